use thiserror::Error;

/// Everything that can go wrong when building or transforming geometry.
///
/// - `OutOfRange`: a point left the soft band around the unit square (or isn't finite).
/// - `LengthsOutOfRange`: a pair of string lengths left their allowed band (or isn't finite).
/// - `Infeasible`: the two strings and the top edge can't form a triangle, even allowing for
///   `tolerance`. This usually means a bad calibration, or a command that overshoots the
///   mechanism.
/// - `NonFinite`: the triangle formula produced NaN or infinity. The degenerate-case guards
///   should make this unreachable.
#[derive(Error, Debug, Clone, Copy, PartialEq)]
pub enum GeomError {
    #[error("point ({x:.4}, {y:.4}) is outside of [{min}, {max}]", min = crate::point::SOFT_MIN, max = crate::point::SOFT_MAX)]
    OutOfRange { x: f64, y: f64 },

    #[error("string lengths (left {left:.4}, right {right:.4}) are outside of [{min}, {max}]", min = crate::MIN_LENGTH, max = crate::MAX_LENGTH)]
    LengthsOutOfRange { left: f64, right: f64 },

    #[error("string lengths (left {left:.4}, right {right:.4}) don't make a triangle with the top edge (tolerance {tolerance})")]
    Infeasible { left: f64, right: f64, tolerance: f64 },

    #[error("non-finite position ({x}, {y}) from string lengths (left {left:.4}, right {right:.4})")]
    NonFinite { left: f64, right: f64, x: f64, y: f64 },
}
