use log::warn;
use serde::{Deserialize, Serialize};

use crate::{square, GeomError, NormalizedPoint, Short};

/// The triangle feasibility slack used when nothing else is configured.
pub const DEFAULT_TOLERANCE: f64 = 0.05;

/// String lengths may dip slightly below zero because of rounding at the spools.
pub const MIN_LENGTH: f64 = -0.05;
pub const MAX_LENGTH: f64 = 1.5;

// The distance between the two spools, in normalized units.
const TOP_EDGE: f64 = 1.0;

/// Lengths of the two strings, from the spools down to the head.
///
/// Normalized so that the top edge between the spools is exactly 1.0.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct StringLengths {
    left: f64,
    right: f64,
}

impl StringLengths {
    pub fn new(left: f64, right: f64) -> Result<Self, GeomError> {
        let in_band = |v: f64| v.is_finite() && (MIN_LENGTH..=MAX_LENGTH).contains(&v);
        if in_band(left) && in_band(right) {
            Ok(StringLengths { left, right })
        } else {
            Err(GeomError::LengthsOutOfRange { left, right })
        }
    }

    pub fn left(&self) -> f64 {
        self.left
    }

    pub fn right(&self) -> f64 {
        self.right
    }

    /// Can these two strings and the top edge form a triangle, allowing for `tolerance` of slop?
    pub fn is_feasible(&self, tolerance: f64) -> bool {
        let (l, r) = (self.left, self.right);
        TOP_EDGE <= l + r + tolerance && l <= TOP_EDGE + r + tolerance && r <= TOP_EDGE + l + tolerance
    }

    fn check_feasible(self, tolerance: f64) -> Result<Self, GeomError> {
        if self.is_feasible(tolerance) {
            Ok(self)
        } else {
            Err(GeomError::Infeasible {
                left: self.left,
                right: self.right,
                tolerance,
            })
        }
    }
}

/// Conversions between positions and string lengths.
///
/// This holds no state apart from the feasibility tolerance, which is a physical tuning
/// parameter rather than part of the geometry.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Kinematics {
    pub tolerance: f64,
}

impl Default for Kinematics {
    fn default() -> Self {
        Kinematics {
            tolerance: DEFAULT_TOLERANCE,
        }
    }
}

impl Kinematics {
    pub fn with_tolerance(tolerance: f64) -> Self {
        Kinematics { tolerance }
    }

    pub fn to_string_lengths(&self, p: &NormalizedPoint) -> Result<StringLengths, GeomError> {
        let left = (square(p.x()) + square(p.y())).sqrt();
        let right = (square(TOP_EDGE - p.x()) + square(p.y())).sqrt();
        StringLengths::new(left, right)?.check_feasible(self.tolerance)
    }

    /// Triangulates the head from the two string lengths, using Heron's formula for the
    /// height of the triangle over the top edge.
    ///
    /// Lengths that are only feasible thanks to the tolerance are clamped onto the edge of the
    /// drawing area instead of being fed to the formula (which would produce NaN).
    pub fn to_point(&self, lengths: &StringLengths) -> Result<NormalizedPoint, GeomError> {
        let StringLengths { left, right } = lengths.check_feasible(self.tolerance)?;

        if left + right <= TOP_EDGE {
            warn!("to_point skirting the top: {}, {}", Short(left), Short(right));
            return NormalizedPoint::new(left, 0.0);
        }
        if right > (square(left) + 1.0).sqrt() {
            warn!("to_point skirting the left: {}, {}", Short(left), Short(right));
            return NormalizedPoint::new(0.0, left);
        }
        if left > (square(right) + 1.0).sqrt() {
            warn!("to_point skirting the right: {}, {}", Short(left), Short(right));
            return NormalizedPoint::new(1.0, right);
        }

        let s = (TOP_EDGE + left + right) / 2.0;
        // The guards above keep every factor non-negative, up to rounding.
        let area = (s * (s - TOP_EDGE) * (s - left) * (s - right)).max(0.0).sqrt();
        let y = area / (0.5 * TOP_EDGE);
        let x = (square(left) - square(y)).max(0.0).sqrt();

        if !(x.is_finite() && y.is_finite()) {
            return Err(GeomError::NonFinite { left, right, x, y });
        }
        NormalizedPoint::new(x, y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn kin() -> Kinematics {
        Kinematics::default()
    }

    fn lengths(left: f64, right: f64) -> StringLengths {
        StringLengths::new(left, right).unwrap()
    }

    #[test]
    fn center_point() {
        let l = kin()
            .to_string_lengths(&NormalizedPoint::new(0.5, 0.5).unwrap())
            .unwrap();
        assert!((l.left() - 0.707).abs() < 1e-3);
        assert!((l.right() - 0.707).abs() < 1e-3);
    }

    #[test]
    fn equilateral_triangle() {
        let p = kin().to_point(&lengths(1.0, 1.0)).unwrap();
        assert!((p.x() - 0.5).abs() < 1e-9);
        assert!((p.y() - 3.0f64.sqrt() / 2.0).abs() < 1e-9);
    }

    #[test]
    fn corners() {
        let k = kin();
        assert_eq!(
            k.to_point(&lengths(0.0, 1.0)).unwrap(),
            NormalizedPoint::UPPER_LEFT
        );
        assert_eq!(
            k.to_point(&lengths(1.0, 0.0)).unwrap(),
            NormalizedPoint::UPPER_RIGHT
        );
    }

    #[test]
    fn skirting_the_top() {
        let p = kin().to_point(&lengths(0.3, 0.68)).unwrap();
        assert_eq!(p, NormalizedPoint::new(0.3, 0.0).unwrap());
    }

    #[test]
    fn skirting_the_left() {
        // Feasible only thanks to the tolerance: the head would be left of the left spool.
        let l = lengths(0.02, 1.04);
        assert!(l.right() > (l.left() * l.left() + 1.0).sqrt());
        let p = kin().to_point(&l).unwrap();
        assert_eq!(p, NormalizedPoint::new(0.0, 0.02).unwrap());
    }

    #[test]
    fn skirting_the_right() {
        let p = kin().to_point(&lengths(1.04, 0.02)).unwrap();
        assert_eq!(p, NormalizedPoint::new(1.0, 0.02).unwrap());
    }

    #[test]
    fn infeasible_lengths_are_rejected() {
        // Far too long a left string for such a short right string.
        let l = lengths(1.5, 0.05);
        assert!(!l.is_feasible(DEFAULT_TOLERANCE));
        assert!(matches!(
            kin().to_point(&l),
            Err(GeomError::Infeasible { .. })
        ));

        // ...but a looser tolerance takes the clamp instead.
        let p = Kinematics::with_tolerance(0.5).to_point(&l).unwrap();
        assert_eq!(p, NormalizedPoint::new(1.0, 0.05).unwrap());
    }

    #[test]
    fn lengths_are_range_checked() {
        assert!(StringLengths::new(1.6, 0.5).is_err());
        assert!(StringLengths::new(-0.1, 0.5).is_err());
        assert!(StringLengths::new(f64::NAN, 0.5).is_err());
        assert!(StringLengths::new(-0.04, 1.5).is_ok());
    }

    #[test]
    fn far_corner_is_too_long() {
        let far = NormalizedPoint::new(1.1, 1.1).unwrap();
        assert!(matches!(
            kin().to_string_lengths(&far),
            Err(GeomError::LengthsOutOfRange { .. })
        ));
    }

    proptest! {
        // Check that to_string_lengths and to_point are inverses.
        #[test]
        fn test_point_inverse(x in 0.0..=1.0f64, y in 0.0..=1.0f64) {
            let k = kin();
            let p = NormalizedPoint::new(x, y).unwrap();
            let q = k.to_point(&k.to_string_lengths(&p).unwrap()).unwrap();
            assert!((p.x() - q.x()).abs() < 1e-6, "{p} -> {q}");
            assert!((p.y() - q.y()).abs() < 1e-6, "{p} -> {q}");
        }

        // And the other way around, for lengths that don't hit one of the clamps.
        #[test]
        fn test_lengths_inverse(left in 0.0..1.5f64, right in 0.0..1.5f64) {
            let k = kin();
            let l = lengths(left, right);
            prop_assume!(left + right > 1.0);
            prop_assume!(right <= (left * left + 1.0).sqrt());
            prop_assume!(left <= (right * right + 1.0).sqrt());
            // Some triangles hang the head below the soft band of the drawing area.
            let Ok(p) = k.to_point(&l) else {
                return Ok(());
            };
            let back = k.to_string_lengths(&p).unwrap();
            assert!((back.left() - left).abs() < 1e-6, "{l:?} -> {p} -> {back:?}");
            assert!((back.right() - right).abs() < 1e-6, "{l:?} -> {p} -> {back:?}");
        }

        // Nothing that passes the feasibility check may produce NaN.
        #[test]
        fn test_never_non_finite(left in MIN_LENGTH..=MAX_LENGTH, right in MIN_LENGTH..=MAX_LENGTH) {
            let res = kin().to_point(&lengths(left, right));
            assert!(!matches!(res, Err(GeomError::NonFinite { .. })));
        }
    }
}
