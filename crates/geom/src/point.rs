use kurbo::Vec2;
use serde::{Deserialize, Serialize};

use crate::{GeomError, Short};

/// Points are allowed to stray a little outside of the unit square, because calibration and
/// rounding errors can push a measured position slightly past an edge.
pub(crate) const SOFT_MIN: f64 = -0.1;
pub(crate) const SOFT_MAX: f64 = 1.1;

/// How far outside the unit square a commanded target may be and still count as inside.
const UNIT_SQUARE_SLACK: f64 = 1e-9;

/// A position on the drawing area, in normalized coordinates.
///
/// (0, 0) is the upper-left spool and (1, 0) is the upper-right spool. Both coordinates are
/// finite and within `[-0.1, 1.1]`; every constructor and every operation that produces a new
/// position checks this.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawPoint")]
pub struct NormalizedPoint {
    x: f64,
    y: f64,
}

#[derive(Deserialize)]
struct RawPoint {
    x: f64,
    y: f64,
}

impl TryFrom<RawPoint> for NormalizedPoint {
    type Error = GeomError;

    fn try_from(raw: RawPoint) -> Result<Self, GeomError> {
        NormalizedPoint::new(raw.x, raw.y)
    }
}

impl NormalizedPoint {
    pub const UPPER_LEFT: NormalizedPoint = NormalizedPoint { x: 0.0, y: 0.0 };
    pub const UPPER_RIGHT: NormalizedPoint = NormalizedPoint { x: 1.0, y: 0.0 };
    pub const LOWER_RIGHT: NormalizedPoint = NormalizedPoint { x: 1.0, y: 1.0 };
    pub const LOWER_LEFT: NormalizedPoint = NormalizedPoint { x: 0.0, y: 1.0 };

    pub fn new(x: f64, y: f64) -> Result<Self, GeomError> {
        let in_band = |v: f64| v.is_finite() && (SOFT_MIN..=SOFT_MAX).contains(&v);
        if in_band(x) && in_band(y) {
            Ok(NormalizedPoint { x, y })
        } else {
            Err(GeomError::OutOfRange { x, y })
        }
    }

    pub fn x(&self) -> f64 {
        self.x
    }

    pub fn y(&self) -> f64 {
        self.y
    }

    /// Is this point inside the unit square proper (not just the soft band around it)?
    ///
    /// Only points that pass this check may be commanded as motion targets.
    pub fn is_in_unit_square(&self) -> bool {
        let inside = |v: f64| (-UNIT_SQUARE_SLACK..=1.0 + UNIT_SQUARE_SLACK).contains(&v);
        inside(self.x) && inside(self.y)
    }

    /// The nearest point of the unit square.
    pub fn clamp_to_unit_square(&self) -> NormalizedPoint {
        NormalizedPoint {
            x: self.x.clamp(0.0, 1.0),
            y: self.y.clamp(0.0, 1.0),
        }
    }

    pub fn distance_to(&self, other: &NormalizedPoint) -> f64 {
        self.subtract_direction(other).hypot()
    }

    /// The vector from `other` to `self`.
    ///
    /// This is a direction, not a position, so it isn't range-checked.
    pub fn subtract_direction(&self, other: &NormalizedPoint) -> Vec2 {
        Vec2::new(self.x - other.x, self.y - other.y)
    }

    /// Moves this point by `v`, failing if the result isn't a valid position.
    pub fn add(&self, v: Vec2) -> Result<NormalizedPoint, GeomError> {
        NormalizedPoint::new(self.x + v.x, self.y + v.y)
    }

    /// Heads towards `other`, but goes no further than `max_distance`.
    ///
    /// If `other` is already within `max_distance`, this is just `other`.
    pub fn scaled_towards(
        &self,
        other: &NormalizedPoint,
        max_distance: f64,
    ) -> Result<NormalizedPoint, GeomError> {
        let v = other.subtract_direction(self);
        let dist = v.hypot();
        if dist <= max_distance {
            return Ok(*other);
        }
        self.add(v * (max_distance / dist))
    }

    /// `n` evenly spaced points from `self` to `other`, including both ends.
    pub fn lerp_points(
        &self,
        other: &NormalizedPoint,
        n: usize,
    ) -> Result<Vec<NormalizedPoint>, GeomError> {
        match n {
            0 => Ok(Vec::new()),
            1 => Ok(vec![*self]),
            _ => {
                let v = other.subtract_direction(self);
                (0..n)
                    .map(|i| {
                        let t = i as f64 / (n - 1) as f64;
                        self.add(v * t)
                    })
                    .collect()
            }
        }
    }
}

impl From<NormalizedPoint> for kurbo::Point {
    fn from(p: NormalizedPoint) -> kurbo::Point {
        kurbo::Point::new(p.x, p.y)
    }
}

impl core::fmt::Display for NormalizedPoint {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "({}, {})", Short(self.x), Short(self.y))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn pt(x: f64, y: f64) -> NormalizedPoint {
        NormalizedPoint::new(x, y).unwrap()
    }

    #[test]
    fn rejects_points_outside_the_band() {
        assert!(NormalizedPoint::new(1.2, 0.5).is_err());
        assert!(NormalizedPoint::new(0.5, -0.2).is_err());
        assert!(NormalizedPoint::new(f64::NAN, 0.5).is_err());
        assert!(NormalizedPoint::new(0.5, f64::INFINITY).is_err());
        assert!(NormalizedPoint::new(-0.1, 1.1).is_ok());
    }

    #[test]
    fn soft_band_is_not_the_unit_square() {
        let p = pt(1.05, 0.5);
        assert!(!p.is_in_unit_square());
        assert_eq!(p.clamp_to_unit_square(), pt(1.0, 0.5));
        assert!(pt(1.0, 0.0).is_in_unit_square());
    }

    #[test]
    fn add_revalidates() {
        let p = pt(1.0, 1.0);
        assert!(p.add(Vec2::new(0.05, 0.0)).is_ok());
        assert_eq!(
            p.add(Vec2::new(0.5, 0.0)),
            Err(GeomError::OutOfRange { x: 1.5, y: 1.0 })
        );
    }

    #[test]
    fn scaled_towards_clamps_long_moves() {
        let from = pt(0.0, 0.0);
        let to = pt(1.0, 0.0);
        let hop = from.scaled_towards(&to, 0.1).unwrap();
        assert!((hop.x() - 0.1).abs() < 1e-12);
        assert_eq!(hop.y(), 0.0);

        let near = pt(0.05, 0.0);
        assert_eq!(from.scaled_towards(&near, 0.1).unwrap(), near);
    }

    #[test]
    fn lerp_includes_both_ends() {
        let a = pt(0.0, 0.0);
        let b = pt(1.0, 0.5);
        let pts = a.lerp_points(&b, 5).unwrap();
        assert_eq!(pts.len(), 5);
        assert_eq!(pts[0], a);
        assert!(pts[4].distance_to(&b) < 1e-12);
        assert!((pts[2].x() - 0.5).abs() < 1e-12);
        assert!((pts[2].y() - 0.25).abs() < 1e-12);

        assert!(a.lerp_points(&b, 0).unwrap().is_empty());
        assert_eq!(a.lerp_points(&b, 1).unwrap(), vec![a]);
    }

    #[test]
    fn deserialize_validates() {
        let ok: NormalizedPoint = serde_json::from_str(r#"{"x": 0.25, "y": 0.75}"#).unwrap();
        assert_eq!(ok, pt(0.25, 0.75));
        assert!(serde_json::from_str::<NormalizedPoint>(r#"{"x": 3.0, "y": 0.75}"#).is_err());
    }

    proptest! {
        #[test]
        fn hop_never_exceeds_max_distance(
            ax in 0.0..1.0f64, ay in 0.0..1.0f64,
            bx in 0.0..1.0f64, by in 0.0..1.0f64,
            max in 0.001..0.5f64,
        ) {
            let a = pt(ax, ay);
            let b = pt(bx, by);
            let hop = a.scaled_towards(&b, max).unwrap();
            assert!(a.distance_to(&hop) <= max + 1e-12);
            // The hop stays on the segment from a to b.
            assert!((a.distance_to(&hop) + hop.distance_to(&b) - a.distance_to(&b)).abs() < 1e-9);
        }
    }
}
