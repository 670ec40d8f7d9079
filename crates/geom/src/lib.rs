//! Basic geometry of the whiteboard bot, including conversion between
//! Cartesian coordinates and string lengths.
//!
//! The pen carriage (the "head") hangs from two strings. Each string runs
//! from the head up to a spool, and the two spools sit at the top corners of
//! the drawing area. Everything in this crate works in *normalized* units:
//! the distance between the two spools is exactly 1.0, the upper-left spool
//! is at (0, 0) and y grows downwards.
//!
//! Physical lengths (what a spool actually winds) are measured in
//! centimeters and carried around as [`Len`], so that they can't be confused
//! with normalized values.

mod error;
mod kinematics;
mod point;

pub use error::GeomError;
pub use kinematics::{Kinematics, StringLengths, DEFAULT_TOLERANCE, MAX_LENGTH, MIN_LENGTH};
pub use point::NormalizedPoint;

pub struct Cm;

pub type Len = euclid::Length<f64, Cm>;

pub(crate) fn square<T: core::ops::Mul<T> + Copy>(x: T) -> <T as core::ops::Mul<T>>::Output {
    x * x
}

pub trait LenExt {
    fn cm(self) -> Len;
}

impl LenExt for f64 {
    fn cm(self) -> Len {
        Len::new(self)
    }
}

/// A pair of values, one per spool.
///
/// Left and right are measured from the point of view of the person
/// looking at the whiteboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct LeftRight<T> {
    pub left: T,
    pub right: T,
}

impl<T> LeftRight<T> {
    pub fn new(left: T, right: T) -> Self {
        LeftRight { left, right }
    }

    pub fn map<U>(self, mut f: impl FnMut(T) -> U) -> LeftRight<U> {
        LeftRight {
            left: f(self.left),
            right: f(self.right),
        }
    }
}

/// Shorter floats for the logs.
pub(crate) struct Short(pub f64);

impl core::fmt::Display for Short {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{:.3}", self.0)
    }
}
