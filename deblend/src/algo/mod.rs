//! Numerical helpers shared by the initialization routines
//!
//! Small array utilities that are not specific to any one source archetype:
//! robust statistics and sub-pixel resampling on the unit pixel grid.

pub mod bilinear;
pub mod stats;

pub use bilinear::{sample_bilinear, shift_image};
pub use stats::{mad, median};
