//! Projection operators onto the feasible sets used for source morphologies.
//!
//! # Operators
//!
//! - **symmetry**: 2-fold rotational symmetry about an arbitrary pixel
//! - **monotonic**: non-increasing flux moving outward from a center pixel
//! - **threshold**: hard (L0) and soft (L1) thresholding of coefficients
//!
//! All operators take ownership of (or mutably borrow) the array they project,
//! so a projection never aliases the data it reads from.

pub mod monotonic;
pub mod symmetry;
pub mod threshold;

pub use monotonic::{NeighborWeight, WeightedMonotonic};
pub use symmetry::{prox_uncentered_symmetry, SymmetryAlgorithm};
pub use threshold::{prox_hard, prox_plus, prox_soft};
