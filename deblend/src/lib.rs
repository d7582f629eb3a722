//! Source initialization for multi-band astronomical image deblending.
//!
//! Given one or more multi-band observations and the sky positions of
//! detected sources, this crate builds a first guess of every source's
//! spectral energy distribution (SED) and spatial morphology, together with
//! the bounding box and the constraints an optimizer should enforce.
//!
//! # Modules
//!
//! - [`frame`] and [`observation`]: model grid, PSFs and observed data
//! - [`init`]: SED estimates, detection coadds and morphology initialization
//! - [`operator`] and [`constraint`]: projections onto feasible sets
//! - [`wavelet`]: starlet transform and wavelet noise estimate
//! - [`source`]: archetype builders producing ready-to-fit sources
//! - [`synthetic`]: seeded synthetic scenes for tests and demos

pub mod algo;
pub mod bbox;
pub mod constraint;
pub mod error;
pub mod frame;
pub mod init;
pub mod observation;
pub mod operator;
pub mod parameter;
pub mod source;
pub mod synthetic;
pub mod wavelet;

pub use bbox::BoundingBox;
pub use constraint::{Constraint, ConstraintChain, NormalizationKind};
pub use error::{InitError, Result};
pub use frame::{AffineWcs, Frame, GaussianPsf, ImagePsf, Psf};
pub use observation::{Observation, ObservationKind};
pub use parameter::{Parameter, StepRule};
pub use source::{Source, SourceConfig};
