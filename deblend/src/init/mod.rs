//! Initial guesses for source parameters.
//!
//! # Stages
//!
//! - **sed**: per-band flux at a sky position, optionally PSF corrected
//! - **coadd**: SED-weighted detection image and its noise cutoff
//! - **morphology**: symmetric, monotonic, trimmed morphology with its box
//! - **multicomponent**: flux-percentile layers and their joint best-fit SEDs

pub mod coadd;
pub mod morphology;
pub mod multicomponent;
pub mod sed;

pub use coadd::build_sed_coadd;
pub use morphology::{init_extended_source, trim_morphology, Coadd, ExtendedInit, MorphologyOptions};
pub use multicomponent::{
    get_best_fit_seds, init_multicomponent_source, split_layers, MultiComponentInit, DEFAULT_FLUX_PERCENTILES,
};
pub use sed::{estimate_seds, get_pixel_sed, get_psf_sed};
