//! Morphology of an extended source from the detection coadd.
//!
//! The coadd is optionally symmetrized and made monotonic about the source
//! center, then trimmed at `bg_cutoff * thresh`. The surviving pixels decide the
//! box size, which starts at 16 pixels and doubles until the box holds all of
//! them.

use log::{debug, warn};
use ndarray::{Array1, Array2, ArrayView2};
use serde::{Deserialize, Serialize};

use crate::bbox::BoundingBox;
use crate::error::{InitError, Result};
use crate::frame::Frame;
use crate::init::coadd::build_sed_coadd;
use crate::init::sed::estimate_seds;
use crate::observation::Observation;
use crate::operator::{prox_uncentered_symmetry, NeighborWeight, SymmetryAlgorithm, WeightedMonotonic};

/// Side of the smallest box a source can get
pub const BASE_BOX_SIZE: usize = 16;

/// A detection image supplied by the caller instead of being built from the observations
#[derive(Debug, Clone, Copy)]
pub struct Coadd<'a> {
    pub image: ArrayView2<'a, f64>,
    /// Noise cutoff of `image`; required whenever a coadd is supplied
    pub bg_cutoff: Option<f64>,
}

/// Projections applied to the coadd before trimming
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MorphologyOptions {
    /// Multiple of the background cutoff below which pixels are dropped
    pub thresh: f64,
    /// Enforce 180° symmetry about the center
    pub symmetric: bool,
    /// Enforce monotonic decline from the center with this neighbour weighting
    pub monotonic: Option<NeighborWeight>,
    /// Minimum relative decline per pixel for the monotonic projection
    pub min_grad: f64,
}

impl Default for MorphologyOptions {
    fn default() -> Self {
        Self {
            thresh: 1.0,
            symmetric: true,
            monotonic: Some(NeighborWeight::Flat),
            min_grad: 0.2,
        }
    }
}

/// Initial SED, morphology and box of an extended source
#[derive(Debug, Clone)]
pub struct ExtendedInit {
    /// SED of each observation
    pub seds: Vec<Array1<f64>>,
    /// All observation SEDs concatenated
    pub sed: Array1<f64>,
    /// Morphology inside the spatial part of `bbox`, 1 at the center
    pub morph: Array2<f64>,
    /// `(channel, row, column)` box of the source in the model frame
    pub bbox: BoundingBox,
}

fn center_in(image_shape: (usize, usize), sky_coord: (f64, f64), frame: &Frame) -> Result<(usize, usize)> {
    let (cy, cx) = frame.get_pixel(sky_coord);
    let (ny, nx) = image_shape;
    if cy < 0 || cx < 0 || cy as usize >= ny || cx as usize >= nx {
        let (y, x) = frame.get_pixel_f64(sky_coord);
        return Err(InitError::OutOfFrame { y, x });
    }
    Ok((cy as usize, cx as usize))
}

/// Trim `morph` to a centered power-of-two box around the source
///
/// Pixels at or below `bg_cutoff * thresh` are zeroed and the rest is
/// normalized to 1 at the center. Without any pixel above the cutoff the
/// morphology is left as is inside a box of [`BASE_BOX_SIZE`].
pub fn trim_morphology(
    sky_coord: (f64, f64),
    frame: &Frame,
    mut morph: Array2<f64>,
    bg_cutoff: f64,
    thresh: f64,
) -> Result<(Array2<f64>, BoundingBox)> {
    let (cy, cx) = center_in(morph.dim(), sky_coord, frame)?;
    let cutoff = bg_cutoff * thresh;
    let mut boxsize = BASE_BOX_SIZE;

    if morph.iter().any(|&v| v > cutoff) {
        morph.mapv_inplace(|v| if v > cutoff { v } else { 0.0 });

        let center_value = morph[[cy, cx]];
        let norm = if center_value > 0.0 {
            center_value
        } else {
            warn!(
                "Center below threshold for source at y={} x={}, normalizing by the peak",
                sky_coord.0, sky_coord.1
            );
            morph.iter().copied().fold(0.0, f64::max)
        };
        if norm > 0.0 {
            morph /= norm;
        }

        if let Some(tight) = BoundingBox::from_data(&morph.view(), 0.0) {
            let (cy, cx) = (cy as i64, cx as i64);
            let reach = [
                cy - tight.start[0],
                tight.stop[0] - cy,
                cx - tight.start[1],
                tight.stop[1] - cx,
            ]
            .into_iter()
            .max()
            .unwrap_or(0);
            let size = 2 * reach.max(0) as usize;
            while boxsize < size {
                boxsize *= 2;
            }
            debug!(
                "Flux above {cutoff:.3e} spans {:?}..{:?}, box size {boxsize}",
                tight.start, tight.stop
            );
        }
    } else {
        warn!(
            "No flux above threshold for source at y={} x={}",
            sky_coord.0, sky_coord.1
        );
    }

    let bbox = BoundingBox::centered((cy as i64, cx as i64), boxsize);
    let morph = bbox.extract_from(&morph.view());
    let bbox_3d = bbox.with_channels((0, frame.n_channels() as i64));
    Ok((morph, bbox_3d))
}

/// Initialize the SED, morphology and box of an extended source at `sky_coord`
///
/// Without a supplied `coadd` the detection image is built from the
/// observations, which then need inverse-variance weights.
pub fn init_extended_source(
    sky_coord: (f64, f64),
    frame: &Frame,
    observations: &[Observation],
    coadd: Option<Coadd<'_>>,
    options: &MorphologyOptions,
) -> Result<ExtendedInit> {
    let (seds, sed) = estimate_seds(sky_coord, frame, observations)?;

    let (detect, bg_cutoff) = match coadd {
        Some(Coadd {
            image,
            bg_cutoff: Some(cutoff),
        }) => (image.to_owned(), cutoff),
        Some(Coadd { bg_cutoff: None, .. }) => return Err(InitError::MissingBackgroundCutoff),
        None => {
            let bg_rms = observations
                .iter()
                .enumerate()
                .map(|(index, obs)| obs.bg_rms(index))
                .collect::<Result<Vec<_>>>()?;
            build_sed_coadd(&seds, &bg_rms, observations)?
        }
    };

    let center = center_in(detect.dim(), sky_coord, frame)?;
    let mut morph = if options.symmetric {
        prox_uncentered_symmetry(detect, center, SymmetryAlgorithm::Sdss)
    } else {
        detect
    };
    if let Some(neighbor_weight) = options.monotonic {
        WeightedMonotonic::new(morph.dim(), neighbor_weight, center, options.min_grad).project(&mut morph);
    }

    let (morph, bbox) = trim_morphology(sky_coord, frame, morph, bg_cutoff, options.thresh)?;
    Ok(ExtendedInit {
        seds,
        sed,
        morph,
        bbox,
    })
}
