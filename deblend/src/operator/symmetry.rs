//! 2-fold rotational symmetry about an arbitrary center pixel.

use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// How a pixel and its 180° partner are reconciled
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SymmetryAlgorithm {
    /// Both pixels take the smaller of the two values
    Sdss,
    /// Blend toward the pair mean; `strength = 1` is the full mean
    Soft { strength: f64 },
}

impl Default for SymmetryAlgorithm {
    fn default() -> Self {
        Self::Sdss
    }
}

/// Project `image` onto images symmetric under a 180° rotation about `center`
///
/// Pixels whose rotated partner falls outside the image cannot be made
/// symmetric and are set to zero.
pub fn prox_uncentered_symmetry(
    mut image: Array2<f64>,
    center: (usize, usize),
    algorithm: SymmetryAlgorithm,
) -> Array2<f64> {
    let (ny, nx) = image.dim();
    let (cy, cx) = (center.0 as i64, center.1 as i64);
    let source = image.clone();

    for ((i, j), value) in image.indexed_iter_mut() {
        let pi = 2 * cy - i as i64;
        let pj = 2 * cx - j as i64;
        if pi < 0 || pj < 0 || pi >= ny as i64 || pj >= nx as i64 {
            *value = 0.0;
            continue;
        }
        let own = source[[i, j]];
        let partner = source[[pi as usize, pj as usize]];
        *value = match algorithm {
            SymmetryAlgorithm::Sdss => own.min(partner),
            SymmetryAlgorithm::Soft { strength } => {
                (1.0 - strength) * own + strength * 0.5 * (own + partner)
            }
        };
    }
    image
}
