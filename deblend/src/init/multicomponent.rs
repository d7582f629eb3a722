//! Layered decomposition of an extended morphology.
//!
//! Flux percentiles of the peak cut the morphology into stacked layers: the
//! first layer holds everything up to the lowest threshold, each further layer
//! the slice between consecutive thresholds, and the last layer the remainder.
//! The layers sum to the original morphology. Their SEDs are refit jointly by
//! linear least squares against the observed images in the source box.

use log::warn;
use nalgebra::DMatrix;
use ndarray::{concatenate, Array2, Array3, ArrayView2, ArrayView3, Axis};

use crate::bbox::BoundingBox;
use crate::error::{InitError, Result};
use crate::frame::Frame;
use crate::init::morphology::{init_extended_source, Coadd, MorphologyOptions};
use crate::observation::{interpolate_observation, Observation};

/// Tolerance on singular values when the Gram matrix must be pseudo-inverted
const PSEUDO_INVERSE_EPSILON: f64 = 1e-12;

/// Percentile used by the default multi-component configuration
pub const DEFAULT_FLUX_PERCENTILES: [f64; 1] = [25.0];

/// Initial parameters of a multi-component source
#[derive(Debug, Clone)]
pub struct MultiComponentInit {
    /// One SED per layer, `(K, C)`
    pub seds: Array2<f64>,
    /// Peak-normalized layers, `(K, Ny, Nx)`
    pub morphs: Array3<f64>,
    pub bbox: BoundingBox,
}

/// Split `morph` into `flux_percentiles.len() + 1` layers that sum to it
///
/// Percentiles are sorted ascending before use. Layers are not normalized.
pub fn split_layers(morph: &ArrayView2<f64>, flux_percentiles: &[f64]) -> Array3<f64> {
    let mut percentiles = flux_percentiles.to_vec();
    percentiles.sort_by(f64::total_cmp);

    let k_total = percentiles.len() + 1;
    let (ny, nx) = morph.dim();
    let mut layers = Array3::zeros((k_total, ny, nx));
    layers.index_axis_mut(Axis(0), 0).assign(morph);

    let max_flux = morph.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let mut last_thresh = 0.0;
    for (k, &percentile) in (1..k_total).zip(&percentiles) {
        let flux_thresh = percentile * max_flux / 100.0;
        for ((i, j), &value) in morph.indexed_iter() {
            if value > flux_thresh {
                layers[[k - 1, i, j]] = flux_thresh - last_thresh;
                layers[[k, i, j]] = value - flux_thresh;
            }
        }
        last_thresh = flux_thresh;
    }
    layers
}

/// Least-squares SEDs `(K, C)` for fixed morphologies `(K, Ny, Nx)` and images `(C, Ny, Nx)`
///
/// Solves the normal equations `(M Mᵀ) A = M Dᵀ`. A singular Gram matrix, as
/// produced by an empty layer, falls back to its pseudo-inverse.
pub fn get_best_fit_seds(morphs: &ArrayView3<f64>, images: &ArrayView3<f64>) -> Result<Array2<f64>> {
    let (k_total, my, mx) = morphs.dim();
    let (channels, iy, ix) = images.dim();
    if (my, mx) != (iy, ix) {
        return Err(InitError::ShapeMismatch(format!(
            "morphologies are {my}x{mx}, images are {iy}x{ix}"
        )));
    }
    let pixels = my * mx;

    let morph_matrix = DMatrix::from_row_iterator(k_total, pixels, morphs.iter().copied());
    let data_matrix = DMatrix::from_row_iterator(channels, pixels, images.iter().copied());

    let gram = &morph_matrix * morph_matrix.transpose();
    let projection = &morph_matrix * data_matrix.transpose();

    let inverse = match gram.clone().try_inverse() {
        Some(inverse) => inverse,
        None => {
            warn!("Singular morphology Gram matrix, using its pseudo-inverse");
            gram.pseudo_inverse(PSEUDO_INVERSE_EPSILON)
                .map_err(|e| InitError::ShapeMismatch(e.to_string()))?
        }
    };
    let seds = inverse * projection;
    Ok(Array2::from_shape_fn((k_total, channels), |(k, c)| seds[(k, c)]))
}

/// Initialize the layered morphologies, their SEDs and the shared box
///
/// The base morphology comes from [`init_extended_source`]; SEDs are fit
/// inside the source box against every observation resampled onto the model
/// grid, so they cover the same concatenated channels as the extended SED.
pub fn init_multicomponent_source(
    sky_coord: (f64, f64),
    frame: &Frame,
    observations: &[Observation],
    coadd: Option<Coadd<'_>>,
    flux_percentiles: &[f64],
    options: &MorphologyOptions,
) -> Result<MultiComponentInit> {
    let extended = init_extended_source(sky_coord, frame, observations, coadd, options)?;
    let mut morphs = split_layers(&extended.morph.view(), flux_percentiles);
    for (k, mut layer) in morphs.axis_iter_mut(Axis(0)).enumerate() {
        let peak = layer.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        if peak <= 0.0 {
            warn!(
                "Zero or negative morphology for component {k} at y={}, x={}",
                sky_coord.0, sky_coord.1
            );
            continue;
        }
        layer /= peak;
    }

    // Every observation's channels, on the model grid, inside the source box
    let spatial = extended.bbox.spatial();
    let boxed: Vec<Array3<f64>> = observations
        .iter()
        .map(|obs| {
            if obs.frame().same_grid(frame) {
                spatial.extract_from_cube(&obs.images())
            } else {
                spatial.extract_from_cube(&interpolate_observation(obs, frame).view())
            }
        })
        .collect();
    let views: Vec<ArrayView3<f64>> = boxed.iter().map(|b| b.view()).collect();
    let boxed_images = concatenate(Axis(0), &views).map_err(|e| InitError::ShapeMismatch(e.to_string()))?;
    let seds = get_best_fit_seds(&morphs.view(), &boxed_images.view())?;

    for (k, sed) in seds.axis_iter(Axis(0)).enumerate() {
        if sed.iter().all(|&v| v <= 0.0) {
            warn!(
                "Zero or negative SED {sed} for component {k} at y={}, x={}",
                sky_coord.0, sky_coord.1
            );
        }
    }

    Ok(MultiComponentInit {
        seds,
        morphs,
        bbox: extended.bbox,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synthetic::gaussian_blob;
    use approx::assert_relative_eq;
    use ndarray::{arr2, Array1};

    #[test]
    fn test_quarter_percentile_layers() {
        let morph = arr2(&[[0.5, 1.0, 0.5], [1.0, 4.0, 2.0], [0.5, 1.5, 0.5]]);
        let layers = split_layers(&morph.view(), &[25.0]);
        assert_eq!(layers.dim(), (2, 3, 3));

        // Above 25% of the peak the first layer is capped at 1.0
        assert_eq!(layers[[0, 1, 1]], 1.0);
        assert_eq!(layers[[0, 1, 2]], 1.0);
        assert_eq!(layers[[0, 2, 1]], 1.0);
        // The second layer holds the remainder
        assert_eq!(layers[[1, 1, 1]], 3.0);
        assert_eq!(layers[[1, 1, 2]], 1.0);
        assert_relative_eq!(layers[[1, 2, 1]], 0.5);
        // At or below the threshold everything stays in the first layer
        assert_eq!(layers[[0, 0, 1]], 1.0);
        assert_eq!(layers[[1, 0, 1]], 0.0);
        assert_eq!(layers[[0, 0, 0]], 0.5);
    }

    #[test]
    fn test_layers_sum_to_morphology() {
        let morph = gaussian_blob((21, 17), (10.0, 7.5), 3.0, 2.5);
        for percentiles in [vec![25.0], vec![75.0, 10.0, 40.0], vec![], vec![50.0, 50.0]] {
            let layers = split_layers(&morph.view(), &percentiles);
            assert_eq!(layers.dim().0, percentiles.len() + 1);
            let total = layers.sum_axis(Axis(0));
            for (a, b) in total.iter().zip(morph.iter()) {
                assert_relative_eq!(a, b, epsilon = 1e-12);
            }
            assert!(layers.iter().all(|&v| v >= 0.0));
        }
    }

    #[test]
    fn test_best_fit_recovers_seds() {
        let m0 = gaussian_blob((16, 16), (8.0, 8.0), 1.5, 1.0);
        let m1 = gaussian_blob((16, 16), (8.0, 8.0), 4.0, 1.0);
        let mut morphs = Array3::zeros((2, 16, 16));
        morphs.index_axis_mut(Axis(0), 0).assign(&m0);
        morphs.index_axis_mut(Axis(0), 1).assign(&m1);

        let true_seds = arr2(&[[3.0, 1.0, 0.5], [0.2, 2.0, 4.0]]);
        let mut images = Array3::zeros((3, 16, 16));
        for c in 0..3 {
            let plane = &m0 * true_seds[[0, c]] + &m1 * true_seds[[1, c]];
            images.index_axis_mut(Axis(0), c).assign(&plane);
        }

        let seds = get_best_fit_seds(&morphs.view(), &images.view()).unwrap();
        assert_eq!(seds.dim(), (2, 3));
        for (a, b) in seds.iter().zip(true_seds.iter()) {
            assert_relative_eq!(a, b, epsilon = 1e-8);
        }
    }

    #[test]
    fn test_best_fit_with_empty_layer() {
        let mut morphs = Array3::zeros((2, 8, 8));
        morphs
            .index_axis_mut(Axis(0), 0)
            .assign(&gaussian_blob((8, 8), (4.0, 4.0), 1.0, 1.0));
        let images = morphs.index_axis(Axis(0), 0).to_owned().insert_axis(Axis(0)) * 2.0;

        let seds = get_best_fit_seds(&morphs.view(), &images.view()).unwrap();
        assert_relative_eq!(seds[[0, 0]], 2.0, epsilon = 1e-8);
        assert_relative_eq!(seds[[1, 0]], 0.0, epsilon = 1e-8);
    }

    #[test]
    fn test_best_fit_shape_mismatch() {
        let morphs = Array3::<f64>::zeros((1, 4, 4));
        let images = Array3::<f64>::zeros((2, 4, 5));
        assert!(get_best_fit_seds(&morphs.view(), &images.view()).is_err());
    }

    #[test]
    fn test_init_multicomponent() {
        let frame = Frame::new((2, 48, 48));
        let blob = gaussian_blob((48, 48), (24.0, 24.0), 2.5, 10.0);
        let sed = Array1::from(vec![1.0, 3.0]);
        let images = Array3::from_shape_fn((2, 48, 48), |(c, i, j)| sed[c] * blob[[i, j]]);
        let obs = Observation::new(images, frame.clone())
            .unwrap()
            .with_weights(Array3::ones((2, 48, 48)))
            .unwrap();

        let init = init_multicomponent_source(
            (24.0, 24.0),
            &frame,
            &[obs],
            None,
            &DEFAULT_FLUX_PERCENTILES,
            &MorphologyOptions::default(),
        )
        .unwrap();

        assert_eq!(init.morphs.dim().0, 2);
        assert_eq!(init.seds.dim(), (2, 2));
        for layer in init.morphs.axis_iter(Axis(0)) {
            assert_relative_eq!(layer.iter().copied().fold(f64::MIN, f64::max), 1.0);
        }
        assert!(init.bbox.contains(&[0, 24, 24]));
        // Both layers share the observed colour
        for k in 0..2 {
            assert_relative_eq!(init.seds[[k, 1]] / init.seds[[k, 0]], 3.0, max_relative = 1e-6);
        }
    }

    #[test]
    fn test_no_percentiles_gives_one_layer() {
        let frame = Frame::new((2, 48, 48));
        let blob = gaussian_blob((48, 48), (24.0, 24.0), 2.5, 10.0);
        let images = Array3::from_shape_fn((2, 48, 48), |(c, i, j)| (1.0 + 2.0 * c as f64) * blob[[i, j]]);
        let obs = Observation::new(images, frame.clone())
            .unwrap()
            .with_weights(Array3::ones((2, 48, 48)))
            .unwrap();

        let init =
            init_multicomponent_source((24.0, 24.0), &frame, &[obs], None, &[], &MorphologyOptions::default())
                .unwrap();
        assert_eq!(init.morphs.dim().0, 1);
        assert_eq!(init.seds.dim(), (1, 2));
        assert_relative_eq!(init.morphs.iter().copied().fold(f64::MIN, f64::max), 1.0);
        assert_relative_eq!(init.seds[[0, 1]] / init.seds[[0, 0]], 3.0, max_relative = 1e-6);
    }
}
