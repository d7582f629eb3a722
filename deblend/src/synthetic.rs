//! Deterministic synthetic scenes for tests and demos.

use ndarray::{Array2, Array3, Axis};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};

use crate::error::{InitError, Result};

/// Circular Gaussian profile with peak `amplitude` at the sub-pixel `center`
pub fn gaussian_blob(shape: (usize, usize), center: (f64, f64), sigma: f64, amplitude: f64) -> Array2<f64> {
    Array2::from_shape_fn(shape, |(i, j)| {
        let r2 = (i as f64 - center.0).powi(2) + (j as f64 - center.1).powi(2);
        amplitude * (-r2 / (2.0 * sigma * sigma)).exp()
    })
}

/// Array of normally distributed values from a seeded generator
///
/// `std_dev` must be positive.
pub fn simple_normal_array(size: (usize, usize, usize), mean: f64, std_dev: f64, seed: u64) -> Result<Array3<f64>> {
    if !(std_dev > 0.0) {
        return Err(InitError::InvalidConfig(format!(
            "noise standard deviation must be positive, got {std_dev}"
        )));
    }
    let mut rng = StdRng::seed_from_u64(seed);
    let normal_dist = Normal::new(mean, std_dev)
        .map_err(|e| InitError::InvalidConfig(format!("noise distribution: {e}")))?;
    Ok(Array3::from_shape_fn(size, |_| normal_dist.sample(&mut rng)))
}

/// One blended source in a synthetic scene
#[derive(Debug, Clone)]
pub struct SyntheticSource {
    /// Pixel position `(y, x)`
    pub center: (f64, f64),
    pub sigma: f64,
    /// Peak flux per channel
    pub sed: Vec<f64>,
}

/// Sum of Gaussian sources `(C, Ny, Nx)`; every SED must have `channels` entries
pub fn render_scene(channels: usize, shape: (usize, usize), sources: &[SyntheticSource]) -> Result<Array3<f64>> {
    let mut scene = Array3::zeros((channels, shape.0, shape.1));
    for source in sources {
        if source.sed.len() != channels {
            return Err(InitError::ShapeMismatch(format!(
                "source SED has {} entries for {channels} channels",
                source.sed.len()
            )));
        }
        let profile = gaussian_blob(shape, source.center, source.sigma, 1.0);
        for (mut plane, &flux) in scene.axis_iter_mut(Axis(0)).zip(&source.sed) {
            plane.scaled_add(flux, &profile);
        }
    }
    Ok(scene)
}
