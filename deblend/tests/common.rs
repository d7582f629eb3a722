//! Common scenes for deblend integration tests

#![allow(dead_code)]

use deblend::synthetic::{render_scene, simple_normal_array, SyntheticSource};
use deblend::{Frame, Observation};
use ndarray::{Array2, Array3};

/// Single reference observation of `sources` on `frame`, with optional seeded noise
///
/// Weights are the inverse noise variance, or 1 for a noiseless scene.
pub fn observe(frame: &Frame, sources: &[SyntheticSource], noise: Option<(f64, u64)>) -> Observation {
    let (channels, ny, nx) = frame.shape();
    let mut images = render_scene(channels, (ny, nx), sources).unwrap();
    let weights = match noise {
        Some((std_dev, seed)) => {
            images += &simple_normal_array((channels, ny, nx), 0.0, std_dev, seed).unwrap();
            Array3::from_elem((channels, ny, nx), 1.0 / (std_dev * std_dev))
        }
        None => Array3::ones((channels, ny, nx)),
    };
    Observation::new(images, frame.clone())
        .unwrap()
        .with_weights(weights)
        .unwrap()
}

/// Assert that values never increase walking outward from `center` in the 8 directions
///
/// Only holds for a single symmetric profile such as the isolated Gaussian bump.
/// Flat-weight monotonicity compares each pixel with the mean of its inward
/// neighbours, so asymmetric blends can rise along a diagonal ray.
pub fn assert_monotonic_rays(morph: &Array2<f64>, center: (usize, usize)) {
    let (ny, nx) = morph.dim();
    for (dy, dx) in [(-1, -1), (-1, 0), (-1, 1), (0, -1), (0, 1), (1, -1), (1, 0), (1, 1)] {
        let (mut i, mut j) = (center.0 as i64 + dy, center.1 as i64 + dx);
        let mut prev = morph[[center.0, center.1]];
        while i >= 0 && j >= 0 && (i as usize) < ny && (j as usize) < nx {
            let value = morph[[i as usize, j as usize]];
            assert!(value <= prev, "flux rises along ({dy}, {dx}) at ({i}, {j})");
            prev = value;
            i += dy;
            j += dx;
        }
    }
}

pub fn peak(values: impl IntoIterator<Item = f64>) -> f64 {
    values.into_iter().fold(f64::NEG_INFINITY, f64::max)
}
