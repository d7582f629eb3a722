//! Starlet transform: the isotropic undecimated B3-spline wavelet ("à trous").
//!
//! The image is smoothed repeatedly with the separable kernel
//! `[1, 4, 6, 4, 1] / 16`, dilated by `2^j` at scale `j`. Each detail plane is
//! the difference between successive smoothings and the final plane holds the
//! coarse residual, so the inverse transform is the plain sum over planes.
//!
//! # Boundaries
//!
//! Samples beyond the image edge are mirrored (`-1 -> 0`, `n -> n - 1`).

use ndarray::{Array1, Array2, Array3, ArrayView2, ArrayView3, Axis};

use crate::algo::mad;

/// B3 spline smoothing kernel
const B3_KERNEL: [f64; 5] = [1.0 / 16.0, 4.0 / 16.0, 6.0 / 16.0, 4.0 / 16.0, 1.0 / 16.0];

/// Ratio between the MAD and the standard deviation of a normal distribution
const MAD_TO_SIGMA: f64 = 0.6745;

/// Mirror an out-of-range index back into `[0, size)`
fn reflect_index(mut idx: isize, size: isize) -> usize {
    loop {
        if idx < 0 {
            idx = -idx - 1;
        } else if idx >= size {
            idx = 2 * size - idx - 1;
        } else {
            return idx as usize;
        }
    }
}

/// Smooth `image` along one axis with the B3 kernel dilated by `step`
fn smooth_axis(image: &ArrayView2<f64>, axis: Axis, step: usize) -> Array2<f64> {
    let (ny, nx) = image.dim();
    let size = image.len_of(axis) as isize;
    let step = step as isize;
    Array2::from_shape_fn((ny, nx), |(i, j)| {
        B3_KERNEL
            .iter()
            .enumerate()
            .map(|(k, &w)| {
                let offset = (k as isize - 2) * step;
                let value = if axis == Axis(0) {
                    image[[reflect_index(i as isize + offset, size), j]]
                } else {
                    image[[i, reflect_index(j as isize + offset, size)]]
                };
                w * value
            })
            .sum()
    })
}

/// Default number of planes for an image: `floor(log2(min(Ny, Nx)))`, at least 1
pub fn default_levels(shape: (usize, usize)) -> usize {
    let smallest = shape.0.min(shape.1).max(1);
    (usize::BITS - 1 - smallest.leading_zeros()).max(1) as usize
}

/// Starlet transform with a fixed number of planes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Starlet {
    levels: usize,
}

impl Starlet {
    /// Transform producing `levels` planes (`levels - 1` detail scales plus the coarse plane)
    pub fn new(levels: usize) -> Self {
        Self {
            levels: levels.max(1),
        }
    }

    /// Transform sized for images of `shape`
    pub fn for_shape(shape: (usize, usize)) -> Self {
        Self::new(default_levels(shape))
    }

    pub fn levels(&self) -> usize {
        self.levels
    }

    /// Decompose `image` into coefficients `(levels, Ny, Nx)`
    pub fn forward(&self, image: &ArrayView2<f64>) -> Array3<f64> {
        let (ny, nx) = image.dim();
        let mut coefficients = Array3::zeros((self.levels, ny, nx));
        let mut current = image.to_owned();

        for scale in 0..self.levels - 1 {
            let step = 1 << scale;
            let rows = smooth_axis(&current.view(), Axis(0), step);
            let smoothed = smooth_axis(&rows.view(), Axis(1), step);
            coefficients
                .index_axis_mut(Axis(0), scale)
                .assign(&(&current - &smoothed));
            current = smoothed;
        }
        coefficients
            .index_axis_mut(Axis(0), self.levels - 1)
            .assign(&current);
        coefficients
    }

    /// Reconstruct the image from its coefficients
    pub fn inverse(coefficients: &ArrayView3<f64>) -> Array2<f64> {
        coefficients.sum_axis(Axis(0))
    }

    /// L2 norm of each plane of the transform of a centered unit impulse
    ///
    /// Scales a noise level in pixel space to the expected noise in each plane.
    pub fn norm(&self, shape: (usize, usize)) -> Array1<f64> {
        let mut impulse = Array2::zeros(shape);
        impulse[[shape.0 / 2, shape.1 / 2]] = 1.0;
        self.forward(&impulse.view())
            .axis_iter(Axis(0))
            .map(|plane| plane.iter().map(|v| v * v).sum::<f64>().sqrt())
            .collect()
    }
}

/// Noise standard deviation per channel, estimated from the finest starlet plane
///
/// `MAD(w_0) / 0.6745` for each channel of the `(C, Ny, Nx)` stack. Channels
/// without finite samples yield 0.
pub fn mad_wavelet(images: &ArrayView3<f64>) -> Array1<f64> {
    let transform = Starlet::new(2);
    images
        .axis_iter(Axis(0))
        .map(|plane| {
            let coefficients = transform.forward(&plane);
            let finest: Vec<f64> = coefficients.index_axis(Axis(0), 0).iter().copied().collect();
            mad(&finest).map_or(0.0, |m| m / MAD_TO_SIGMA)
        })
        .collect()
}
