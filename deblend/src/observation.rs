//! Observed multi-band images and their noise model.
//!
//! An [`Observation`] couples an image cube `(C, Ny, Nx)` with inverse-variance
//! weights and the [`Frame`] it was taken in. Observations sharing the model
//! grid are *reference* observations; any other observation must be resampled
//! onto the model grid before it can be combined pixel by pixel.

use ndarray::{Array1, Array3, ArrayView3, Axis};

use crate::algo::sample_bilinear;
use crate::error::{InitError, Result};
use crate::frame::Frame;

/// How an observation relates to the model frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObservationKind {
    /// Pixels are on the model grid and can be used directly
    Reference,
    /// Pixels live on another grid and are resampled on demand
    Resampled,
}

/// Multi-band image with inverse-variance weights
#[derive(Debug, Clone)]
pub struct Observation {
    images: Array3<f64>,
    weights: Option<Array3<f64>>,
    frame: Frame,
    kind: ObservationKind,
    diff_kernels: Option<Array3<f64>>,
}

impl Observation {
    /// Create a reference observation; `images` must match the frame shape
    pub fn new(images: Array3<f64>, frame: Frame) -> Result<Self> {
        if images.dim() != frame.shape() {
            return Err(InitError::ShapeMismatch(format!(
                "images {:?} do not match frame {:?}",
                images.dim(),
                frame.shape()
            )));
        }
        Ok(Self {
            images,
            weights: None,
            frame,
            kind: ObservationKind::Reference,
            diff_kernels: None,
        })
    }

    /// Attach inverse-variance weights of the same shape as the images
    pub fn with_weights(mut self, weights: Array3<f64>) -> Result<Self> {
        if weights.dim() != self.images.dim() {
            return Err(InitError::ShapeMismatch(format!(
                "weights {:?} do not match images {:?}",
                weights.dim(),
                self.images.dim()
            )));
        }
        self.weights = Some(weights);
        Ok(self)
    }

    /// Attach per-channel difference kernels `(C, h, w)` between the model PSF and this PSF
    pub fn with_diff_kernels(mut self, kernels: Array3<f64>) -> Result<Self> {
        if kernels.dim().0 != self.images.dim().0 {
            return Err(InitError::ShapeMismatch(format!(
                "{} difference kernels for {} channels",
                kernels.dim().0,
                self.images.dim().0
            )));
        }
        self.diff_kernels = Some(kernels);
        Ok(self)
    }

    /// Mark this observation as living on a grid other than the model's
    pub fn resampled(mut self) -> Self {
        self.kind = ObservationKind::Resampled;
        self
    }

    pub fn images(&self) -> ArrayView3<'_, f64> {
        self.images.view()
    }

    pub fn weights(&self) -> Option<ArrayView3<'_, f64>> {
        self.weights.as_ref().map(|w| w.view())
    }

    pub fn frame(&self) -> &Frame {
        &self.frame
    }

    pub fn kind(&self) -> ObservationKind {
        self.kind
    }

    pub fn is_reference(&self) -> bool {
        self.kind == ObservationKind::Reference
    }

    pub fn n_channels(&self) -> usize {
        self.images.dim().0
    }

    pub fn diff_kernels(&self) -> Option<ArrayView3<'_, f64>> {
        self.diff_kernels.as_ref().map(|k| k.view())
    }

    /// L2 norm of each channel's difference kernel
    ///
    /// Without kernels the PSFs already match and the kernel is a unit impulse.
    pub fn diff_kernel_norms(&self) -> Array1<f64> {
        match &self.diff_kernels {
            Some(kernels) => kernels
                .axis_iter(Axis(0))
                .map(|k| k.iter().map(|v| v * v).sum::<f64>().sqrt())
                .collect(),
            None => Array1::ones(self.n_channels()),
        }
    }

    /// Background RMS per channel, `1 / sqrt(mean(w[w > 0]))`
    ///
    /// `index` names this observation in the error when weights are missing.
    pub fn bg_rms(&self, index: usize) -> Result<Array1<f64>> {
        let weights = self
            .weights
            .as_ref()
            .ok_or(InitError::MissingWeights { observation: index })?;

        weights
            .axis_iter(Axis(0))
            .map(|plane| {
                let (sum, count) = plane
                    .iter()
                    .filter(|&&w| w > 0.0)
                    .fold((0.0, 0usize), |(s, n), &w| (s + w, n + 1));
                if count == 0 {
                    Err(InitError::MissingWeights { observation: index })
                } else {
                    Ok(1.0 / (sum / count as f64).sqrt())
                }
            })
            .collect::<Result<Vec<f64>>>()
            .map(Array1::from)
    }
}

/// Index of the observation that lives in the model frame
///
/// When several do, the first one wins.
pub fn reference_index(observations: &[Observation]) -> Result<usize> {
    observations
        .iter()
        .position(Observation::is_reference)
        .ok_or(InitError::NoReferenceObservation)
}

/// Resample every channel of `observation` onto the pixel grid of `target`
///
/// Each target pixel is mapped through sky coordinates into the observation's
/// grid and sampled bilinearly. Pixels falling outside the observation are zero.
pub fn interpolate_observation(observation: &Observation, target: &Frame) -> Array3<f64> {
    let (_, ny, nx) = target.shape();
    let images = observation.images();
    let source_frame = observation.frame();

    let positions: Vec<(f64, f64)> = (0..ny * nx)
        .map(|idx| {
            let pixel = ((idx / nx) as f64, (idx % nx) as f64);
            source_frame.get_pixel_f64(target.get_sky_coord(pixel))
        })
        .collect();

    let mut out = Array3::zeros((observation.n_channels(), ny, nx));
    for (channel, mut plane) in out.axis_iter_mut(Axis(0)).enumerate() {
        let source = images.index_axis(Axis(0), channel);
        for (value, &(y, x)) in plane.iter_mut().zip(&positions) {
            *value = sample_bilinear(&source, y, x).unwrap_or(0.0);
        }
    }
    out
}
