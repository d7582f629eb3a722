//! Model frames, sky-to-pixel mapping and point spread functions.
//!
//! A [`Frame`] describes the pixel grid a model (or an observation) lives in:
//! its `(C, Ny, Nx)` shape, an optional affine mapping between sky coordinates
//! and pixel indices, and an optional PSF. Without a mapping, sky coordinates
//! are pixel coordinates.

use std::f64::consts::PI;
use std::fmt;
use std::sync::Arc;

use nalgebra::{Matrix2, Vector2};
use ndarray::{Array3, ArrayView2, Axis};

use crate::algo::sample_bilinear;
use crate::bbox::BoundingBox;
use crate::error::{InitError, Result};

/// Threshold for considering a determinant as zero
const DETERMINANT_EPSILON: f64 = 1e-12;

/// Point spread function model evaluated on the frame's pixel grid
pub trait Psf: fmt::Debug + Send + Sync {
    /// Number of channels the PSF covers
    fn channels(&self) -> usize;

    /// Spatial footprint `(height, width)` of the sampled PSF image
    fn footprint(&self) -> (usize, usize);

    /// Sampled PSF stack `(C, height, width)`, centered on the middle pixel
    fn image(&self) -> Array3<f64>;

    /// PSF centered at the sub-pixel frame position `center = (y, x)`, evaluated over `bbox`
    ///
    /// A 3D box selects channels as well; a 2D box renders every channel.
    fn render(&self, center: (f64, f64), bbox: &BoundingBox) -> Array3<f64>;

    /// Peak value of the sampled PSF in each channel
    fn peaks(&self) -> Vec<f64> {
        self.image()
            .axis_iter(Axis(0))
            .map(|plane| plane.iter().copied().fold(f64::NEG_INFINITY, f64::max))
            .collect()
    }
}

fn channel_range(bbox: &BoundingBox, channels: usize) -> (usize, usize) {
    if bbox.ndim() == 3 {
        (
            bbox.start[0].clamp(0, channels as i64) as usize,
            bbox.stop[0].clamp(0, channels as i64) as usize,
        )
    } else {
        (0, channels)
    }
}

/// Circular Gaussian PSF with one width per channel, normalized to unit flux
#[derive(Debug, Clone)]
pub struct GaussianPsf {
    sigmas: Vec<f64>,
    size: usize,
}

impl GaussianPsf {
    /// Create a Gaussian PSF sampled on an odd `size × size` footprint
    pub fn new(sigmas: Vec<f64>, size: usize) -> Result<Self> {
        if sigmas.is_empty() || sigmas.iter().any(|&s| !(s > 0.0)) {
            return Err(InitError::InvalidConfig(format!(
                "PSF widths must be positive, got {sigmas:?}"
            )));
        }
        if size % 2 == 0 {
            return Err(InitError::InvalidConfig(format!(
                "PSF footprint must be odd, got {size}"
            )));
        }
        Ok(Self { sigmas, size })
    }

    /// Footprint wide enough to hold ±5σ of the widest channel
    pub fn with_auto_size(sigmas: Vec<f64>) -> Result<Self> {
        let widest = sigmas.iter().copied().fold(0.0, f64::max);
        let half = (5.0 * widest).ceil() as usize;
        Self::new(sigmas, 2 * half + 1)
    }

    /// Per-channel Gaussian widths in pixels
    pub fn sigmas(&self) -> &[f64] {
        &self.sigmas
    }

    fn evaluate(sigma: f64, dy: f64, dx: f64) -> f64 {
        let norm = 1.0 / (2.0 * PI * sigma * sigma);
        norm * (-(dy * dy + dx * dx) / (2.0 * sigma * sigma)).exp()
    }
}

impl Psf for GaussianPsf {
    fn channels(&self) -> usize {
        self.sigmas.len()
    }

    fn footprint(&self) -> (usize, usize) {
        (self.size, self.size)
    }

    fn image(&self) -> Array3<f64> {
        let half = (self.size / 2) as f64;
        Array3::from_shape_fn((self.sigmas.len(), self.size, self.size), |(c, i, j)| {
            Self::evaluate(self.sigmas[c], i as f64 - half, j as f64 - half)
        })
    }

    fn render(&self, center: (f64, f64), bbox: &BoundingBox) -> Array3<f64> {
        let (c0, c1) = channel_range(bbox, self.sigmas.len());
        let spatial = bbox.spatial();
        let shape = spatial.shape();
        Array3::from_shape_fn((c1 - c0, shape[0], shape[1]), |(c, i, j)| {
            let y = (spatial.start[0] + i as i64) as f64;
            let x = (spatial.start[1] + j as i64) as f64;
            Self::evaluate(self.sigmas[c0 + c], y - center.0, x - center.1)
        })
    }
}

/// PSF given as a sampled image stack
///
/// Off-center evaluation resamples the stack bilinearly.
#[derive(Debug, Clone)]
pub struct ImagePsf {
    image: Array3<f64>,
}

impl ImagePsf {
    /// Wrap a `(C, height, width)` stack whose peak sits at the middle pixel
    pub fn new(image: Array3<f64>) -> Result<Self> {
        let (c, h, w) = image.dim();
        if c == 0 || h == 0 || w == 0 {
            return Err(InitError::ShapeMismatch(format!(
                "PSF image must be non-empty, got {:?}",
                image.dim()
            )));
        }
        Ok(Self { image })
    }
}

impl Psf for ImagePsf {
    fn channels(&self) -> usize {
        self.image.dim().0
    }

    fn footprint(&self) -> (usize, usize) {
        let (_, h, w) = self.image.dim();
        (h, w)
    }

    fn image(&self) -> Array3<f64> {
        self.image.clone()
    }

    fn render(&self, center: (f64, f64), bbox: &BoundingBox) -> Array3<f64> {
        let (c0, c1) = channel_range(bbox, self.channels());
        let (h, w) = self.footprint();
        let (hc, wc) = ((h / 2) as f64, (w / 2) as f64);
        let spatial = bbox.spatial();
        let shape = spatial.shape();
        let mut out = Array3::zeros((c1 - c0, shape[0], shape[1]));
        for (k, mut plane) in out.axis_iter_mut(Axis(0)).enumerate() {
            let source: ArrayView2<f64> = self.image.index_axis(Axis(0), c0 + k);
            for ((i, j), value) in plane.indexed_iter_mut() {
                let y = (spatial.start[0] + i as i64) as f64 - center.0 + hc;
                let x = (spatial.start[1] + j as i64) as f64 - center.1 + wc;
                *value = sample_bilinear(&source, y, x).unwrap_or(0.0);
            }
        }
        out
    }
}

/// Affine mapping between sky coordinates `(y, x)` and pixel positions
///
/// `sky = origin + matrix · pixel`
#[derive(Debug, Clone, PartialEq)]
pub struct AffineWcs {
    origin: Vector2<f64>,
    matrix: Matrix2<f64>,
    inverse: Matrix2<f64>,
}

impl AffineWcs {
    /// Create a mapping from the sky position of pixel `(0, 0)` and the pixel-to-sky matrix
    pub fn new(origin: (f64, f64), matrix: Matrix2<f64>) -> Result<Self> {
        let det = matrix.determinant();
        if det.abs() < DETERMINANT_EPSILON {
            return Err(InitError::InvalidConfig(format!(
                "singular WCS matrix: determinant={det:.6e}"
            )));
        }
        let inverse = matrix.try_inverse().ok_or_else(|| {
            InitError::InvalidConfig(format!("singular WCS matrix: determinant={det:.6e}"))
        })?;
        Ok(Self {
            origin: Vector2::new(origin.0, origin.1),
            matrix,
            inverse,
        })
    }

    /// Axis-aligned mapping with a uniform pixel scale (sky units per pixel)
    pub fn from_scale(origin: (f64, f64), scale: f64) -> Result<Self> {
        Self::new(origin, Matrix2::new(scale, 0.0, 0.0, scale))
    }

    /// Fractional pixel position of a sky coordinate
    pub fn sky_to_pixel(&self, sky: (f64, f64)) -> (f64, f64) {
        let pixel = self.inverse * (Vector2::new(sky.0, sky.1) - self.origin);
        (pixel.x, pixel.y)
    }

    /// Sky coordinate of a (possibly fractional) pixel position
    pub fn pixel_to_sky(&self, pixel: (f64, f64)) -> (f64, f64) {
        let sky = self.origin + self.matrix * Vector2::new(pixel.0, pixel.1);
        (sky.x, sky.y)
    }
}

/// Pixel grid of a model or observation
#[derive(Debug, Clone)]
pub struct Frame {
    shape: (usize, usize, usize),
    wcs: Option<AffineWcs>,
    psf: Option<Arc<dyn Psf>>,
    channels: Vec<String>,
}

impl Frame {
    /// Create a frame of shape `(C, Ny, Nx)` with no WCS and no PSF
    pub fn new(shape: (usize, usize, usize)) -> Self {
        Self {
            shape,
            wcs: None,
            psf: None,
            channels: (0..shape.0).map(|c| c.to_string()).collect(),
        }
    }

    /// Attach a PSF model
    pub fn with_psf(mut self, psf: Arc<dyn Psf>) -> Self {
        self.psf = Some(psf);
        self
    }

    /// Attach a sky-to-pixel mapping
    pub fn with_wcs(mut self, wcs: AffineWcs) -> Self {
        self.wcs = Some(wcs);
        self
    }

    /// Name the channels (bands); the count must match the frame shape
    pub fn with_channels(mut self, channels: Vec<String>) -> Result<Self> {
        if channels.len() != self.shape.0 {
            return Err(InitError::ShapeMismatch(format!(
                "{} channel names for a frame with {} channels",
                channels.len(),
                self.shape.0
            )));
        }
        self.channels = channels;
        Ok(self)
    }

    /// `(C, Ny, Nx)`
    pub fn shape(&self) -> (usize, usize, usize) {
        self.shape
    }

    /// Number of channels
    pub fn n_channels(&self) -> usize {
        self.shape.0
    }

    pub fn channel_names(&self) -> &[String] {
        &self.channels
    }

    pub fn psf(&self) -> Option<&Arc<dyn Psf>> {
        self.psf.as_ref()
    }

    pub fn wcs(&self) -> Option<&AffineWcs> {
        self.wcs.as_ref()
    }

    /// Fractional pixel position `(row, col)` of a sky coordinate
    pub fn get_pixel_f64(&self, sky_coord: (f64, f64)) -> (f64, f64) {
        match &self.wcs {
            Some(wcs) => wcs.sky_to_pixel(sky_coord),
            None => sky_coord,
        }
    }

    /// Integer pixel index `(row, col)` of a sky coordinate
    pub fn get_pixel(&self, sky_coord: (f64, f64)) -> (i64, i64) {
        let (y, x) = self.get_pixel_f64(sky_coord);
        (y.round() as i64, x.round() as i64)
    }

    /// Sky coordinate of a pixel position
    pub fn get_sky_coord(&self, pixel: (f64, f64)) -> (f64, f64) {
        match &self.wcs {
            Some(wcs) => wcs.pixel_to_sky(pixel),
            None => pixel,
        }
    }

    /// Check if a pixel index lies inside the spatial grid
    pub fn contains_pixel(&self, pixel: (i64, i64)) -> bool {
        let (_, ny, nx) = self.shape;
        pixel.0 >= 0 && pixel.1 >= 0 && (pixel.0 as usize) < ny && (pixel.1 as usize) < nx
    }

    /// 3D box covering every channel and pixel of the frame
    pub fn bbox(&self) -> BoundingBox {
        let (c, ny, nx) = self.shape;
        BoundingBox::from_shape(&[c, ny, nx], &[0, 0, 0])
    }

    /// Whether two frames share the same pixel grid (shape and mapping)
    pub fn same_grid(&self, other: &Frame) -> bool {
        self.shape.1 == other.shape.1 && self.shape.2 == other.shape.2 && self.wcs == other.wcs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_gaussian_psf_normalized() {
        let psf = GaussianPsf::new(vec![1.0, 2.0], 21).unwrap();
        let image = psf.image();
        assert_eq!(image.dim(), (2, 21, 21));
        for plane in image.axis_iter(Axis(0)) {
            assert_relative_eq!(plane.sum(), 1.0, epsilon = 1e-4);
        }
        // Narrower PSF has the higher peak
        let peaks = psf.peaks();
        assert!(peaks[0] > peaks[1]);
        assert_relative_eq!(peaks[0], 1.0 / (2.0 * PI), epsilon = 1e-12);
    }

    #[test]
    fn test_gaussian_psf_rejects_bad_config() {
        assert!(GaussianPsf::new(vec![1.0], 10).is_err());
        assert!(GaussianPsf::new(vec![0.0], 11).is_err());
        assert!(GaussianPsf::new(vec![], 11).is_err());
        assert_eq!(GaussianPsf::with_auto_size(vec![1.0]).unwrap().footprint(), (11, 11));
    }

    #[test]
    fn test_gaussian_render_peaks_at_center() {
        let psf = GaussianPsf::new(vec![1.5], 11).unwrap();
        let bbox = BoundingBox::centered((20, 30), 16);
        let rendered = psf.render((20.0, 30.0), &bbox);
        assert_eq!(rendered.dim(), (1, 16, 16));

        let (mut best, mut best_idx) = (f64::NEG_INFINITY, (0, 0));
        for ((_, i, j), &v) in rendered.indexed_iter() {
            if v > best {
                best = v;
                best_idx = (i, j);
            }
        }
        assert_eq!(best_idx, (8, 8));
    }

    #[test]
    fn test_image_psf_render_matches_image_on_grid() {
        let psf = GaussianPsf::new(vec![1.0], 7).unwrap();
        let image_psf = ImagePsf::new(psf.image()).unwrap();
        let bbox = BoundingBox::from_bounds(&[(0, 1), (7, 14), (7, 14)]);
        let rendered = image_psf.render((10.0, 10.0), &bbox);
        let expected = psf.image();
        for ((c, i, j), &v) in rendered.indexed_iter() {
            assert_relative_eq!(v, expected[[c, i, j]], epsilon = 1e-12);
        }
    }

    #[test]
    fn test_frame_without_wcs_uses_pixel_coordinates() {
        let frame = Frame::new((3, 64, 64));
        assert_eq!(frame.get_pixel((10.4, 20.6)), (10, 21));
        assert_eq!(frame.get_sky_coord((3.0, 4.0)), (3.0, 4.0));
        assert!(frame.contains_pixel((63, 0)));
        assert!(!frame.contains_pixel((64, 0)));
        assert!(!frame.contains_pixel((-1, 5)));
        assert_eq!(frame.bbox().shape(), vec![3, 64, 64]);
    }

    #[test]
    fn test_affine_wcs_round_trip() {
        let wcs = AffineWcs::from_scale((100.0, 200.0), 0.5).unwrap();
        let frame = Frame::new((1, 32, 32)).with_wcs(wcs);

        assert_eq!(frame.get_pixel((105.0, 210.0)), (10, 20));
        let sky = frame.get_sky_coord((10.0, 20.0));
        assert_relative_eq!(sky.0, 105.0);
        assert_relative_eq!(sky.1, 210.0);

        assert!(AffineWcs::new((0.0, 0.0), Matrix2::zeros()).is_err());
    }

    #[test]
    fn test_same_grid() {
        let a = Frame::new((2, 32, 32));
        let b = Frame::new((5, 32, 32));
        let c = Frame::new((2, 16, 32));
        assert!(a.same_grid(&b));
        assert!(!a.same_grid(&c));
    }

    #[test]
    fn test_channel_names() {
        let frame = Frame::new((2, 8, 8))
            .with_channels(vec!["g".into(), "r".into()])
            .unwrap();
        assert_eq!(frame.channel_names(), &["g".to_string(), "r".to_string()]);
        assert!(Frame::new((2, 8, 8)).with_channels(vec!["g".into()]).is_err());
    }
}
