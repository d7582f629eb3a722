//! SED estimation at a sky position.

use log::warn;
use ndarray::{concatenate, Array1, ArrayView1, Axis};

use crate::error::{InitError, Result};
use crate::frame::Frame;
use crate::observation::Observation;

/// Per-channel intensity of the pixel containing `sky_coord`
pub fn get_pixel_sed(sky_coord: (f64, f64), observation: &Observation) -> Result<Array1<f64>> {
    let frame = observation.frame();
    let pixel = frame.get_pixel(sky_coord);
    if !frame.contains_pixel(pixel) {
        let (y, x) = frame.get_pixel_f64(sky_coord);
        return Err(InitError::OutOfFrame { y, x });
    }
    let images = observation.images();
    Ok(images
        .slice(ndarray::s![.., pixel.0 as usize, pixel.1 as usize])
        .to_owned())
}

/// Pixel SED corrected for the PSF peak height of each channel
///
/// Divides by the observation's PSF peak per channel, then multiplies by the
/// peak of the first channel of the model frame's PSF. Either step is skipped
/// when the corresponding frame has no PSF.
pub fn get_psf_sed(sky_coord: (f64, f64), observation: &Observation, frame: &Frame) -> Result<Array1<f64>> {
    let mut sed = get_pixel_sed(sky_coord, observation)?;

    if let Some(psf) = observation.frame().psf() {
        let peaks = psf.peaks();
        if peaks.len() != sed.len() {
            return Err(InitError::ShapeMismatch(format!(
                "observation PSF has {} channels, images have {}",
                peaks.len(),
                sed.len()
            )));
        }
        sed.iter_mut().zip(&peaks).for_each(|(s, &p)| *s /= p);
    }

    if let Some(peak) = frame.psf().and_then(|psf| psf.peaks().first().copied()) {
        sed *= peak;
    }
    Ok(sed)
}

/// PSF-corrected SED of every observation, plus their concatenation
///
/// Warns when the concatenated SED is nowhere positive.
pub fn estimate_seds(
    sky_coord: (f64, f64),
    frame: &Frame,
    observations: &[Observation],
) -> Result<(Vec<Array1<f64>>, Array1<f64>)> {
    if observations.is_empty() {
        return Err(InitError::EmptyObservations);
    }
    let seds = observations
        .iter()
        .map(|obs| get_psf_sed(sky_coord, obs, frame))
        .collect::<Result<Vec<_>>>()?;

    let views: Vec<ArrayView1<f64>> = seds.iter().map(|s| s.view()).collect();
    let sed = concatenate(Axis(0), &views).map_err(|e| InitError::ShapeMismatch(e.to_string()))?;

    if sed.iter().all(|&v| v <= 0.0) {
        warn!(
            "Zero or negative SED {} at y={}, x={}",
            sed, sky_coord.0, sky_coord.1
        );
    }
    Ok((seds, sed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::GaussianPsf;
    use approx::assert_relative_eq;
    use ndarray::Array3;
    use std::sync::Arc;

    fn observation_with_pixel(value: [f64; 2]) -> Observation {
        let mut images = Array3::zeros((2, 10, 10));
        images[[0, 4, 6]] = value[0];
        images[[1, 4, 6]] = value[1];
        Observation::new(images, Frame::new((2, 10, 10))).unwrap()
    }

    /// Gaussian PSF whose sampled peak is `peak`: `1 / (2 pi sigma^2) = peak`
    fn psf_with_peak(peak: f64, channels: usize) -> Arc<GaussianPsf> {
        let sigma = (1.0 / (2.0 * std::f64::consts::PI * peak)).sqrt();
        Arc::new(GaussianPsf::new(vec![sigma; channels], 11).unwrap())
    }

    #[test]
    fn test_pixel_sed() {
        let obs = observation_with_pixel([3.0, -1.0]);
        let sed = get_pixel_sed((4.2, 5.8), &obs).unwrap();
        assert_eq!(sed.to_vec(), vec![3.0, -1.0]);
    }

    #[test]
    fn test_pixel_sed_outside_frame() {
        let obs = observation_with_pixel([3.0, 1.0]);
        assert!(matches!(
            get_pixel_sed((-2.0, 5.0), &obs),
            Err(InitError::OutOfFrame { .. })
        ));
        assert!(get_pixel_sed((4.0, 9.6), &obs).is_err());
    }

    #[test]
    fn test_psf_sed_rescales_by_peak_ratio() {
        let raw = observation_with_pixel([3.0, 5.0]);
        let obs_frame = raw.frame().clone().with_psf(psf_with_peak(1.0, 2));
        let obs = Observation::new(raw.images().to_owned(), obs_frame).unwrap();
        let model = Frame::new((2, 10, 10)).with_psf(psf_with_peak(2.0, 2));

        let corrected = get_psf_sed((4.0, 6.0), &obs, &model).unwrap();
        let plain = get_pixel_sed((4.0, 6.0), &obs).unwrap();
        assert_relative_eq!(corrected[0], plain[0] * 2.0, max_relative = 1e-12);
        assert_relative_eq!(corrected[1], plain[1] * 2.0, max_relative = 1e-12);

        // Without PSFs nothing is corrected
        let uncorrected = get_psf_sed((4.0, 6.0), &raw, &Frame::new((2, 10, 10))).unwrap();
        assert_eq!(uncorrected, plain);
    }

    #[test]
    fn test_estimate_seds_concatenates() {
        let a = observation_with_pixel([1.0, 2.0]);
        let b = observation_with_pixel([-3.0, 4.0]);
        let (seds, sed) = estimate_seds((4.0, 6.0), &Frame::new((2, 10, 10)), &[a, b]).unwrap();
        assert_eq!(seds.len(), 2);
        assert_eq!(sed.to_vec(), vec![1.0, 2.0, -3.0, 4.0]);

        // Non-positive SEDs are returned, not rejected
        let c = observation_with_pixel([-1.0, 0.0]);
        let (_, sed) = estimate_seds((4.0, 6.0), &Frame::new((2, 10, 10)), &[c]).unwrap();
        assert_eq!(sed.to_vec(), vec![-1.0, 0.0]);

        assert_eq!(
            estimate_seds((4.0, 6.0), &Frame::new((2, 10, 10)), &[]),
            Err(InitError::EmptyObservations)
        );
    }
}
