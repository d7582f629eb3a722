//! SED-weighted detection coadd.
//!
//! Every channel with a positive SED contributes `sed / rms²` times its image.
//! The sum is divided by `Σ sed² / rms²`, which makes the coadd an estimate of
//! the morphology of a source with that SED. The cutoff is the propagated 1σ
//! noise of the weighted sum under the same normalization.

use log::warn;
use ndarray::{Array1, Array2, ArrayView3, Axis, CowArray, Ix3};

use crate::error::{InitError, Result};
use crate::observation::{interpolate_observation, reference_index, Observation};

/// Build the detection coadd and its background cutoff
///
/// `seds[i]` and `bg_rmses[i]` belong to `observations[i]`. Observations not in
/// the reference frame are resampled onto it first. Every RMS entry must be
/// strictly positive.
pub fn build_sed_coadd(
    seds: &[Array1<f64>],
    bg_rmses: &[Array1<f64>],
    observations: &[Observation],
) -> Result<(Array2<f64>, f64)> {
    if observations.is_empty() {
        return Err(InitError::EmptyObservations);
    }
    if seds.len() != observations.len() || bg_rmses.len() != observations.len() {
        return Err(InitError::ShapeMismatch(format!(
            "{} SEDs and {} RMS vectors for {} observations",
            seds.len(),
            bg_rmses.len(),
            observations.len()
        )));
    }

    for (index, rms) in bg_rmses.iter().enumerate() {
        if let Some((channel, &value)) = rms.iter().enumerate().find(|&(_, &v)| !(v > 0.0)) {
            return Err(InitError::NonPositiveRms {
                observation: index,
                channel,
                value,
            });
        }
    }

    let reference = &observations[reference_index(observations)?];
    let (_, ny, nx) = reference.frame().shape();

    let mut detect = Array2::<f64>::zeros((ny, nx));
    let mut normalization = 0.0;
    let mut variance = 0.0;

    for (index, ((obs, sed), rms)) in observations.iter().zip(seds).zip(bg_rmses).enumerate() {
        if sed.len() != obs.n_channels() || rms.len() != obs.n_channels() {
            return Err(InitError::ShapeMismatch(format!(
                "observation {index} has {} channels, SED {} and RMS {}",
                obs.n_channels(),
                sed.len(),
                rms.len()
            )));
        }
        if !sed.iter().any(|&s| s > 0.0) {
            continue;
        }

        let images: CowArray<f64, Ix3> = if obs.is_reference() {
            CowArray::from(obs.images())
        } else {
            CowArray::from(interpolate_observation(obs, reference.frame()))
        };
        check_grid(index, &images.view(), (ny, nx))?;

        for (channel, image) in images.axis_iter(Axis(0)).enumerate() {
            let (s, r) = (sed[channel], rms[channel]);
            if s <= 0.0 {
                continue;
            }
            let weight = s / (r * r);
            detect.scaled_add(weight, &image);
            normalization += s * s / (r * r);
            variance += (weight * r).powi(2);
        }
    }

    if normalization <= 0.0 {
        warn!("No channel with positive SED contributes to the detection coadd");
        return Ok((detect, 0.0));
    }

    detect /= normalization;
    Ok((detect, variance.sqrt() / normalization))
}

fn check_grid(index: usize, images: &ArrayView3<f64>, grid: (usize, usize)) -> Result<()> {
    let (_, ny, nx) = images.dim();
    if (ny, nx) != grid {
        return Err(InitError::ShapeMismatch(format!(
            "observation {index} images are {ny}x{nx}, reference grid is {}x{}",
            grid.0, grid.1
        )));
    }
    Ok(())
}
