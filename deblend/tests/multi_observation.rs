//! Initialization from several observations on different pixel grids

mod common;

use std::sync::Arc;

use approx::assert_relative_eq;
use common::{observe, peak};
use deblend::init::{build_sed_coadd, estimate_seds, get_pixel_sed, get_psf_sed};
use deblend::source::{ExtendedConfig, MultiComponentConfig};
use deblend::synthetic::{gaussian_blob, SyntheticSource};
use deblend::{AffineWcs, Frame, GaussianPsf, InitError, Observation, Psf};
use ndarray::{arr1, Array3, Axis, Ix2};

/// Two bands on the model grid plus one band at half the resolution
fn two_instrument_scene() -> (Frame, Vec<Observation>) {
    let model = Frame::new((3, 48, 48));

    let fine_frame = Frame::new((2, 48, 48));
    let fine = observe(
        &fine_frame,
        &[SyntheticSource {
            center: (24.0, 24.0),
            sigma: 3.0,
            sed: vec![2.0, 1.0],
        }],
        None,
    );

    let coarse_frame = Frame::new((1, 24, 24)).with_wcs(AffineWcs::from_scale((0.0, 0.0), 2.0).unwrap());
    let coarse_image = gaussian_blob((24, 24), (12.0, 12.0), 1.5, 1.5).insert_axis(Axis(0));
    let coarse = Observation::new(coarse_image, coarse_frame)
        .unwrap()
        .with_weights(Array3::ones((1, 24, 24)))
        .unwrap()
        .resampled();

    (model, vec![fine, coarse])
}

#[test]
fn test_seds_concatenate_across_observations() {
    let (model, observations) = two_instrument_scene();
    let (seds, sed) = estimate_seds((24.0, 24.0), &model, &observations).unwrap();
    assert_eq!(seds.len(), 2);
    assert_eq!(seds[1].to_vec(), vec![1.5]);
    assert_eq!(sed.to_vec(), vec![2.0, 1.0, 1.5]);
}

#[test]
fn test_coadd_on_reference_grid() {
    let (_, observations) = two_instrument_scene();
    let seds = vec![arr1(&[2.0, 1.0]), arr1(&[1.5])];
    let rms = vec![arr1(&[1.0, 1.0]), arr1(&[1.0])];
    let (detect, cutoff) = build_sed_coadd(&seds, &rms, &observations).unwrap();

    assert_eq!(detect.dim(), (48, 48));
    // Every channel sees the same unit profile at the center
    assert_relative_eq!(detect[[24, 24]], 1.0, epsilon = 1e-12);
    assert_relative_eq!(cutoff, 1.0 / 7.25f64.sqrt(), epsilon = 1e-12);
    assert!(cutoff > 0.0);

    let bad = vec![arr1(&[1.0, 0.0]), arr1(&[1.0])];
    assert_eq!(
        build_sed_coadd(&seds, &bad, &observations).unwrap_err(),
        InitError::NonPositiveRms {
            observation: 0,
            channel: 1,
            value: 0.0
        }
    );
}

#[test]
fn test_extended_across_instruments() {
    let (model, observations) = two_instrument_scene();
    let config = ExtendedConfig {
        thresh: 0.1,
        ..Default::default()
    };
    let source = config.build(&model, (24.0, 24.0), &observations).unwrap();

    let bbox = source.bbox();
    assert_eq!(bbox.shape()[0], 3);
    assert!(bbox.contains(&[0, 24, 24]));

    let model_flux = source.render().unwrap();
    assert_eq!(model_flux.shape(), bbox.shape().as_slice());
    let (cy, cx) = ((24 - bbox.start[1]) as usize, (24 - bbox.start[2]) as usize);
    assert_relative_eq!(model_flux[[0, cy, cx]], 2.0);
    assert_relative_eq!(model_flux[[2, cy, cx]], 1.5);
}

#[test]
fn test_multicomponent_fits_all_observations() {
    let (model, observations) = two_instrument_scene();
    let source = MultiComponentConfig::default()
        .build(&model, (24.0, 24.0), &observations)
        .unwrap();
    assert_eq!(source.components().len(), 2);
    for component in source.components() {
        let morph = component.parameters()[1].value.clone().into_dimensionality::<Ix2>().unwrap();
        assert_relative_eq!(peak(morph.iter().copied()), 1.0);
        // One SED entry per channel of every observation
        assert_eq!(component.parameters()[0].shape(), &[3]);
    }
    let flux = source.render().unwrap();
    assert_eq!(flux.shape(), source.bbox().shape().as_slice());
}

#[test]
fn test_missing_reference_observation() {
    let (model, mut observations) = two_instrument_scene();
    observations.remove(0);
    let err = ExtendedConfig::default()
        .build(&model, (24.0, 24.0), &observations)
        .unwrap_err();
    assert_eq!(err, InitError::NoReferenceObservation);
}

#[test]
fn test_psf_corrected_sed_uses_model_peak() {
    // Target PSF peaks at 2, the observation's at 1
    let sharp = GaussianPsf::new(vec![(1.0 / (4.0 * std::f64::consts::PI)).sqrt()], 11).unwrap();
    let broad = GaussianPsf::new(vec![(1.0 / (2.0 * std::f64::consts::PI)).sqrt()], 11).unwrap();
    assert_relative_eq!(sharp.peaks()[0], 2.0, epsilon = 1e-12);
    assert_relative_eq!(broad.peaks()[0], 1.0, epsilon = 1e-12);

    let target = Frame::new((1, 16, 16)).with_psf(Arc::new(sharp));
    let source_frame = Frame::new((1, 16, 16)).with_psf(Arc::new(broad));
    let images = Array3::from_elem((1, 16, 16), 3.0);
    let obs = Observation::new(images, source_frame).unwrap();

    let raw = get_pixel_sed((8.0, 8.0), &obs).unwrap();
    let corrected = get_psf_sed((8.0, 8.0), &obs, &target).unwrap();
    assert_eq!(raw.to_vec(), vec![3.0]);
    assert_relative_eq!(corrected[0], raw[0] * 2.0, epsilon = 1e-12);
}
