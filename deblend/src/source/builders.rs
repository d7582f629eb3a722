//! Archetype builders and their configuration.
//!
//! Each configuration struct captures the options of one archetype and builds
//! a [`Source`] once a frame, a sky position and the observations are known.
//! [`SourceConfig`] tags them so a catalogue of source types can be loaded
//! from JSON.
//!
//! # Example
//!
//! ```no_run
//! use deblend::source::SourceConfig;
//!
//! let configs: Vec<SourceConfig> = serde_json::from_str(
//!     r#"[{"type": "extended", "monotonic": "angle"}, {"type": "point"}]"#,
//! ).unwrap();
//! ```

use std::sync::Arc;

use log::info;
use ndarray::{arr1, Array1, Array2, Array3, ArrayD, Axis, Ix3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::bbox::BoundingBox;
use crate::constraint::{Constraint, ConstraintChain, NormalizationKind};
use crate::error::{InitError, Result};
use crate::frame::Frame;
use crate::init::{
    estimate_seds, get_best_fit_seds, init_extended_source, init_multicomponent_source, Coadd,
    MorphologyOptions, DEFAULT_FLUX_PERCENTILES,
};
use crate::observation::{interpolate_observation, Observation};
use crate::operator::{NeighborWeight, SymmetryAlgorithm};
use crate::parameter::{Parameter, StepRule};
use crate::source::component::{FactorizedComponent, FunctionComponent, MorphologyFn};
use crate::source::Source;
use crate::wavelet::{mad_wavelet, Starlet};

/// Step of sub-pixel center and shift parameters
const POSITION_STEP: f64 = 0.1;

/// Step of pixel-space and coefficient morphologies
const MORPH_STEP: f64 = 0.01;

/// Legacy boolean monotonicity: `true` selects angle weights, `false` none
pub fn monotonic_from_flag(flag: bool) -> Option<NeighborWeight> {
    flag.then_some(NeighborWeight::Angle)
}

/// Accepts `true`/`false`, `"flat"`/`"angle"`/`"nearest"` or `null`
mod monotonic_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    use super::monotonic_from_flag;
    use crate::operator::NeighborWeight;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Flag(bool),
        Weight(NeighborWeight),
    }

    pub fn serialize<S: Serializer>(value: &Option<NeighborWeight>, serializer: S) -> Result<S::Ok, S::Error> {
        value.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<NeighborWeight>, D::Error> {
        Ok(match Option::<Repr>::deserialize(deserializer)? {
            None => None,
            Some(Repr::Flag(flag)) => monotonic_from_flag(flag),
            Some(Repr::Weight(weight)) => Some(weight),
        })
    }
}

fn check_thresh(name: &str, value: f64) -> Result<()> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(InitError::InvalidConfig(format!("{name} must be finite and non-negative, got {value}")))
    }
}

fn check_min_grad(value: f64) -> Result<()> {
    if (0.0..1.0).contains(&value) {
        Ok(())
    } else {
        Err(InitError::InvalidConfig(format!("min_grad must lie in [0, 1), got {value}")))
    }
}

fn sed_parameter(sed: Array1<f64>, factor: f64) -> Parameter {
    Parameter::new("sed", sed.into_dyn(), StepRule::Relative { factor }).with_constraint(Constraint::positivity())
}

fn shift_parameter(frame: &Frame, sky_coord: (f64, f64), shifting: bool) -> Option<Parameter> {
    shifting.then(|| {
        let (y, x) = frame.get_pixel_f64(sky_coord);
        let (py, px) = frame.get_pixel(sky_coord);
        Parameter::new(
            "shift",
            arr1(&[y - py as f64, x - px as f64]).into_dyn(),
            StepRule::Constant(POSITION_STEP),
        )
    })
}

/// Morphology constraints shared by extended and multi-component sources
fn morphology_constraint(
    monotonic: Option<NeighborWeight>,
    symmetric: bool,
    min_grad: f64,
    center_on: bool,
) -> Constraint {
    let mut constraints = Vec::new();
    if let Some(neighbor_weight) = monotonic {
        constraints.push(Constraint::Monotonicity {
            neighbor_weight,
            min_gradient: min_grad,
        });
    }
    if symmetric {
        constraints.push(Constraint::Symmetry {
            algorithm: SymmetryAlgorithm::default(),
        });
    }
    constraints.push(Constraint::positivity());
    if center_on {
        constraints.push(Constraint::center_on());
    }
    constraints.push(Constraint::Normalization {
        kind: NormalizationKind::Max,
    });
    ConstraintChain::new(constraints).into()
}

/// Morphology initialization used by every coadd-based archetype
fn detection_options(thresh: f64, min_grad: f64) -> MorphologyOptions {
    MorphologyOptions {
        thresh,
        symmetric: true,
        monotonic: Some(NeighborWeight::Flat),
        min_grad,
    }
}

/// Source with a uniform random morphology over the whole frame
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RandomConfig {
    /// Observation whose images the SED is fit to; random SED when unset
    pub observation: Option<usize>,
    /// Seed for reproducible draws
    pub seed: Option<u64>,
}

impl RandomConfig {
    pub fn build(&self, frame: &Frame, observations: &[Observation]) -> Result<Source> {
        let (channels, ny, nx) = frame.shape();
        let mut rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let morph = Array2::from_shape_fn((ny, nx), |_| rng.gen::<f64>());

        let sed = match self.observation {
            None => Array1::from_shape_fn(channels, |_| rng.gen::<f64>()),
            Some(index) => {
                let obs = observations.get(index).ok_or_else(|| {
                    InitError::InvalidConfig(format!(
                        "observation {index} requested, {} available",
                        observations.len()
                    ))
                })?;
                let images = if obs.frame().same_grid(frame) {
                    obs.images().to_owned()
                } else {
                    interpolate_observation(obs, frame)
                };
                let morphs = morph.view().insert_axis(Axis(0));
                get_best_fit_seds(&morphs, &images.view())?.row(0).to_owned()
            }
        };

        let positive = Constraint::positivity();
        let sed = Parameter::new("sed", sed.into_dyn(), StepRule::default()).with_constraint(positive.clone());
        let morph = Parameter::new("morph", morph.into_dyn(), StepRule::default()).with_constraint(positive);
        Ok(Source::Random(FactorizedComponent::new(sed, morph, frame.bbox())))
    }
}

/// Source with the frame PSF as morphology
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PointConfig {}

impl PointConfig {
    pub fn build(&self, frame: &Frame, sky_coord: (f64, f64), observations: &[Observation]) -> Result<Source> {
        let psf = Arc::clone(frame.psf().ok_or(InitError::MissingPsf)?);
        let (_, sed) = estimate_seds(sky_coord, frame, observations)?;
        if sed.iter().any(|&v| v <= 0.0) && sed.iter().any(|&v| v > 0.0) {
            info!(
                "Zero or negative SED {sed} at y={}, x={}",
                sky_coord.0, sky_coord.1
            );
        }

        let (y, x) = frame.get_pixel_f64(sky_coord);
        let (py, px) = frame.get_pixel(sky_coord);
        let (h, w) = psf.footprint();
        let (top, left) = (py - (h / 2) as i64, px - (w / 2) as i64);
        let bbox = BoundingBox::from_bounds(&[
            (0, frame.n_channels() as i64),
            (top, top + h as i64),
            (left, left + w as i64),
        ]);

        let func: Arc<MorphologyFn> = Arc::new(move |center: &ArrayD<f64>, bbox: &BoundingBox| -> Result<Array3<f64>> {
            match center.as_slice() {
                Some(&[cy, cx]) => Ok(psf.render((cy, cx), bbox)),
                _ => Err(InitError::ShapeMismatch(format!(
                    "point source center must hold two values, got {:?}",
                    center.shape()
                ))),
            }
        });

        let center = Parameter::new("center", arr1(&[y, x]).into_dyn(), StepRule::Constant(POSITION_STEP));
        Ok(Source::Point(FunctionComponent::new(
            sed_parameter(sed, 1e-2),
            center,
            bbox,
            func,
        )))
    }
}

/// Extended source that is monotonic and optionally symmetric about its center
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtendedConfig {
    /// Multiple of the background cutoff used to trim the morphology
    pub thresh: f64,
    /// Neighbour weighting of the monotonicity constraint; none disables it
    #[serde(with = "monotonic_serde")]
    pub monotonic: Option<NeighborWeight>,
    /// Constrain the morphology to 180° symmetry
    pub symmetric: bool,
    /// Add a free sub-pixel shift parameter
    pub shifting: bool,
    /// Strength of the monotonicity constraint (0.2 is strong)
    pub min_grad: f64,
}

impl Default for ExtendedConfig {
    fn default() -> Self {
        Self {
            thresh: 1.0,
            monotonic: Some(NeighborWeight::Flat),
            symmetric: false,
            shifting: false,
            min_grad: 0.2,
        }
    }
}

impl ExtendedConfig {
    pub fn validate(&self) -> Result<()> {
        check_thresh("thresh", self.thresh)?;
        check_min_grad(self.min_grad)
    }

    pub fn build(&self, frame: &Frame, sky_coord: (f64, f64), observations: &[Observation]) -> Result<Source> {
        self.build_with_coadd(frame, sky_coord, observations, None)
    }

    /// Build from a precomputed detection coadd instead of the observations' weights
    pub fn build_with_coadd(
        &self,
        frame: &Frame,
        sky_coord: (f64, f64),
        observations: &[Observation],
        coadd: Option<Coadd<'_>>,
    ) -> Result<Source> {
        self.validate()?;
        let init = init_extended_source(
            sky_coord,
            frame,
            observations,
            coadd,
            &detection_options(self.thresh, self.min_grad),
        )?;

        let constraint = morphology_constraint(self.monotonic, self.symmetric, self.min_grad, false);
        let morph = Parameter::new("morph", init.morph.into_dyn(), StepRule::Constant(MORPH_STEP))
            .with_constraint(constraint);

        Ok(Source::Extended {
            component: FactorizedComponent::new(sed_parameter(init.sed, 1e-2), morph, init.bbox),
            pixel_center: frame.get_pixel(sky_coord),
            shift: shift_parameter(frame, sky_coord, self.shifting),
        })
    }
}

/// Extended source whose morphology is optimized in starlet coefficients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StarletConfig {
    /// Multiple of the background cutoff used to trim the morphology
    pub thresh: f64,
    /// Coefficient threshold in units of the propagated noise
    pub starlet_thresh: f64,
    /// Strength of the monotonic initialization
    pub min_grad: f64,
}

impl Default for StarletConfig {
    fn default() -> Self {
        Self {
            thresh: 1.0,
            starlet_thresh: 5.0,
            min_grad: 0.0,
        }
    }
}

impl StarletConfig {
    pub fn validate(&self) -> Result<()> {
        check_thresh("thresh", self.thresh)?;
        check_thresh("starlet_thresh", self.starlet_thresh)?;
        check_min_grad(self.min_grad)
    }

    pub fn build(&self, frame: &Frame, sky_coord: (f64, f64), observations: &[Observation]) -> Result<Source> {
        self.build_with_coadd(frame, sky_coord, observations, None)
    }

    pub fn build_with_coadd(
        &self,
        frame: &Frame,
        sky_coord: (f64, f64),
        observations: &[Observation],
        coadd: Option<Coadd<'_>>,
    ) -> Result<Source> {
        self.validate()?;
        let init = init_extended_source(
            sky_coord,
            frame,
            observations,
            coadd,
            &detection_options(self.thresh, self.min_grad),
        )?;

        // Pixel noise seen through each observation's difference kernel
        let noise: Vec<f64> = observations
            .iter()
            .flat_map(|obs| (mad_wavelet(&obs.images()) * obs.diff_kernel_norms()).to_vec())
            .collect();
        if noise.len() != init.sed.len() {
            return Err(InitError::ShapeMismatch(format!(
                "{} noise levels for an SED of {} channels",
                noise.len(),
                init.sed.len()
            )));
        }
        let level = self.starlet_thresh
            * init
                .sed
                .iter()
                .zip(&noise)
                .map(|(s, n)| (s * n).powi(2))
                .sum::<f64>()
                .sqrt();

        let transform = Starlet::for_shape(init.morph.dim());
        let coefficients = transform.forward(&init.morph.view());
        let norm = transform.norm(init.morph.dim());
        let levels = transform.levels();
        let thresholds = Array3::from_shape_fn((levels, 1, 1), |(j, _, _)| {
            if j + 1 == levels {
                0.0
            } else {
                level * norm[j]
            }
        });

        let constraint: Constraint = ConstraintChain::new(vec![
            Constraint::L0 {
                thresh: thresholds.into_dyn(),
            },
            Constraint::positivity(),
        ])
        .into();
        let morph = Parameter::new("morph", coefficients.into_dyn(), StepRule::Constant(MORPH_STEP))
            .with_constraint(constraint);

        let func: Arc<MorphologyFn> = Arc::new(|coefficients: &ArrayD<f64>, _: &BoundingBox| -> Result<Array3<f64>> {
            let coefficients = coefficients.view().into_dimensionality::<Ix3>().map_err(|_| {
                InitError::ShapeMismatch(format!(
                    "starlet coefficients must be 3D, got {:?}",
                    coefficients.shape()
                ))
            })?;
            Ok(Starlet::inverse(&coefficients).insert_axis(Axis(0)))
        });

        Ok(Source::Starlet {
            component: FunctionComponent::new(sed_parameter(init.sed, 1e-2), morph, init.bbox, func),
            pixel_center: frame.get_pixel(sky_coord),
        })
    }
}

/// Extended source split into layers by flux percentile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MultiComponentConfig {
    /// Multiple of the background cutoff used to trim the morphology
    pub thresh: f64,
    /// Percentiles of the peak flux separating the layers
    pub flux_percentiles: Vec<f64>,
    /// Neighbour weighting of the monotonicity constraint; none disables it
    #[serde(with = "monotonic_serde")]
    pub monotonic: Option<NeighborWeight>,
    /// Constrain every layer to 180° symmetry
    pub symmetric: bool,
    /// Add one free sub-pixel shift shared by all layers
    pub shifting: bool,
    /// Strength of the monotonicity constraint (0.2 is strong)
    pub min_grad: f64,
}

impl Default for MultiComponentConfig {
    fn default() -> Self {
        Self {
            thresh: 1.0,
            flux_percentiles: DEFAULT_FLUX_PERCENTILES.to_vec(),
            monotonic: Some(NeighborWeight::Flat),
            symmetric: false,
            shifting: false,
            min_grad: 0.2,
        }
    }
}

impl MultiComponentConfig {
    pub fn validate(&self) -> Result<()> {
        check_thresh("thresh", self.thresh)?;
        check_min_grad(self.min_grad)?;
        match self.flux_percentiles.iter().find(|p| !(0.0..=100.0).contains(*p)) {
            Some(p) => Err(InitError::InvalidConfig(format!(
                "flux percentiles must lie in [0, 100], got {p}"
            ))),
            None => Ok(()),
        }
    }

    pub fn build(&self, frame: &Frame, sky_coord: (f64, f64), observations: &[Observation]) -> Result<Source> {
        self.build_with_coadd(frame, sky_coord, observations, None)
    }

    pub fn build_with_coadd(
        &self,
        frame: &Frame,
        sky_coord: (f64, f64),
        observations: &[Observation],
        coadd: Option<Coadd<'_>>,
    ) -> Result<Source> {
        self.validate()?;
        let init = init_multicomponent_source(
            sky_coord,
            frame,
            observations,
            coadd,
            &self.flux_percentiles,
            &detection_options(self.thresh, self.min_grad),
        )?;

        let constraint = morphology_constraint(self.monotonic, self.symmetric, self.min_grad, true);
        let components = init
            .seds
            .axis_iter(Axis(0))
            .zip(init.morphs.axis_iter(Axis(0)))
            .map(|(sed, morph)| {
                let morph = Parameter::new("morph", morph.to_owned().into_dyn(), StepRule::Constant(MORPH_STEP))
                    .with_constraint(constraint.clone());
                FactorizedComponent::new(sed_parameter(sed.to_owned(), 1e-1), morph, init.bbox.clone())
            })
            .collect();

        Ok(Source::MultiComponent {
            components,
            bbox: init.bbox,
            pixel_center: frame.get_pixel(sky_coord),
            shift: shift_parameter(frame, sky_coord, self.shifting),
        })
    }
}

/// Any archetype configuration, tagged by `type`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SourceConfig {
    Random(RandomConfig),
    Point(PointConfig),
    Extended(ExtendedConfig),
    Starlet(StarletConfig),
    MultiComponent(MultiComponentConfig),
}

impl SourceConfig {
    pub fn build(&self, frame: &Frame, sky_coord: (f64, f64), observations: &[Observation]) -> Result<Source> {
        self.build_with_coadd(frame, sky_coord, observations, None)
    }

    /// Build with a shared detection coadd; archetypes that do not use one ignore it
    pub fn build_with_coadd(
        &self,
        frame: &Frame,
        sky_coord: (f64, f64),
        observations: &[Observation],
        coadd: Option<Coadd<'_>>,
    ) -> Result<Source> {
        match self {
            Self::Random(config) => config.build(frame, observations),
            Self::Point(config) => config.build(frame, sky_coord, observations),
            Self::Extended(config) => config.build_with_coadd(frame, sky_coord, observations, coadd),
            Self::Starlet(config) => config.build_with_coadd(frame, sky_coord, observations, coadd),
            Self::MultiComponent(config) => config.build_with_coadd(frame, sky_coord, observations, coadd),
        }
    }
}
