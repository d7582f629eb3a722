//! Renderable building blocks of a source.

use std::fmt;
use std::sync::Arc;

use ndarray::{Array1, Array3, ArrayD, Axis, Ix1, Ix2};

use crate::algo::shift_image;
use crate::bbox::BoundingBox;
use crate::error::{InitError, Result};
use crate::parameter::Parameter;

/// Common capabilities of every component
pub trait Component: fmt::Debug + Send + Sync {
    /// `(channel, row, column)` box the component renders into
    fn bbox(&self) -> &BoundingBox;

    /// Parameters in optimizer order
    fn parameters(&self) -> Vec<&Parameter>;

    fn parameters_mut(&mut self) -> Vec<&mut Parameter>;

    /// Flux image over [`Component::bbox`], shifted by `shift = (dy, dx)` pixels when given
    fn render(&self, shift: Option<(f64, f64)>) -> Result<Array3<f64>>;
}

fn sed_vector(sed: &Parameter) -> Result<Array1<f64>> {
    sed.value
        .clone()
        .into_dimensionality::<Ix1>()
        .map_err(|_| InitError::ShapeMismatch(format!("SED '{}' must be 1D, got {:?}", sed.name, sed.shape())))
}

/// `sed ⊗ morph` for a `(C | 1, h, w)` morphology stack
fn outer_with_sed(sed: &Array1<f64>, morph: &Array3<f64>) -> Result<Array3<f64>> {
    let (planes, h, w) = morph.dim();
    if planes != 1 && planes != sed.len() {
        return Err(InitError::ShapeMismatch(format!(
            "{planes} morphology planes for an SED of {} channels",
            sed.len()
        )));
    }
    Ok(Array3::from_shape_fn((sed.len(), h, w), |(c, i, j)| {
        let plane = if planes == 1 { 0 } else { c };
        sed[c] * morph[[plane, i, j]]
    }))
}

/// Shift value of a two-element shift parameter
pub fn shift_of(shift: &Parameter) -> Result<(f64, f64)> {
    match shift.value.as_slice() {
        Some(&[dy, dx]) => Ok((dy, dx)),
        _ => Err(InitError::ShapeMismatch(format!(
            "shift must hold two values, got {:?}",
            shift.shape()
        ))),
    }
}

/// Component whose model is the outer product of an SED and one morphology
#[derive(Debug, Clone)]
pub struct FactorizedComponent {
    pub sed: Parameter,
    pub morph: Parameter,
    pub bbox: BoundingBox,
}

impl FactorizedComponent {
    pub fn new(sed: Parameter, morph: Parameter, bbox: BoundingBox) -> Self {
        Self { sed, morph, bbox }
    }
}

impl Component for FactorizedComponent {
    fn bbox(&self) -> &BoundingBox {
        &self.bbox
    }

    fn parameters(&self) -> Vec<&Parameter> {
        vec![&self.sed, &self.morph]
    }

    fn parameters_mut(&mut self) -> Vec<&mut Parameter> {
        vec![&mut self.sed, &mut self.morph]
    }

    fn render(&self, shift: Option<(f64, f64)>) -> Result<Array3<f64>> {
        let sed = sed_vector(&self.sed)?;
        let morph = self.morph.value.view().into_dimensionality::<Ix2>().map_err(|_| {
            InitError::ShapeMismatch(format!("morphology must be 2D, got {:?}", self.morph.shape()))
        })?;
        let morph = match shift {
            Some((dy, dx)) if dy != 0.0 || dx != 0.0 => shift_image(&morph, dy, dx),
            _ => morph.to_owned(),
        };
        outer_with_sed(&sed, &morph.insert_axis(Axis(0)))
    }
}

/// Maps a free parameter to a `(C | 1, h, w)` morphology over a box
pub type MorphologyFn = dyn Fn(&ArrayD<f64>, &BoundingBox) -> Result<Array3<f64>> + Send + Sync;

/// Component whose morphology is computed from a free parameter
#[derive(Clone)]
pub struct FunctionComponent {
    pub sed: Parameter,
    pub param: Parameter,
    pub bbox: BoundingBox,
    func: Arc<MorphologyFn>,
}

impl fmt::Debug for FunctionComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionComponent")
            .field("sed", &self.sed)
            .field("param", &self.param)
            .field("bbox", &self.bbox)
            .finish_non_exhaustive()
    }
}

impl FunctionComponent {
    pub fn new(sed: Parameter, param: Parameter, bbox: BoundingBox, func: Arc<MorphologyFn>) -> Self {
        Self {
            sed,
            param,
            bbox,
            func,
        }
    }

    /// Morphology for the current parameter value
    pub fn morphology(&self) -> Result<Array3<f64>> {
        (self.func)(&self.param.value, &self.bbox)
    }
}

impl Component for FunctionComponent {
    fn bbox(&self) -> &BoundingBox {
        &self.bbox
    }

    fn parameters(&self) -> Vec<&Parameter> {
        vec![&self.sed, &self.param]
    }

    fn parameters_mut(&mut self) -> Vec<&mut Parameter> {
        vec![&mut self.sed, &mut self.param]
    }

    /// The morphology function sees positions directly, so `shift` is ignored
    fn render(&self, _shift: Option<(f64, f64)>) -> Result<Array3<f64>> {
        let sed = sed_vector(&self.sed)?;
        outer_with_sed(&sed, &self.morphology()?)
    }
}
