//! Source models ready for optimization.
//!
//! # Archetypes
//!
//! - **Random**: uniform random morphology over the whole frame
//! - **Point**: PSF at an optimizable sub-pixel center
//! - **Extended**: symmetric monotonic morphology from the detection coadd
//! - **Starlet**: extended morphology expressed in starlet coefficients
//! - **MultiComponent**: stacked flux layers of an extended morphology
//!
//! Every archetype exposes its parameters in a fixed order, its box and a
//! render of its flux over that box. Builders live in [`builders`].

pub mod builders;
pub mod component;

use ndarray::Array3;

use crate::bbox::BoundingBox;
use crate::error::{InitError, Result};
use crate::parameter::Parameter;

pub use builders::{
    ExtendedConfig, MultiComponentConfig, PointConfig, RandomConfig, SourceConfig, StarletConfig,
};
pub use component::{Component, FactorizedComponent, FunctionComponent, MorphologyFn};

use component::shift_of;

/// An initialized source of one of the supported archetypes
#[derive(Debug, Clone)]
pub enum Source {
    Random(FactorizedComponent),
    Point(FunctionComponent),
    Extended {
        component: FactorizedComponent,
        pixel_center: (i64, i64),
        shift: Option<Parameter>,
    },
    Starlet {
        component: FunctionComponent,
        pixel_center: (i64, i64),
    },
    /// Components share one box and one optional shift
    MultiComponent {
        components: Vec<FactorizedComponent>,
        bbox: BoundingBox,
        pixel_center: (i64, i64),
        shift: Option<Parameter>,
    },
}

impl Source {
    /// Archetype name as used in configuration files
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Random(_) => "random",
            Self::Point(_) => "point",
            Self::Extended { .. } => "extended",
            Self::Starlet { .. } => "starlet",
            Self::MultiComponent { .. } => "multi_component",
        }
    }

    /// Components of the source in rendering order
    pub fn components(&self) -> Vec<&dyn Component> {
        match self {
            Self::Random(component) => vec![component as &dyn Component],
            Self::Point(component) => vec![component as &dyn Component],
            Self::Extended { component, .. } => vec![component as &dyn Component],
            Self::Starlet { component, .. } => vec![component as &dyn Component],
            Self::MultiComponent { components, .. } => {
                components.iter().map(|c| c as &dyn Component).collect()
            }
        }
    }

    /// `(channel, row, column)` box of the source
    pub fn bbox(&self) -> &BoundingBox {
        match self {
            Self::Random(component) => &component.bbox,
            Self::Point(component) => &component.bbox,
            Self::Extended { component, .. } => &component.bbox,
            Self::Starlet { component, .. } => &component.bbox,
            Self::MultiComponent { bbox, .. } => bbox,
        }
    }

    /// Shift parameter shared by the source's components, if it has one
    pub fn shift(&self) -> Option<&Parameter> {
        match self {
            Self::Extended { shift, .. } | Self::MultiComponent { shift, .. } => shift.as_ref(),
            _ => None,
        }
    }

    /// Current center in frame pixels: the pixel center plus any shift
    ///
    /// Random sources have no center.
    pub fn center(&self) -> Option<(f64, f64)> {
        let with_shift = |pixel: (i64, i64), shift: &Option<Parameter>| {
            let (dy, dx) = shift.as_ref().and_then(|s| shift_of(s).ok()).unwrap_or((0.0, 0.0));
            (pixel.0 as f64 + dy, pixel.1 as f64 + dx)
        };
        match self {
            Self::Random(_) => None,
            Self::Point(component) => shift_of(&component.param).ok(),
            Self::Extended {
                pixel_center, shift, ..
            }
            | Self::MultiComponent {
                pixel_center, shift, ..
            } => Some(with_shift(*pixel_center, shift)),
            Self::Starlet { pixel_center, .. } => Some((pixel_center.0 as f64, pixel_center.1 as f64)),
        }
    }

    /// All parameters in optimizer order; a shared shift comes last, once
    pub fn parameters(&self) -> Vec<&Parameter> {
        let mut parameters: Vec<&Parameter> = self
            .components()
            .into_iter()
            .flat_map(|c| c.parameters())
            .collect();
        if let Some(shift) = self.shift() {
            parameters.push(shift);
        }
        parameters
    }

    pub fn parameters_mut(&mut self) -> Vec<&mut Parameter> {
        match self {
            Self::Random(component) => component.parameters_mut(),
            Self::Point(component) => component.parameters_mut(),
            Self::Starlet { component, .. } => component.parameters_mut(),
            Self::Extended { component, shift, .. } => {
                let mut parameters = component.parameters_mut();
                parameters.extend(shift.as_mut());
                parameters
            }
            Self::MultiComponent {
                components, shift, ..
            } => {
                let mut parameters: Vec<&mut Parameter> = components
                    .iter_mut()
                    .flat_map(|c| c.parameters_mut())
                    .collect();
                parameters.extend(shift.as_mut());
                parameters
            }
        }
    }

    /// Flux of the source over [`Source::bbox`]
    pub fn render(&self) -> Result<Array3<f64>> {
        let shift = self.shift().map(shift_of).transpose()?;
        let shape = self.bbox().shape();
        let mut model = Array3::zeros((shape[0], shape[1], shape[2]));
        for component in self.components() {
            let rendered = component.render(shift)?;
            if rendered.dim() != model.dim() {
                return Err(InitError::ShapeMismatch(format!(
                    "component renders {:?} into a box of {:?}",
                    rendered.dim(),
                    model.dim()
                )));
            }
            model += &rendered;
        }
        Ok(model)
    }
}
