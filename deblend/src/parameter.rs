//! Optimizable arrays and their metadata.
//!
//! A [`Parameter`] pairs an n-dimensional value with everything an optimizer
//! needs to update it: a name, an optional [`Constraint`] applied after every
//! gradient step, a [`StepRule`], convergence state, an optional uncertainty
//! and a fixed/free flag. Sources own their parameters exclusively.

use std::fmt;
use std::sync::Arc;

use ndarray::{arr0, ArrayD, Axis};

use crate::constraint::Constraint;
use crate::error::Result;

/// Step size as a function of the current value and the iteration count
pub type StepFn = dyn Fn(&ArrayD<f64>, usize) -> ArrayD<f64> + Send + Sync;

/// How a parameter's step size is determined
#[derive(Clone)]
pub enum StepRule {
    /// Fixed step
    Constant(f64),
    /// `factor * mean(value, axis 0)`
    Relative { factor: f64 },
    /// Arbitrary rule
    Custom(Arc<StepFn>),
}

impl fmt::Debug for StepRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Constant(step) => f.debug_tuple("Constant").field(step).finish(),
            Self::Relative { factor } => f.debug_struct("Relative").field("factor", factor).finish(),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

impl Default for StepRule {
    /// Relative step with factor 0.1
    fn default() -> Self {
        Self::Relative { factor: 0.1 }
    }
}

/// `factor * mean(x, axis 0)`; an empty leading axis gives a zero step
pub fn relative_step(x: &ArrayD<f64>, factor: f64) -> ArrayD<f64> {
    if x.ndim() == 0 {
        return x.mapv(|v| factor * v);
    }
    match x.mean_axis(Axis(0)) {
        Some(mean) => mean * factor,
        None => arr0(0.0).into_dyn(),
    }
}

impl StepRule {
    /// Step size for `value` at `iteration`
    pub fn evaluate(&self, value: &ArrayD<f64>, iteration: usize) -> ArrayD<f64> {
        match self {
            Self::Constant(step) => arr0(*step).into_dyn(),
            Self::Relative { factor } => relative_step(value, *factor),
            Self::Custom(rule) => rule(value, iteration),
        }
    }
}

/// An optimizable array together with its optimization metadata
#[derive(Debug, Clone)]
pub struct Parameter {
    pub name: String,
    pub value: ArrayD<f64>,
    pub constraint: Option<Constraint>,
    pub step: StepRule,
    pub converged: bool,
    /// Uncertainty estimate filled in by the optimizer
    pub std: Option<ArrayD<f64>>,
    pub fixed: bool,
}

impl Parameter {
    pub fn new(name: impl Into<String>, value: ArrayD<f64>, step: StepRule) -> Self {
        Self {
            name: name.into(),
            value,
            constraint: None,
            step,
            converged: false,
            std: None,
            fixed: false,
        }
    }

    pub fn with_constraint(mut self, constraint: Constraint) -> Self {
        self.constraint = Some(constraint);
        self
    }

    pub fn shape(&self) -> &[usize] {
        self.value.shape()
    }

    /// Step size at `iteration` according to the parameter's rule
    pub fn step_size(&self, iteration: usize) -> ArrayD<f64> {
        self.step.evaluate(&self.value, iteration)
    }

    /// Project the value onto the feasible set, if a constraint is attached
    pub fn apply_constraint(&mut self, step: f64) -> Result<()> {
        match &self.constraint {
            Some(constraint) => constraint.project(&mut self.value, step),
            None => Ok(()),
        }
    }

    /// Exclude the parameter from optimization
    pub fn fix(&mut self) {
        self.fixed = true;
    }

    /// Include the parameter in optimization again
    pub fn free(&mut self) {
        self.fixed = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::{arr1, arr2};

    #[test]
    fn test_relative_step_of_sed_is_scalar() {
        let sed = arr1(&[1.0, 2.0, 3.0]).into_dyn();
        let step = relative_step(&sed, 0.1);
        assert_eq!(step.ndim(), 0);
        assert_relative_eq!(step.sum(), 0.2);
    }

    #[test]
    fn test_relative_step_of_image_is_column_mean() {
        let image = arr2(&[[1.0, 4.0], [3.0, 8.0]]).into_dyn();
        let step = relative_step(&image, 0.5);
        assert_eq!(step.shape(), &[2]);
        assert_relative_eq!(step[[0]], 1.0);
        assert_relative_eq!(step[[1]], 3.0);
    }

    #[test]
    fn test_step_rules() {
        let p = Parameter::new("center", arr1(&[4.0, 5.0]).into_dyn(), StepRule::Constant(0.1));
        assert_relative_eq!(p.step_size(0).sum(), 0.1);

        let p = Parameter::new("sed", arr1(&[2.0, 4.0]).into_dyn(), StepRule::default());
        assert_relative_eq!(p.step_size(3).sum(), 0.3);

        let rule = StepRule::Custom(Arc::new(|x: &ArrayD<f64>, it: usize| x.mapv(|v| v / (it + 1) as f64)));
        let p = Parameter::new("morph", arr1(&[2.0, 4.0]).into_dyn(), rule);
        assert_eq!(p.step_size(1).as_slice().unwrap(), &[1.0, 2.0]);
        assert_eq!(format!("{:?}", p.step), "Custom(..)");
    }

    #[test]
    fn test_fix_and_free() {
        let mut p = Parameter::new("sed", arr1(&[1.0]).into_dyn(), StepRule::default());
        assert!(!p.fixed);
        p.fix();
        assert!(p.fixed);
        p.free();
        assert!(!p.fixed);
    }

    #[test]
    fn test_apply_constraint() {
        let mut p = Parameter::new("sed", arr1(&[-1.0, 2.0]).into_dyn(), StepRule::default());
        p.apply_constraint(1.0).unwrap();
        assert_eq!(p.value.as_slice().unwrap(), &[-1.0, 2.0]);

        let mut p = p.with_constraint(Constraint::positivity());
        p.apply_constraint(1.0).unwrap();
        assert_eq!(p.value.as_slice().unwrap(), &[0.0, 2.0]);
    }
}
