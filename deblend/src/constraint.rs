//! Projections applied to parameters after each optimizer step.
//!
//! A [`Constraint`] maps an array onto a feasible set in place. Morphology
//! constraints treat the middle pixel of the array as the source center, which
//! holds because source boxes are centered on their pixel center.
//!
//! # Variants
//!
//! - **Positivity**: clamp to a floor (default 0)
//! - **Monotonicity**: flux declines away from the center
//! - **Symmetry**: 2-fold rotational symmetry about the center
//! - **L0 / L1**: hard / soft thresholding with a broadcastable threshold array
//! - **Normalization**: divide by the max or the sum
//! - **CenterOn**: keep the center pixel above a tiny floor
//! - **Chain**: several constraints applied left to right

use ndarray::{ArrayD, Ix2};
use serde::{Deserialize, Serialize};

use crate::error::{InitError, Result};
use crate::operator::{
    prox_hard, prox_plus, prox_soft, prox_uncentered_symmetry, NeighborWeight, SymmetryAlgorithm,
    WeightedMonotonic,
};

/// Which statistic a [`Constraint::Normalization`] fixes to one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NormalizationKind {
    Max,
    Sum,
}

/// Projection onto a feasible set
#[derive(Debug, Clone, PartialEq)]
pub enum Constraint {
    /// Entries below `zero` are raised to `zero`
    Positivity { zero: f64 },
    /// Monotonic decline from the array center
    Monotonicity {
        neighbor_weight: NeighborWeight,
        min_gradient: f64,
    },
    /// 180° rotational symmetry about the array center
    Symmetry { algorithm: SymmetryAlgorithm },
    /// Hard threshold at `step * thresh`
    L0 { thresh: ArrayD<f64> },
    /// Soft threshold at `step * thresh`
    L1 { thresh: ArrayD<f64> },
    /// Rescale so the max (or sum) equals one
    Normalization { kind: NormalizationKind },
    /// Center pixel is at least `tiny`
    CenterOn { tiny: f64 },
    Chain(ConstraintChain),
}

impl Constraint {
    pub fn positivity() -> Self {
        Self::Positivity { zero: 0.0 }
    }

    pub fn center_on() -> Self {
        Self::CenterOn { tiny: 1e-6 }
    }

    /// Project `x` in place; `step` scales the thresholding constraints
    pub fn project(&self, x: &mut ArrayD<f64>, step: f64) -> Result<()> {
        match self {
            Self::Positivity { zero } => prox_plus(x, *zero),
            Self::Monotonicity {
                neighbor_weight,
                min_gradient,
            } => {
                let mut image = as_image(x)?;
                let shape = image.dim();
                let prox = WeightedMonotonic::new(
                    shape,
                    *neighbor_weight,
                    (shape.0 / 2, shape.1 / 2),
                    *min_gradient,
                );
                prox.project(&mut image);
            }
            Self::Symmetry { algorithm } => {
                let image = as_image(x)?.to_owned();
                let center = (image.nrows() / 2, image.ncols() / 2);
                let symmetric = prox_uncentered_symmetry(image, center, *algorithm);
                x.assign(&symmetric.into_dyn());
            }
            Self::L0 { thresh } => prox_hard(x, step, &thresh.view())?,
            Self::L1 { thresh } => prox_soft(x, step, &thresh.view())?,
            Self::Normalization { kind } => {
                let norm = match kind {
                    NormalizationKind::Max => x.iter().copied().fold(f64::NEG_INFINITY, f64::max),
                    NormalizationKind::Sum => x.sum(),
                };
                // All-zero layers stay as they are
                if norm > 0.0 {
                    x.mapv_inplace(|v| v / norm);
                }
            }
            Self::CenterOn { tiny } => {
                let mut image = as_image(x)?;
                let center = (image.nrows() / 2, image.ncols() / 2);
                if image[center] < *tiny {
                    image[center] = *tiny;
                }
            }
            Self::Chain(chain) => chain.project(x, step)?,
        }
        Ok(())
    }
}

fn as_image(x: &mut ArrayD<f64>) -> Result<ndarray::ArrayViewMut2<'_, f64>> {
    let ndim = x.ndim();
    x.view_mut()
        .into_dimensionality::<Ix2>()
        .map_err(|_| InitError::ShapeMismatch(format!("expected a 2D morphology, got {ndim} axes")))
}

/// Constraints applied in order, left to right
#[derive(Debug, Clone, PartialEq)]
pub struct ConstraintChain {
    constraints: Vec<Constraint>,
}

impl ConstraintChain {
    pub fn new(constraints: Vec<Constraint>) -> Self {
        Self { constraints }
    }

    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    pub fn len(&self) -> usize {
        self.constraints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty()
    }

    pub fn project(&self, x: &mut ArrayD<f64>, step: f64) -> Result<()> {
        for constraint in &self.constraints {
            constraint.project(x, step)?;
        }
        Ok(())
    }
}

impl From<ConstraintChain> for Constraint {
    fn from(chain: ConstraintChain) -> Self {
        Self::Chain(chain)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::{arr1, Array2, Array3, IxDyn};

    fn bump(n: usize) -> ArrayD<f64> {
        let c = (n / 2) as f64;
        Array2::from_shape_fn((n, n), |(i, j)| {
            (-((i as f64 - c).powi(2) + (j as f64 - c).powi(2)) / 4.0).exp()
        })
        .into_dyn()
    }

    #[test]
    fn test_normalization() {
        let mut x = arr1(&[1.0, 3.0, 4.0]).into_dyn();
        Constraint::Normalization {
            kind: NormalizationKind::Max,
        }
        .project(&mut x, 1.0)
        .unwrap();
        assert_relative_eq!(x[[2]], 1.0);
        assert_relative_eq!(x[[0]], 0.25);

        Constraint::Normalization {
            kind: NormalizationKind::Sum,
        }
        .project(&mut x, 1.0)
        .unwrap();
        assert_relative_eq!(x.sum(), 1.0);

        let mut zeros = ArrayD::<f64>::zeros(IxDyn(&[3]));
        Constraint::Normalization {
            kind: NormalizationKind::Max,
        }
        .project(&mut zeros, 1.0)
        .unwrap();
        assert!(zeros.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_center_on() {
        let mut x = ArrayD::<f64>::zeros(IxDyn(&[5, 4]));
        Constraint::center_on().project(&mut x, 1.0).unwrap();
        assert_eq!(x[[2, 2]], 1e-6);
        assert_eq!(x.sum(), 1e-6);
    }

    #[test]
    fn test_symmetry_about_array_center() {
        let mut x = bump(9);
        x[[1, 4]] = 5.0;
        Constraint::Symmetry {
            algorithm: SymmetryAlgorithm::Sdss,
        }
        .project(&mut x, 1.0)
        .unwrap();
        assert_relative_eq!(x[[1, 4]], x[[7, 4]]);
    }

    #[test]
    fn test_monotonicity_needs_image() {
        let mut x = Array3::<f64>::ones((2, 4, 4)).into_dyn();
        let constraint = Constraint::Monotonicity {
            neighbor_weight: NeighborWeight::Flat,
            min_gradient: 0.0,
        };
        assert!(matches!(
            constraint.project(&mut x, 1.0),
            Err(InitError::ShapeMismatch(_))
        ));
    }

    #[test]
    fn test_chain_applies_in_order() {
        let mut x = bump(11);
        x[[5, 9]] = 3.0;
        x[[0, 0]] = -1.0;
        let chain = ConstraintChain::new(vec![
            Constraint::Monotonicity {
                neighbor_weight: NeighborWeight::Angle,
                min_gradient: 0.0,
            },
            Constraint::positivity(),
            Constraint::Normalization {
                kind: NormalizationKind::Max,
            },
        ]);
        assert_eq!(chain.len(), 3);
        Constraint::from(chain).project(&mut x, 1.0).unwrap();

        assert_relative_eq!(x[[5, 5]], 1.0);
        assert!(x[[5, 9]] < 1.0);
        assert!(x.iter().all(|&v| (0.0..=1.0).contains(&v)));
    }

    #[test]
    fn test_l0_uses_step() {
        let mut x = arr1(&[0.5, 1.5, 3.0]).into_dyn();
        let thresh = arr1(&[1.0]).into_dyn();
        Constraint::L0 { thresh }.project(&mut x, 2.0).unwrap();
        assert_eq!(x.as_slice().unwrap(), &[0.0, 0.0, 3.0]);
    }
}
