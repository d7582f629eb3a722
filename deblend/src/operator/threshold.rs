//! Element-wise proximal operators.

use ndarray::{ArrayD, ArrayViewD, Zip};

use crate::error::{InitError, Result};

fn broadcast_thresh<'a>(x: &ArrayD<f64>, thresh: &'a ArrayViewD<'_, f64>) -> Result<ArrayViewD<'a, f64>> {
    thresh.broadcast(x.raw_dim()).ok_or_else(|| {
        InitError::ShapeMismatch(format!(
            "threshold {:?} cannot broadcast to {:?}",
            thresh.shape(),
            x.shape()
        ))
    })
}

/// Hard thresholding (L0 prox): zero every entry with `|x| < step * thresh`
///
/// `thresh` broadcasts against `x`, so a `(levels, 1, 1)` array sets one
/// threshold per wavelet scale.
pub fn prox_hard(x: &mut ArrayD<f64>, step: f64, thresh: &ArrayViewD<f64>) -> Result<()> {
    let thresh = broadcast_thresh(x, thresh)?;
    Zip::from(x).and(&thresh).for_each(|v, &t| {
        if v.abs() < step * t {
            *v = 0.0;
        }
    });
    Ok(())
}

/// Soft thresholding (L1 prox): shrink every entry toward zero by `step * thresh`
pub fn prox_soft(x: &mut ArrayD<f64>, step: f64, thresh: &ArrayViewD<f64>) -> Result<()> {
    let thresh = broadcast_thresh(x, thresh)?;
    Zip::from(x).and(&thresh).for_each(|v, &t| {
        let shrunk = (v.abs() - step * t).max(0.0);
        *v = shrunk.copysign(*v);
    });
    Ok(())
}

/// Clamp every entry below `zero` up to `zero`
pub fn prox_plus(x: &mut ArrayD<f64>, zero: f64) {
    x.mapv_inplace(|v| if v < zero { zero } else { v });
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::{arr1, Array3, IxDyn};

    #[test]
    fn test_prox_hard_scalar_threshold() {
        let mut x = arr1(&[-3.0, -0.5, 0.2, 1.0, 4.0]).into_dyn();
        let thresh = ArrayD::from_elem(IxDyn(&[1]), 2.0);
        prox_hard(&mut x, 0.5, &thresh.view()).unwrap();
        assert_eq!(x.as_slice().unwrap(), &[-3.0, 0.0, 0.0, 1.0, 4.0]);
    }

    #[test]
    fn test_prox_hard_per_scale() {
        let mut x = Array3::from_elem((3, 4, 4), 1.5).into_dyn();
        let thresh = ndarray::Array3::from_shape_vec((3, 1, 1), vec![1.0, 2.0, 0.0])
            .unwrap()
            .into_dyn();
        prox_hard(&mut x, 1.0, &thresh.view()).unwrap();
        assert!(x.index_axis(ndarray::Axis(0), 0).iter().all(|&v| v == 1.5));
        assert!(x.index_axis(ndarray::Axis(0), 1).iter().all(|&v| v == 0.0));
        assert!(x.index_axis(ndarray::Axis(0), 2).iter().all(|&v| v == 1.5));
    }

    #[test]
    fn test_prox_soft_shrinks() {
        let mut x = arr1(&[-3.0, -0.5, 0.5, 3.0]).into_dyn();
        let thresh = ArrayD::from_elem(IxDyn(&[1]), 1.0);
        prox_soft(&mut x, 1.0, &thresh.view()).unwrap();
        let out = x.as_slice().unwrap();
        assert_relative_eq!(out[0], -2.0);
        assert_eq!(out[1], 0.0);
        assert_eq!(out[2], 0.0);
        assert_relative_eq!(out[3], 2.0);
    }

    #[test]
    fn test_threshold_shape_mismatch() {
        let mut x = Array3::<f64>::zeros((3, 4, 4)).into_dyn();
        let thresh = ArrayD::from_elem(IxDyn(&[2, 1, 1]), 1.0);
        assert!(matches!(
            prox_hard(&mut x, 1.0, &thresh.view()),
            Err(InitError::ShapeMismatch(_))
        ));
    }

    #[test]
    fn test_prox_plus() {
        let mut x = arr1(&[-1.0, 0.0, 2.0]).into_dyn();
        prox_plus(&mut x, 0.0);
        assert_eq!(x.as_slice().unwrap(), &[0.0, 0.0, 2.0]);

        let mut x = arr1(&[-1.0, 1e-30, 2.0]).into_dyn();
        prox_plus(&mut x, 1e-20);
        assert_eq!(x.as_slice().unwrap(), &[1e-20, 1e-20, 2.0]);
    }
}
