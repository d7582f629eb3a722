//! Bilinear sampling on the unit pixel grid.
//!
//! Pixel `(i, j)` of an image is the sample at coordinate `(y=i, x=j)`. Sampling
//! between pixel centers blends the four surrounding corners; coordinates outside
//! the grid have no value.

use ndarray::{Array2, ArrayView2};

/// Sample `image` at the fractional position `(y, x)`
///
/// Returns `None` when the position lies outside `[0, ny-1] × [0, nx-1]`.
pub fn sample_bilinear(image: &ArrayView2<f64>, y: f64, x: f64) -> Option<f64> {
    let (ny, nx) = image.dim();
    if ny == 0 || nx == 0 || !y.is_finite() || !x.is_finite() {
        return None;
    }
    let (y_max, x_max) = ((ny - 1) as f64, (nx - 1) as f64);
    if y < 0.0 || x < 0.0 || y > y_max || x > x_max {
        return None;
    }

    let y_low = y.floor() as usize;
    let x_low = x.floor() as usize;
    let y_high = (y_low + 1).min(ny - 1);
    let x_high = (x_low + 1).min(nx - 1);
    let y_weight = y - y_low as f64;
    let x_weight = x - x_low as f64;

    // Get the four corner values
    let q11 = image[[y_low, x_low]];
    let q12 = image[[y_high, x_low]];
    let q21 = image[[y_low, x_high]];
    let q22 = image[[y_high, x_high]];

    Some(
        q11 * (1.0 - x_weight) * (1.0 - y_weight)
            + q21 * x_weight * (1.0 - y_weight)
            + q12 * (1.0 - x_weight) * y_weight
            + q22 * x_weight * y_weight,
    )
}

/// Translate an image by a sub-pixel offset
///
/// Output pixel `(i, j)` takes the input value at `(i - dy, j - dx)`, so a positive
/// `dy` moves flux toward larger row indices. Pixels sampled from outside the
/// input are zero.
pub fn shift_image(image: &ArrayView2<f64>, dy: f64, dx: f64) -> Array2<f64> {
    if dy == 0.0 && dx == 0.0 {
        return image.to_owned();
    }
    Array2::from_shape_fn(image.dim(), |(i, j)| {
        sample_bilinear(image, i as f64 - dy, j as f64 - dx).unwrap_or(0.0)
    })
}
