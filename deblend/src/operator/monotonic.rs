//! Radial monotonicity about a center pixel.
//!
//! Pixels are visited in order of increasing distance from the center. Each
//! pixel's reference flux is a weighted mean of the 8-connected neighbours that
//! lie strictly closer to the center and toward it; the pixel is clamped to
//! `reference · (1 - min_gradient)`. A positive `min_gradient` breaks flat
//! plateaus ("bridges") connecting unrelated peaks.

use std::fmt;
use std::str::FromStr;

use ndarray::{ArrayBase, DataMut, Ix2};
use serde::{Deserialize, Serialize};

const NEIGHBORS: [(i64, i64); 8] = [
    (-1, -1),
    (-1, 0),
    (-1, 1),
    (0, -1),
    (0, 1),
    (1, -1),
    (1, 0),
    (1, 1),
];

/// Weighting of the inward neighbours that define a pixel's reference flux
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NeighborWeight {
    /// Equal weight for every inward neighbour
    Flat,
    /// Weight by the cosine between the neighbour offset and the inward direction
    Angle,
    /// Only the neighbour best aligned with the inward direction
    Nearest,
}

impl fmt::Display for NeighborWeight {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Flat => "flat",
            Self::Angle => "angle",
            Self::Nearest => "nearest",
        };
        write!(f, "{name}")
    }
}

impl FromStr for NeighborWeight {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "flat" => Ok(Self::Flat),
            "angle" => Ok(Self::Angle),
            "nearest" => Ok(Self::Nearest),
            other => Err(format!(
                "unknown neighbor weight '{other}', expected flat, angle or nearest"
            )),
        }
    }
}

/// Precomputed monotonic projection for a fixed shape and center
#[derive(Debug, Clone)]
pub struct WeightedMonotonic {
    shape: (usize, usize),
    center: (usize, usize),
    min_gradient: f64,
    /// Flat pixel indices by increasing distance, center excluded
    order: Vec<usize>,
    /// Normalized `(flat index, weight)` reference neighbours per pixel
    parents: Vec<Vec<(usize, f64)>>,
}

impl WeightedMonotonic {
    /// Build the projection for images of `shape` monotonic about `center`
    ///
    /// `center` must lie inside `shape`.
    pub fn new(
        shape: (usize, usize),
        neighbor_weight: NeighborWeight,
        center: (usize, usize),
        min_gradient: f64,
    ) -> Self {
        let (ny, nx) = shape;
        debug_assert!(center.0 < ny && center.1 < nx);
        let (cy, cx) = (center.0 as i64, center.1 as i64);
        let dist2 = |i: i64, j: i64| (i - cy).pow(2) + (j - cx).pow(2);

        let mut parents = vec![Vec::new(); ny * nx];
        for i in 0..ny as i64 {
            for j in 0..nx as i64 {
                if (i, j) == (cy, cx) {
                    continue;
                }
                let own = dist2(i, j);
                let (ry, rx) = ((cy - i) as f64, (cx - j) as f64);
                let norm = (ry * ry + rx * rx).sqrt();

                let mut candidates: Vec<(usize, f64)> = NEIGHBORS
                    .iter()
                    .filter_map(|&(dy, dx)| {
                        let (ni, nj) = (i + dy, j + dx);
                        if ni < 0 || nj < 0 || ni >= ny as i64 || nj >= nx as i64 {
                            return None;
                        }
                        if dist2(ni, nj) >= own {
                            return None;
                        }
                        let cos = (dy as f64 * ry + dx as f64 * rx)
                            / (norm * ((dy * dy + dx * dx) as f64).sqrt());
                        (cos > 0.0).then_some((ni as usize * nx + nj as usize, cos))
                    })
                    .collect();

                match neighbor_weight {
                    NeighborWeight::Flat => candidates.iter_mut().for_each(|c| c.1 = 1.0),
                    NeighborWeight::Angle => {}
                    NeighborWeight::Nearest => {
                        if let Some(best) = candidates
                            .iter()
                            .copied()
                            .max_by(|a, b| a.1.total_cmp(&b.1))
                        {
                            candidates = vec![(best.0, 1.0)];
                        }
                    }
                }

                let total: f64 = candidates.iter().map(|c| c.1).sum();
                if total > 0.0 {
                    candidates.iter_mut().for_each(|c| c.1 /= total);
                }
                parents[i as usize * nx + j as usize] = candidates;
            }
        }

        let mut order: Vec<usize> = (0..ny * nx)
            .filter(|&idx| idx != center.0 * nx + center.1)
            .collect();
        order.sort_by_key(|&idx| dist2((idx / nx) as i64, (idx % nx) as i64));

        Self {
            shape,
            center,
            min_gradient,
            order,
            parents,
        }
    }

    pub fn shape(&self) -> (usize, usize) {
        self.shape
    }

    pub fn center(&self) -> (usize, usize) {
        self.center
    }

    /// Clamp `image` in place so flux does not increase away from the center
    ///
    /// # Panics
    /// Panics if `image` does not have the shape this projection was built for.
    pub fn project<S>(&self, image: &mut ArrayBase<S, Ix2>)
    where
        S: DataMut<Elem = f64>,
    {
        assert_eq!(image.dim(), self.shape, "monotonic projection shape mismatch");
        let factor = 1.0 - self.min_gradient;
        let nx = self.shape.1;
        let at = |idx: usize| [idx / nx, idx % nx];

        for &idx in &self.order {
            let parents = &self.parents[idx];
            if parents.is_empty() {
                continue;
            }
            let reference: f64 = parents.iter().map(|&(p, w)| w * image[at(p)]).sum();
            let limit = reference * factor;
            let value = &mut image[at(idx)];
            if *value > limit {
                *value = limit;
            }
        }
    }
}
