//! Integer bounding boxes over pixel (and channel) coordinates
//!
//! A [`BoundingBox`] is a half-open, axis-aligned region `[start, stop)` along
//! each axis. Bounds are signed so a box centered near a frame edge can extend
//! past it; extraction from an array zero-fills whatever falls outside.

use ndarray::{s, Array2, Array3, ArrayView2, ArrayView3};
use serde::{Deserialize, Serialize};

/// Axis-aligned box with half-open integer bounds on every axis
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BoundingBox {
    /// Inclusive lower bound per axis
    pub start: Vec<i64>,
    /// Exclusive upper bound per axis
    pub stop: Vec<i64>,
}

impl BoundingBox {
    /// Create a box from `(start, stop)` pairs, one per axis
    pub fn from_bounds(bounds: &[(i64, i64)]) -> Self {
        Self {
            start: bounds.iter().map(|b| b.0).collect(),
            stop: bounds.iter().map(|b| b.1).collect(),
        }
    }

    /// Create a box of the given shape anchored at `origin`
    pub fn from_shape(shape: &[usize], origin: &[i64]) -> Self {
        debug_assert_eq!(shape.len(), origin.len());
        Self {
            start: origin.to_vec(),
            stop: origin
                .iter()
                .zip(shape)
                .map(|(&o, &n)| o + n as i64)
                .collect(),
        }
    }

    /// Tight 2D box around all pixels strictly greater than `min_value`
    ///
    /// Returns `None` when no pixel passes.
    pub fn from_data(data: &ArrayView2<f64>, min_value: f64) -> Option<Self> {
        let mut bounds: Option<(i64, i64, i64, i64)> = None;
        for ((row, col), &value) in data.indexed_iter() {
            if value <= min_value {
                continue;
            }
            let (row, col) = (row as i64, col as i64);
            bounds = Some(match bounds {
                None => (row, col, row, col),
                Some((r0, c0, r1, c1)) => (r0.min(row), c0.min(col), r1.max(row), c1.max(col)),
            });
        }
        bounds.map(|(r0, c0, r1, c1)| Self::from_bounds(&[(r0, r1 + 1), (c0, c1 + 1)]))
    }

    /// Square 2D box of side `size` centered on `center`
    ///
    /// The center lands at index `size / 2` of the box.
    pub fn centered(center: (i64, i64), size: usize) -> Self {
        let half = (size / 2) as i64;
        let size = size as i64;
        Self::from_bounds(&[
            (center.0 - half, center.0 - half + size),
            (center.1 - half, center.1 - half + size),
        ])
    }

    /// Number of axes
    pub fn ndim(&self) -> usize {
        self.start.len()
    }

    /// Extent along each axis
    pub fn shape(&self) -> Vec<usize> {
        self.start
            .iter()
            .zip(&self.stop)
            .map(|(&a, &b)| (b - a).max(0) as usize)
            .collect()
    }

    /// True when the box covers no cells
    pub fn is_empty(&self) -> bool {
        self.start.iter().zip(&self.stop).any(|(a, b)| b <= a)
    }

    /// Check if this box contains the given point
    pub fn contains(&self, point: &[i64]) -> bool {
        point.len() == self.ndim()
            && point
                .iter()
                .zip(self.start.iter().zip(&self.stop))
                .all(|(&p, (&a, &b))| p >= a && p < b)
    }

    /// Check if this box completely contains another box
    pub fn contains_box(&self, other: &Self) -> bool {
        self.ndim() == other.ndim()
            && (0..self.ndim()).all(|d| self.start[d] <= other.start[d] && self.stop[d] >= other.stop[d])
    }

    /// Overlap of both boxes, `None` when they are disjoint
    pub fn intersection(&self, other: &Self) -> Option<Self> {
        let overlap = Self {
            start: self.start.iter().zip(&other.start).map(|(a, b)| *a.max(b)).collect(),
            stop: self.stop.iter().zip(&other.stop).map(|(a, b)| *a.min(b)).collect(),
        };
        (!overlap.is_empty()).then_some(overlap)
    }

    /// Prepend a channel range, turning a 2D spatial box into a 3D box
    pub fn with_channels(&self, channels: (i64, i64)) -> Self {
        let mut start = vec![channels.0];
        let mut stop = vec![channels.1];
        start.extend_from_slice(&self.start);
        stop.extend_from_slice(&self.stop);
        Self { start, stop }
    }

    /// The trailing two (row, column) axes of the box
    pub fn spatial(&self) -> Self {
        let n = self.ndim();
        debug_assert!(n >= 2);
        Self {
            start: self.start[n - 2..].to_vec(),
            stop: self.stop[n - 2..].to_vec(),
        }
    }

    /// Copy the region of a 2D array covered by this box
    ///
    /// Cells outside the array are zero.
    pub fn extract_from(&self, data: &ArrayView2<f64>) -> Array2<f64> {
        let spatial = self.spatial();
        let shape = spatial.shape();
        let mut out = Array2::zeros((shape[0], shape[1]));
        let (ny, nx) = data.dim();
        let image_box = Self::from_shape(&[ny, nx], &[0, 0]);
        if let Some(overlap) = spatial.intersection(&image_box) {
            let src = data.slice(s![
                overlap.start[0] as usize..overlap.stop[0] as usize,
                overlap.start[1] as usize..overlap.stop[1] as usize
            ]);
            let (r0, c0) = (
                (overlap.start[0] - spatial.start[0]) as usize,
                (overlap.start[1] - spatial.start[1]) as usize,
            );
            out.slice_mut(s![r0..r0 + src.nrows(), c0..c0 + src.ncols()])
                .assign(&src);
        }
        out
    }

    /// Copy the region of a 3D `(channel, row, column)` array covered by this box
    ///
    /// A 2D box extracts every channel. Cells outside the array are zero.
    pub fn extract_from_cube(&self, data: &ArrayView3<f64>) -> Array3<f64> {
        let (nc, ny, nx) = data.dim();
        let full = if self.ndim() == 3 {
            self.clone()
        } else {
            self.with_channels((0, nc as i64))
        };
        let shape = full.shape();
        let mut out = Array3::zeros((shape[0], shape[1], shape[2]));
        let data_box = Self::from_shape(&[nc, ny, nx], &[0, 0, 0]);
        if let Some(overlap) = full.intersection(&data_box) {
            let src = data.slice(s![
                overlap.start[0] as usize..overlap.stop[0] as usize,
                overlap.start[1] as usize..overlap.stop[1] as usize,
                overlap.start[2] as usize..overlap.stop[2] as usize
            ]);
            let offset: Vec<usize> = (0..3)
                .map(|d| (overlap.start[d] - full.start[d]) as usize)
                .collect();
            let (dc, dy, dx) = src.dim();
            out.slice_mut(s![
                offset[0]..offset[0] + dc,
                offset[1]..offset[1] + dy,
                offset[2]..offset[2] + dx
            ])
            .assign(&src);
        }
        out
    }
}
