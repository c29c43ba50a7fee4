use nalgebra::Vector3;
use ndarray::{Array2, Axis};

use crate::affine::Affine;

/// Axis-aligned box in the target space of an affine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min: Vector3<f64>,
    pub max: Vector3<f64>,
}

impl BoundingBox {
    /// Smallest box containing every transformed corner voxel of a volume
    /// of `shape`.
    pub fn from_affine(shape: (usize, usize, usize), affine: &Affine) -> Self {
        let corners = corners(shape);
        // corners are always N x 4
        let transformed = corners.dot(&affine.to_array().t());

        let mut min = Vector3::repeat(f64::INFINITY);
        let mut max = Vector3::repeat(f64::NEG_INFINITY);
        for point in transformed.axis_iter(Axis(0)) {
            for axis in 0..3 {
                min[axis] = min[axis].min(point[axis]);
                max[axis] = max[axis].max(point[axis]);
            }
        }
        Self { min, max }
    }

    /// Output grid shape covering the box with unit spacing.
    pub fn grid_shape(&self) -> (usize, usize, usize) {
        let extent = |axis: usize| (self.max[axis] - self.min[axis] + 1.0).ceil().max(0.0) as usize;
        (extent(0), extent(1), extent(2))
    }

    pub fn contains(&self, point: [f64; 3], tolerance: f64) -> bool {
        (0..3).all(|axis| {
            point[axis] >= self.min[axis] - tolerance && point[axis] <= self.max[axis] + tolerance
        })
    }
}

/// The 8 corner voxel coordinates `{0, D-1}^3`, homogeneous, one per row.
pub fn corners(shape: (usize, usize, usize)) -> Array2<f64> {
    let last = |d: usize| d.saturating_sub(1) as f64;
    let (dx, dy, dz) = (last(shape.0), last(shape.1), last(shape.2));
    let mut out = Array2::<f64>::ones((8, 4));
    for (row, mut point) in out.axis_iter_mut(Axis(0)).enumerate() {
        point[0] = if row & 0b100 == 0 { 0.0 } else { dx };
        point[1] = if row & 0b010 == 0 { 0.0 } else { dy };
        point[2] = if row & 0b001 == 0 { 0.0 } else { dz };
    }
    out
}
