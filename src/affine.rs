//! Homogeneous 4x4 affine transforms.
//!
//! Points are stored one per row, so a batch of `N` points is an `N x 4`
//! array and applying an affine `A` computes `points · Aᵀ`.

use std::ops::Mul;

use nalgebra::{Matrix3, Matrix4, Vector3, Vector4};
use ndarray::{Array2, ArrayView2, Axis, concatenate};

use crate::error::{ResliceError, Result};

/// Determinants at or below this magnitude are treated as singular.
pub const SINGULAR_EPSILON: f64 = 1e-12;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Affine(Matrix4<f64>);

impl Default for Affine {
    fn default() -> Self {
        Self::identity()
    }
}

impl Affine {
    pub fn new(matrix: Matrix4<f64>) -> Self {
        Self(matrix)
    }

    pub fn identity() -> Self {
        Self(Matrix4::identity())
    }

    /// Build an affine from row-major rows.
    pub fn from_rows(rows: [[f64; 4]; 4]) -> Self {
        Self(Matrix4::from_fn(|r, c| rows[r][c]))
    }

    /// Build an affine from a dynamically shaped 2D array.
    ///
    /// # Errors
    ///
    /// Returns [`ResliceError::InvalidShape`] unless the array is 4x4.
    pub fn from_array(array: ArrayView2<'_, f64>) -> Result<Self> {
        if array.dim() != (4, 4) {
            return Err(ResliceError::InvalidShape {
                expected: "4x4 affine matrix",
                found: array.shape().to_vec(),
            });
        }
        Ok(Self(Matrix4::from_fn(|r, c| array[[r, c]])))
    }

    /// Pure translation `[[I, t], [0, 1]]`.
    pub fn translation(t: Vector3<f64>) -> Self {
        Self(Matrix4::new_translation(&t))
    }

    pub fn matrix(&self) -> &Matrix4<f64> {
        &self.0
    }

    pub fn to_array(&self) -> Array2<f64> {
        Array2::from_shape_fn((4, 4), |(r, c)| self.0[(r, c)])
    }

    /// `self · other`: applies `other` first, then `self`.
    pub fn compose(&self, other: &Affine) -> Affine {
        Self(self.0 * other.0)
    }

    pub fn determinant(&self) -> f64 {
        self.0.determinant()
    }

    /// # Errors
    ///
    /// Returns [`ResliceError::SingularMatrix`] when the determinant is
    /// numerically zero.
    pub fn invert(&self) -> Result<Affine> {
        let determinant = self.determinant();
        if !determinant.is_finite() || determinant.abs() <= SINGULAR_EPSILON {
            return Err(ResliceError::SingularMatrix { determinant });
        }
        self.0
            .try_inverse()
            .map(Self)
            .ok_or(ResliceError::SingularMatrix { determinant })
    }

    /// Transform a batch of homogeneous points stored as rows of an `N x 4`
    /// array.
    ///
    /// # Errors
    ///
    /// Returns [`ResliceError::InvalidShape`] if `points` is not `N x 4`.
    pub fn apply(&self, points: ArrayView2<'_, f64>) -> Result<Array2<f64>> {
        if points.ncols() != 4 {
            return Err(ResliceError::InvalidShape {
                expected: "N x 4 homogeneous points",
                found: points.shape().to_vec(),
            });
        }
        Ok(points.dot(&self.to_array().t()))
    }

    #[inline]
    pub fn transform_point(&self, point: [f64; 3]) -> [f64; 3] {
        let p = self.0 * Vector4::new(point[0], point[1], point[2], 1.0);
        [p.x, p.y, p.z]
    }

    /// Singular values of the linear (rotation/scale/shear) block.
    pub fn singular_values(&self) -> Vector3<f64> {
        let linear: Matrix3<f64> = self.0.fixed_view::<3, 3>(0, 0).into_owned();
        let mut values = linear.singular_values();
        values
            .as_mut_slice()
            .sort_by(|a, b| b.partial_cmp(a).unwrap_or(std::cmp::Ordering::Equal));
        values
    }
}

impl Mul for Affine {
    type Output = Affine;

    fn mul(self, rhs: Affine) -> Affine {
        self.compose(&rhs)
    }
}

impl From<Matrix4<f64>> for Affine {
    fn from(matrix: Matrix4<f64>) -> Self {
        Self(matrix)
    }
}

/// Append a column of ones to an `N x 3` coordinate array.
///
/// # Errors
///
/// Returns [`ResliceError::InvalidShape`] if `points` is not `N x 3`.
pub fn to_homogeneous(points: ArrayView2<'_, f64>) -> Result<Array2<f64>> {
    if points.ncols() != 3 {
        return Err(ResliceError::InvalidShape {
            expected: "N x 3 points",
            found: points.shape().to_vec(),
        });
    }
    let ones = Array2::<f64>::ones((points.nrows(), 1));
    concatenate(Axis(1), &[points.view(), ones.view()]).map_err(|_| ResliceError::InvalidShape {
        expected: "N x 3 points",
        found: points.shape().to_vec(),
    })
}
