use crate::affine::Affine;
use crate::enums::{Interpolation, View};
use crate::error::{ResliceError, Result};
use crate::reslicer::{ResliceResult, reslice};

use ndarray::{Array3, ArrayD, ArrayView2, Ix3};

/// Numeric voxel type the reslicer can sample.
pub trait Sample: Copy + Default + PartialOrd + Send + Sync + 'static {
    fn to_f64(self) -> f64;

    /// Convert an interpolated value back; integer types round and saturate.
    fn from_f64(value: f64) -> Self;
}

macro_rules! impl_sample_float {
    ($($t:ty),*) => {$(
        impl Sample for $t {
            #[inline]
            fn to_f64(self) -> f64 {
                self as f64
            }

            #[inline]
            fn from_f64(value: f64) -> Self {
                value as $t
            }
        }
    )*};
}

macro_rules! impl_sample_int {
    ($($t:ty),*) => {$(
        impl Sample for $t {
            #[inline]
            fn to_f64(self) -> f64 {
                self as f64
            }

            #[inline]
            fn from_f64(value: f64) -> Self {
                value.round() as $t
            }
        }
    )*};
}

impl_sample_float!(f32, f64);
impl_sample_int!(u8, u16, u32, i16, i32);

/// A 3D array in native `(X, Y, Z)` voxel order together with the affine
/// mapping its voxel indices into scanner space.
#[derive(Debug, Clone)]
pub struct Volume<T> {
    pub data: Array3<T>,
    pub affine: Affine,
}

impl<T: Sample> Volume<T> {
    pub fn new(data: Array3<T>, affine: Affine) -> Self {
        Self { data, affine }
    }

    /// Build a volume from dynamically shaped inputs.
    ///
    /// # Errors
    ///
    /// Returns [`ResliceError::InvalidShape`] if `data` is not 3D or
    /// `affine` is not 4x4.
    pub fn from_dyn(data: ArrayD<T>, affine: ArrayView2<'_, f64>) -> Result<Self> {
        let found = data.shape().to_vec();
        let data = data
            .into_dimensionality::<Ix3>()
            .map_err(|_| ResliceError::InvalidShape {
                expected: "3D volume",
                found,
            })?;
        let affine = Affine::from_array(affine)?;
        Ok(Self::new(data, affine))
    }

    /// Get the dimensions of the volume (X, Y, Z)
    pub fn dim(&self) -> (usize, usize, usize) {
        self.data.dim()
    }

    /// Get a reference to the underlying data
    pub fn data(&self) -> &Array3<T> {
        &self.data
    }

    /// Get a mutable reference to the underlying data
    pub fn data_mut(&mut self) -> &mut Array3<T> {
        &mut self.data
    }

    pub fn affine(&self) -> &Affine {
        &self.affine
    }

    /// Voxel size along each native axis, from the affine's column norms.
    pub fn spacing(&self) -> (f64, f64, f64) {
        let m = self.affine.matrix();
        let norm = |c: usize| m.fixed_view::<3, 1>(0, c).norm();
        (norm(0), norm(1), norm(2))
    }

    /// `(min, max)` of the samples, or `None` for an empty volume.
    pub fn intensity_range(&self) -> Option<(f64, f64)> {
        self.data.iter().map(|v| v.to_f64()).fold(None, |acc, v| match acc {
            None => Some((v, v)),
            Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
        })
    }

    pub fn reslice(&self, view: View, interpolation: Interpolation) -> Result<ResliceResult<T>> {
        reslice(self, view, interpolation)
    }
}
