use crate::{
    affine::Affine,
    error::ResliceError,
    volume::{Sample, Volume},
};

use nalgebra::{Matrix4, Quaternion, UnitQuaternion, Vector3};
use ndarray::{ArrayD, IxDyn};
use nifti::{IntoNdArray, NiftiHeader, NiftiObject, ReaderOptions, error::NiftiError};
use std::path::Path;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum NiftiLoaderError {
    #[error("NIfTI error: {0}")]
    Nifti(#[from] NiftiError),

    #[error(transparent)]
    Shape(#[from] ResliceError),
}

/// Where the voxel to scanner affine of a NIfTI volume comes from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AffineMode {
    /// The affine stored in the header.
    #[default]
    Header,
    /// The header affine with every entry rounded to the nearest integer.
    Rounded,
}

pub struct NiftiLoader;

impl NiftiLoader {
    /// Load an intensity volume from a `.nii` or `.nii.gz` file.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or is not a 3D volume.
    pub fn load_image(
        path: impl AsRef<Path>,
        mode: AffineMode,
    ) -> Result<Volume<f32>, NiftiLoaderError> {
        let path = path.as_ref();
        let obj = ReaderOptions::new().read_file(path)?;
        let affine = Self::affine(obj.header(), mode);
        let array = obj.into_volume().into_ndarray::<f32>()?;
        let shape = array.shape().to_vec();
        let volume = Self::to_volume(shape, array.iter().copied().collect(), affine)?;
        info!(path = %path.display(), shape = ?volume.dim(), "Loaded NIfTI image");
        Ok(volume)
    }

    /// Load a label volume. Values are rounded to the nearest label and
    /// negative values become background.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or is not a 3D volume.
    pub fn load_labels(
        path: impl AsRef<Path>,
        mode: AffineMode,
    ) -> Result<Volume<u32>, NiftiLoaderError> {
        let path = path.as_ref();
        let obj = ReaderOptions::new().read_file(path)?;
        let affine = Self::affine(obj.header(), mode);
        let array = obj.into_volume().into_ndarray::<f64>()?;
        let shape = array.shape().to_vec();
        let labels = array.iter().map(|&v| u32::from_f64(v)).collect();
        let volume = Self::to_volume(shape, labels, affine)?;
        info!(path = %path.display(), shape = ?volume.dim(), "Loaded NIfTI labels");
        Ok(volume)
    }

    fn affine(header: &NiftiHeader, mode: AffineMode) -> Affine {
        let affine = header_affine(header);
        match mode {
            AffineMode::Header => affine,
            AffineMode::Rounded => Affine::new(affine.matrix().map(f64::round)),
        }
    }

    /// Build a volume from values in logical `(x, y, z, ...)` order. Trailing
    /// axes of length one are dropped.
    fn to_volume<T: Sample>(
        shape: Vec<usize>,
        values: Vec<T>,
        affine: Affine,
    ) -> Result<Volume<T>, NiftiLoaderError> {
        let spatial = if shape.len() > 3 && shape[3..].iter().all(|&n| n == 1) {
            &shape[..3]
        } else {
            &shape[..]
        };
        let data = ArrayD::from_shape_vec(IxDyn(spatial), values).map_err(|_| {
            ResliceError::InvalidShape {
                expected: "3D volume",
                found: shape.clone(),
            }
        })?;
        Ok(Volume::from_dyn(data, affine.to_array().view())?)
    }
}

/// Voxel to scanner affine of a NIfTI header.
///
/// The sform is used when `sform_code > 0`, then the quaternion qform when
/// `qform_code > 0`. Otherwise the volume is centred on the origin with the
/// x axis flipped.
pub fn header_affine(header: &NiftiHeader) -> Affine {
    if header.sform_code > 0 {
        let rows = [header.srow_x, header.srow_y, header.srow_z];
        return Affine::new(Matrix4::from_fn(|r, c| match r {
            3 => f64::from(u8::from(c == 3)),
            _ => f64::from(rows[r][c]),
        }));
    }

    let zooms = Vector3::new(
        f64::from(header.pixdim[1]),
        f64::from(header.pixdim[2]),
        f64::from(header.pixdim[3]),
    );
    if header.qform_code > 0 {
        let (b, c, d) = (
            f64::from(header.quatern_b),
            f64::from(header.quatern_c),
            f64::from(header.quatern_d),
        );
        let a = (1.0 - (b * b + c * c + d * d)).max(0.0).sqrt();
        let rotation = UnitQuaternion::new_normalize(Quaternion::new(a, b, c, d));
        let qfac = if header.pixdim[0] < 0.0 { -1.0 } else { 1.0 };
        let scaling = Vector3::new(zooms.x, zooms.y, zooms.z * qfac);
        let mut matrix = rotation.to_homogeneous() * Matrix4::new_nonuniform_scaling(&scaling);
        matrix[(0, 3)] = f64::from(header.quatern_x);
        matrix[(1, 3)] = f64::from(header.quatern_y);
        matrix[(2, 3)] = f64::from(header.quatern_z);
        return Affine::new(matrix);
    }

    warn!("NIfTI header has no sform or qform, centring the volume");
    let dims = [header.dim[1], header.dim[2], header.dim[3]];
    let signs = [-1.0, 1.0, 1.0];
    let mut matrix = Matrix4::identity();
    for axis in 0..3 {
        let zoom = zooms[axis] * signs[axis];
        let centre = (f64::from(dims[axis].max(1)) - 1.0) / 2.0;
        matrix[(axis, axis)] = zoom;
        matrix[(axis, 3)] = -centre * zoom;
    }
    Affine::new(matrix)
}
