use crate::{affine::Affine, enums::SortBy, volume::Volume};

use dicom::{
    object::{FileDicomObject, InMemDicomObject, open_file},
    pixeldata::{ConvertOptions, PixelDecoder, VoiLutOption},
};
use dicom_dictionary_std::tags;
use nalgebra::{Matrix4, Vector3};
use ndarray::{Array2, Array3, s};
use std::{fs, path::Path};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum VolumeLoaderError {
    #[error("No valid DICOM images found")]
    NoValidImages,

    #[error("Inconsistent image dimensions")]
    InconsistentDimensions,

    #[error("Missing spacing information")]
    MissingSpacing,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("DICOM error: {0}")]
    Dicom(#[from] dicom::object::ReadError),
}

struct DicomSlice {
    order: Option<f32>,
    position: Option<Vector3<f64>>,
    image: Array2<u16>,
}

/// Direction cosines and pixel spacing shared by every slice of a series.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SliceGeometry {
    /// Direction of increasing column index.
    pub row_direction: Vector3<f64>,
    /// Direction of increasing row index.
    pub column_direction: Vector3<f64>,
    /// Distance between adjacent rows.
    pub row_spacing: f64,
    /// Distance between adjacent columns.
    pub column_spacing: f64,
    pub slice_thickness: Option<f64>,
}

impl SliceGeometry {
    /// Voxel `(column, row, slice)` to scanner affine.
    ///
    /// DICOM patient coordinates (LPS) are converted to the base convention
    /// by negating x and y.
    pub fn affine(&self, first: Vector3<f64>, last: Vector3<f64>, num_slices: usize) -> Affine {
        let slice_step = if num_slices > 1 {
            (last - first) / (num_slices - 1) as f64
        } else {
            self.row_direction.cross(&self.column_direction) * self.slice_thickness.unwrap_or(1.0)
        };
        let i = self.row_direction * self.column_spacing;
        let j = self.column_direction * self.row_spacing;

        #[rustfmt::skip]
        let lps = Matrix4::new(
            i.x, j.x, slice_step.x, first.x,
            i.y, j.y, slice_step.y, first.y,
            i.z, j.z, slice_step.z, first.z,
            0.0, 0.0, 0.0,          1.0,
        );
        let lps_to_ras = Matrix4::from_diagonal(&nalgebra::Vector4::new(-1.0, -1.0, 1.0, 1.0));
        Affine::new(lps_to_ras * lps)
    }
}

pub struct VolumeLoader;

impl VolumeLoader {
    /// Load a volume from DICOM objects
    ///
    /// The voxel array is laid out as `(column, row, slice)` and the affine
    /// maps it into scanner space.
    ///
    /// # Arguments
    ///
    /// * `dicom_objects` - Slice of DICOM file objects
    /// * `sort_by` - Method to sort the slices
    ///
    /// # Errors
    ///
    /// Returns error if no valid images found or dimensions are inconsistent
    pub fn load_from_dicom_objects(
        dicom_objects: &[FileDicomObject<InMemDicomObject>],
        sort_by: SortBy,
    ) -> Result<Volume<u16>, VolumeLoaderError> {
        let mut slices: Vec<_> = dicom_objects
            .iter()
            .filter_map(|dicom_object| Self::extract_slice(dicom_object, &sort_by))
            .collect();

        if slices.is_empty() {
            return Err(VolumeLoaderError::NoValidImages);
        }

        Self::sort_slices(&mut slices, sort_by);
        Self::validate_dimensions(&slices)?;

        let affine = Self::get_affine(dicom_objects, &slices)?;
        let volume = Volume::new(Self::build_volume_array(&slices), affine);
        info!(
            shape = ?volume.dim(),
            spacing = ?volume.spacing(),
            "Loaded DICOM volume"
        );

        Ok(volume)
    }

    /// Load a volume from file paths
    pub fn load_from_file_paths(
        paths: &[impl AsRef<Path>],
        sort_by: SortBy,
    ) -> Result<Volume<u16>, VolumeLoaderError> {
        let objects: Result<Vec<_>, _> =
            paths.iter().map(|path| open_file(path.as_ref())).collect();

        Self::load_from_dicom_objects(&objects?, sort_by)
    }

    /// Load a volume from a directory containing .dcm files
    pub fn load_from_directory(
        path: impl AsRef<Path>,
        sort_by: SortBy,
    ) -> Result<Volume<u16>, VolumeLoaderError> {
        let paths: Vec<_> = fs::read_dir(path.as_ref())?
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| {
                path.extension()
                    .and_then(|s| s.to_str())
                    .is_some_and(|ext| ext.eq_ignore_ascii_case("dcm"))
            })
            .collect();

        if paths.is_empty() {
            return Err(VolumeLoaderError::NoValidImages);
        }

        Self::load_from_file_paths(&paths, sort_by)
    }

    fn extract_slice(
        dicom_object: &FileDicomObject<InMemDicomObject>,
        sort_by: &SortBy,
    ) -> Option<DicomSlice> {
        let order = Self::get_sort_order(dicom_object, sort_by)?;
        let image = Self::decode_image(dicom_object)?;
        let position = Self::get_position(dicom_object);
        Some(DicomSlice {
            order,
            position,
            image,
        })
    }

    fn get_sort_order(
        dicom_object: &FileDicomObject<InMemDicomObject>,
        sort_by: &SortBy,
    ) -> Option<Option<f32>> {
        match sort_by {
            SortBy::ImagePositionPatient => {
                let pos = dicom_object
                    .element(tags::IMAGE_POSITION_PATIENT)
                    .ok()?
                    .to_multi_float32()
                    .ok()?;
                Some(pos.get(2).copied())
            }
            SortBy::TablePosition => {
                let pos = dicom_object
                    .element(tags::TABLE_POSITION)
                    .ok()?
                    .to_float32()
                    .ok();
                Some(pos)
            }
            SortBy::InstanceNumber => {
                let num = dicom_object
                    .element(tags::INSTANCE_NUMBER)
                    .ok()?
                    .to_int::<i32>()
                    .ok()
                    .map(|n| n as f32);
                Some(num)
            }
            SortBy::None => Some(Some(0.0)),
        }
    }

    fn get_position(dicom_object: &FileDicomObject<InMemDicomObject>) -> Option<Vector3<f64>> {
        let pos = dicom_object
            .element(tags::IMAGE_POSITION_PATIENT)
            .ok()?
            .to_multi_float64()
            .ok()?;
        (pos.len() == 3).then(|| Vector3::new(pos[0], pos[1], pos[2]))
    }

    fn decode_image(dicom_object: &FileDicomObject<InMemDicomObject>) -> Option<Array2<u16>> {
        let pixel_data = dicom_object.decode_pixel_data().ok()?;
        let options = ConvertOptions::new().with_voi_lut(VoiLutOption::First);
        pixel_data
            .to_ndarray_with_options::<u16>(&options)
            .ok()
            .map(|arr| arr.slice_move(s![0, .., .., 0]))
    }

    fn sort_slices(slices: &mut [DicomSlice], sort_by: SortBy) {
        if !matches!(sort_by, SortBy::None) {
            slices.sort_by(|a, b| {
                a.order
                    .partial_cmp(&b.order)
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
        }

        if matches!(sort_by, SortBy::ImagePositionPatient) {
            slices.reverse();
        }
    }

    fn validate_dimensions(slices: &[DicomSlice]) -> Result<(), VolumeLoaderError> {
        let first_dim = slices[0].image.dim();
        if slices.iter().any(|slice| slice.image.dim() != first_dim) {
            return Err(VolumeLoaderError::InconsistentDimensions);
        }
        Ok(())
    }

    fn build_volume_array(slices: &[DicomSlice]) -> Array3<u16> {
        let (rows, columns) = slices[0].image.dim();
        let mut volume = Array3::<u16>::zeros((columns, rows, slices.len()));

        for (i, slice) in slices.iter().enumerate() {
            volume.slice_mut(s![.., .., i]).assign(&slice.image.t());
        }

        volume
    }

    fn get_affine(
        dicom_objects: &[FileDicomObject<InMemDicomObject>],
        slices: &[DicomSlice],
    ) -> Result<Affine, VolumeLoaderError> {
        let first = slices.first().and_then(|slice| slice.position);
        let last = slices.last().and_then(|slice| slice.position);
        if let (Some(geometry), Some(first), Some(last)) =
            (Self::get_geometry(dicom_objects), first, last)
        {
            return Ok(geometry.affine(first, last, slices.len()));
        }

        warn!("Missing orientation or position, falling back to a diagonal affine");
        let (row_spacing, column_spacing, slice_thickness) =
            Self::get_spacing(dicom_objects).ok_or(VolumeLoaderError::MissingSpacing)?;
        Ok(Affine::new(Matrix4::new_nonuniform_scaling(&Vector3::new(
            column_spacing as f64,
            row_spacing as f64,
            slice_thickness as f64,
        ))))
    }

    fn get_geometry(dicom_objects: &[FileDicomObject<InMemDicomObject>]) -> Option<SliceGeometry> {
        dicom_objects.iter().find_map(|dicom_object| {
            let orientation = dicom_object
                .element(tags::IMAGE_ORIENTATION_PATIENT)
                .ok()?
                .to_multi_float64()
                .ok()?;
            let pixel_spacing = dicom_object
                .element(tags::PIXEL_SPACING)
                .ok()?
                .to_multi_float64()
                .ok()?;
            if orientation.len() != 6 || pixel_spacing.len() != 2 {
                return None;
            }
            let slice_thickness = dicom_object
                .element(tags::SLICE_THICKNESS)
                .ok()
                .and_then(|e| e.to_float64().ok());

            Some(SliceGeometry {
                row_direction: Vector3::new(orientation[0], orientation[1], orientation[2]),
                column_direction: Vector3::new(orientation[3], orientation[4], orientation[5]),
                row_spacing: pixel_spacing[0],
                column_spacing: pixel_spacing[1],
                slice_thickness,
            })
        })
    }

    fn get_spacing(dicom_objects: &[FileDicomObject<InMemDicomObject>]) -> Option<(f32, f32, f32)> {
        dicom_objects.iter().find_map(|dicom_object| {
            let pixel_spacing = dicom_object
                .element(tags::PIXEL_SPACING)
                .ok()?
                .to_multi_float32()
                .ok()?;

            let slice_thickness = dicom_object
                .element(tags::SLICE_THICKNESS)
                .ok()?
                .to_float32()
                .ok()?;

            Some((*pixel_spacing.first()?, *pixel_spacing.get(1)?, slice_thickness))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn axial_geometry() -> SliceGeometry {
        SliceGeometry {
            row_direction: Vector3::new(1.0, 0.0, 0.0),
            column_direction: Vector3::new(0.0, 1.0, 0.0),
            row_spacing: 0.7,
            column_spacing: 0.5,
            slice_thickness: Some(3.0),
        }
    }

    #[test]
    fn test_axial_series_affine() {
        let first = Vector3::new(-100.0, -120.0, 40.0);
        let last = Vector3::new(-100.0, -120.0, 80.0);
        let affine = axial_geometry().affine(first, last, 21);

        // origin is flipped from LPS into the base convention
        let origin = affine.transform_point([0.0, 0.0, 0.0]);
        assert_relative_eq!(origin[0], 100.0);
        assert_relative_eq!(origin[1], 120.0);
        assert_relative_eq!(origin[2], 40.0);

        let corner = affine.transform_point([2.0, 10.0, 20.0]);
        assert_relative_eq!(corner[0], 100.0 - 1.0);
        assert_relative_eq!(corner[1], 120.0 - 7.0);
        assert_relative_eq!(corner[2], 80.0);
    }

    #[test]
    fn test_single_slice_uses_thickness() {
        let position = Vector3::new(0.0, 0.0, 0.0);
        let affine = axial_geometry().affine(position, position, 1);
        let singular_values = affine.singular_values();
        assert_relative_eq!(singular_values[0], 3.0, epsilon = 1e-12);
        assert!(affine.invert().is_ok());
    }

    #[test]
    fn test_build_volume_array_layout() {
        let image = Array2::from_shape_fn((2, 3), |(row, col)| (row * 10 + col) as u16);
        let slices = vec![
            DicomSlice {
                order: Some(0.0),
                position: None,
                image: image.clone(),
            },
            DicomSlice {
                order: Some(1.0),
                position: None,
                image: image + 100,
            },
        ];
        let volume = VolumeLoader::build_volume_array(&slices);
        assert_eq!(volume.dim(), (3, 2, 2));
        assert_eq!(volume[[2, 1, 0]], 12);
        assert_eq!(volume[[2, 1, 1]], 112);
    }

    #[test]
    fn test_sort_by_position_descends() {
        let make = |order: f32| DicomSlice {
            order: Some(order),
            position: None,
            image: Array2::zeros((1, 1)),
        };
        let mut slices = vec![make(2.0), make(-1.0), make(5.0)];
        VolumeLoader::sort_slices(&mut slices, SortBy::ImagePositionPatient);
        let orders: Vec<_> = slices.iter().map(|s| s.order).collect();
        assert_eq!(orders, vec![Some(5.0), Some(2.0), Some(-1.0)]);
    }
}
