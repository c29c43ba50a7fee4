//! Resampling a volume onto the regular grid of a canonical view.

use ndarray::{Array3, ArrayView2, ArrayView3, Axis, Zip};
use tracing::debug;
use web_time::Instant;

use crate::affine::Affine;
use crate::bounding_box::BoundingBox;
use crate::enums::{Interpolation, View};
use crate::error::Result;
use crate::volume::{Sample, Volume};

/// A freshly allocated resliced volume.
///
/// The third axis is the slicing axis of the view.
#[derive(Debug, Clone)]
pub struct ResliceResult<T> {
    data: Array3<T>,
    view: Option<View>,
    interpolation: Interpolation,
    bounding_box: BoundingBox,
}

impl<T: Sample> ResliceResult<T> {
    pub fn shape(&self) -> (usize, usize, usize) {
        self.data.dim()
    }

    pub fn num_slices(&self) -> usize {
        self.data.len_of(Axis(2))
    }

    /// 2D plane at `index` along the third axis, or `None` if out of range.
    pub fn slice(&self, index: usize) -> Option<ArrayView2<'_, T>> {
        (index < self.num_slices()).then(|| self.data.index_axis(Axis(2), index))
    }

    /// `None` when resliced into the base convention or a custom affine.
    pub fn view(&self) -> Option<View> {
        self.view
    }

    pub fn interpolation(&self) -> Interpolation {
        self.interpolation
    }

    /// Target-space box the output grid covers; voxel `(0, 0, 0)` sits at
    /// `bounding_box().min`.
    pub fn bounding_box(&self) -> &BoundingBox {
        &self.bounding_box
    }

    pub fn data(&self) -> &Array3<T> {
        &self.data
    }

    pub fn into_data(self) -> Array3<T> {
        self.data
    }

    /// Indices of slices holding at least one non-fill voxel, as a half-open
    /// range.
    pub fn occupied_slices(&self) -> Option<std::ops::Range<usize>> {
        let occupied: Vec<usize> = self
            .data
            .axis_iter(Axis(2))
            .enumerate()
            .filter(|(_, plane)| plane.iter().any(|v| *v != T::default()))
            .map(|(index, _)| index)
            .collect();
        Some(*occupied.first()?..*occupied.last()? + 1)
    }
}

/// Reslices one volume with a fixed interpolation order.
pub struct Reslicer<'a, T> {
    volume: &'a Volume<T>,
    interpolation: Interpolation,
}

impl<'a, T: Sample> Reslicer<'a, T> {
    pub fn new(volume: &'a Volume<T>, interpolation: Interpolation) -> Self {
        Self {
            volume,
            interpolation,
        }
    }

    pub fn to_view(&self, view: View) -> Result<ResliceResult<T>> {
        let affine = view.resolve(self.volume.affine());
        self.run(&affine, Some(view))
    }

    /// Resample into the base scanner convention without reorientation.
    pub fn to_base(&self) -> Result<ResliceResult<T>> {
        self.run(self.volume.affine(), None)
    }

    /// Resample with an arbitrary source voxel to target space affine.
    pub fn reslice_with(&self, affine: &Affine) -> Result<ResliceResult<T>> {
        self.run(affine, None)
    }

    fn run(&self, affine: &Affine, view: Option<View>) -> Result<ResliceResult<T>> {
        let start = Instant::now();
        let bounding_box = BoundingBox::from_affine(self.volume.dim(), affine);
        let data = resample(
            self.volume.data().view(),
            affine,
            &bounding_box,
            self.interpolation,
        )?;
        debug!(
            view = ?view,
            interpolation = ?self.interpolation,
            source_shape = ?self.volume.dim(),
            output_shape = ?data.dim(),
            elapsed = ?start.elapsed(),
            "Resliced volume"
        );
        Ok(ResliceResult {
            data,
            view,
            interpolation: self.interpolation,
            bounding_box,
        })
    }
}

/// Reslice `volume` into `view` using its native affine.
///
/// # Errors
///
/// Returns [`crate::ResliceError::SingularMatrix`] if the view affine cannot
/// be inverted.
pub fn reslice<T: Sample>(
    volume: &Volume<T>,
    view: View,
    interpolation: Interpolation,
) -> Result<ResliceResult<T>> {
    Reslicer::new(volume, interpolation).to_view(view)
}

/// Sample `source` on the unit grid covering `bounding_box`.
///
/// `affine` maps source voxels into target space. Output voxel `(i, j, k)`
/// corresponds to target point `bounding_box.min + (i, j, k)`.
///
/// # Errors
///
/// Returns [`crate::ResliceError::SingularMatrix`] before allocating the
/// output if `affine` is not invertible.
pub fn resample<T: Sample>(
    source: ArrayView3<'_, T>,
    affine: &Affine,
    bounding_box: &BoundingBox,
    interpolation: Interpolation,
) -> Result<Array3<T>> {
    let offset = Affine::translation(bounding_box.min);
    let target_to_source = affine.invert()?.compose(&offset);

    let mut output = Array3::<T>::default(bounding_box.grid_shape());
    Zip::indexed(&mut output).par_for_each(|(i, j, k), value| {
        let coord = target_to_source.transform_point([i as f64, j as f64, k as f64]);
        *value = interpolation.sample(&source, coord);
    });
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ResliceError;
    use approx::assert_relative_eq;

    fn ramp_volume() -> Volume<f32> {
        let data = Array3::from_shape_fn((2, 2, 2), |(x, y, z)| (x + 2 * y + 4 * z) as f32);
        Volume::new(data, Affine::identity())
    }

    #[test]
    fn test_base_identity_is_copy() {
        let volume = ramp_volume();
        for order in [Interpolation::Nearest, Interpolation::Linear] {
            let result = Reslicer::new(&volume, order).to_base().unwrap();
            assert_eq!(result.data(), volume.data());
            assert_eq!(result.view(), None);
        }
    }

    #[test]
    fn test_axial_flips_first_two_axes() {
        let volume = ramp_volume();
        let result = reslice(&volume, View::Axial, Interpolation::Nearest).unwrap();
        assert_eq!(result.shape(), (2, 2, 2));
        let data = result.data();
        for ((i, j, k), value) in data.indexed_iter() {
            assert_eq!(*value, volume.data()[[1 - i, 1 - j, k]]);
        }
    }

    #[test]
    fn test_coronal_and_sagittal_permutations() {
        let data = Array3::from_shape_fn((2, 3, 4), |(x, y, z)| (x * 100 + y * 10 + z) as u16);
        let volume = Volume::new(data, Affine::identity());

        let coronal = reslice(&volume, View::Coronal, Interpolation::Nearest).unwrap();
        assert_eq!(coronal.shape(), (2, 4, 3));
        for ((i, j, k), value) in coronal.data().indexed_iter() {
            assert_eq!(*value, volume.data()[[1 - i, 2 - k, 3 - j]]);
        }

        let sagittal = reslice(&volume, View::Sagittal, Interpolation::Nearest).unwrap();
        assert_eq!(sagittal.shape(), (3, 4, 2));
        for ((i, j, k), value) in sagittal.data().indexed_iter() {
            assert_eq!(*value, volume.data()[[1 - k, 2 - i, 3 - j]]);
        }
    }

    #[test]
    fn test_anisotropic_spacing_upsamples() {
        let data = Array3::from_shape_fn((2, 2, 3), |(_, _, z)| z as f32 * 10.0);
        let affine = Affine::from_rows([
            [1.0, 0.0, 0.0, 0.0],
            [0.0, 1.0, 0.0, 0.0],
            [0.0, 0.0, 2.0, 0.0],
            [0.0, 0.0, 0.0, 1.0],
        ]);
        let volume = Volume::new(data, affine);
        let result = reslice(&volume, View::Axial, Interpolation::Linear).unwrap();
        // z spans [0, 4] millimetres
        assert_eq!(result.shape(), (2, 2, 5));
        let column: Vec<f32> = (0..5).map(|k| result.data()[[0, 0, k]]).collect();
        assert_eq!(column, vec![0.0, 5.0, 10.0, 15.0, 20.0]);
    }

    #[test]
    fn test_translation_does_not_change_output() {
        let volume = ramp_volume();
        let mut shifted = volume.clone();
        shifted.affine = Affine::translation([12.5, -3.0, 40.0].into()).compose(volume.affine());
        for view in View::ALL {
            let a = reslice(&volume, view, Interpolation::Linear).unwrap();
            let b = reslice(&shifted, view, Interpolation::Linear).unwrap();
            assert_eq!(a.data(), b.data());
            let shift = b.bounding_box().min - a.bounding_box().min;
            let expected = view.matrix().transform_point([12.5, -3.0, 40.0]);
            for axis in 0..3 {
                assert_relative_eq!(shift[axis], expected[axis], epsilon = 1e-9);
            }
        }
    }

    #[test]
    fn test_singular_affine_rejected() {
        let mut volume = ramp_volume();
        volume.affine = Affine::from_rows([
            [1.0, 0.0, 0.0, 0.0],
            [0.0, 1.0, 0.0, 0.0],
            [0.0, 0.0, 0.0, 0.0],
            [0.0, 0.0, 0.0, 1.0],
        ]);
        let err = reslice(&volume, View::Sagittal, Interpolation::Linear).unwrap_err();
        assert!(matches!(err, ResliceError::SingularMatrix { .. }));
    }

    #[test]
    fn test_slice_access() {
        let volume = ramp_volume();
        let result = reslice(&volume, View::Axial, Interpolation::Nearest).unwrap();
        assert_eq!(result.num_slices(), 2);
        assert_eq!(result.slice(1).unwrap().dim(), (2, 2));
        assert!(result.slice(2).is_none());
    }

    #[test]
    fn test_occupied_slices() {
        let mut data = Array3::<u32>::zeros((3, 3, 6));
        data[[1, 1, 2]] = 4;
        data[[0, 2, 3]] = 1;
        let volume = Volume::new(data, Affine::identity());
        let result = Reslicer::new(&volume, Interpolation::Nearest).to_base().unwrap();
        assert_eq!(result.occupied_slices(), Some(2..4));

        let empty = Volume::new(Array3::<u32>::zeros((2, 2, 2)), Affine::identity());
        let result = Reslicer::new(&empty, Interpolation::Nearest).to_base().unwrap();
        assert_eq!(result.occupied_slices(), None);
    }
}
