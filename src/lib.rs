//! # segviz-reslice
//!
//! This crate reslices medical volumes and their segmentations into the
//! three canonical radiological views so they can be paged through slice by
//! slice:
//!  - Axial
//!  - Coronal
//!  - Sagittal
//!
//! A [`Volume`] pairs a 3D voxel array with the 4x4 affine mapping voxel
//! indices into scanner space. Reslicing composes that affine with a fixed
//! view reorientation, finds the bounding box of the transformed volume and
//! resamples the source onto a unit grid covering it. Intensity volumes use
//! linear interpolation, label volumes nearest neighbour; for the same shape
//! and affine both produce outputs of identical shape. Output voxels are
//! computed in parallel using rayon.
//!
//! On top of the engine the [`renderer`] module keeps an explicit cache of
//! resliced views and composites colored labels over grayscale slices, and
//! the [`volume_loader`] and [`nifti_loader`] modules read a DICOM series or
//! a NIfTI file into a [`Volume`].
//!
//! # Examples
//!
//! ## Reslicing a DICOM series
//!
//! Read all DICOM files from the dicom/ directory, reslice them into the
//! coronal view and save the middle slice.
//!
//! ```no_run
//! # use segviz_reslice::{Interpolation, SortBy, View, VolumeLoader};
//! # use image::GrayImage;
//! let volume = VolumeLoader::load_from_directory("dicom", SortBy::ImagePositionPatient)
//!     .expect("should have loaded files from directory");
//! let coronal = volume
//!     .reslice(View::Coronal, Interpolation::Linear)
//!     .expect("should have resliced the volume");
//! let plane = coronal
//!     .slice(coronal.num_slices() / 2)
//!     .expect("should have a slice at the center of the volume");
//! let (width, height) = plane.dim();
//! let image = GrayImage::from_fn(width as u32, height as u32, |x, y| {
//!     image::Luma([(plane[[x as usize, y as usize]] >> 8) as u8])
//! });
//! image.save("result.png").expect("should have saved the slice");
//! ```
//!
//! ## Overlaying a segmentation
//!
//! ```no_run
//! # use segviz_reslice::{AffineMode, Colormap, ImagePairRenderer, NiftiLoader, RenderOptions, View};
//! let image = NiftiLoader::load_image("image.nii.gz", AffineMode::Header)
//!     .expect("should have loaded the image");
//! let labels = NiftiLoader::load_labels("labels.nii.gz", AffineMode::Header)
//!     .expect("should have loaded the labels");
//! let mut renderer =
//!     ImagePairRenderer::new(image, labels, Colormap::default_tab10(), RenderOptions::default())
//!         .expect("labels should match the image");
//! renderer.automatic_rescale();
//! let sagittal = renderer
//!     .get_slice(View::Sagittal, 40)
//!     .expect("should have rendered the slice");
//! sagittal.save("sagittal.png").expect("should have saved the slice");
//! ```

pub mod affine;
pub mod bounding_box;
pub mod colors;
pub mod enums;
pub mod error;
mod interpolator;
pub mod nifti_loader;
pub mod renderer;
pub mod reslicer;
pub mod view;
pub mod volume;
pub mod volume_loader;

pub use affine::Affine;
pub use bounding_box::BoundingBox;
pub use colors::{ColorRange, Colormap};
pub use enums::{Interpolation, SortBy, View};
pub use nifti_loader::{AffineMode, NiftiLoader};
pub use error::{ResliceError, Result};
pub use renderer::{ImagePairRenderer, ImageRenderer, RenderOptions, ViewCache};
pub use reslicer::{ResliceResult, Reslicer, reslice};
pub use volume::{Sample, Volume};
pub use volume_loader::VolumeLoader;
