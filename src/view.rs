//! Canonical view reorientation.
//!
//! Native affines map voxels into the base scanner convention: x runs
//! left to right, y posterior to anterior, z inferior to superior. Each view
//! re-expresses that convention with a signed axis permutation, so the
//! third axis of the resliced volume is the slicing axis of the view.

use nalgebra::Matrix4;

use crate::affine::Affine;
use crate::enums::View;

impl View {
    /// Reorientation matrix from the base convention into this view.
    pub fn matrix(&self) -> Affine {
        #[rustfmt::skip]
        let m = match self {
            // RAI-
            View::Axial => Matrix4::new(
                -1.0,  0.0, 0.0, 0.0,
                 0.0, -1.0, 0.0, 0.0,
                 0.0,  0.0, 1.0, 0.0,
                 0.0,  0.0, 0.0, 1.0,
            ),
            // RSA-
            View::Coronal => Matrix4::new(
                -1.0,  0.0,  0.0, 0.0,
                 0.0,  0.0, -1.0, 0.0,
                 0.0, -1.0,  0.0, 0.0,
                 0.0,  0.0,  0.0, 1.0,
            ),
            // ASR-
            View::Sagittal => Matrix4::new(
                 0.0, -1.0,  0.0, 0.0,
                 0.0,  0.0, -1.0, 0.0,
                -1.0,  0.0,  0.0, 0.0,
                 0.0,  0.0,  0.0, 1.0,
            ),
        };
        Affine::new(m)
    }

    /// Source voxel to view space: `matrix() · native`.
    pub fn resolve(&self, native: &Affine) -> Affine {
        self.matrix().compose(native)
    }
}
