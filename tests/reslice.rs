use std::collections::BTreeSet;

use approx::assert_relative_eq;
use nalgebra::{Matrix4, Rotation3, Vector3};
use ndarray::{Array3, Axis};
use rayon::prelude::*;
use segviz_reslice::{
    Affine, BoundingBox, Interpolation, ResliceError, View, Volume, bounding_box::corners, reslice,
};

fn oblique_affines() -> Vec<Affine> {
    let scaling = Matrix4::new_nonuniform_scaling(&Vector3::new(0.9, 1.3, 2.5));
    let shift = Matrix4::new_translation(&Vector3::new(-40.0, 12.5, 3.0));
    [(0.0, 0.0, 0.0), (0.3, -0.2, 0.1), (1.2, 0.4, -0.7)]
        .into_iter()
        .map(|(roll, pitch, yaw)| {
            let rotation = Rotation3::from_euler_angles(roll, pitch, yaw).to_homogeneous();
            Affine::new(shift * rotation * scaling)
        })
        .collect()
}

fn intensity_volume(affine: Affine) -> Volume<f32> {
    let data = Array3::from_shape_fn((7, 5, 4), |(x, y, z)| {
        (x as f32 * 1.5 + y as f32 * 0.25 - z as f32).sin() * 100.0 + 200.0
    });
    Volume::new(data, affine)
}

fn label_volume(affine: Affine) -> Volume<u32> {
    let data = Array3::from_shape_fn((7, 5, 4), |(x, y, z)| match (x + y + z) % 4 {
        0 => 0,
        1 => 3,
        2 => 7,
        _ => 12,
    });
    Volume::new(data, affine)
}

#[test]
fn intensity_and_label_outputs_share_shape() {
    for affine in oblique_affines() {
        let image = intensity_volume(affine);
        let labels = label_volume(affine);
        for view in View::ALL {
            let a = reslice(&image, view, Interpolation::Linear).unwrap();
            let b = reslice(&labels, view, Interpolation::Nearest).unwrap();
            assert_eq!(a.shape(), b.shape(), "{view}");
            assert_eq!(a.bounding_box(), b.bounding_box());
        }
    }
}

#[test]
fn reslice_is_deterministic() {
    let volume = intensity_volume(oblique_affines()[2]);
    for view in View::ALL {
        for order in [Interpolation::Nearest, Interpolation::Linear] {
            let first = reslice(&volume, view, order).unwrap();
            let second = reslice(&volume, view, order).unwrap();
            let first_bits: Vec<u32> = first.data().iter().map(|v| v.to_bits()).collect();
            let second_bits: Vec<u32> = second.data().iter().map(|v| v.to_bits()).collect();
            assert_eq!(first_bits, second_bits);
        }
    }
}

#[test]
fn bounding_box_covers_every_transformed_corner() {
    let shape = (7, 5, 4);
    for affine in oblique_affines() {
        for view in View::ALL {
            let view_affine = view.resolve(&affine);
            let bbox = BoundingBox::from_affine(shape, &view_affine);
            let transformed = view_affine.apply(corners(shape).view()).unwrap();
            for point in transformed.axis_iter(Axis(0)) {
                assert!(bbox.contains([point[0], point[1], point[2]], 1e-9));
            }
        }
    }
}

#[test]
fn view_matrices_preserve_singular_values() {
    for affine in oblique_affines() {
        let expected = affine.singular_values();
        for view in View::ALL {
            let values = view.resolve(&affine).singular_values();
            for axis in 0..3 {
                assert_relative_eq!(values[axis], expected[axis], epsilon = 1e-9);
            }
        }
    }
}

#[test]
fn nearest_labels_stay_integral() {
    for affine in oblique_affines() {
        let labels = label_volume(affine);
        let mut allowed: BTreeSet<u32> = labels.data().iter().copied().collect();
        allowed.insert(0);
        for view in View::ALL {
            let result = reslice(&labels, view, Interpolation::Nearest).unwrap();
            assert!(result.data().iter().all(|label| allowed.contains(label)));
        }
    }
}

#[test]
fn two_voxel_cube_axial_scenario() {
    let data = Array3::from_shape_fn((2, 2, 2), |(x, y, z)| (x + 2 * y + 4 * z) as u16);
    let volume = Volume::new(data, Affine::identity());
    let result = reslice(&volume, View::Axial, Interpolation::Nearest).unwrap();
    assert_eq!(result.shape(), (2, 2, 2));

    // output (0, 0, 0) maps back to source (1, 1, 0)
    let value = result.data()[[0, 0, 0]];
    assert_eq!(value, 3);
    assert!(volume.data().iter().any(|v| *v == value));
}

#[test]
fn singular_affine_is_rejected() {
    let affine = Affine::from_rows([
        [1.0, 0.0, 0.0, 0.0],
        [0.0, 1.0, 0.0, 0.0],
        [0.0, 0.0, 0.0, 0.0],
        [0.0, 0.0, 0.0, 1.0],
    ]);
    let volume = intensity_volume(affine);
    for view in View::ALL {
        let err = reslice(&volume, view, Interpolation::Linear).unwrap_err();
        assert!(matches!(err, ResliceError::SingularMatrix { .. }));
    }
}

#[test]
fn views_can_be_resliced_concurrently() {
    let volume = intensity_volume(oblique_affines()[1]);
    let parallel: Vec<_> = View::ALL
        .par_iter()
        .map(|&view| reslice(&volume, view, Interpolation::Linear).unwrap())
        .collect();
    for (view, result) in View::ALL.into_iter().zip(parallel) {
        let sequential = reslice(&volume, view, Interpolation::Linear).unwrap();
        assert_eq!(result.data(), sequential.data());
    }
}

#[test]
fn linear_reslice_of_constant_volume_stays_bounded() {
    let data = Array3::<f32>::from_elem((6, 6, 6), 50.0);
    let volume = Volume::new(data, oblique_affines()[2]);
    for view in View::ALL {
        let result = reslice(&volume, view, Interpolation::Linear).unwrap();
        assert!(result.data().iter().all(|v| (0.0..=50.0001).contains(v)));
        // the centre of the volume is always fully inside the source
        let (x, y, z) = result.shape();
        let centre = result.data()[[x / 2, y / 2, z / 2]];
        assert_relative_eq!(centre, 50.0, epsilon = 1e-3);
    }
}
