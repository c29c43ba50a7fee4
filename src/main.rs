use segviz_reslice::{
    enums::{SortBy, View},
    renderer::{ImageRenderer, RenderOptions, concat_images},
    volume_loader::VolumeLoader,
};

use image::{DynamicImage, Rgba};

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let volume = VolumeLoader::load_from_directory("dicom", SortBy::ImagePositionPatient)
        .expect("should have loaded files from directory");
    let intensities = volume.data().mapv(f32::from);
    let mut renderer = ImageRenderer::new(
        segviz_reslice::Volume::new(intensities, *volume.affine()),
        RenderOptions::default(),
    );
    renderer.automatic_rescale();

    let row = View::ALL
        .iter()
        .map(|&view| {
            let center = renderer
                .num_slices(view)
                .expect("should have resliced the volume")
                / 2;
            let slice = renderer
                .get_slice(view, center)
                .expect("should have returned slice at center of volume");
            DynamicImage::ImageLuma8(slice).to_rgba8()
        })
        .collect();
    concat_images(&[row], Rgba([0, 0, 0, 255]))
        .save("result.png")
        .expect("should have saved the image");
}
