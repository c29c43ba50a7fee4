//! Slice rendering on top of the reslicing engine.
//!
//! Renderers keep one resliced volume per `(View, Interpolation)` in an
//! explicit [`ViewCache`] and only drop it when the intensity window
//! changes.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::ops::Range;

use image::{GrayImage, ImageBuffer, Luma, Rgba, RgbaImage, imageops};
use ndarray::{Array3, ArrayView2, Zip};
use rayon::prelude::*;
use thiserror::Error;
use tracing::{debug, warn};

use crate::colors::Colormap;
use crate::enums::{Interpolation, View};
use crate::error::ResliceError;
use crate::reslicer::ResliceResult;
use crate::volume::{Sample, Volume};

const MAX_UINT8: f64 = 255.0;
const AFFINE_TOLERANCE: f64 = 1e-4;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error(transparent)]
    Reslice(#[from] ResliceError),

    #[error("Label volume shape {labels:?} does not match image shape {image:?}")]
    ShapeMismatch {
        image: (usize, usize, usize),
        labels: (usize, usize, usize),
    },

    #[error("Label volume affine does not match the image affine")]
    AffineMismatch,

    #[error("The {0} view has no slices")]
    EmptyView(View),
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderOptions {
    /// Opacity applied to label colors, in `[0, 1]`.
    pub alpha: f32,

    /// When non-zero, only label pixels within this many pixels of another
    /// label are drawn.
    pub edge_width: usize,

    /// Quantiles used by [`ImageRenderer::automatic_rescale`].
    pub lower_quantile: f64,
    pub upper_quantile: f64,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            alpha: 1.0,
            edge_width: 0,
            lower_quantile: 0.005,
            upper_quantile: 0.995,
        }
    }
}

/// Most recent reslice per view and interpolation order.
#[derive(Debug, Clone)]
pub struct ViewCache<T> {
    entries: HashMap<(View, Interpolation), ResliceResult<T>>,
}

impl<T> Default for ViewCache<T> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }
}

impl<T: Sample> ViewCache<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, view: View, interpolation: Interpolation) -> Option<&ResliceResult<T>> {
        self.entries.get(&(view, interpolation))
    }

    pub fn get_or_reslice(
        &mut self,
        volume: &Volume<T>,
        view: View,
        interpolation: Interpolation,
    ) -> Result<&ResliceResult<T>, ResliceError> {
        match self.entries.entry((view, interpolation)) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                debug!(%view, ?interpolation, "View cache miss");
                Ok(entry.insert(volume.reslice(view, interpolation)?))
            }
        }
    }

    pub fn invalidate(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Renders grayscale slices of an intensity volume.
pub struct ImageRenderer {
    image: Volume<f32>,
    rescaled: Volume<u8>,
    window: (f64, f64),
    options: RenderOptions,
    cache: ViewCache<u8>,
}

impl ImageRenderer {
    pub fn new(image: Volume<f32>, options: RenderOptions) -> Self {
        let window = image.intensity_range().unwrap_or((0.0, 0.0));
        let rescaled = Self::rescale(&image, window);
        Self {
            image,
            rescaled,
            window,
            options,
            cache: ViewCache::new(),
        }
    }

    pub fn image(&self) -> &Volume<f32> {
        &self.image
    }

    pub fn options(&self) -> &RenderOptions {
        &self.options
    }

    /// Current intensity window `(vmin, vmax)`.
    pub fn window(&self) -> (f64, f64) {
        self.window
    }

    pub fn cache(&self) -> &ViewCache<u8> {
        &self.cache
    }

    /// Map `[vmin, vmax]` linearly onto `[0, 255]`; values outside are
    /// clamped. `None` uses the data minimum or maximum.
    pub fn rescale_intensity(&mut self, vmin: Option<f64>, vmax: Option<f64>) {
        let (data_min, data_max) = self.image.intensity_range().unwrap_or((0.0, 0.0));
        let window = (vmin.unwrap_or(data_min), vmax.unwrap_or(data_max));
        self.apply_window(window);
    }

    /// Window the intensities between the configured quantiles.
    pub fn automatic_rescale(&mut self) {
        let mut values: Vec<f32> = self.image.data().iter().copied().collect();
        if values.is_empty() {
            return;
        }
        values.par_sort_unstable_by(f32::total_cmp);
        let at = |q: f64| {
            let index = (q.clamp(0.0, 1.0) * (values.len() - 1) as f64).round() as usize;
            values[index] as f64
        };
        let window = (at(self.options.lower_quantile), at(self.options.upper_quantile));
        self.apply_window(window);
    }

    fn apply_window(&mut self, window: (f64, f64)) {
        if window == self.window {
            return;
        }
        debug!(vmin = window.0, vmax = window.1, "Rescaling intensity");
        self.window = window;
        self.rescaled = Self::rescale(&self.image, window);
        self.cache.invalidate();
    }

    fn rescale(image: &Volume<f32>, (vmin, vmax): (f64, f64)) -> Volume<u8> {
        let range = vmax - vmin;
        let mut data = Array3::<u8>::zeros(image.dim());
        Zip::from(&mut data)
            .and(image.data())
            .par_for_each(|out, &value| *out = Self::normalize_to_u8(value as f64, vmin, range));
        Volume::new(data, *image.affine())
    }

    #[inline]
    fn normalize_to_u8(value: f64, vmin: f64, range: f64) -> u8 {
        if range <= 0.0 {
            return 0;
        }
        (((value - vmin) / range) * MAX_UINT8).clamp(0.0, MAX_UINT8) as u8
    }

    fn resliced(&mut self, view: View) -> Result<&ResliceResult<u8>, RenderError> {
        Ok(self
            .cache
            .get_or_reslice(&self.rescaled, view, Interpolation::Linear)?)
    }

    pub fn num_slices(&mut self, view: View) -> Result<usize, RenderError> {
        Ok(self.resliced(view)?.num_slices())
    }

    /// `(width, height)` of the slices of `view`.
    pub fn slice_size(&mut self, view: View) -> Result<(u32, u32), RenderError> {
        let (width, height, _) = self.resliced(view)?.shape();
        Ok((width as u32, height as u32))
    }

    pub fn get_slice(&mut self, view: View, index: usize) -> Result<GrayImage, RenderError> {
        let result = self.resliced(view)?;
        let index = trim_slice_index(view, index, result.num_slices())?;
        let plane = result.slice(index).ok_or(RenderError::EmptyView(view))?;
        Ok(plane_to_image(&plane))
    }
}

/// Renders an intensity volume with a co-registered label volume composited
/// on top.
pub struct ImagePairRenderer {
    image: ImageRenderer,
    labels: Volume<u32>,
    label_cache: ViewCache<u32>,
    colormap: Colormap,
}

impl ImagePairRenderer {
    /// The labels are resliced through the image affine, so both views
    /// always share a grid.
    ///
    /// # Errors
    ///
    /// Fails if the label volume's shape or affine differ from the image's.
    pub fn new(
        image: Volume<f32>,
        labels: Volume<u32>,
        colormap: Colormap,
        options: RenderOptions,
    ) -> Result<Self, RenderError> {
        if image.dim() != labels.dim() {
            return Err(RenderError::ShapeMismatch {
                image: image.dim(),
                labels: labels.dim(),
            });
        }
        let max_difference = (image.affine().matrix() - labels.affine().matrix()).amax();
        if max_difference > AFFINE_TOLERANCE {
            return Err(RenderError::AffineMismatch);
        }
        let labels = Volume::new(labels.data, *image.affine());
        Ok(Self {
            image: ImageRenderer::new(image, options),
            labels,
            label_cache: ViewCache::new(),
            colormap,
        })
    }

    pub fn image_renderer(&mut self) -> &mut ImageRenderer {
        &mut self.image
    }

    pub fn labels(&self) -> &Volume<u32> {
        &self.labels
    }

    pub fn colormap(&self) -> &Colormap {
        &self.colormap
    }

    pub fn alpha(&self) -> f32 {
        self.image.options.alpha
    }

    pub fn set_alpha(&mut self, alpha: f32) {
        self.image.options.alpha = alpha.clamp(0.0, 1.0);
    }

    pub fn set_edge_width(&mut self, edge_width: usize) {
        self.image.options.edge_width = edge_width;
    }

    pub fn rescale_intensity(&mut self, vmin: Option<f64>, vmax: Option<f64>) {
        self.image.rescale_intensity(vmin, vmax);
    }

    pub fn automatic_rescale(&mut self) {
        self.image.automatic_rescale();
    }

    pub fn num_slices(&mut self, view: View) -> Result<usize, RenderError> {
        self.image.num_slices(view)
    }

    pub fn slice_size(&mut self, view: View) -> Result<(u32, u32), RenderError> {
        self.image.slice_size(view)
    }

    fn resliced_labels(&mut self, view: View) -> Result<&ResliceResult<u32>, RenderError> {
        Ok(self
            .label_cache
            .get_or_reslice(&self.labels, view, Interpolation::Nearest)?)
    }

    /// Slice range of `view` that contains any non-background label.
    pub fn label_range(&mut self, view: View) -> Result<Option<Range<usize>>, RenderError> {
        Ok(self.resliced_labels(view)?.occupied_slices())
    }

    pub fn get_slice(&mut self, view: View, index: usize) -> Result<RgbaImage, RenderError> {
        let index = trim_slice_index(view, index, self.image.num_slices(view)?)?;
        let gray = self.image.get_slice(view, index)?;
        let alpha = self.image.options.alpha;
        let edge_width = self.image.options.edge_width;

        let labels = self
            .label_cache
            .get_or_reslice(&self.labels, view, Interpolation::Nearest)?;
        let plane = labels.slice(index).ok_or(RenderError::EmptyView(view))?;
        let overlay = colorize_labels(&plane, &self.colormap, alpha, edge_width);

        let mut composite: RgbaImage = ImageBuffer::from_fn(gray.width(), gray.height(), |x, y| {
            let Luma([g]) = *gray.get_pixel(x, y);
            Rgba([g, g, g, u8::MAX])
        });
        imageops::overlay(&mut composite, &overlay, 0, 0);
        Ok(composite)
    }
}

fn trim_slice_index(view: View, index: usize, num_slices: usize) -> Result<usize, RenderError> {
    if num_slices == 0 {
        return Err(RenderError::EmptyView(view));
    }
    if index >= num_slices {
        warn!(%view, index, max = num_slices - 1, "Slice index out of range, trimming");
        return Ok(num_slices - 1);
    }
    Ok(index)
}

/// Image whose x axis runs along the first axis of `plane`.
fn plane_to_image(plane: &ArrayView2<'_, u8>) -> GrayImage {
    let (width, height) = plane.dim();
    ImageBuffer::from_fn(width as u32, height as u32, |x, y| {
        Luma([plane[[x as usize, y as usize]]])
    })
}

fn colorize_labels(
    plane: &ArrayView2<'_, u32>,
    colormap: &Colormap,
    alpha: f32,
    edge_width: usize,
) -> RgbaImage {
    let (width, height) = plane.dim();
    ImageBuffer::from_fn(width as u32, height as u32, |x, y| {
        let (x, y) = (x as usize, y as usize);
        let label = plane[[x, y]];
        if label == 0 || (edge_width > 0 && is_interior(plane, x, y, edge_width)) {
            return Rgba([0, 0, 0, 0]);
        }
        let Rgba([r, g, b, a]) = colormap.color_of(label);
        Rgba([r, g, b, (a as f32 * alpha).round() as u8])
    })
}

/// Whether every pixel within `width` (city-block distance) of `(x, y)` lies
/// inside the plane and carries the same label.
fn is_interior(plane: &ArrayView2<'_, u32>, x: usize, y: usize, width: usize) -> bool {
    let (nx, ny) = plane.dim();
    let label = plane[[x, y]];
    let w = width as isize;
    for ox in -w..=w {
        let reach = w - ox.abs();
        for oy in -reach..=reach {
            let (px, py) = (x as isize + ox, y as isize + oy);
            if px < 0 || py < 0 || px as usize >= nx || py as usize >= ny {
                return false;
            }
            if plane[[px as usize, py as usize]] != label {
                return false;
            }
        }
    }
    true
}

/// Paste a grid of images into one, centring each image in its cell.
///
/// Column widths and row heights are the maxima over the grid.
pub fn concat_images(grid: &[Vec<RgbaImage>], background: Rgba<u8>) -> RgbaImage {
    let num_cols = grid.iter().map(Vec::len).max().unwrap_or(0);
    let mut col_widths = vec![0u32; num_cols];
    let mut row_heights = vec![0u32; grid.len()];
    for (r, row) in grid.iter().enumerate() {
        for (c, image) in row.iter().enumerate() {
            col_widths[c] = col_widths[c].max(image.width());
            row_heights[r] = row_heights[r].max(image.height());
        }
    }

    let mut result = RgbaImage::from_pixel(
        col_widths.iter().sum(),
        row_heights.iter().sum(),
        background,
    );
    let mut y_offset = 0;
    for (row, &row_height) in grid.iter().zip(&row_heights) {
        let mut x_offset = 0;
        for (image, &col_width) in row.iter().zip(&col_widths) {
            let x = x_offset + (col_width - image.width()) / 2;
            let y = y_offset + (row_height - image.height()) / 2;
            imageops::replace(&mut result, image, x as i64, y as i64);
            x_offset += col_width;
        }
        y_offset += row_height;
    }
    result
}
