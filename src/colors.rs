//! Label colormaps.
//!
//! A colormap is indexed by label value. Row 0 is the background and is
//! always rendered fully transparent.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use image::Rgba;
use ndarray::Array2;
use ndarray_npy::{ReadNpyError, read_npy};
use thiserror::Error;

const MAX_UINT8: f64 = 255.0;
const TRANSPARENT: Rgba<u8> = Rgba([0, 0, 0, 0]);

/// Largest label index accepted from a label description file.
pub const MAX_LABEL_INDEX: usize = u16::MAX as usize;

#[derive(Debug, Error)]
pub enum ColormapError {
    #[error("Colormap file {0} does not exist")]
    NotFound(PathBuf),

    #[error("Unsupported colormap extension: {0}")]
    UnsupportedExtension(PathBuf),

    #[error("Colors should be num_colors x 3 or num_colors x 4, found {rows} x {cols}")]
    InvalidShape { rows: usize, cols: usize },

    #[error("Color value {0} is outside the allowed range")]
    ValueOutOfRange(f64),

    #[error("Malformed label description at line {line}: {content:?}")]
    ParseLine { line: usize, content: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("NPY error: {0}")]
    Npy(#[from] ReadNpyError),
}

/// Value range of colors stored in a `.npy` file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ColorRange {
    /// Components in `[0, 1]`.
    #[default]
    Unit,
    /// Components in `[0, 255]`.
    Byte,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Colormap {
    colors: Vec<Rgba<u8>>,
}

impl Default for Colormap {
    fn default() -> Self {
        Self::default_tab10()
    }
}

impl Colormap {
    pub fn new(colors: Vec<Rgba<u8>>) -> Self {
        Self { colors }
    }

    /// Opaque colors from RGB rows.
    pub fn from_rgb(rows: &[[u8; 3]]) -> Self {
        let colors = rows.iter().map(|&[r, g, b]| Rgba([r, g, b, u8::MAX])).collect();
        Self { colors }
    }

    /// Matplotlib's tab10 palette preceded by a black background entry.
    pub fn default_tab10() -> Self {
        Self::from_rgb(&[
            [0, 0, 0],
            [0, 120, 177],
            [255, 126, 42],
            [0, 160, 58],
            [223, 35, 45],
            [153, 103, 185],
            [144, 86, 76],
            [235, 119, 191],
            [127, 127, 127],
            [187, 189, 60],
            [0, 190, 205],
        ])
    }

    pub fn len(&self) -> usize {
        self.colors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }

    pub fn colors(&self) -> &[Rgba<u8>] {
        &self.colors
    }

    /// Color of `label`. Background and labels without an entry are
    /// transparent.
    #[inline]
    pub fn color_of(&self, label: u32) -> Rgba<u8> {
        if label == 0 {
            return TRANSPARENT;
        }
        self.colors
            .get(label as usize)
            .copied()
            .unwrap_or(TRANSPARENT)
    }

    /// Spread colors `1..` over the distinct non-zero `labels`, cycling when
    /// there are more labels than colors.
    ///
    /// For colors `[c0, c1, c2]` and labels `{0, 2, 5}`, row 2 becomes `c1`,
    /// row 5 becomes `c2` and every other row is blank.
    pub fn reindex(&self, labels: impl IntoIterator<Item = u32>) -> Self {
        let label_set: BTreeSet<u32> = labels.into_iter().filter(|&l| l != 0).collect();
        let Some(&max_label) = label_set.last() else {
            return Self::new(vec![TRANSPARENT]);
        };
        let mut colors = vec![TRANSPARENT; max_label as usize + 1];
        let num_colors = self.colors.len().saturating_sub(1);
        if num_colors == 0 {
            return Self::new(colors);
        }
        for (i, label) in label_set.into_iter().enumerate() {
            colors[label as usize] = self.colors[i % num_colors + 1];
        }
        Self::new(colors)
    }

    /// Load colors from an ITK-SNAP label description (`.txt`) or a NumPy
    /// array (`.npy`).
    ///
    /// Only the IDX, R, G, B and A fields of a `.txt` file are read; A is in
    /// `[0, 1]`. Indices missing from the file get a blank color.
    pub fn load(path: impl AsRef<Path>, range: ColorRange) -> Result<Self, ColormapError> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(ColormapError::NotFound(path.to_path_buf()));
        }
        match path.extension().and_then(|s| s.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("txt") => {
                Self::parse_label_description(&fs::read_to_string(path)?)
            }
            Some(ext) if ext.eq_ignore_ascii_case("npy") => {
                Self::from_array(&Self::read_colors_npy(path)?, range)
            }
            _ => Err(ColormapError::UnsupportedExtension(path.to_path_buf())),
        }
    }

    /// Read an `.npy` color table stored as `f64`, `f32`, `u8` or `i64`.
    fn read_colors_npy(path: &Path) -> Result<Array2<f64>, ColormapError> {
        match read_npy::<_, Array2<f64>>(path) {
            Err(ReadNpyError::WrongDescriptor(_)) => {}
            other => return Ok(other?),
        }
        match read_npy::<_, Array2<f32>>(path) {
            Err(ReadNpyError::WrongDescriptor(_)) => {}
            other => return Ok(other?.mapv(f64::from)),
        }
        match read_npy::<_, Array2<u8>>(path) {
            Err(ReadNpyError::WrongDescriptor(_)) => {}
            other => return Ok(other?.mapv(f64::from)),
        }
        Ok(read_npy::<_, Array2<i64>>(path)?.mapv(|v| v as f64))
    }

    pub fn from_array(array: &Array2<f64>, range: ColorRange) -> Result<Self, ColormapError> {
        let (rows, cols) = array.dim();
        if cols != 3 && cols != 4 {
            return Err(ColormapError::InvalidShape { rows, cols });
        }
        let scale = match range {
            ColorRange::Unit => MAX_UINT8,
            ColorRange::Byte => 1.0,
        };
        let mut colors = Vec::with_capacity(rows);
        for row in array.rows() {
            let mut rgba = [u8::MAX; 4];
            for (c, &value) in row.iter().enumerate() {
                let scaled = value * scale;
                if !(0.0..=MAX_UINT8).contains(&scaled) {
                    return Err(ColormapError::ValueOutOfRange(value));
                }
                rgba[c] = scaled as u8;
            }
            colors.push(Rgba(rgba));
        }
        Ok(Self::new(colors))
    }

    fn parse_label_description(contents: &str) -> Result<Self, ColormapError> {
        let mut entries = Vec::new();
        for (line_number, line) in contents.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let parse_error = || ColormapError::ParseLine {
                line: line_number + 1,
                content: line.to_owned(),
            };
            let fields: Vec<f64> = line
                .split_whitespace()
                .take(5)
                .map(str::parse::<f64>)
                .collect::<Result<_, _>>()
                .map_err(|_| parse_error())?;
            let [idx, r, g, b, a] = fields[..] else {
                return Err(parse_error());
            };
            if !(0.0..=MAX_LABEL_INDEX as f64).contains(&idx) {
                return Err(parse_error());
            }
            let rgba = Rgba([r as u8, g as u8, b as u8, (a * MAX_UINT8) as u8]);
            entries.push((idx as usize, rgba));
        }

        let len = entries.iter().map(|(idx, _)| idx + 1).max().unwrap_or(0);
        let mut colors = vec![TRANSPARENT; len];
        for (idx, rgba) in entries {
            colors[idx] = rgba;
        }
        Ok(Self::new(colors))
    }
}
