//! Pixel validity
//!
//! A pixel is valid when no band holds the cube's no-data sentinel (NaN is
//! treated the same way) and its band sum is nonzero. Invalid pixels never
//! reach the normalizer or the model and score exactly 0.

use ndarray::{Array2, ArrayView1, ArrayView2, Axis};

use anomap_core::{Error, Result, SpectralCube};

/// One flag per pixel, in row-major order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidityMask {
    flags: Vec<bool>,
    rows: usize,
    cols: usize,
}

impl ValidityMask {
    /// Evaluate every pixel of a cube
    pub fn from_cube(cube: &SpectralCube) -> Result<Self> {
        let (rows, cols) = cube.spatial_shape();
        let pixels = cube.pixel_matrix()?;
        let flags = pixels
            .outer_iter()
            .map(|spectrum| is_valid_spectrum(spectrum, |v| cube.is_nodata(v)))
            .collect();
        Ok(Self { flags, rows, cols })
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    pub fn len(&self) -> usize {
        self.flags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flags.is_empty()
    }

    /// Flag for flat pixel index `i`
    pub fn is_valid(&self, i: usize) -> bool {
        self.flags.get(i).copied().unwrap_or(false)
    }

    /// Flag at (row, col)
    pub fn get(&self, row: usize, col: usize) -> bool {
        row < self.rows && col < self.cols && self.flags[row * self.cols + col]
    }

    /// Number of valid pixels
    pub fn count(&self) -> usize {
        self.flags.iter().filter(|&&v| v).count()
    }

    pub fn as_slice(&self) -> &[bool] {
        &self.flags
    }

    /// Flat indices of valid pixels, ascending
    pub fn valid_indices(&self) -> Vec<usize> {
        self.flags
            .iter()
            .enumerate()
            .filter_map(|(i, &v)| v.then_some(i))
            .collect()
    }
}

/// Whether one spectrum is usable for fitting and scoring
pub fn is_valid_spectrum(spectrum: ArrayView1<'_, f32>, is_nodata: impl Fn(f64) -> bool) -> bool {
    let mut sum = 0.0f64;
    for &v in spectrum.iter() {
        let v = f64::from(v);
        if is_nodata(v) {
            return false;
        }
        sum += v;
    }
    sum != 0.0
}

/// Gather the rows of `pixels` flagged valid into a new `(n_valid, bands)` matrix
pub fn valid_pixels(pixels: ArrayView2<'_, f32>, mask: &ValidityMask) -> Result<Array2<f32>> {
    if pixels.nrows() != mask.len() {
        return Err(Error::InvalidDimensions {
            width: mask.cols,
            height: pixels.nrows() / mask.cols.max(1),
        });
    }
    Ok(pixels.select(Axis(0), &mask.valid_indices()))
}
