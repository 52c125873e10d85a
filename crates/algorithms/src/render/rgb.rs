//! True-colour composites
//!
//! Red, green and blue come from the bands nearest 650, 550 and 450 nm (or
//! fixed indices without wavelength metadata). No-data samples are zeroed,
//! then all three channels share one 2-98 percentile stretch.

use ndarray::{Array3, ArrayView3};
use serde::{Deserialize, Serialize};

use super::stretch::stretch_to_u8;
use crate::imagery::select_band;
use anomap_core::{Algorithm, Error, RasterElement, Result, SpectralCube};

/// Parameters for [`compose_rgb`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RgbParams {
    /// Target wavelengths in nm, red/green/blue. Default: 650, 550, 450
    pub wavelengths_nm: [f64; 3],
    /// Band indices without wavelength metadata, red/green/blue. Default: 40, 25, 15
    pub default_bands: [usize; 3],
    /// Default: 2
    pub low_percentile: f64,
    /// Default: 98
    pub high_percentile: f64,
}

impl Default for RgbParams {
    fn default() -> Self {
        Self {
            wavelengths_nm: [650.0, 550.0, 450.0],
            default_bands: [40, 25, 15],
            low_percentile: 2.0,
            high_percentile: 98.0,
        }
    }
}

/// 8-bit RGB image, shape `(rows, cols, 3)`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RgbImage {
    data: Array3<u8>,
    bands: [usize; 3],
}

impl RgbImage {
    pub fn rows(&self) -> usize {
        self.data.dim().0
    }

    pub fn cols(&self) -> usize {
        self.data.dim().1
    }

    pub fn data(&self) -> ArrayView3<'_, u8> {
        self.data.view()
    }

    /// Cube band indices used for red, green, blue
    pub fn band_indices(&self) -> [usize; 3] {
        self.bands
    }

    /// Interleaved `RGBRGB...` bytes in row-major order
    pub fn into_raw(self) -> Vec<u8> {
        self.data.into_raw_vec_and_offset().0
    }
}

/// Build a stretched RGB composite from a cube
pub fn compose_rgb(cube: &SpectralCube, params: &RgbParams) -> Result<RgbImage> {
    let mut bands = [0usize; 3];
    for (slot, (&nm, &default)) in bands
        .iter_mut()
        .zip(params.wavelengths_nm.iter().zip(&params.default_bands))
    {
        *slot = select_band(cube, nm, default)?;
    }
    tracing::debug!("RGB bands: {:?}", bands);

    let (rows, cols) = cube.spatial_shape();
    let data = cube.data();
    let nodata = Some(cube.nodata());

    let mut samples = Vec::with_capacity(rows * cols * 3);
    for r in 0..rows {
        for c in 0..cols {
            for &b in &bands {
                let v = f64::from(data[(r, c, b)]);
                samples.push(if v.is_nodata(nodata) { 0.0 } else { v });
            }
        }
    }

    let bytes = stretch_to_u8(&samples, params.low_percentile, params.high_percentile);
    let data = Array3::from_shape_vec((rows, cols, 3), bytes).map_err(|e| Error::Other(e.to_string()))?;
    Ok(RgbImage { data, bands })
}

/// RGB compositing as an [`Algorithm`]
#[derive(Debug, Clone, Default)]
pub struct RgbComposite;

impl Algorithm for RgbComposite {
    type Input = SpectralCube;
    type Output = RgbImage;
    type Params = RgbParams;
    type Error = Error;

    fn name(&self) -> &'static str {
        "RgbComposite"
    }

    fn description(&self) -> &'static str {
        "Percentile-stretched true-colour composite from the bands nearest 650/550/450 nm"
    }

    fn execute(&self, input: Self::Input, params: Self::Params) -> Result<Self::Output> {
        compose_rgb(&input, &params)
    }
}
