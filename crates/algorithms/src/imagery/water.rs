//! Water masking from NDWI
//!
//! Water pixels are those whose NDWI exceeds [`NDWI_WATER_THRESHOLD`].
//! Undefined NDWI (zero band sum, nodata) is never water.

use ndarray::{Array2, ArrayView2};
use serde::{Deserialize, Serialize};

use super::bands::select_band;
use super::indices::ndwi;
use anomap_core::{Algorithm, Error, Raster, Result, SpectralCube};

/// NDWI above which a pixel is water
pub const NDWI_WATER_THRESHOLD: f64 = 0.2;

/// Band choice for the water index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaterMaskParams {
    /// Green wavelength in nm. Default: 550
    pub green_nm: f64,
    /// Near-infrared wavelength in nm. Default: 860
    pub nir_nm: f64,
    /// Green band index without wavelength metadata. Default: 35
    pub default_green: usize,
    /// NIR band index without wavelength metadata. Default: 85
    pub default_nir: usize,
}

impl Default for WaterMaskParams {
    fn default() -> Self {
        Self {
            green_nm: 550.0,
            nir_nm: 860.0,
            default_green: 35,
            default_nir: 85,
        }
    }
}

/// Boolean water flag per pixel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaterMask {
    mask: Array2<bool>,
}

impl WaterMask {
    pub fn from_array(mask: Array2<bool>) -> Self {
        Self { mask }
    }

    /// Threshold an NDWI raster with the fixed water threshold
    pub fn from_ndwi(index: &Raster<f64>) -> Self {
        water_mask_with_threshold(index, NDWI_WATER_THRESHOLD)
    }

    pub fn shape(&self) -> (usize, usize) {
        self.mask.dim()
    }

    /// Whether (row, col) is water; out of bounds is not
    pub fn is_water(&self, row: usize, col: usize) -> bool {
        self.mask.get((row, col)).copied().unwrap_or(false)
    }

    /// Number of water pixels
    pub fn count(&self) -> usize {
        self.mask.iter().filter(|&&w| w).count()
    }

    /// Fraction of pixels flagged as water
    pub fn fraction(&self) -> f64 {
        if self.mask.is_empty() {
            0.0
        } else {
            self.count() as f64 / self.mask.len() as f64
        }
    }

    pub fn view(&self) -> ArrayView2<'_, bool> {
        self.mask.view()
    }
}

/// NDWI for a cube, bands picked by wavelength or by default index
pub fn water_index(cube: &SpectralCube, params: &WaterMaskParams) -> Result<Raster<f64>> {
    let green_idx = select_band(cube, params.green_nm, params.default_green)?;
    let nir_idx = select_band(cube, params.nir_nm, params.default_nir)?;
    tracing::debug!("NDWI bands: green {}, nir {}", green_idx, nir_idx);

    let green = cube.band(green_idx)?;
    let nir = cube.band(nir_idx)?;
    ndwi(&green, &nir)
}

/// Water mask for a cube using the fixed threshold
pub fn water_mask(cube: &SpectralCube, params: &WaterMaskParams) -> Result<WaterMask> {
    let index = water_index(cube, params)?;
    let mask = WaterMask::from_ndwi(&index);
    tracing::info!(
        "Water mask: {} pixels ({:.1}%)",
        mask.count(),
        mask.fraction() * 100.0
    );
    Ok(mask)
}

/// Flag pixels whose index is strictly above `threshold`. NaN is never water.
pub fn water_mask_with_threshold(index: &Raster<f64>, threshold: f64) -> WaterMask {
    WaterMask {
        mask: index.data().mapv(|v| v > threshold),
    }
}

/// Water masking as an [`Algorithm`]
#[derive(Debug, Clone, Default)]
pub struct WaterMasking;

impl Algorithm for WaterMasking {
    type Input = SpectralCube;
    type Output = WaterMask;
    type Params = WaterMaskParams;
    type Error = Error;

    fn name(&self) -> &'static str {
        "WaterMasking"
    }

    fn description(&self) -> &'static str {
        "Flag open water where NDWI exceeds 0.2"
    }

    fn execute(&self, input: Self::Input, params: Self::Params) -> Result<Self::Output> {
        water_mask(&input, &params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;

    /// Bands [green, nir]; left column is water, right column is land
    fn lake_cube() -> SpectralCube {
        let data = Array3::from_shape_fn((3, 2, 2), |(_, c, b)| match (c, b) {
            (0, 0) => 0.30,
            (0, _) => 0.05,
            (_, 0) => 0.10,
            _ => 0.40,
        });
        SpectralCube::new(data).with_wavelengths(vec![550.0, 860.0]).unwrap()
    }

    #[test]
    fn test_water_mask() {
        let mask = water_mask(&lake_cube(), &WaterMaskParams::default()).unwrap();
        assert_eq!(mask.shape(), (3, 2));
        assert_eq!(mask.count(), 3);
        assert!(mask.is_water(1, 0));
        assert!(!mask.is_water(1, 1));
    }

    #[test]
    fn test_threshold_is_strict() {
        let index = Raster::filled(2, 2, NDWI_WATER_THRESHOLD);
        assert_eq!(WaterMask::from_ndwi(&index).count(), 0);
    }

    #[test]
    fn test_nan_is_not_water() {
        let index = Raster::filled(2, 2, f64::NAN);
        assert_eq!(water_mask_with_threshold(&index, -1.0).count(), 0);
    }

    #[test]
    fn test_count_grows_as_threshold_drops() {
        let values: Vec<f64> = (0..100).map(|i| -1.0 + i as f64 * 0.02).collect();
        let index = Raster::from_vec(values, 10, 10).unwrap();

        let mut last = 0;
        for step in 0..=40 {
            let threshold = 1.0 - step as f64 * 0.05;
            let count = water_mask_with_threshold(&index, threshold).count();
            assert!(count >= last);
            last = count;
        }
        assert_eq!(water_mask_with_threshold(&index, -2.0).count(), 100);
    }

    #[test]
    fn test_algorithm_trait() {
        let mask = WaterMasking.execute_default(lake_cube()).unwrap();
        assert_eq!(mask.count(), 3);
    }
}
