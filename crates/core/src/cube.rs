//! Hyperspectral cube type

use std::sync::Arc;

use ndarray::{Array2, Array3, ArrayView2, ArrayView3, Axis};

use crate::crs::CRS;
use crate::error::{Error, Result};
use crate::raster::{GeoTransform, Raster, RasterElement};

/// No-data sentinel used when a header does not declare one.
pub const DEFAULT_NODATA: f64 = -9999.0;

/// An immutable hyperspectral reflectance cube with shape `(rows, cols, bands)`.
///
/// The sample buffer is shared behind an `Arc`, so cloning a cube is cheap and
/// a loaded cube can be handed to several stages (scorer, water masker, RGB
/// compositor) without copying.
#[derive(Debug, Clone)]
pub struct SpectralCube {
    data: Arc<Array3<f32>>,
    wavelengths: Option<Vec<f64>>,
    nodata: f64,
    transform: GeoTransform,
    crs: Option<CRS>,
}

impl SpectralCube {
    /// Wrap a `(rows, cols, bands)` array. No wavelengths, default sentinel.
    pub fn new(data: Array3<f32>) -> Self {
        // Standard layout keeps `pixel_matrix` a zero-copy reshape.
        let data = if data.is_standard_layout() {
            data
        } else {
            data.as_standard_layout().into_owned()
        };
        Self {
            data: Arc::new(data),
            wavelengths: None,
            nodata: DEFAULT_NODATA,
            transform: GeoTransform::default(),
            crs: None,
        }
    }

    /// Build a cube from band-sequential samples (`bands` planes of `rows * cols`).
    pub fn from_bsq(samples: Vec<f32>, rows: usize, cols: usize, bands: usize) -> Result<Self> {
        if samples.len() != rows * cols * bands {
            return Err(Error::InvalidDimensions {
                width: cols,
                height: rows,
            });
        }
        let planes = Array3::from_shape_vec((bands, rows, cols), samples)
            .map_err(|e| Error::Other(e.to_string()))?;
        Ok(Self::new(planes.permuted_axes([1, 2, 0])))
    }

    /// Attach per-band wavelengths (nanometres). Length must equal the band count.
    pub fn with_wavelengths(mut self, wavelengths: Vec<f64>) -> Result<Self> {
        if wavelengths.len() != self.band_count() {
            return Err(Error::BandCountMismatch {
                expected: self.band_count(),
                actual: wavelengths.len(),
            });
        }
        self.wavelengths = Some(wavelengths);
        Ok(self)
    }

    /// Set the no-data sentinel
    pub fn with_nodata(mut self, nodata: f64) -> Self {
        self.nodata = nodata;
        self
    }

    /// Set the geotransform
    pub fn with_transform(mut self, transform: GeoTransform) -> Self {
        self.transform = transform;
        self
    }

    /// Set the CRS
    pub fn with_crs(mut self, crs: Option<CRS>) -> Self {
        self.crs = crs;
        self
    }

    // Dimensions

    /// Shape as (rows, cols, bands)
    pub fn shape(&self) -> (usize, usize, usize) {
        self.data.dim()
    }

    /// Spatial shape as (rows, cols)
    pub fn spatial_shape(&self) -> (usize, usize) {
        let (rows, cols, _) = self.shape();
        (rows, cols)
    }

    /// Number of spectral bands
    pub fn band_count(&self) -> usize {
        self.data.len_of(Axis(2))
    }

    /// Number of pixels (rows * cols)
    pub fn pixel_count(&self) -> usize {
        let (rows, cols) = self.spatial_shape();
        rows * cols
    }

    // Metadata

    /// Per-band wavelengths, when the source provided them
    pub fn wavelengths(&self) -> Option<&[f64]> {
        self.wavelengths.as_deref()
    }

    /// No-data sentinel
    pub fn nodata(&self) -> f64 {
        self.nodata
    }

    /// Geotransform
    pub fn transform(&self) -> &GeoTransform {
        &self.transform
    }

    /// CRS
    pub fn crs(&self) -> Option<&CRS> {
        self.crs.as_ref()
    }

    /// Whether `value` equals the sentinel (NaN always counts as no-data)
    pub fn is_nodata(&self, value: f64) -> bool {
        value.is_nodata(Some(self.nodata))
    }

    /// Index of the band whose wavelength is closest to `target_nm`.
    ///
    /// Ties resolve to the lowest index. `None` when wavelengths are absent.
    pub fn nearest_band(&self, target_nm: f64) -> Option<usize> {
        let wavelengths = self.wavelengths()?;
        let mut best: Option<(usize, f64)> = None;
        for (i, &w) in wavelengths.iter().enumerate() {
            let d = (w - target_nm).abs();
            if best.map_or(true, |(_, bd)| d < bd) {
                best = Some((i, d));
            }
        }
        best.map(|(i, _)| i)
    }

    // Data access

    /// View of the full cube
    pub fn data(&self) -> ArrayView3<'_, f32> {
        self.data.view()
    }

    /// Flattened `(rows * cols, bands)` view, one row per pixel in row-major order
    pub fn pixel_matrix(&self) -> Result<ArrayView2<'_, f32>> {
        let (rows, cols, bands) = self.shape();
        self.data
            .view()
            .into_shape_with_order((rows * cols, bands))
            .map_err(|e| Error::Other(e.to_string()))
    }

    /// Read one band as an `f64` raster carrying the cube's georeferencing.
    ///
    /// The raster's no-data value is the cube sentinel.
    pub fn band(&self, index: usize) -> Result<Raster<f64>> {
        let bands = self.band_count();
        if index >= bands {
            return Err(Error::BandOutOfRange { index, bands });
        }
        let plane: Array2<f64> = self.data.index_axis(Axis(2), index).mapv(f64::from);
        let mut raster = Raster::from_array(plane);
        raster.set_transform(self.transform);
        raster.set_crs(self.crs.clone());
        raster.set_nodata(Some(self.nodata));
        Ok(raster)
    }

    /// Read a subset of bands, in the order given
    pub fn bands(&self, indices: &[usize]) -> Result<Vec<Raster<f64>>> {
        indices.iter().map(|&i| self.band(i)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp_cube(rows: usize, cols: usize, bands: usize) -> SpectralCube {
        let data = Array3::from_shape_fn((rows, cols, bands), |(r, c, b)| {
            (r * 100 + c * 10 + b) as f32
        });
        SpectralCube::new(data)
    }

    #[test]
    fn test_shape_and_defaults() {
        let cube = ramp_cube(4, 3, 5);
        assert_eq!(cube.shape(), (4, 3, 5));
        assert_eq!(cube.spatial_shape(), (4, 3));
        assert_eq!(cube.pixel_count(), 12);
        assert_eq!(cube.nodata(), DEFAULT_NODATA);
        assert!(cube.wavelengths().is_none());
    }

    #[test]
    fn test_pixel_matrix_row_major() {
        let cube = ramp_cube(2, 3, 4);
        let pixels = cube.pixel_matrix().unwrap();
        assert_eq!(pixels.dim(), (6, 4));
        // pixel (1, 2) -> row 1 * 3 + 2 = 5
        assert_eq!(pixels[(5, 3)], 123.0);
    }

    #[test]
    fn test_band_read_carries_meta() {
        let cube = ramp_cube(2, 2, 3)
            .with_transform(GeoTransform::new(5.0, 6.0, 1.0, -1.0))
            .with_nodata(-1.0);
        let band = cube.band(2).unwrap();
        assert_eq!(band.get(1, 1).unwrap(), 112.0);
        assert_eq!(band.nodata(), Some(-1.0));
        assert_eq!(band.transform().origin_x, 5.0);
        assert!(matches!(
            cube.band(3),
            Err(Error::BandOutOfRange { index: 3, bands: 3 })
        ));
    }

    #[test]
    fn test_from_bsq_layout() {
        // 2 bands of 1x2: band0 = [1, 2], band1 = [3, 4]
        let cube = SpectralCube::from_bsq(vec![1.0, 2.0, 3.0, 4.0], 1, 2, 2).unwrap();
        assert_eq!(cube.data()[(0, 0, 0)], 1.0);
        assert_eq!(cube.data()[(0, 1, 0)], 2.0);
        assert_eq!(cube.data()[(0, 0, 1)], 3.0);
        assert_eq!(cube.data()[(0, 1, 1)], 4.0);
    }

    #[test]
    fn test_nearest_band() {
        let cube = ramp_cube(1, 1, 4)
            .with_wavelengths(vec![400.0, 500.0, 600.0, 700.0])
            .unwrap();
        assert_eq!(cube.nearest_band(560.0), Some(2));
        // Equidistant: lowest index wins
        assert_eq!(cube.nearest_band(550.0), Some(1));
        assert_eq!(cube.nearest_band(10_000.0), Some(3));
        assert_eq!(ramp_cube(1, 1, 2).nearest_band(550.0), None);
    }

    #[test]
    fn test_wavelength_count_checked() {
        let result = ramp_cube(1, 1, 3).with_wavelengths(vec![1.0, 2.0]);
        assert!(matches!(
            result,
            Err(Error::BandCountMismatch { expected: 3, actual: 2 })
        ));
    }
}
