//! Water-masked anomaly rendering

use serde::{Deserialize, Serialize};

use super::stretch::{stretch, StretchParams};
use crate::imagery::{water_mask, WaterMask, WaterMaskParams};
use anomap_core::{Error, Raster, Result, SpectralCube};

/// Parameters for [`refine`]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RefineParams {
    pub water: WaterMaskParams,
    pub stretch: StretchParams,
}

/// A stretched anomaly image together with the mask that was applied
#[derive(Debug, Clone)]
pub struct RefinedAnomaly {
    /// Values in `[0, 1]`, water pixels 0
    pub image: Raster<f64>,
    pub water: WaterMask,
}

/// Zero water pixels of `raster` and stretch the rest into `[0, 1]`.
///
/// The water mask comes from the NDWI of `cube`, which must share the
/// raster's spatial shape.
pub fn refine(raster: &Raster<f64>, cube: &SpectralCube, params: &RefineParams) -> Result<RefinedAnomaly> {
    let (rows, cols) = cube.spatial_shape();
    if raster.shape() != (rows, cols) {
        return Err(Error::SizeMismatch {
            er: rows,
            ec: cols,
            ar: raster.rows(),
            ac: raster.cols(),
        });
    }

    let water = water_mask(cube, &params.water)?;
    let image = stretch(raster, Some(&water), &params.stretch)?;
    Ok(RefinedAnomaly { image, water })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;

    #[test]
    fn test_water_pixels_are_zero() {
        // two bands [green, nir]; row 0 is water
        let cube = SpectralCube::new(Array3::from_shape_fn((2, 3, 2), |(r, _, b)| {
            match (r, b) {
                (0, 0) => 0.3f32,
                (0, _) => 0.05,
                (_, 0) => 0.1,
                _ => 0.4,
            }
        }))
        .with_wavelengths(vec![550.0, 860.0])
        .unwrap();
        let raster = Raster::from_vec(vec![50.0, 60.0, 70.0, 1.0, 2.0, 4.0], 2, 3).unwrap();

        let refined = refine(&raster, &cube, &RefineParams::default()).unwrap();
        assert_eq!(refined.water.count(), 3);
        for c in 0..3 {
            assert_eq!(refined.image.get(0, c).unwrap(), 0.0);
        }
        // p98 over land only
        assert_eq!(refined.image.get(1, 2).unwrap(), 1.0);
        assert!(refined.image.get(1, 0).unwrap() > 0.2);
    }

    #[test]
    fn test_shape_mismatch() {
        let cube = SpectralCube::new(Array3::from_elem((2, 2, 2), 1.0f32));
        let raster = Raster::filled(3, 3, 1.0);
        assert!(matches!(
            refine(&raster, &cube, &RefineParams::default()),
            Err(Error::SizeMismatch { .. })
        ));
    }
}
