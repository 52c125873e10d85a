//! Wavelength-based band selection

use anomap_core::{Error, Result, SpectralCube};

/// Pick the band closest to `target_nm`, or `default_index` when the cube
/// carries no wavelengths.
///
/// Ties resolve to the lower index. The chosen index must exist in the cube.
pub fn select_band(cube: &SpectralCube, target_nm: f64, default_index: usize) -> Result<usize> {
    let index = match cube.nearest_band(target_nm) {
        Some(i) => i,
        None => {
            tracing::warn!(
                "No wavelength metadata, using band {} for {} nm",
                default_index,
                target_nm
            );
            default_index
        }
    };

    if index >= cube.band_count() {
        return Err(Error::BandOutOfRange {
            index,
            bands: cube.band_count(),
        });
    }
    Ok(index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;

    fn cube(bands: usize) -> SpectralCube {
        SpectralCube::new(Array3::from_elem((2, 2, bands), 1.0f32))
    }

    #[test]
    fn test_nearest_wavelength() {
        let c = cube(4).with_wavelengths(vec![450.0, 540.0, 560.0, 860.0]).unwrap();
        assert_eq!(select_band(&c, 650.0, 0).unwrap(), 2);
        assert_eq!(select_band(&c, 900.0, 0).unwrap(), 3);
        // 550 is equidistant from 540 and 560
        assert_eq!(select_band(&c, 550.0, 0).unwrap(), 1);
    }

    #[test]
    fn test_default_without_wavelengths() {
        assert_eq!(select_band(&cube(50), 550.0, 35).unwrap(), 35);
    }

    #[test]
    fn test_default_out_of_range() {
        assert!(matches!(
            select_band(&cube(10), 860.0, 85),
            Err(Error::BandOutOfRange { index: 85, bands: 10 })
        ));
    }
}
