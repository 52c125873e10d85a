//! Percentile contrast stretch
//!
//! Anomaly rasters are clipped to `[0, p98]` and divided by `p98`; RGB
//! samples are clipped to a joint `[p2, p98]` and scaled to `0..=255`. A
//! zero-width range renders as all zeros.

use ndarray::Zip;
use serde::{Deserialize, Serialize};

use super::percentile::{percentile, percentile_sorted};
use crate::imagery::WaterMask;
use anomap_core::{Error, Raster, Result};

/// Parameters for the anomaly stretch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StretchParams {
    /// Percentile mapped to 1.0. Default: 98
    pub upper_percentile: f64,
}

impl Default for StretchParams {
    fn default() -> Self {
        Self {
            upper_percentile: 98.0,
        }
    }
}

/// Stretch a non-negative raster into `[0, 1]`.
///
/// The upper percentile is computed over finite values outside `exclude`.
/// Excluded and non-finite pixels render as 0. When no pixel is included or
/// the percentile is not positive the whole output is 0.
pub fn stretch(
    raster: &Raster<f64>,
    exclude: Option<&WaterMask>,
    params: &StretchParams,
) -> Result<Raster<f64>> {
    let (rows, cols) = raster.shape();
    if let Some(mask) = exclude {
        if mask.shape() != (rows, cols) {
            let (mr, mc) = mask.shape();
            return Err(Error::SizeMismatch {
                er: rows,
                ec: cols,
                ar: mr,
                ac: mc,
            });
        }
    }

    let excluded = |row: usize, col: usize| exclude.is_some_and(|m| m.is_water(row, col));

    let mut included: Vec<f64> = raster
        .data()
        .indexed_iter()
        .filter(|&((r, c), v)| v.is_finite() && !excluded(r, c))
        .map(|(_, &v)| v)
        .collect();

    let mut output = raster.with_same_meta::<f64>(rows, cols);
    output.set_nodata(None);

    let vmax = match percentile(&mut included, params.upper_percentile) {
        Some(v) if v > 0.0 && v.is_finite() => v,
        Some(v) => {
            tracing::warn!("Degenerate stretch range [0, {}], rendering zeros", v);
            return Ok(output);
        }
        None => {
            tracing::warn!("No pixels left to stretch, rendering zeros");
            return Ok(output);
        }
    };
    tracing::debug!("Stretch p{} = {:.6}", params.upper_percentile, vmax);

    Zip::indexed(output.data_mut())
        .and(raster.data())
        .for_each(|(r, c), out, &v| {
            if v.is_finite() && !excluded(r, c) {
                *out = v.clamp(0.0, vmax) / vmax;
            }
        });
    Ok(output)
}

/// Scale samples into bytes with a shared low/high percentile clip.
///
/// Non-finite samples count as 0. Returns all zeros for an empty or
/// zero-width range.
pub fn stretch_to_u8(samples: &[f64], low_percentile: f64, high_percentile: f64) -> Vec<u8> {
    let clean: Vec<f64> = samples
        .iter()
        .map(|&v| if v.is_finite() { v } else { 0.0 })
        .collect();
    let mut sorted = clean.clone();
    sorted.sort_unstable_by(|a, b| a.total_cmp(b));

    let (lo, hi) = match (
        percentile_sorted(&sorted, low_percentile),
        percentile_sorted(&sorted, high_percentile),
    ) {
        (Some(lo), Some(hi)) if hi > lo => (lo, hi),
        _ => {
            tracing::warn!("Degenerate RGB percentile range, rendering zeros");
            return vec![0; clean.len()];
        }
    };
    tracing::debug!("RGB stretch p{} = {:.6}, p{} = {:.6}", low_percentile, lo, high_percentile, hi);

    let range = hi - lo;
    clean
        .into_iter()
        .map(|v| ((v.clamp(lo, hi) - lo) / range * 255.0) as u8)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::Array2;

    fn ramp(n: usize) -> Raster<f64> {
        Raster::from_vec((0..n * n).map(|v| v as f64).collect(), n, n).unwrap()
    }

    #[test]
    fn test_stretch_range() {
        let out = stretch(&ramp(10), None, &StretchParams::default()).unwrap();
        assert!(out.data().iter().all(|&v| (0.0..=1.0).contains(&v)));
        assert_eq!(out.get(9, 9).unwrap(), 1.0);
        assert_eq!(out.get(0, 0).unwrap(), 0.0);
    }

    #[test]
    fn test_all_zero_renders_zero() {
        let out = stretch(&Raster::filled(4, 4, 0.0), None, &StretchParams::default()).unwrap();
        assert!(out.data().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_excluded_pixels_ignored() {
        let mut r = Raster::filled(2, 2, 1.0);
        r.set(0, 0, 1000.0).unwrap();
        let mut water = Array2::from_elem((2, 2), false);
        water[(0, 0)] = true;
        let mask = WaterMask::from_array(water);

        let out = stretch(&r, Some(&mask), &StretchParams::default()).unwrap();
        // the outlier no longer drives the percentile
        assert_eq!(out.get(0, 0).unwrap(), 0.0);
        assert_relative_eq!(out.get(1, 1).unwrap(), 1.0);
    }

    #[test]
    fn test_non_square_keeps_positions() {
        let r = Raster::from_vec(vec![0.0, 1.0, 2.0, f64::NAN, 4.0, -1.0], 2, 3).unwrap();
        let mut water = Array2::from_elem((2, 3), false);
        water[(1, 1)] = true;
        let mask = WaterMask::from_array(water);

        let params = StretchParams {
            upper_percentile: 100.0,
        };
        let out = stretch(&r, Some(&mask), &params).unwrap();
        // included finite values: 0, 1, 2, -1 -> p100 = 2
        assert_eq!(out.shape(), (2, 3));
        assert_relative_eq!(out.get(0, 1).unwrap(), 0.5);
        assert_relative_eq!(out.get(0, 2).unwrap(), 1.0);
        assert_eq!(out.get(1, 0).unwrap(), 0.0);
        assert_eq!(out.get(1, 1).unwrap(), 0.0);
        assert_eq!(out.get(1, 2).unwrap(), 0.0);
    }

    #[test]
    fn test_everything_excluded() {
        let mask = WaterMask::from_array(Array2::from_elem((3, 3), true));
        let out = stretch(&ramp(3), Some(&mask), &StretchParams::default()).unwrap();
        assert!(out.data().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_mask_shape_mismatch() {
        let mask = WaterMask::from_array(Array2::from_elem((2, 2), false));
        assert!(stretch(&ramp(3), Some(&mask), &StretchParams::default()).is_err());
    }

    #[test]
    fn test_u8_spans_full_range() {
        let samples: Vec<f64> = (0..200).map(|v| v as f64).collect();
        let bytes = stretch_to_u8(&samples, 2.0, 98.0);
        assert_eq!(bytes.iter().min(), Some(&0));
        assert_eq!(bytes.iter().max(), Some(&255));
    }

    #[test]
    fn test_u8_constant_is_zero() {
        assert!(stretch_to_u8(&[5.0; 30], 2.0, 98.0).iter().all(|&b| b == 0));
    }
}
