//! Per-band min-max normalization
//!
//! Fit once on valid reference pixels, then apply the same parameters to
//! reference and target alike.

use ndarray::{Array2, ArrayView2};
use serde::{Deserialize, Serialize};

use crate::maybe_rayon::*;
use anomap_core::{Error, Result};

/// Denominator substituted for a band whose reference range is zero
pub const NORM_EPSILON: f64 = 1e-6;

/// Per-band minimum and maximum learned from reference pixels
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizationParams {
    min: Vec<f64>,
    max: Vec<f64>,
}

impl NormalizationParams {
    /// Learn per-band min and max from a `(pixels, bands)` matrix.
    ///
    /// The matrix must already be restricted to valid pixels.
    pub fn fit(reference: ArrayView2<'_, f32>) -> Result<Self> {
        let bands = reference.ncols();
        if reference.nrows() == 0 {
            return Err(Error::NoValidPixels("reference"));
        }

        let mut min = vec![f64::INFINITY; bands];
        let mut max = vec![f64::NEG_INFINITY; bands];
        for row in reference.outer_iter() {
            for (b, &v) in row.iter().enumerate() {
                let v = f64::from(v);
                if v < min[b] {
                    min[b] = v;
                }
                if v > max[b] {
                    max[b] = v;
                }
            }
        }

        let flat = min.iter().zip(&max).filter(|(lo, hi)| hi <= lo).count();
        if flat > 0 {
            tracing::debug!("{} of {} bands have zero reference range", flat, bands);
        }

        Ok(Self { min, max })
    }

    /// Number of bands the parameters were fit on
    pub fn band_count(&self) -> usize {
        self.min.len()
    }

    pub fn min(&self) -> &[f64] {
        &self.min
    }

    pub fn max(&self) -> &[f64] {
        &self.max
    }

    /// Map every value to `(v - min) / (max - min)` for its band.
    ///
    /// Values outside the reference range fall outside `[0, 1]`.
    pub fn apply(&self, pixels: ArrayView2<'_, f32>) -> Result<Array2<f32>> {
        let (n, bands) = pixels.dim();
        if bands != self.band_count() {
            return Err(Error::BandCountMismatch {
                expected: self.band_count(),
                actual: bands,
            });
        }

        let scale: Vec<(f64, f64)> = self
            .min
            .iter()
            .zip(&self.max)
            .map(|(&lo, &hi)| {
                let range = hi - lo;
                (lo, if range > 0.0 { range } else { NORM_EPSILON })
            })
            .collect();

        let data: Vec<f32> = (0..n)
            .into_par_iter()
            .flat_map(|i| {
                let row = pixels.row(i);
                row.iter()
                    .zip(&scale)
                    .map(|(&v, &(lo, range))| ((f64::from(v) - lo) / range) as f32)
                    .collect::<Vec<f32>>()
            })
            .collect();

        Array2::from_shape_vec((n, bands), data).map_err(|e| Error::Other(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    #[test]
    fn test_fit_then_apply_spans_unit_interval() {
        let x = array![[1.0f32, 10.0], [3.0, 20.0], [5.0, 15.0]];
        let params = NormalizationParams::fit(x.view()).unwrap();
        let y = params.apply(x.view()).unwrap();

        assert_relative_eq!(y[(0, 0)], 0.0);
        assert_relative_eq!(y[(2, 0)], 1.0);
        assert_relative_eq!(y[(1, 0)], 0.5);
        assert_relative_eq!(y[(0, 1)], 0.0);
        assert_relative_eq!(y[(1, 1)], 1.0);
        assert!(y.iter().all(|&v| (0.0..=1.0).contains(&v)));
    }

    #[test]
    fn test_constant_band_uses_epsilon() {
        let x = array![[7.0f32, 1.0], [7.0, 2.0]];
        let params = NormalizationParams::fit(x.view()).unwrap();

        let y = params.apply(x.view()).unwrap();
        assert_eq!(y[(0, 0)], 0.0);
        assert_eq!(y[(1, 0)], 0.0);

        let target = array![[8.0f32, 1.5]];
        let t = params.apply(target.view()).unwrap();
        assert!(t[(0, 0)].is_finite());
        assert_relative_eq!(f64::from(t[(0, 0)]), 1.0 / NORM_EPSILON, max_relative = 1e-5);
    }

    #[test]
    fn test_band_mismatch() {
        let x = array![[1.0f32, 2.0]];
        let params = NormalizationParams::fit(x.view()).unwrap();
        let wrong = array![[1.0f32, 2.0, 3.0]];
        assert!(matches!(
            params.apply(wrong.view()),
            Err(Error::BandCountMismatch { expected: 2, actual: 3 })
        ));
    }

    #[test]
    fn test_empty_reference() {
        let x = Array2::<f32>::zeros((0, 4));
        assert!(matches!(
            NormalizationParams::fit(x.view()),
            Err(Error::NoValidPixels(_))
        ));
    }
}
