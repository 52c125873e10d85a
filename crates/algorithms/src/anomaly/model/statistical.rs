//! Mean/std z-score model
//!
//! Always available. Training records per-band mean and population standard
//! deviation; the score of a pixel is its mean absolute z-score.

use ndarray::ArrayView2;

use super::{check_trained_bands, ReconstructionModel, StatisticalParams};
use crate::maybe_rayon::*;
use anomap_core::{Error, Result};

#[derive(Debug, Clone)]
pub struct StatisticalModel {
    params: StatisticalParams,
    mean: Vec<f64>,
    std: Vec<f64>,
}

impl StatisticalModel {
    pub fn new(params: StatisticalParams) -> Self {
        Self {
            params,
            mean: Vec::new(),
            std: Vec::new(),
        }
    }

    /// Per-band means, empty before training
    pub fn mean(&self) -> &[f64] {
        &self.mean
    }

    /// Per-band standard deviations with zeros replaced by the epsilon
    pub fn std(&self) -> &[f64] {
        &self.std
    }
}

impl ReconstructionModel for StatisticalModel {
    fn name(&self) -> &'static str {
        "statistical"
    }

    fn band_count(&self) -> Option<usize> {
        (!self.mean.is_empty()).then_some(self.mean.len())
    }

    fn train(&mut self, pixels: ArrayView2<'_, f32>) -> Result<()> {
        let (n, bands) = pixels.dim();
        if n == 0 || bands == 0 {
            return Err(Error::NoValidPixels("training set"));
        }

        let mut mean = vec![0.0f64; bands];
        for row in pixels.outer_iter() {
            for (b, &v) in row.iter().enumerate() {
                mean[b] += f64::from(v);
            }
        }
        mean.iter_mut().for_each(|m| *m /= n as f64);

        let mut var = vec![0.0f64; bands];
        for row in pixels.outer_iter() {
            for (b, &v) in row.iter().enumerate() {
                let d = f64::from(v) - mean[b];
                var[b] += d * d;
            }
        }

        let eps = self.params.std_epsilon;
        let std: Vec<f64> = var
            .into_iter()
            .map(|v| {
                let s = (v / n as f64).sqrt();
                if s > eps {
                    s
                } else {
                    eps
                }
            })
            .collect();

        tracing::debug!("Statistical model fit on {} pixels x {} bands", n, bands);
        self.mean = mean;
        self.std = std;
        Ok(())
    }

    fn score(&self, pixels: ArrayView2<'_, f32>) -> Result<Vec<f64>> {
        let bands = check_trained_bands(self.band_count(), &pixels)?;
        let n = pixels.nrows();
        let mean = &self.mean;
        let std = &self.std;

        let scores: Vec<f64> = (0..n)
            .into_par_iter()
            .map(|i| {
                let row = pixels.row(i);
                let total: f64 = row
                    .iter()
                    .zip(mean.iter().zip(std))
                    .map(|(&v, (&m, &s))| ((f64::from(v) - m) / s).abs())
                    .sum();
                total / bands as f64
            })
            .collect();

        Ok(scores)
    }
}
