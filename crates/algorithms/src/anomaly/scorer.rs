//! Anomaly scoring
//!
//! Reference and target cubes are masked for validity, normalized with
//! parameters fit on the reference, and scored by a reconstruction model
//! trained on the reference. Scores are scattered back into a raster with
//! the target's spatial shape; invalid pixels stay at exactly 0.

use ndarray::{Array2, ArrayView2};
use serde::{Deserialize, Serialize};

use super::model::{
    build_model, AutoencoderParams, ModelStrategy, ReconstructionModel, StatisticalParams,
};
use super::normalizer::NormalizationParams;
use super::progress::{NoProgress, Progress};
use super::validity::{valid_pixels, ValidityMask};
use anomap_core::{Algorithm, Error, Raster, Result, SpectralCube};

/// Parameters for anomaly detection
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnomalyParams {
    /// Resolved model strategy. Default: autoencoder when compiled in
    pub strategy: ModelStrategy,
    pub statistical: StatisticalParams,
    pub autoencoder: AutoencoderParams,
}

/// Anomaly raster together with the model that scored it
#[derive(Debug, Clone)]
pub struct AnomalyMap {
    pub scores: Raster<f64>,
    /// Statistical after a fallback, whatever the requested strategy
    pub model: ModelStrategy,
}

/// Score `target` against a model of `reference`.
///
/// Returns a raster with the target's rows and cols, transform and CRS.
/// All values are finite and non-negative.
pub fn detect_anomalies(
    reference: &SpectralCube,
    target: &SpectralCube,
    params: &AnomalyParams,
) -> Result<Raster<f64>> {
    detect_anomalies_with_progress(reference, target, params, &NoProgress).map(|map| map.scores)
}

/// [`detect_anomalies`] with checkpoint reporting (10, 15, 25, 40, 80 percent)
/// and the strategy that actually produced the scores
pub fn detect_anomalies_with_progress(
    reference: &SpectralCube,
    target: &SpectralCube,
    params: &AnomalyParams,
    progress: &dyn Progress,
) -> Result<AnomalyMap> {
    if reference.band_count() != target.band_count() {
        return Err(Error::BandCountMismatch {
            expected: reference.band_count(),
            actual: target.band_count(),
        });
    }

    progress.checkpoint(10, "Preprocessing data");
    let (rows, cols) = target.spatial_shape();
    let target_mask = ValidityMask::from_cube(target)?;
    let reference_mask = ValidityMask::from_cube(reference)?;

    tracing::info!(
        "Valid pixels: reference {}/{}, target {}/{}",
        reference_mask.count(),
        reference_mask.len(),
        target_mask.count(),
        target_mask.len()
    );

    if target_mask.count() == 0 {
        tracing::warn!("Target has no valid pixels, anomaly map is all zero");
        progress.checkpoint(80, "Anomaly map complete");
        return Ok(AnomalyMap {
            scores: build_output(target, rows, cols, vec![0.0; rows * cols])?,
            model: params.strategy,
        });
    }

    let reference_valid = valid_pixels(reference.pixel_matrix()?, &reference_mask)?;
    let target_valid = valid_pixels(target.pixel_matrix()?, &target_mask)?;

    progress.checkpoint(15, "Normalizing spectra");
    let normalizer = NormalizationParams::fit(reference_valid.view())?;
    let reference_norm = normalizer.apply(reference_valid.view())?;
    let target_norm = normalizer.apply(target_valid.view())?;

    progress.checkpoint(25, &format!("Training {} model", params.strategy.name()));
    let primary = build_model(params.strategy, &params.statistical, &params.autoencoder);
    let (model, scores) = score_with_fallback(
        primary,
        params.strategy,
        &params.statistical,
        reference_norm.view(),
        target_norm.view(),
        progress,
    )?;
    progress.checkpoint(80, "Anomaly map complete");

    let mut data = vec![0.0f64; rows * cols];
    for (idx, score) in target_mask.valid_indices().into_iter().zip(scores) {
        data[idx] = if score.is_finite() { score.max(0.0) } else { 0.0 };
    }

    log_score_stats(&data, &target_mask);
    Ok(AnomalyMap {
        scores: build_output(target, rows, cols, data)?,
        model,
    })
}

/// Train and score with `primary`; on any model failure retry with the
/// statistical model. Returns the strategy that produced the scores.
fn score_with_fallback(
    primary: Result<Box<dyn ReconstructionModel>>,
    requested: ModelStrategy,
    statistical: &StatisticalParams,
    reference: ArrayView2<'_, f32>,
    target: ArrayView2<'_, f32>,
    progress: &dyn Progress,
) -> Result<(ModelStrategy, Vec<f64>)> {
    let attempt = primary.and_then(|mut model| {
        let name = model.name();
        model.train(reference)?;
        progress.checkpoint(40, "Computing anomalies");
        model.score(target).map(|scores| (name, scores))
    });

    match attempt {
        Ok((name, scores)) => {
            tracing::debug!("Scored {} pixels with the {} model", scores.len(), name);
            Ok((requested, scores))
        }
        Err(e @ Error::BandCountMismatch { .. }) => Err(e),
        Err(e) => {
            tracing::warn!("Reconstruction model failed ({}), falling back to statistical model", e);
            let mut fallback = build_model(
                ModelStrategy::Statistical,
                statistical,
                &AutoencoderParams::default(),
            )?;
            fallback.train(reference)?;
            progress.checkpoint(40, "Computing anomalies");
            Ok((ModelStrategy::Statistical, fallback.score(target)?))
        }
    }
}

fn log_score_stats(data: &[f64], mask: &ValidityMask) {
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    let mut sum = 0.0;
    let mut n = 0usize;
    for (i, &v) in data.iter().enumerate() {
        if mask.is_valid(i) {
            min = min.min(v);
            max = max.max(v);
            sum += v;
            n += 1;
        }
    }
    if n > 0 {
        tracing::debug!(
            "Reconstruction error: min {:.6}, max {:.6}, mean {:.6}",
            min,
            max,
            sum / n as f64
        );
    }
}

fn build_output(target: &SpectralCube, rows: usize, cols: usize, data: Vec<f64>) -> Result<Raster<f64>> {
    let array =
        Array2::from_shape_vec((rows, cols), data).map_err(|e| Error::Other(e.to_string()))?;
    let mut output = Raster::from_array(array);
    output.set_transform(*target.transform());
    output.set_crs(target.crs().cloned());
    Ok(output)
}

// ---------------------------------------------------------------------------
// Algorithm trait
// ---------------------------------------------------------------------------

/// Anomaly detection as an [`Algorithm`]: input is `(reference, target)`
#[derive(Debug, Clone, Default)]
pub struct AnomalyDetection;

impl Algorithm for AnomalyDetection {
    type Input = (SpectralCube, SpectralCube);
    type Output = Raster<f64>;
    type Params = AnomalyParams;
    type Error = Error;

    fn name(&self) -> &'static str {
        "AnomalyDetection"
    }

    fn description(&self) -> &'static str {
        "Score target pixels by reconstruction error against a reference model"
    }

    fn execute(&self, input: Self::Input, params: Self::Params) -> Result<Self::Output> {
        let (reference, target) = input;
        detect_anomalies(&reference, &target, &params)
    }
}
