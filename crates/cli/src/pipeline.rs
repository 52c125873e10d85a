//! End-to-end run: load both scenes, score, render, summarize
//!
//! A run writes into `out_dir`:
//! - `anomaly_raw.tif`: unstretched anomaly scores
//! - `anomaly_raw.png`: scores stretched without a water mask
//! - `anomaly_refined.png`: scores stretched with land pixels suppressed
//! - `rgb_target.png` / `rgb_reference.png`: true-color composites
//! - `run_config.json`: the parameters and results of the run

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::thread::JoinHandle;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{error, info};

use anomap_algorithms::anomaly::{detect_anomalies_with_progress, risk_summary, AnomalyParams};
use anomap_algorithms::render::{compose_rgb, refine, stretch, RefineParams, RgbParams};
use anomap_colormap::{raster_to_rgb, ColorScheme, ColormapParams};
use anomap_core::io::{read_envi, write_geotiff, write_png_rgb};
use anomap_core::{Raster, SpectralCube};

use crate::status::{RunError, RunGuard, RunResults, StatusHandle};

pub const RAW_TIFF: &str = "anomaly_raw.tif";
pub const RAW_PNG: &str = "anomaly_raw.png";
pub const REFINED_PNG: &str = "anomaly_refined.png";
pub const RGB_TARGET_PNG: &str = "rgb_target.png";
pub const RGB_REFERENCE_PNG: &str = "rgb_reference.png";
pub const RUN_CONFIG_JSON: &str = "run_config.json";

/// Everything a run needs
#[derive(Debug, Clone, Serialize)]
pub struct RunConfig {
    /// ENVI header of the clean reference scene
    pub reference: PathBuf,
    /// ENVI header of the scene to inspect
    pub target: PathBuf,
    pub out_dir: PathBuf,
    pub anomaly: AnomalyParams,
    pub refine: RefineParams,
    pub rgb: RgbParams,
    #[serde(skip)]
    pub colormap: ColorScheme,
}

impl RunConfig {
    pub fn new(reference: PathBuf, target: PathBuf, out_dir: PathBuf) -> Self {
        Self {
            reference,
            target,
            out_dir,
            anomaly: AnomalyParams::default(),
            refine: RefineParams::default(),
            rgb: RgbParams::default(),
            colormap: ColorScheme::default(),
        }
    }
}

#[derive(Serialize)]
struct RunRecord<'a> {
    config: &'a RunConfig,
    colormap: &'static str,
    results: &'a RunResults,
}

/// Execute a run, recording progress and outcome in `status`.
///
/// Failures, including panics inside the algorithms, end up in
/// `status.error` and yield `None`.
pub fn run_pipeline(config: &RunConfig, status: &StatusHandle) -> Option<RunResults> {
    status.start();
    let outcome = catch_unwind(AssertUnwindSafe(|| execute(config, status)));
    match outcome {
        Ok(Ok(results)) => {
            status.complete(results.clone());
            Some(results)
        }
        Ok(Err(e)) => {
            error!("Run failed: {:#}", e);
            status.fail(format!("{:#}", e));
            None
        }
        Err(panic) => {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            error!("Run panicked: {}", message);
            status.fail(format!("internal error: {}", message));
            None
        }
    }
}

/// Start [`run_pipeline`] on a worker thread.
///
/// The guard stays held until the worker finishes.
pub fn spawn_run(
    guard: &RunGuard,
    config: RunConfig,
    status: StatusHandle,
) -> std::result::Result<JoinHandle<Option<RunResults>>, RunError> {
    let ticket = guard.try_acquire()?;
    Ok(std::thread::spawn(move || {
        let _ticket = ticket;
        run_pipeline(&config, &status)
    }))
}

fn execute(config: &RunConfig, status: &StatusHandle) -> Result<RunResults> {
    status.update(5, "Loading data");
    let reference = load_cube(&config.reference, "reference")?;
    let target = load_cube(&config.target, "target")?;

    std::fs::create_dir_all(&config.out_dir)
        .with_context(|| format!("Failed to create {}", config.out_dir.display()))?;

    let map = detect_anomalies_with_progress(&reference, &target, &config.anomaly, status)
        .context("Failed to compute anomaly map")?;
    let scores = map.scores;

    let raw_tiff = config.out_dir.join(RAW_TIFF);
    write_geotiff(&scores, &raw_tiff).context("Failed to write anomaly raster")?;

    let raw_png = config.out_dir.join(RAW_PNG);
    let raw = stretch(&scores, None, &config.refine.stretch).context("Failed to stretch anomaly map")?;
    write_colormapped(&raw, config.colormap, &raw_png)?;

    status.update(90, "Refining with water mask");
    let refined = refine(&scores, &target, &config.refine).context("Failed to refine anomaly map")?;
    let refined_png = config.out_dir.join(REFINED_PNG);
    write_colormapped(&refined.image, config.colormap, &refined_png)?;
    info!("Water covers {:.1}% of the scene", 100.0 * refined.water.fraction());

    status.update(95, "Rendering RGB composites");
    let rgb_png = config.out_dir.join(RGB_TARGET_PNG);
    write_rgb(&target, &config.rgb, &rgb_png)?;
    write_rgb(&reference, &config.rgb, &config.out_dir.join(RGB_REFERENCE_PNG))?;

    let risk = risk_summary(&scores).rounded();
    let results = RunResults {
        high_risk: risk.high,
        medium_risk: risk.medium,
        low_risk: risk.low,
        model: map.model.name().to_string(),
        raw_map_file: RAW_PNG.to_string(),
        map_file: REFINED_PNG.to_string(),
        rgb_file: RGB_TARGET_PNG.to_string(),
        water_fraction: refined.water.fraction(),
    };

    let record = RunRecord {
        config,
        colormap: config.colormap.id(),
        results: &results,
    };
    let json = serde_json::to_string_pretty(&record)?;
    std::fs::write(config.out_dir.join(RUN_CONFIG_JSON), json).context("Failed to write run record")?;

    info!(
        "Risk: high {:.1}%, medium {:.1}%, low {:.1}%",
        results.high_risk, results.medium_risk, results.low_risk
    );
    Ok(results)
}

fn load_cube(path: &Path, role: &str) -> Result<SpectralCube> {
    let cube = read_envi(path).with_context(|| format!("Failed to read {} scene {}", role, path.display()))?;
    let (rows, cols, bands) = cube.shape();
    info!("{}: {} x {} x {} bands", role, cols, rows, bands);
    Ok(cube)
}

fn write_colormapped(raster: &Raster<f64>, scheme: ColorScheme, path: &Path) -> Result<()> {
    let rgb = raster_to_rgb(raster, &ColormapParams::new(scheme));
    write_png_rgb(rgb, raster.cols(), raster.rows(), path)
        .with_context(|| format!("Failed to write {}", path.display()))
}

fn write_rgb(cube: &SpectralCube, params: &RgbParams, path: &Path) -> Result<()> {
    let image = compose_rgb(cube, params).context("Failed to compose RGB image")?;
    let (rows, cols) = (image.rows(), image.cols());
    write_png_rgb(image.into_raw(), cols, rows, path)
        .with_context(|| format!("Failed to write {}", path.display()))
}
