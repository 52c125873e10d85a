//! anomap CLI - Hyperspectral anomaly detection

mod pipeline;
mod status;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use anomap_algorithms::anomaly::{
    detect_anomalies, AnomalyParams, AutoencoderParams, Capabilities, ModelChoice, ValidityMask,
};
use anomap_algorithms::imagery::{water_index, water_mask_with_threshold, WaterMaskParams, NDWI_WATER_THRESHOLD};
use anomap_algorithms::render::{compose_rgb, refine, stretch, RefineParams, RgbParams, StretchParams};
use anomap_colormap::{raster_to_rgb, ColorScheme, ColormapParams};
use anomap_core::io::{read_envi, read_geotiff, write_geotiff, write_png_rgb};
use anomap_core::{Raster, SpectralCube};

use pipeline::{spawn_run, RunConfig};
use status::{RunGuard, StatusHandle};

// ─── CLI structure ──────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "anomap")]
#[command(author, version, about = "Hyperspectral anomaly detection", long_about = None)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show information about an ENVI cube
    Info {
        /// ENVI header file
        input: PathBuf,
    },
    /// Score target pixels against a model of the reference scene
    Detect {
        /// Reference (clean) ENVI header
        #[arg(long)]
        reference: PathBuf,
        /// Target ENVI header
        #[arg(long)]
        target: PathBuf,
        /// Output GeoTIFF with raw anomaly scores
        output: PathBuf,
        /// Also write a stretched, colormapped PNG
        #[arg(long)]
        png: Option<PathBuf>,
        #[command(flatten)]
        model: ModelArgs,
        #[command(flatten)]
        render: RenderArgs,
    },
    /// Stretch an anomaly raster, suppressing land via NDWI
    Refine {
        /// Anomaly scores GeoTIFF
        #[arg(long)]
        scores: PathBuf,
        /// ENVI header of the scene the scores belong to
        #[arg(long)]
        cube: PathBuf,
        /// Output PNG
        output: PathBuf,
        /// Upper percentile for the stretch
        #[arg(long, default_value = "98.0")]
        percentile: f64,
        #[command(flatten)]
        render: RenderArgs,
    },
    /// True-color composite of a cube
    Rgb {
        /// ENVI header file
        input: PathBuf,
        /// Output PNG
        output: PathBuf,
        /// Lower percentile of the joint stretch
        #[arg(long, default_value = "2.0")]
        low: f64,
        /// Upper percentile of the joint stretch
        #[arg(long, default_value = "98.0")]
        high: f64,
    },
    /// NDWI of a cube, optionally thresholded into a water mask
    Ndwi {
        /// ENVI header file
        input: PathBuf,
        /// Output GeoTIFF
        output: PathBuf,
        /// Write a 0/1 water mask instead of the index
        #[arg(long)]
        mask: bool,
    },
    /// Full run: scores, refined map, RGB composites and risk summary
    Run {
        /// Reference (clean) ENVI header
        #[arg(long)]
        reference: PathBuf,
        /// Target ENVI header
        #[arg(long)]
        target: PathBuf,
        /// Output directory
        #[arg(short, long, default_value = "output")]
        out_dir: PathBuf,
        /// Mirror the run status as JSON in this file
        #[arg(long)]
        status_file: Option<PathBuf>,
        #[command(flatten)]
        model: ModelArgs,
        #[command(flatten)]
        render: RenderArgs,
    },
}

#[derive(Args)]
struct ModelArgs {
    /// Reconstruction model: auto, autoencoder, statistical
    #[arg(long, default_value = "auto")]
    model: ModelChoice,
    /// Autoencoder training epochs
    #[arg(long, default_value = "50")]
    epochs: usize,
    /// Autoencoder mini-batch size
    #[arg(long, default_value = "256")]
    batch_size: usize,
    /// Autoencoder learning rate
    #[arg(long, default_value = "0.001")]
    learning_rate: f64,
    /// Random seed for training
    #[arg(long, default_value = "42")]
    seed: u64,
}

impl ModelArgs {
    fn params(&self) -> AnomalyParams {
        AnomalyParams {
            strategy: self.model.resolve(&Capabilities::probe()),
            autoencoder: AutoencoderParams {
                epochs: self.epochs,
                batch_size: self.batch_size,
                learning_rate: self.learning_rate,
                seed: self.seed,
                ..AutoencoderParams::default()
            },
            ..AnomalyParams::default()
        }
    }
}

#[derive(Args)]
struct RenderArgs {
    /// Color scheme: jet, hot, grayscale, water
    #[arg(long, default_value = "jet")]
    colormap: ColorScheme,
}

// ─── Helpers ────────────────────────────────────────────────────────────

fn setup_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");
}

fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap(),
    );
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

fn read_cube(path: &Path) -> Result<SpectralCube> {
    let pb = spinner("Reading cube...");
    let cube = read_envi(path).with_context(|| format!("Failed to read {}", path.display()))?;
    pb.finish_and_clear();
    let (rows, cols, bands) = cube.shape();
    info!("Input: {} x {} x {} bands", cols, rows, bands);
    Ok(cube)
}

fn write_result(raster: &Raster<f64>, path: &Path) -> Result<()> {
    let pb = spinner("Writing output...");
    write_geotiff(raster, path).context("Failed to write output")?;
    pb.finish_and_clear();
    Ok(())
}

fn write_colormapped(raster: &Raster<f64>, scheme: ColorScheme, path: &Path) -> Result<()> {
    let rgb = raster_to_rgb(raster, &ColormapParams::new(scheme));
    write_png_rgb(rgb, raster.cols(), raster.rows(), path).context("Failed to write PNG")
}

fn done(name: &str, path: &Path, elapsed: Duration) {
    println!("{} saved to: {}", name, path.display());
    println!("  Processing time: {:.2?}", elapsed);
}

fn run_with_progress(config: RunConfig, status_file: Option<&Path>) -> Result<()> {
    let guard = RunGuard::new();
    let status = StatusHandle::new();
    let start = Instant::now();
    let handle = spawn_run(&guard, config.clone(), status.clone())?;

    let pb = ProgressBar::new(100);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos:>3}% {msg}")
            .unwrap()
            .progress_chars("=> "),
    );
    while !handle.is_finished() {
        let snap = status.snapshot();
        pb.set_position(snap.progress as u64);
        pb.set_message(snap.current_step.clone());
        if let Some(path) = status_file {
            std::fs::write(path, status.to_json()?).context("Failed to write status file")?;
        }
        std::thread::sleep(Duration::from_millis(200));
    }
    let results = handle
        .join()
        .map_err(|_| anyhow::anyhow!("worker thread panicked"))?;
    pb.finish_and_clear();
    if let Some(path) = status_file {
        std::fs::write(path, status.to_json()?).context("Failed to write status file")?;
    }

    let Some(results) = results else {
        let message = status.snapshot().error.unwrap_or_else(|| "unknown error".to_string());
        anyhow::bail!("Run failed: {}", message);
    };

    let risk = results.risk();
    println!("Model: {}", results.model);
    println!("Risk summary:");
    println!("  High:   {:>5.1}%", risk.high);
    println!("  Medium: {:>5.1}%", risk.medium);
    println!("  Low:    {:>5.1}%", risk.low);
    println!("  Water:  {:>5.1}%", 100.0 * results.water_fraction);
    println!("Anomaly map: {}", config.out_dir.join(&results.map_file).display());
    println!("Raw map:     {}", config.out_dir.join(&results.raw_map_file).display());
    println!("RGB:         {}", config.out_dir.join(&results.rgb_file).display());
    println!("  Processing time: {:.2?}", start.elapsed());
    Ok(())
}

// ─── Main ───────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    match cli.command {
        // ── Info ─────────────────────────────────────────────────────
        Commands::Info { input } => {
            let cube = read_cube(&input)?;
            let (rows, cols, bands) = cube.shape();
            let valid = ValidityMask::from_cube(&cube).context("Failed to scan pixels")?;

            println!("File: {}", input.display());
            println!("Dimensions: {} x {} ({} pixels)", cols, rows, cube.pixel_count());
            println!("Bands: {}", bands);
            match cube.wavelengths() {
                Some(wl) if !wl.is_empty() => {
                    println!("Wavelengths: {:.1} - {:.1} nm", wl[0], wl[wl.len() - 1]);
                }
                _ => println!("Wavelengths: none"),
            }
            let gt = cube.transform();
            let bounds = gt.bounds(cols, rows);
            println!("Pixel size: {} x {}", gt.pixel_width, gt.pixel_height.abs());
            println!(
                "Bounds: ({:.6}, {:.6}) - ({:.6}, {:.6})",
                bounds.0, bounds.1, bounds.2, bounds.3
            );
            if let Some(crs) = cube.crs() {
                println!("CRS: {}", crs);
            }
            println!("NoData: {}", cube.nodata());
            println!(
                "Valid pixels: {} ({:.1}%)",
                valid.count(),
                100.0 * valid.count() as f64 / valid.len().max(1) as f64
            );
        }

        // ── Detect ───────────────────────────────────────────────────
        Commands::Detect {
            reference,
            target,
            output,
            png,
            model,
            render,
        } => {
            let reference = read_cube(&reference)?;
            let target = read_cube(&target)?;
            let params = model.params();
            let start = Instant::now();
            let pb = spinner(&format!("Scoring with {} model...", params.strategy.name()));
            let scores =
                detect_anomalies(&reference, &target, &params).context("Failed to compute anomaly map")?;
            pb.finish_and_clear();
            let elapsed = start.elapsed();
            write_result(&scores, &output)?;
            if let Some(png) = png {
                let image = stretch(&scores, None, &StretchParams::default())
                    .context("Failed to stretch anomaly map")?;
                write_colormapped(&image, render.colormap, &png)?;
                println!("Preview saved to: {}", png.display());
            }
            done("Anomaly map", &output, elapsed);
        }

        // ── Refine ───────────────────────────────────────────────────
        Commands::Refine {
            scores,
            cube,
            output,
            percentile,
            render,
        } => {
            let raster: Raster<f64> = read_geotiff(&scores).context("Failed to read anomaly scores")?;
            let cube = read_cube(&cube)?;
            let mut params = RefineParams::default();
            params.stretch.upper_percentile = percentile;
            let start = Instant::now();
            let refined = refine(&raster, &cube, &params).context("Failed to refine anomaly map")?;
            let elapsed = start.elapsed();
            write_colormapped(&refined.image, render.colormap, &output)?;
            info!("Water: {:.1}% of pixels", 100.0 * refined.water.fraction());
            done("Refined map", &output, elapsed);
        }

        // ── RGB ──────────────────────────────────────────────────────
        Commands::Rgb {
            input,
            output,
            low,
            high,
        } => {
            let cube = read_cube(&input)?;
            let params = RgbParams {
                low_percentile: low,
                high_percentile: high,
                ..RgbParams::default()
            };
            let start = Instant::now();
            let image = compose_rgb(&cube, &params).context("Failed to compose RGB image")?;
            let elapsed = start.elapsed();
            let [r, g, b] = image.band_indices();
            info!("Bands: R={} G={} B={}", r, g, b);
            let (rows, cols) = (image.rows(), image.cols());
            write_png_rgb(image.into_raw(), cols, rows, &output).context("Failed to write PNG")?;
            done("RGB composite", &output, elapsed);
        }

        // ── NDWI ─────────────────────────────────────────────────────
        Commands::Ndwi {
            input,
            output,
            mask,
        } => {
            let cube = read_cube(&input)?;
            let start = Instant::now();
            let index =
                water_index(&cube, &WaterMaskParams::default()).context("Failed to calculate NDWI")?;
            let result = if mask {
                let water = water_mask_with_threshold(&index, NDWI_WATER_THRESHOLD);
                info!("Water: {:.1}% of pixels", 100.0 * water.fraction());
                let mut out = index.with_same_meta::<f64>(index.rows(), index.cols());
                for ((row, col), &is_water) in water.view().indexed_iter() {
                    out.set(row, col, if is_water { 1.0 } else { 0.0 })?;
                }
                out
            } else {
                index
            };
            let elapsed = start.elapsed();
            write_result(&result, &output)?;
            done(if mask { "Water mask" } else { "NDWI" }, &output, elapsed);
        }

        // ── Run ──────────────────────────────────────────────────────
        Commands::Run {
            reference,
            target,
            out_dir,
            status_file,
            model,
            render,
        } => {
            let mut config = RunConfig::new(reference, target, out_dir);
            config.anomaly = model.params();
            config.colormap = render.colormap;
            run_with_progress(config, status_file.as_deref())?;
        }
    }

    Ok(())
}
