//! CLI entry point for spectroscan
//!
//! Drives a raster scan on the simulated rig and manages the resulting
//! measurement files.
//!
//! # Usage
//!
//! Run a scan, confirming the previewed area at the terminal:
//! ```bash
//! spectroscan scan
//! ```
//!
//! Inspect and clean up measurements:
//! ```bash
//! spectroscan list
//! spectroscan view measurement_20240501_120000_spectra.csv --slice 100
//! spectroscan delete --all --yes
//! ```

// Global allocator (Microsoft Rust Guidelines: M-MIMALLOC-APPS)
#[cfg(not(test))]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use scan_core::{ConfirmationAdapter, SettingsStore};
use scan_driver_mock::{generate_sequence_like, GenerateOptions};
use scan_experiment::{
    confirmation_channel, AutoConfirm, ConfirmationRequest, ScanEvent, ScanOutcome, ScanReport,
    ScanSequencer, StorageOptions,
};
use scan_storage::{delete_all, delete_measurement, find_measurement, list_measurements, MeasurementCube};
use spectroscan::{config::AppConfig, logging, rig::SimulatedRig};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tracing::{info, warn};

/// Grace period for the run to wind down when the CLI exits.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[derive(Parser)]
#[command(name = "spectroscan")]
#[command(about = "Raster scans with a scanning spectrometer", long_about = None)]
struct Cli {
    /// Configuration file (TOML)
    #[arg(long, global = true, default_value = spectroscan::config::DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one raster scan on the simulated rig
    Scan {
        /// Accept the previewed area without asking
        #[arg(long)]
        yes: bool,
    },

    /// Load a measurement and print a summary of its cube
    View {
        /// File name, session id or path
        measurement: String,

        /// Wavelength index to summarize
        #[arg(long)]
        slice: Option<usize>,
    },

    /// List stored measurements
    List,

    /// Delete one or all measurements
    Delete {
        /// File name or session id
        #[arg(required_unless_present = "all", conflicts_with = "all")]
        measurement: Option<String>,

        /// Delete every measurement in the output directory
        #[arg(long)]
        all: bool,

        /// Do not ask before deleting
        #[arg(long)]
        yes: bool,
    },

    /// Write synthetic measurements shaped like the configured scan
    Generate {
        /// Number of measurements
        #[arg(long, default_value = "1")]
        count: usize,

        /// Also write per-point files
        #[arg(long)]
        point_files: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = AppConfig::load_from(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    config.validate().map_err(|e| anyhow!(e))?;
    logging::init_from_config(&config).map_err(|e| anyhow!(e))?;

    match cli.command {
        Commands::Scan { yes } => {
            let runtime = tokio::runtime::Runtime::new().context("starting tokio runtime")?;
            let result = runtime.block_on(run_scan(&config, yes));
            // A terminal prompt may still be blocked reading stdin.
            runtime.shutdown_timeout(Duration::from_millis(100));
            result
        }
        Commands::View { measurement, slice } => view_measurement(&config, &measurement, slice),
        Commands::List => list(&config),
        Commands::Delete {
            measurement,
            all,
            yes,
        } => delete(&config, measurement.as_deref(), all, yes),
        Commands::Generate { count, point_files } => generate(&config, count, point_files),
    }
}

async fn run_scan(config: &AppConfig, yes: bool) -> Result<()> {
    let rig = SimulatedRig::start(config).await?;

    let confirmation: Arc<dyn ConfirmationAdapter> = if yes {
        Arc::new(AutoConfirm(true))
    } else {
        let (requester, requests) = confirmation_channel(1);
        tokio::spawn(prompt_confirmations(requests));
        Arc::new(requester)
    };

    let sequencer = ScanSequencer::new(
        Arc::new(SettingsStore::new(config.scan.clone())),
        rig.hardware(confirmation),
        StorageOptions {
            output_dir: config.storage.output_dir.clone(),
        },
    );
    let progress = tokio::spawn(print_progress(sequencer.subscribe()));

    let join = sequencer.start()?.join();
    tokio::pin!(join);
    let report = loop {
        tokio::select! {
            report = &mut join => break report?,
            signal = tokio::signal::ctrl_c() => {
                signal.context("listening for Ctrl-C")?;
                if sequencer.request_stop() {
                    println!("\nStopping scan...");
                }
            }
        }
    };

    sequencer.shutdown(SHUTDOWN_GRACE).await?;
    if let Err(e) = progress.await {
        warn!(error = %e, "Progress printer ended abnormally");
    }
    print_report(&report);

    match report.outcome {
        ScanOutcome::Failed { error } => bail!("scan failed: {error}"),
        _ => Ok(()),
    }
}

async fn prompt_confirmations(mut requests: mpsc::Receiver<ConfirmationRequest>) {
    while let Some(request) = requests.recv().await {
        let question = format!("Scan {}? [y/N] ", request.summary);
        let accepted = tokio::task::spawn_blocking(move || ask_yes_no(&question))
            .await
            .unwrap_or(false);
        request.respond(accepted);
    }
}

async fn print_progress(mut events: broadcast::Receiver<ScanEvent>) {
    loop {
        match events.recv().await {
            Ok(ScanEvent::Phase(phase)) => println!("Phase: {phase}"),
            Ok(ScanEvent::PointRecorded { cell, progress }) => {
                let eta = progress
                    .eta
                    .map(|d| format!("{:.1}s", d.as_secs_f64()))
                    .unwrap_or_else(|| "-".to_string());
                println!(
                    "  [{}/{}] x={} y={} ({:.0}%, eta {eta})",
                    progress.point_index,
                    progress.total_points,
                    cell.grid_x,
                    cell.grid_y,
                    progress.fraction() * 100.0
                );
            }
            Ok(ScanEvent::Finished(_)) => {}
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "Progress display fell behind");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

fn print_report(report: &ScanReport) {
    println!();
    match &report.outcome {
        ScanOutcome::Completed { path } => println!("Scan completed: {}", path.display()),
        ScanOutcome::Cancelled { reason } => println!("Scan cancelled: {reason}"),
        ScanOutcome::Failed { error } => println!("Scan failed: {error}"),
    }
    if let Some(geometry) = &report.geometry {
        println!("  Grid:            {geometry}");
    }
    println!("  Points written:  {}", report.points_written);
    if report.missing_samples > 0 {
        println!("  Missing samples: {}", report.missing_samples);
    }
    if report.motion_failures > 0 {
        println!("  Motion failures: {}", report.motion_failures);
    }
    println!("  Elapsed:         {:.1}s", report.elapsed.as_secs_f64());
}

fn view_measurement(config: &AppConfig, measurement: &str, slice: Option<usize>) -> Result<()> {
    let path = resolve_measurement(&config.storage.output_dir, measurement)?;
    let policy = config.storage.cube_policy().map_err(|e| anyhow!(e))?;
    let cube = MeasurementCube::load(&path, policy)?;
    info!(file = %path.display(), "Measurement loaded");

    let (ny, nx, len) = cube.shape();
    let (min, max) = cube.value_range();
    println!("{}", path.display());
    println!("  Grid:        {nx} x {ny}");
    println!("  Spectrum:    {len} samples");
    println!("  Range:       {min:.3} .. {max:.3}");
    if cube.skipped_rows() > 0 {
        println!("  Skipped:     {} malformed rows", cube.skipped_rows());
    }

    let scan = &config.scan;
    let calibration = match (scan.lambda_calibration_enabled, scan.lambda_min, scan.lambda_max) {
        (true, Some(lo), Some(hi)) => Some((lo, hi)),
        _ => None,
    };
    let axis = cube.wavelength_axis(calibration);
    if let (Some(first), Some(last)) = (axis.first(), axis.last()) {
        println!("  Axis:        {first:.2} .. {last:.2}");
    }

    let mean = cube.mean_spectrum();
    if let Some((peak, value)) = mean
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.total_cmp(b.1))
    {
        println!("  Mean peak:   {value:.3} at index {peak}");
    }

    if let Some(index) = slice {
        let view = slice_in_range(&cube, index)?;
        let (lo, hi) = view
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(*v), hi.max(*v)));
        let at = axis.get(index).copied().unwrap_or(index as f64);
        println!("  Slice {index}:   {lo:.3} .. {hi:.3} at {at:.2}");
        for row in view.rows() {
            let line: Vec<String> = row.iter().map(|v| format!("{v:10.3}")).collect();
            println!("    {}", line.join(" "));
        }
    }
    Ok(())
}

/// Wavelength slice `index`, rejecting indices past the spectrum.
fn slice_in_range(cube: &MeasurementCube, index: usize) -> Result<ndarray::ArrayView2<'_, f64>> {
    let len = cube.spectrum_len();
    if index >= len {
        bail!("slice {index} is outside 0..{len}");
    }
    cube.slice(index)
        .ok_or_else(|| anyhow!("slice {index} is outside 0..{len}"))
}

fn resolve_measurement(dir: &Path, measurement: &str) -> Result<PathBuf> {
    let as_path = Path::new(measurement);
    if as_path.is_file() {
        return Ok(as_path.to_path_buf());
    }
    Ok(find_measurement(dir, measurement)?.path)
}

fn list(config: &AppConfig) -> Result<()> {
    let dir = &config.storage.output_dir;
    let entries = list_measurements(dir)?;
    if entries.is_empty() {
        println!("No measurements in {}", dir.display());
        return Ok(());
    }
    for entry in &entries {
        let points = if entry.points_dir.is_some() { " +points" } else { "" };
        println!("{:<48} {:>10} B{points}", entry.file_name, entry.size_bytes);
    }
    println!("{} measurement(s) in {}", entries.len(), dir.display());
    Ok(())
}

fn delete(config: &AppConfig, measurement: Option<&str>, all: bool, yes: bool) -> Result<()> {
    let dir = &config.storage.output_dir;
    if all {
        if !yes && !ask_yes_no(&format!("Delete all measurements in {}? [y/N] ", dir.display())) {
            println!("Nothing deleted");
            return Ok(());
        }
        let removed = delete_all(dir)?;
        println!("Deleted {removed} measurement(s)");
        return Ok(());
    }

    let name = measurement.ok_or_else(|| anyhow!("no measurement given"))?;
    let entry = find_measurement(dir, name)?;
    if !yes && !ask_yes_no(&format!("Delete {}? [y/N] ", entry.file_name)) {
        println!("Nothing deleted");
        return Ok(());
    }
    delete_measurement(&entry)?;
    println!("Deleted {}", entry.file_name);
    Ok(())
}

fn generate(config: &AppConfig, count: usize, point_files: bool) -> Result<()> {
    let options = GenerateOptions {
        output_dir: config.storage.output_dir.clone(),
        count,
        point_files,
    };
    let generated = generate_sequence_like(&config.scan.normalize(), &options)?;
    for measurement in &generated {
        println!(
            "{} ({} points)",
            measurement.path.display(),
            measurement.total_points
        );
    }
    Ok(())
}

fn ask_yes_no(question: &str) -> bool {
    print!("{question}");
    if std::io::stdout().flush().is_err() {
        return false;
    }
    let mut answer = String::new();
    if std::io::stdin().read_line(&mut answer).is_err() {
        return false;
    }
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

#[cfg(test)]
mod tests {
    use super::*;
    use scan_storage::SpectrumLengthPolicy;

    fn three_by_two() -> MeasurementCube {
        let text = "0,0,1,2,3\n1,0,4,5,6\n2,0,7,8,9\n0,1,1,1,1\n1,1,2,2,2\n2,1,3,3,3\n";
        MeasurementCube::from_reader(text.as_bytes(), SpectrumLengthPolicy::ZeroPad).expect("cube")
    }

    #[test]
    fn test_slice_past_spectrum_is_an_error() {
        let cube = three_by_two();
        let err = slice_in_range(&cube, 50).expect_err("out of range");
        assert!(err.to_string().contains("outside 0..3"));
        assert!(slice_in_range(&cube, 3).is_err());

        let view = slice_in_range(&cube, 2).expect("last slice");
        assert_eq!(view[[0, 2]], 9.0);
    }

    #[test]
    fn test_shape_is_rows_then_columns() {
        // Three distinct X values, two distinct Y values.
        let (ny, nx, len) = three_by_two().shape();
        assert_eq!((nx, ny, len), (3, 2, 3));
    }
}
