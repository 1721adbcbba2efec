//! Command-line driver: correct one exposure or a manifest of exposures.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use ifucorr::{Config, ExposureInputs, ExposurePipeline, ExposureReport, ZoneSource};

#[derive(Parser, Debug)]
#[command(author, version, about = "Illumination correction and sky subtraction of IFS cubes")]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// YAML or JSON configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory receiving all products
    #[arg(long, global = true, default_value = "ifucorr_out")]
    output_dir: PathBuf,

    /// Override the Unit-pass bin width in wavelength planes
    #[arg(long, global = true)]
    bin_width: Option<usize>,

    /// Override the primary header keyword holding the rotator angle
    #[arg(long, global = true)]
    rotation_key: Option<String>,

    /// Exposures processed in parallel (0 = one per core)
    #[arg(long, short = 'j', global = true, default_value_t = 0)]
    jobs: usize,

    /// Log filter, overridden by RUST_LOG
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Directory for rolling log files
    #[arg(long, global = true, default_value = "logs")]
    log_dir: PathBuf,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Correct a single exposure
    Run {
        /// Identifier used in output file names
        #[arg(long)]
        exposure: String,

        /// Reduced cube
        #[arg(long)]
        cube: PathBuf,

        /// Zone map image
        #[arg(long, conflicts_with = "provenance", required_unless_present = "provenance")]
        zones: Option<PathBuf>,

        /// Provenance table used instead of a zone map image
        #[arg(long)]
        provenance: Option<PathBuf>,

        /// Broadband image for the first source mask
        #[arg(long)]
        reference: Option<PathBuf>,
    },
    /// Correct every exposure listed in a YAML or JSON manifest
    Batch {
        manifest: PathBuf,
    },
}

fn load_config(args: &Args) -> Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };
    if let Some(bin_width) = args.bin_width {
        config.bin_width = bin_width;
    }
    if let Some(key) = &args.rotation_key {
        config.layout.rotation_key = key.clone();
    }
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

fn load_manifest(path: &Path) -> Result<Vec<ExposureInputs>> {
    let format = common::FileFormat::from_path(path)?;
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read manifest {}", path.display()))?;
    common::deserialize(&text, format)
        .with_context(|| format!("Failed to parse manifest {}", path.display()))
}

fn exposures(command: &Command) -> Result<Vec<ExposureInputs>> {
    match command {
        Command::Run {
            exposure,
            cube,
            zones,
            provenance,
            reference,
        } => {
            let zones = match (zones, provenance) {
                (Some(path), _) => ZoneSource::Image(path.clone()),
                (None, Some(path)) => ZoneSource::Provenance(path.clone()),
                (None, None) => anyhow::bail!("Either --zones or --provenance is required"),
            };
            Ok(vec![ExposureInputs {
                exposure: exposure.clone(),
                cube: cube.clone(),
                zones,
                reference: reference.clone(),
            }])
        }
        Command::Batch { manifest } => load_manifest(manifest),
    }
}

fn run(args: Args) -> Result<bool> {
    let config = load_config(&args)?;
    let exposures = exposures(&args.command)?;

    rayon::ThreadPoolBuilder::new()
        .num_threads(args.jobs)
        .build_global()
        .context("Failed to configure the worker pool")?;

    tracing::info!(
        exposures = exposures.len(),
        output_dir = %args.output_dir.display(),
        "Starting illumination correction"
    );

    let pipeline = ExposurePipeline::new(config, &args.output_dir)?;
    let results = pipeline.run_all(&exposures)?;

    let mut all_ok = true;
    for (inputs, result) in exposures.iter().zip(results) {
        all_ok &= log_outcome(&inputs.exposure, result);
    }
    Ok(all_ok)
}

/// Log the result of one exposure, returning whether it succeeded.
fn log_outcome(exposure: &str, result: ifucorr::Result<ExposureReport>) -> bool {
    match result {
        Ok(report) => {
            tracing::info!(exposure, gaps = report.gap_count(), "Exposure done");
            true
        }
        Err(err) => {
            let configuration = err.is_configuration();
            let err = anyhow::Error::from(err);
            tracing::error!(exposure, configuration, "{err:#}");
            false
        }
    }
}

fn main() -> ExitCode {
    let args = Args::parse();

    if let Err(err) = common::log_setup::setup_logging(&args.log_level, &args.log_dir, "ifucorr") {
        eprintln!("Failed to set up logging: {err}");
        return ExitCode::FAILURE;
    }

    match run(args) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            tracing::error!("{err:#}");
            ExitCode::FAILURE
        }
    }
}
