//! Command-line interface for the scan preprocessor.

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use log::{error, info, warn};
use rayon::prelude::*;

use crate::core::loaders::{find_scan_files, load_scan_csv};
use crate::core::writers::write_frame_csv;
use crate::{CloudPreprocessor, PreprocessorConfig};

#[derive(Parser)]
#[command(name = "scan-preprocess")]
#[command(about = "Range sensor scan preprocessing pipeline", version)]
pub struct Cli {
    /// Path to YAML config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Increase verbosity
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Preprocess a single scan CSV (x, y, z, t columns)
    Preprocess {
        /// Input scan CSV file
        scan: PathBuf,
        /// Output frame CSV (defaults to <scan>_frame.csv)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Absolute scan timestamp in seconds
        #[arg(long, default_value_t = 0.0)]
        stamp: f64,
        /// Override the random grid seed
        #[arg(long)]
        seed: Option<u64>,
        /// Override the neighbor count
        #[arg(short, long)]
        k: Option<usize>,
        /// Override the downsampling resolution
        #[arg(long)]
        resolution: Option<f64>,
    },

    /// Preprocess every scan CSV in a directory in parallel
    Batch {
        /// Directory containing scan CSV files
        input_dir: PathBuf,
        /// Output directory for frame CSV files
        output_dir: PathBuf,
        /// Time between consecutive scans, used to stamp them in file order
        #[arg(long, default_value_t = 0.1)]
        scan_period: f64,
        /// Limit number of files to process
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Write the default configuration as YAML
    InitConfig {
        /// Destination YAML file
        path: PathBuf,
    },
}

/// Create a spinner for indeterminate operations
fn create_spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(message.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

/// Create a progress bar for batch runs
fn create_progress_bar(len: usize) -> ProgressBar {
    let pb = ProgressBar::new(len as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{bar:40.cyan/blue} {pos}/{len} scans ({eta})")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );
    pb
}

/// Print a summary box
fn print_summary(title: &str, items: &[(&str, String)]) {
    println!();
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║ {:<62} ║", title);
    println!("╠══════════════════════════════════════════════════════════════╣");
    for (key, value) in items {
        let display_value = if value.chars().count() > 39 {
            format!("{}...", value.chars().take(36).collect::<String>())
        } else {
            value.clone()
        };
        println!("║ {:<20}: {:<39} ║", key, display_value);
    }
    println!("╚══════════════════════════════════════════════════════════════╝");
    println!();
}

pub fn run() {
    let cli = Cli::parse();

    // Initialize logging based on verbosity (must come first)
    env_logger::Builder::new()
        .filter_level(match cli.verbose {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            2 => log::LevelFilter::Debug,
            _ => log::LevelFilter::Trace,
        })
        .format_timestamp_secs()
        .init();

    // Load config
    let config = match &cli.config {
        Some(path) => match PreprocessorConfig::from_yaml(path) {
            Ok(cfg) => {
                info!("Loaded config from: {}", path.display());
                cfg
            }
            Err(e) => {
                warn!("Failed to load config from {}: {}, using defaults", path.display(), e);
                PreprocessorConfig::default()
            }
        },
        None => PreprocessorConfig::default(),
    };

    let result = match cli.command {
        Commands::Preprocess {
            scan,
            output,
            stamp,
            seed,
            k,
            resolution,
        } => {
            let config = PreprocessorConfig {
                seed: seed.unwrap_or(config.seed),
                k_correspondences: k.unwrap_or(config.k_correspondences),
                downsample_resolution: resolution.unwrap_or(config.downsample_resolution),
                ..config
            };
            cmd_preprocess(&scan, output, stamp, &config)
        }
        Commands::Batch {
            input_dir,
            output_dir,
            scan_period,
            limit,
        } => cmd_batch(&input_dir, &output_dir, scan_period, limit, &config),
        Commands::InitConfig { path } => cmd_init_config(&path, &config),
    };

    if let Err(e) = result {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

/// Default output path: `<stem>_frame.csv` next to the input.
fn default_output_path(scan: &Path) -> PathBuf {
    let stem = scan
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("scan");
    scan.with_file_name(format!("{}_frame.csv", stem))
}

/// Load, preprocess and write one scan. Returns (input, output) point counts.
fn process_file(
    preprocessor: &mut CloudPreprocessor,
    input: &Path,
    output: &Path,
    stamp: f64,
) -> Result<(usize, usize)> {
    let scan = load_scan_csv(input, stamp)
        .with_context(|| format!("Failed to load scan {}", input.display()))?;
    let frame = preprocessor
        .preprocess_scan(&scan)
        .with_context(|| format!("Failed to preprocess {}", input.display()))?;
    write_frame_csv(output, &frame)?;
    Ok((scan.len(), frame.len()))
}

fn cmd_preprocess(
    scan: &Path,
    output: Option<PathBuf>,
    stamp: f64,
    config: &PreprocessorConfig,
) -> Result<()> {
    let start = Instant::now();
    let output = output.unwrap_or_else(|| default_output_path(scan));

    let mut preprocessor =
        CloudPreprocessor::from_config(config).context("Invalid preprocessor configuration")?;

    println!("Preprocessing scan...");
    println!("Input: {}", scan.display());
    println!("Output: {}", output.display());

    let spinner = create_spinner("Sorting, filtering and downsampling...");
    let result = process_file(&mut preprocessor, scan, &output, stamp);
    spinner.finish_and_clear();
    let (input_count, output_count) = result?;

    print_summary(
        "Preprocessing Complete",
        &[
            ("Input file", scan.display().to_string()),
            ("Output file", output.display().to_string()),
            ("Input points", input_count.to_string()),
            ("Output points", output_count.to_string()),
            ("Downsampling", format!("{:?}", config.downsample_mode)),
            ("Resolution", config.downsample_resolution.to_string()),
            ("k", config.k_correspondences.to_string()),
            ("Duration", format!("{:.2?}", start.elapsed())),
        ],
    );
    Ok(())
}

fn cmd_batch(
    input_dir: &Path,
    output_dir: &Path,
    scan_period: f64,
    limit: Option<usize>,
    config: &PreprocessorConfig,
) -> Result<()> {
    let start = Instant::now();

    let mut files = find_scan_files(input_dir)?;
    if let Some(lim) = limit {
        files.truncate(lim);
    }
    if files.is_empty() {
        warn!("No scan CSV files found in {}", input_dir.display());
    }

    println!("Preprocessing scans in batch mode...");
    println!("Input directory: {}", input_dir.display());
    println!("Output directory: {}", output_dir.display());

    // One forked preprocessor per file keeps random grid output independent
    // of thread scheduling
    let mut base =
        CloudPreprocessor::from_config(config).context("Invalid preprocessor configuration")?;
    let workers: Vec<CloudPreprocessor> = files.iter().map(|_| base.fork()).collect();

    let pb = create_progress_bar(files.len());
    let results: Vec<(&PathBuf, Result<(usize, usize)>)> = files
        .par_iter()
        .zip(workers.into_par_iter())
        .enumerate()
        .map(|(i, (path, mut worker))| {
            let name = path.file_name().map(PathBuf::from).unwrap_or_default();
            let output = output_dir.join(default_output_path(&name));
            let result = process_file(&mut worker, path, &output, i as f64 * scan_period);
            pb.inc(1);
            (path, result)
        })
        .collect();
    pb.finish_and_clear();

    let mut total_in = 0usize;
    let mut total_out = 0usize;
    let mut failed = 0usize;
    for (path, result) in &results {
        match result {
            Ok((n_in, n_out)) => {
                total_in += n_in;
                total_out += n_out;
            }
            Err(e) => {
                failed += 1;
                error!("{}: {:#}", path.display(), e);
            }
        }
    }

    print_summary(
        "Batch Preprocessing Complete",
        &[
            ("Input directory", input_dir.display().to_string()),
            ("Output directory", output_dir.display().to_string()),
            ("Scans processed", (results.len() - failed).to_string()),
            ("Scans failed", failed.to_string()),
            ("Input points", total_in.to_string()),
            ("Output points", total_out.to_string()),
            ("Duration", format!("{:.2?}", start.elapsed())),
        ],
    );

    if failed > 0 {
        anyhow::bail!("{} of {} scans failed", failed, results.len());
    }
    Ok(())
}

fn cmd_init_config(path: &Path, config: &PreprocessorConfig) -> Result<()> {
    config
        .to_yaml(path)
        .with_context(|| format!("Failed to write config to {}", path.display()))?;
    println!("Wrote configuration to {}", path.display());
    Ok(())
}
