//! Chunked CSV sweep tool
//!
//! Generates synthetic training files and measures how fast a chunked
//! reader can feed them to a minibatch loop.
//!
//! # Usage
//!
//! ```bash
//! # Write 200000 rows of 151 columns
//! csv-sweep generate --output train.csv --rows 200000 --columns 151
//!
//! # Sweep the file once in minibatches of 128 samples
//! csv-sweep sweep --input train.csv --streams x:150,y:1
//!
//! # Use a configuration file and resume a saved position
//! csv-sweep sweep --input train.csv --config reader.toml --resume sweep.state
//! ```

use std::path::{Path, PathBuf};
use std::time::Instant;

use clap::{Args, Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use chunked_csv::config::StorageConfig;
use chunked_csv::{
    ChunkReader, LocalStorage, ReaderConfig, SequenceChunk, StorageBackend, StreamSpec, Sweep,
    SweepItem, SweepState,
};

/// Minibatches between throughput reports.
const REPORT_INTERVAL: u64 = 10;

/// Chunked CSV sweep tool
#[derive(Parser, Debug)]
#[command(name = "csv-sweep")]
#[command(about = "Generate and sweep chunked CSV training files")]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Write a synthetic CSV file where every column of row i equals i
    Generate(GenerateArgs),
    /// Read a CSV file in minibatches and report throughput
    Sweep(SweepArgs),
}

#[derive(Args, Debug)]
struct GenerateArgs {
    /// Output file path
    #[arg(short, long)]
    output: PathBuf,

    /// Number of rows
    #[arg(long, default_value = "200000")]
    rows: u64,

    /// Number of columns per row
    #[arg(long, default_value = "151")]
    columns: usize,
}

#[derive(Args, Debug)]
struct SweepArgs {
    /// Input CSV file, relative to the storage base path
    #[arg(short, long)]
    input: PathBuf,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Streams in column order, e.g. "x:150,y:1"
    #[arg(long)]
    streams: Option<String>,

    /// Nominal chunk size in bytes
    #[arg(long)]
    chunk_size: Option<u64>,

    /// Samples per minibatch
    #[arg(short, long, default_value = "128")]
    minibatch_size: usize,

    /// Rank of this worker
    #[arg(long)]
    worker_rank: Option<usize>,

    /// Number of workers sharing the file
    #[arg(long)]
    workers: Option<usize>,

    /// Number of passes over the file
    #[arg(long)]
    max_sweeps: Option<usize>,

    /// Resume from a saved sweep state
    #[arg(long)]
    resume: Option<PathBuf>,

    /// Write the final sweep state to this file
    #[arg(long)]
    save_state: Option<PathBuf>,
}

/// Outcome of a sweep run.
#[derive(Debug, Default, PartialEq, Eq)]
struct SweepSummary {
    samples: u64,
    minibatches: u64,
    sweeps: u64,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = tracing_subscriber::filter::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::filter::EnvFilter::new(&cli.log_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    match cli.command {
        Command::Generate(args) => {
            let started = Instant::now();
            generate(&args.output, args.rows, args.columns)?;
            tracing::info!(
                "Generated {} rows of {} columns in {:.2}s",
                args.rows,
                args.columns,
                started.elapsed().as_secs_f64()
            );
        }
        Command::Sweep(args) => {
            let config = build_config(&args)?;
            let summary = sweep(&config, &args)?;
            tracing::info!("Total number of samples {}", summary.samples);
        }
    }

    Ok(())
}

/// Writes `rows` fully quoted records of `columns` fields each.
fn generate(output: &Path, rows: u64, columns: usize) -> Result<(), Box<dyn std::error::Error>> {
    if columns == 0 {
        return Err("column count must be greater than 0".into());
    }

    let storage = LocalStorage::new(&StorageConfig::default())?;
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .quote_style(csv::QuoteStyle::Always)
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(storage.open_write(output)?);

    let mut record = vec![String::new(); columns];
    for row in 0..rows {
        let value = format!("{row}.0");
        record.iter_mut().for_each(|field| field.clone_from(&value));
        writer.write_record(&record)?;

        if (row + 1) % 100_000 == 0 {
            tracing::info!("{} records generated", row + 1);
        }
    }

    writer.flush()?;
    let output = writer.into_inner().map_err(|e| e.into_error())?;
    output.finish()?;
    Ok(())
}

/// Layers the configuration file, `CSVCHUNK_*` variables and flags.
fn build_config(args: &SweepArgs) -> Result<ReaderConfig, Box<dyn std::error::Error>> {
    let mut config = match &args.config {
        Some(path) => ReaderConfig::from_file(path)?,
        None => ReaderConfig::default(),
    }
    .with_env_overrides();

    if let Some(streams) = &args.streams {
        config.streams = streams
            .split(',')
            .map(str::parse)
            .collect::<chunked_csv::Result<Vec<StreamSpec>>>()?;
    }
    if config.streams.is_empty() {
        config.streams = vec![StreamSpec::new("x", [150]), StreamSpec::new("y", [1])];
    }
    if let Some(chunk_size) = args.chunk_size {
        config.chunking.chunk_size = chunk_size;
    }
    if let Some(rank) = args.worker_rank {
        config.sweep.worker_rank = rank;
    }
    if let Some(workers) = args.workers {
        config.sweep.number_of_workers = workers;
    }
    if let Some(max_sweeps) = args.max_sweeps {
        config.sweep.max_sweeps = max_sweeps;
    }

    config.validate()?;
    Ok(config)
}

/// Runs the sweep, assembling minibatches of per-stream sample buffers.
fn sweep(config: &ReaderConfig, args: &SweepArgs) -> Result<SweepSummary, Box<dyn std::error::Error>> {
    if args.minibatch_size == 0 {
        return Err("minibatch size must be greater than 0".into());
    }

    let reader = ChunkReader::from_config(config, &args.input)?;
    tracing::info!(
        "Sweeping {} ({} bytes, {} chunks) as worker {}/{}",
        args.input.display(),
        reader.file_size(),
        reader.chunk_count(),
        config.sweep.worker_rank,
        config.sweep.number_of_workers
    );

    let mut sweep = Sweep::new(reader, &config.sweep)?;
    if let Some(path) = &args.resume {
        let bytes = std::fs::read(path)?;
        sweep.restore(SweepState::from_bytes(&bytes)?)?;
        tracing::info!("Resumed from {}", path.display());
    }

    let stream_count = config.streams.len();
    let mut buffers: Vec<Vec<f32>> = vec![Vec::new(); stream_count];
    let mut pending = 0usize;

    let mut summary = SweepSummary::default();
    let mut interval_samples = 0u64;
    let mut interval_start = Instant::now();

    while let Some(item) = sweep.next_item()? {
        let flush = match item {
            SweepItem::Sequence(info) => {
                if let Some(chunk) = sweep.current_chunk() {
                    for (buffer, fields) in buffers.iter_mut().zip(chunk.sequence(info.index_in_chunk)) {
                        buffer.extend_from_slice(fields);
                    }
                    pending += 1;
                }
                pending == args.minibatch_size
            }
            SweepItem::EndOfSweep => {
                summary.sweeps += 1;
                pending > 0
            }
        };

        if !flush {
            continue;
        }

        summary.minibatches += 1;
        summary.samples += pending as u64;
        interval_samples += pending as u64;
        pending = 0;
        buffers.iter_mut().for_each(Vec::clear);

        if summary.minibatches % REPORT_INTERVAL == 0 {
            let elapsed = interval_start.elapsed().as_secs_f64();
            if elapsed > 0.0 {
                tracing::info!(
                    "Number of samples per second {:.2}",
                    interval_samples as f64 / elapsed
                );
            }
            interval_samples = 0;
            interval_start = Instant::now();
        }
    }

    if let Some(path) = &args.save_state {
        std::fs::write(path, sweep.state().to_bytes()?)?;
        tracing::info!("Saved sweep state to {}", path.display());
    }

    Ok(summary)
}
