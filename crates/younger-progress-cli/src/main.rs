//! Younger Progress - multi-process workload runner.
//!
//! `run` splits a workload into chunks and spawns one copy of this binary per
//! chunk as a `worker`, showing a single aggregated progress bar. Workers find
//! the coordinator's progress channel through their environment.

mod coordinator;
mod worker;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::time::Duration;
use tracing::{debug, Level};
use tracing_subscriber::FmtSubscriber;
use younger_progress::config::{BatchingConfig, DisplayConfig};

#[derive(Parser, Debug)]
#[command(name = "younger-progress")]
#[command(about = "Run a chunked workload across worker processes with aggregated progress")]
struct Args {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Split the workload and coordinate worker processes
    Run {
        /// Number of work items
        #[arg(long)]
        total: u64,

        /// Number of worker processes (one chunk each)
        #[arg(long, default_value = "4")]
        workers: u64,

        /// Flush interval as a percentage of the total
        #[arg(long, default_value_t = BatchingConfig::DEFAULT_PERCENT)]
        percent: f64,

        /// Progress bar label
        #[arg(long, default_value = DisplayConfig::DEFAULT_DESCRIPTION)]
        description: String,

        /// Simulated work per item, in milliseconds
        #[arg(long, default_value = "0")]
        delay_ms: u64,

        /// Give up after this many seconds without any progress message
        #[arg(long)]
        stall_timeout_secs: Option<u64>,

        /// Make the worker with this index fail halfway through its chunk
        #[arg(long)]
        fail_worker: Option<usize>,

        /// Do not draw a progress bar
        #[arg(long)]
        hidden: bool,

        /// Print the run summary as JSON on stdout
        #[arg(long)]
        json: bool,
    },

    /// Process one chunk and report progress to the coordinator
    #[command(hide = true)]
    Worker {
        /// First item of the chunk
        #[arg(long)]
        start: u64,

        /// One past the last item of the chunk
        #[arg(long)]
        end: u64,

        /// Simulated work per item, in milliseconds
        #[arg(long, default_value = "0")]
        delay_ms: u64,

        /// Panic when reaching this item
        #[arg(long)]
        panic_at: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Logs go to stderr so they stay out of the JSON summary
    let log_level = if args.debug { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .init();

    match args.command {
        Command::Run {
            total,
            workers,
            percent,
            description,
            delay_ms,
            stall_timeout_secs,
            fail_worker,
            hidden,
            json,
        } => {
            let options = coordinator::RunOptions {
                total,
                workers,
                percent,
                description,
                delay: Duration::from_millis(delay_ms),
                stall_timeout: stall_timeout_secs.map(Duration::from_secs),
                fail_worker,
                hidden,
                debug: args.debug,
            };
            let summary = coordinator::run(options).await?;

            if json {
                println!("{}", serde_json::to_string(&summary)?);
            } else {
                println!(
                    "{} / {} items reported, {} / {} workers completed ({:?})",
                    summary.report.displayed_total,
                    total,
                    summary.report.completed_workers,
                    summary.report.expected_workers,
                    summary.report.exit
                );
            }

            summary.ensure_success()
        }
        Command::Worker {
            start,
            end,
            delay_ms,
            panic_at,
        } => {
            let options = worker::WorkerOptions {
                items: start..end,
                delay: Duration::from_millis(delay_ms),
                panic_at,
            };
            debug!("Worker {} handling {:?}", std::process::id(), options.items);
            tokio::task::spawn_blocking(move || worker::run(options)).await?
        }
    }
}
