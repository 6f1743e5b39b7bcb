//! Coordinator side of a multi-process run.

use anyhow::{bail, Context, Result};
use serde::Serialize;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::process::{Child, Command};
use tracing::{info, warn};
use younger_progress::{split_even, ListenerReport, ProgressManager};

/// Options for a coordinated run.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub total: u64,
    pub workers: u64,
    pub percent: f64,
    pub description: String,
    pub delay: Duration,
    pub stall_timeout: Option<Duration>,
    pub fail_worker: Option<usize>,
    pub hidden: bool,
    pub debug: bool,
}

/// Outcome of a run, printed once the listener has closed.
#[derive(Debug, Serialize)]
pub struct RunSummary {
    #[serde(flatten)]
    pub report: ListenerReport,
    pub interval: u64,
    pub failed_workers: usize,
    pub interrupted: bool,
}

impl RunSummary {
    /// Turn worker failures or an interrupted run into an error exit.
    pub fn ensure_success(&self) -> Result<()> {
        if self.interrupted {
            bail!("run interrupted before all workers finished");
        }
        if self.failed_workers > 0 {
            bail!("{} worker(s) failed", self.failed_workers);
        }
        Ok(())
    }
}

enum Outcome {
    Finished { failed: usize },
    Interrupted,
}

pub async fn run(options: RunOptions) -> Result<RunSummary> {
    let chunks = split_even(options.total, options.workers)?;

    let mut manager = ProgressManager::new(options.percent)?;
    if let Some(timeout) = options.stall_timeout {
        manager = manager.with_stall_timeout(timeout);
    }
    if options.hidden {
        manager = manager.hidden();
    }

    let run = manager
        .run(options.total, chunks.len() as u64, &options.description)
        .await?;
    let handle = run.handle().clone();
    let stop = run.stop_token();

    // The listener is finished on every path out of the worker pool
    let (outcome, report) = run
        .finish_after(async move {
            let (env_name, env_value) = handle.to_env()?;
            let exe = std::env::current_exe().context("cannot locate own executable")?;

            let mut children = Vec::with_capacity(chunks.len());
            for (index, chunk) in chunks.iter().enumerate() {
                let mut command = Command::new(&exe);
                command
                    .arg("worker")
                    .arg("--start")
                    .arg(chunk.start.to_string())
                    .arg("--end")
                    .arg(chunk.end.to_string())
                    .arg("--delay-ms")
                    .arg(options.delay.as_millis().to_string())
                    .env(env_name, &env_value)
                    .stdin(Stdio::null())
                    .stdout(Stdio::null())
                    .kill_on_drop(true);
                if options.fail_worker == Some(index) {
                    command
                        .arg("--panic-at")
                        .arg((chunk.start + (chunk.end - chunk.start) / 2).to_string());
                }
                if options.debug {
                    command.arg("--debug");
                }

                let child = command
                    .spawn()
                    .with_context(|| format!("failed to spawn worker {}", index))?;
                children.push(child);
            }
            info!("Spawned {} workers", children.len());

            let outcome = tokio::select! {
                statuses = wait_all(children) => {
                    let failed = statuses?
                        .iter()
                        .enumerate()
                        .filter(|(index, status)| {
                            if !status.success() {
                                warn!("Worker {} exited with {}", index, status);
                            }
                            !status.success()
                        })
                        .count();
                    Outcome::Finished { failed }
                }
                _ = tokio::signal::ctrl_c() => {
                    // Dropping the children kills them
                    warn!("Interrupted, stopping workers");
                    stop.cancel();
                    Outcome::Interrupted
                }
            };
            Ok::<_, anyhow::Error>(outcome)
        })
        .await?;

    let interval = manager.interval();

    let (failed_workers, interrupted) = match outcome {
        Outcome::Finished { failed } => (failed, false),
        Outcome::Interrupted => (0, true),
    };

    Ok(RunSummary {
        report,
        interval,
        failed_workers,
        interrupted,
    })
}

async fn wait_all(children: Vec<Child>) -> Result<Vec<ExitStatus>> {
    let mut statuses = Vec::with_capacity(children.len());
    for mut child in children {
        statuses.push(child.wait().await.context("failed to wait for worker")?);
    }
    Ok(statuses)
}
