//! Display sinks updated by the coordinator's listener.
//!
//! Decouples aggregation from the terminal (indicatif).

use crate::config::DisplayConfig;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

/// A progress display owned by exactly one listener.
pub trait ProgressSink: Send + 'static {
    /// Advance the displayed position by `n` units.
    fn advance(&mut self, n: u64);

    /// Called each time another worker signals completion.
    fn workers_completed(&mut self, _completed: u64, _expected: u64) {}

    /// Final call; no updates follow.
    fn close(&mut self);
}

/// Terminal progress bar.
pub struct IndicatifSink {
    bar: ProgressBar,
    description: String,
}

impl IndicatifSink {
    /// A bar drawn on stderr.
    pub fn new(total: u64, description: &str) -> Self {
        let target = ProgressDrawTarget::stderr_with_hz(DisplayConfig::REFRESH_RATE_HZ);
        Self::with_target(total, description, target)
    }

    /// A bar that tracks state without drawing anything.
    pub fn hidden(total: u64, description: &str) -> Self {
        Self::with_target(total, description, ProgressDrawTarget::hidden())
    }

    fn with_target(total: u64, description: &str, target: ProgressDrawTarget) -> Self {
        let bar = ProgressBar::with_draw_target(Some(total), target);
        bar.set_style(
            ProgressStyle::with_template(DisplayConfig::BAR_TEMPLATE)
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars(DisplayConfig::PROGRESS_CHARS),
        );
        bar.set_message(description.to_string());
        Self {
            bar,
            description: description.to_string(),
        }
    }

    /// Current displayed position.
    pub fn position(&self) -> u64 {
        self.bar.position()
    }
}

impl ProgressSink for IndicatifSink {
    fn advance(&mut self, n: u64) {
        self.bar.inc(n);
    }

    fn workers_completed(&mut self, completed: u64, expected: u64) {
        self.bar.set_message(format!(
            "{} ({}/{} workers)",
            self.description, completed, expected
        ));
    }

    fn close(&mut self) {
        self.bar.finish();
    }
}
