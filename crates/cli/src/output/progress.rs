//! Batch progress bar
//!
//! [`TransferProgress`] is handed to the engine as its progress observer and
//! advances one step per finished item, whichever worker finished it.

use std::time::Duration;

use ef_core::{ProgressObserver, TransferOutcome};
use indicatif::{ProgressBar, ProgressStyle};

use super::OutputConfig;

const TEMPLATE: &str = "{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} items ({eta}) {msg}";

/// Progress bar wrapper
///
/// In quiet, JSON or no-progress mode nothing is drawn.
#[derive(Debug)]
pub struct TransferProgress {
    bar: Option<ProgressBar>,
}

impl TransferProgress {
    pub fn new(config: &OutputConfig) -> Self {
        let bar = config.progress_enabled().then(|| {
            let bar = ProgressBar::hidden();
            let style = ProgressStyle::with_template(TEMPLATE)
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-");
            bar.set_style(style);
            bar
        });
        Self { bar }
    }

    pub fn is_visible(&self) -> bool {
        self.bar.is_some()
    }

    /// Items finished so far
    pub fn position(&self) -> u64 {
        self.bar.as_ref().map_or(0, ProgressBar::position)
    }
}

impl ProgressObserver for TransferProgress {
    fn on_start(&self, total: usize) {
        if let Some(bar) = &self.bar {
            bar.set_length(total as u64);
            bar.set_position(0);
            bar.set_draw_target(indicatif::ProgressDrawTarget::stderr());
            bar.enable_steady_tick(Duration::from_millis(100));
        }
    }

    fn on_item(&self, outcome: &TransferOutcome) {
        if let Some(bar) = &self.bar {
            if let Some(error) = &outcome.error {
                bar.set_message(format!("item {} failed: {}", outcome.index, error.kind));
            }
            bar.inc(1);
        }
    }

    fn on_finish(&self) {
        if let Some(bar) = &self.bar {
            bar.finish_and_clear();
        }
    }
}
