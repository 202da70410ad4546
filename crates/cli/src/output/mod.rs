//! Output formatting utilities
//!
//! Human-readable and JSON output, plan tables, and the transfer progress bar.

mod formatter;
mod progress;

pub use formatter::Formatter;
pub use progress::TransferProgress;

/// Output configuration derived from CLI flags
#[derive(Debug, Clone, Default)]
pub struct OutputConfig {
    /// Use JSON output format
    pub json: bool,
    /// Disable colored output
    pub no_color: bool,
    /// Disable progress bar
    pub no_progress: bool,
    /// Suppress non-error output
    pub quiet: bool,
}

impl OutputConfig {
    /// Whether a progress bar may be drawn at all
    pub fn progress_enabled(&self) -> bool {
        !(self.json || self.quiet || self.no_progress)
    }
}
