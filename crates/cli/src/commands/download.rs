//! download command - Fetch objects into a local directory
//!
//! Resolves an access plan per provider, runs the batch on the chosen
//! backend and reports one line per failed item plus a summary.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Args;
use ef_core::{TransferOutput, TransferResult};
use serde::Serialize;

use super::{fail, load_config, SourceArgs, TransferArgs};
use crate::exit_code::ExitCode;
use crate::output::{Formatter, OutputConfig, TransferProgress};

/// Download objects
#[derive(Args, Debug)]
pub struct DownloadArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    /// Directory to write files into (created if missing)
    #[arg(short = 'o', long = "output-dir", default_value = ".")]
    pub output_dir: PathBuf,

    /// Download again even if the file already exists
    #[arg(long)]
    pub overwrite: bool,

    #[command(flatten)]
    pub transfer: TransferArgs,
}

/// Counts over one finished batch
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub total: usize,
    pub downloaded: usize,
    pub skipped: usize,
    pub failed: usize,
    pub bytes: u64,
}

impl BatchSummary {
    pub fn from_results(results: &[TransferResult]) -> Self {
        let mut summary = Self {
            total: results.len(),
            ..Self::default()
        };
        for result in results {
            match (&result.output, &result.error) {
                (_, Some(_)) => summary.failed += 1,
                (Some(TransferOutput::File { skipped: true, .. }), None) => summary.skipped += 1,
                (Some(TransferOutput::File { bytes, .. }), None) => {
                    summary.downloaded += 1;
                    summary.bytes += bytes;
                }
                (_, None) => summary.downloaded += 1,
            }
        }
        summary
    }

    pub fn exit_code(&self) -> ExitCode {
        if self.failed == 0 {
            ExitCode::Success
        } else {
            ExitCode::PartialFailure
        }
    }
}

impl fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} items: {} downloaded ({}), {} skipped, {} failed",
            self.total,
            self.downloaded,
            humansize::format_size(self.bytes, humansize::BINARY),
            self.skipped,
            self.failed
        )
    }
}

#[derive(Debug, Serialize)]
struct DownloadOutput<'a> {
    results: &'a [TransferResult],
    summary: &'a BatchSummary,
}

/// Execute the download command
pub async fn execute(args: DownloadArgs, output_config: OutputConfig) -> ExitCode {
    let formatter = Formatter::new(output_config.clone());

    let sources = match args.source.sources() {
        Ok(sources) => sources,
        Err(e) => {
            formatter.error(&format!("{e:#}"));
            return ExitCode::UsageError;
        }
    };

    let config = match load_config(&formatter) {
        Ok(config) => config,
        Err(code) => return code,
    };

    let (backend, mut options) = match args.transfer.resolve(&config.transfer) {
        Ok(resolved) => resolved,
        Err(e) => return fail(&formatter, &e),
    };
    options.overwrite_existing = args.overwrite;
    options.show_progress = output_config.progress_enabled();

    let access = match ef_s3::login(&config) {
        Ok(access) => access.with_observer(Arc::new(TransferProgress::new(&output_config))),
        Err(e) => return fail(&formatter, &e),
    };

    let outcome = access
        .download(sources, &args.output_dir, backend.as_ref(), &options)
        .await;
    backend.shutdown().await;

    let results = match outcome {
        Ok(results) => results,
        Err(e) => return fail(&formatter, &e),
    };
    let summary = BatchSummary::from_results(&results);

    if formatter.is_json() {
        formatter.json(&DownloadOutput {
            results: &results,
            summary: &summary,
        });
        return summary.exit_code();
    }

    for result in &results {
        match (&result.error, &result.output) {
            (Some(error), _) => {
                formatter.error(&format!("{}: {error}", result.object.display_url()));
            }
            (None, Some(TransferOutput::File { path, skipped: true, .. })) => {
                formatter.println(&formatter.dim(&format!("{} (already present)", path.display())));
            }
            (None, Some(TransferOutput::File { path, bytes, .. })) => {
                formatter.println(&format!(
                    "{} ({})",
                    path.display(),
                    humansize::format_size(*bytes, humansize::BINARY)
                ));
            }
            (None, _) => {}
        }
    }

    if summary.failed == 0 {
        formatter.success(&summary.to_string());
    } else {
        formatter.warning(&summary.to_string());
    }
    summary.exit_code()
}
