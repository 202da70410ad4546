//! CLI command definitions and execution
//!
//! Each subcommand lives in its own module with an `Args` struct and an
//! `execute` function returning an [`ExitCode`]. Argument groups shared by
//! several commands (object sources, transfer tuning) are defined here.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use ef_core::{
    BackendKind, Config, ConfigManager, ExecutionBackend, GranuleRecord, ObjectSource,
    TransferConfig, TransferOptions,
};

use crate::exit_code::ExitCode;
use crate::output::{Formatter, OutputConfig};

mod completions;
mod credentials;
mod download;
mod open;
mod plan;

/// ef - Earthdata fetch
///
/// Credential-aware parallel access to cloud-hosted Earth science data.
/// Reads directly from S3 when running in-region and falls back to
/// authenticated HTTPS everywhere else.
#[derive(Parser, Debug)]
#[command(name = "ef")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output format: human-readable or JSON
    #[arg(long, global = true, default_value = "false")]
    pub json: bool,

    /// Disable colored output
    #[arg(long, global = true, default_value = "false")]
    pub no_color: bool,

    /// Disable progress bar
    #[arg(long, global = true, default_value = "false")]
    pub no_progress: bool,

    /// Suppress non-error output
    #[arg(short, long, global = true, default_value = "false")]
    pub quiet: bool,

    /// Enable debug logging
    #[arg(long, global = true, default_value = "false")]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Download objects into a local directory
    Download(download::DownloadArgs),

    /// Open objects for streaming and print their first bytes
    Open(open::OpenArgs),

    /// Show which access method each provider would use
    Plan(plan::PlanArgs),

    /// Print temporary S3 credentials for a provider, DAAC or endpoint
    Credentials(credentials::CredentialsArgs),

    /// Generate shell completions
    Completions(completions::CompletionsArgs),
}

/// Execute the CLI command and return an exit code
pub async fn execute(cli: Cli) -> ExitCode {
    let mut output_config = OutputConfig {
        json: cli.json,
        no_color: cli.no_color,
        no_progress: cli.no_progress,
        quiet: cli.quiet,
    };
    // A broken config file is reported by the command that needs it.
    if let Ok(config) = ConfigManager::new().and_then(|manager| manager.load()) {
        apply_defaults(&mut output_config, &config);
    }

    match cli.command {
        Commands::Download(args) => download::execute(args, output_config).await,
        Commands::Open(args) => open::execute(args, output_config).await,
        Commands::Plan(args) => plan::execute(args, output_config).await,
        Commands::Credentials(args) => credentials::execute(args, output_config).await,
        Commands::Completions(args) => completions::execute(args),
    }
}

/// Flags win; the config file can only turn JSON on and color or progress off
fn apply_defaults(output: &mut OutputConfig, config: &Config) {
    output.json |= config.defaults.output.eq_ignore_ascii_case("json");
    output.no_color |= config.defaults.color.eq_ignore_ascii_case("never");
    output.no_progress |= !config.defaults.progress;
}

/// Where the objects of a batch come from
#[derive(Args, Debug, Default)]
pub struct SourceArgs {
    /// Object links (s3:// or https://)
    pub urls: Vec<String>,

    /// JSON file with granule records (one record or an array)
    #[arg(long, value_name = "FILE")]
    pub records: Vec<PathBuf>,

    /// Provider id or DAAC name for bare links, e.g. POCLOUD
    #[arg(long)]
    pub provider: Option<String>,
}

impl SourceArgs {
    /// Collect sources in the order given: links first, then record files
    pub fn sources(&self) -> anyhow::Result<Vec<ObjectSource>> {
        let mut sources: Vec<ObjectSource> = self
            .urls
            .iter()
            .map(|url| ObjectSource::url(url.as_str(), self.provider.as_deref()))
            .collect();

        for path in &self.records {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let records = parse_records(&content)
                .with_context(|| format!("Invalid granule records in {}", path.display()))?;
            sources.extend(records.into_iter().map(ObjectSource::FromRecord));
        }

        anyhow::ensure!(
            !sources.is_empty(),
            "Nothing to do: pass at least one link or --records file"
        );
        Ok(sources)
    }
}

/// Accept either a single record or an array of records
fn parse_records(content: &str) -> serde_json::Result<Vec<GranuleRecord>> {
    let value: serde_json::Value = serde_json::from_str(content)?;
    if value.is_array() {
        serde_json::from_value(value)
    } else {
        Ok(vec![serde_json::from_value(value)?])
    }
}

/// Batch tuning flags; unset flags fall back to the configuration file
#[derive(Args, Debug, Default)]
pub struct TransferArgs {
    /// Execution backend: sequential, pool or distributed
    #[arg(long)]
    pub backend: Option<String>,

    /// Worker count for the pool and distributed backends
    #[arg(long)]
    pub threads: Option<usize>,

    /// Attempts per item, including the first
    #[arg(long)]
    pub retries: Option<u32>,

    /// Time budget per item attempt, in seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Time budget for the whole batch, in seconds
    #[arg(long, value_name = "SECS")]
    pub batch_timeout: Option<u64>,
}

impl TransferArgs {
    /// Build the backend and options for one batch
    pub fn resolve(
        &self,
        config: &TransferConfig,
    ) -> ef_core::Result<(Arc<dyn ExecutionBackend>, TransferOptions)> {
        let kind: BackendKind = self
            .backend
            .as_deref()
            .unwrap_or(config.backend.as_str())
            .parse()?;
        let threads = self.threads.unwrap_or(config.threads);

        let mut options = TransferOptions::from(config);
        if let Some(retries) = self.retries {
            options.retry.max_attempts = retries.max(1);
        }
        if let Some(secs) = self.timeout {
            options.per_item_timeout = Some(Duration::from_secs(secs));
        }
        if let Some(secs) = self.batch_timeout {
            options.batch_timeout = Some(Duration::from_secs(secs));
        }

        tracing::debug!(backend = %kind, threads, "Execution backend selected");
        Ok((kind.build(threads), options))
    }
}

/// Load the configuration file, reporting failures as usage errors
pub(crate) fn load_config(formatter: &Formatter) -> Result<Config, ExitCode> {
    ConfigManager::new()
        .and_then(|manager| manager.load())
        .map_err(|e| {
            formatter.error(&format!("Failed to load configuration: {e}"));
            ExitCode::UsageError
        })
}

/// Report a batch-level library error and pick its exit code
pub(crate) fn fail(formatter: &Formatter, error: &ef_core::Error) -> ExitCode {
    formatter.error(&error.to_string());
    ExitCode::from_error(error)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_download() {
        let cli = Cli::try_parse_from([
            "ef",
            "--json",
            "download",
            "s3://bucket/a.nc",
            "https://host/b.nc",
            "-o",
            "/tmp/out",
            "--provider",
            "POCLOUD",
            "--backend",
            "distributed",
            "--threads",
            "4",
            "--overwrite",
        ])
        .unwrap();
        assert!(cli.json);
        let Commands::Download(args) = cli.command else {
            panic!("expected download");
        };
        assert_eq!(args.source.urls.len(), 2);
        assert_eq!(args.source.provider.as_deref(), Some("POCLOUD"));
        assert_eq!(args.transfer.threads, Some(4));
        assert!(args.overwrite);
    }

    #[test]
    fn test_config_defaults_merge_with_flags() {
        let mut config = Config::default();
        config.defaults.output = "json".into();
        config.defaults.progress = false;

        let mut output = OutputConfig::default();
        apply_defaults(&mut output, &config);
        assert!(output.json);
        assert!(output.no_progress);
        assert!(!output.no_color);

        let mut output = OutputConfig {
            no_color: true,
            ..Default::default()
        };
        apply_defaults(&mut output, &Config::default());
        assert!(output.no_color);
        assert!(!output.json);
        assert!(!output.no_progress);
    }

    #[test]
    fn test_sources_from_links_and_records() {
        let dir = tempfile::TempDir::new().unwrap();
        let records = dir.path().join("granules.json");
        std::fs::write(
            &records,
            r#"[{
                "concept_id": "G1-POCLOUD",
                "provider": "POCLOUD",
                "cloud_hosted": true,
                "related_urls": [
                    {"URL": "s3://podaac/a.nc", "Type": "GET DATA VIA DIRECT ACCESS"},
                    {"URL": "https://archive/podaac/a.nc", "Type": "GET DATA"}
                ]
            }]"#,
        )
        .unwrap();

        let args = SourceArgs {
            urls: vec!["https://host/b.nc".into()],
            records: vec![records],
            provider: Some("LPCLOUD".into()),
        };
        let sources = args.sources().unwrap();
        assert_eq!(sources.len(), 2);
        assert_eq!(sources[0], ObjectSource::url("https://host/b.nc", Some("LPCLOUD")));
        assert!(matches!(&sources[1], ObjectSource::FromRecord(r) if r.concept_id == "G1-POCLOUD"));
    }

    #[test]
    fn test_single_record_object_accepted() {
        let records =
            parse_records(r#"{"concept_id": "G2-NSIDC_CPRD", "provider": "NSIDC_CPRD"}"#).unwrap();
        assert_eq!(records.len(), 1);
        assert!(records[0].related_urls.is_empty());
    }

    #[test]
    fn test_empty_sources_rejected() {
        let err = SourceArgs::default().sources().unwrap_err();
        assert!(err.to_string().contains("Nothing to do"));

        let missing = SourceArgs {
            records: vec![PathBuf::from("/nonexistent/records.json")],
            ..Default::default()
        };
        assert!(format!("{:#}", missing.sources().unwrap_err()).contains("Failed to read"));
    }

    #[test]
    fn test_transfer_args_override_config() {
        let args = TransferArgs {
            backend: Some("sequential".into()),
            retries: Some(0),
            timeout: Some(30),
            ..Default::default()
        };
        let (backend, options) = args.resolve(&TransferConfig::default()).unwrap();
        assert_eq!(backend.kind(), BackendKind::Sequential);
        assert_eq!(options.retry.max_attempts, 1);
        assert_eq!(options.per_item_timeout, Some(Duration::from_secs(30)));
        assert_eq!(options.batch_timeout, None);
    }

    #[test]
    fn test_transfer_args_default_to_config() {
        let config = TransferConfig {
            backend: "distributed".into(),
            threads: 3,
            ..TransferConfig::default()
        };
        let (backend, _) = TransferArgs::default().resolve(&config).unwrap();
        assert_eq!(backend.kind(), BackendKind::Distributed);
        assert_eq!(backend.workers(), 3);
    }

    #[test]
    fn test_unknown_backend_is_usage_error() {
        let args = TransferArgs {
            backend: Some("gpu".into()),
            ..Default::default()
        };
        let err = args.resolve(&TransferConfig::default()).err().unwrap();
        assert_eq!(ExitCode::from_error(&err), ExitCode::UsageError);
    }
}
