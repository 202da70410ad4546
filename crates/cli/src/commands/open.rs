//! open command - Open objects as streams
//!
//! Opens every object with the batch engine, then reads the first bytes of
//! each stream through the session the engine chose (S3 or HTTPS).

use std::sync::Arc;

use clap::Args;
use ef_core::{AccessMethod, ObjectStream, StreamResult};
use serde::Serialize;

use super::{fail, load_config, SourceArgs, TransferArgs};
use crate::exit_code::ExitCode;
use crate::output::{Formatter, OutputConfig, TransferProgress};

/// Open objects and print their first bytes
#[derive(Args, Debug)]
pub struct OpenArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    /// Bytes to read from the start of each object
    #[arg(long, default_value = "16")]
    pub bytes: u64,

    #[command(flatten)]
    pub transfer: TransferArgs,
}

#[derive(Debug, Serialize)]
struct OpenOutput {
    url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    method: Option<AccessMethod>,
    #[serde(skip_serializing_if = "Option::is_none")]
    size_bytes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    record_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    head: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// Space-separated lowercase hex
fn hex_preview(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{b:02x}"))
        .collect::<Vec<_>>()
        .join(" ")
}

async fn inspect(mut stream: ObjectStream, bytes: u64) -> OpenOutput {
    let head = stream.read(bytes).await;
    stream.close();
    let (head, error) = match head {
        Ok(data) => (Some(hex_preview(&data)), None),
        Err(e) => (None, Some(e.to_string())),
    };
    OpenOutput {
        url: stream.url().to_string(),
        method: Some(stream.method()),
        size_bytes: Some(stream.size()),
        record_id: stream.record_id().map(str::to_string),
        head,
        error,
    }
}

/// Execute the open command
pub async fn execute(args: OpenArgs, output_config: OutputConfig) -> ExitCode {
    let formatter = Formatter::new(output_config.clone());

    let sources = match args.source.sources() {
        Ok(sources) => sources,
        Err(e) => {
            formatter.error(&format!("{e:#}"));
            return ExitCode::UsageError;
        }
    };
    let objects = match ef_core::object::expand_sources(sources.clone()) {
        Ok(objects) => objects,
        Err(e) => return fail(&formatter, &e),
    };

    let config = match load_config(&formatter) {
        Ok(config) => config,
        Err(code) => return code,
    };
    let (backend, mut options) = match args.transfer.resolve(&config.transfer) {
        Ok(resolved) => resolved,
        Err(e) => return fail(&formatter, &e),
    };
    options.show_progress = output_config.progress_enabled();

    let access = match ef_s3::login(&config) {
        Ok(access) => access.with_observer(Arc::new(TransferProgress::new(&output_config))),
        Err(e) => return fail(&formatter, &e),
    };

    let opened = access.open(sources, backend.as_ref(), &options).await;
    backend.shutdown().await;
    let opened: Vec<StreamResult> = match opened {
        Ok(opened) => opened,
        Err(e) => return fail(&formatter, &e),
    };

    let mut outputs = Vec::with_capacity(opened.len());
    for (position, result) in opened.into_iter().enumerate() {
        let output = match result {
            Ok(stream) => inspect(stream, args.bytes).await,
            Err(error) => OpenOutput {
                url: objects
                    .get(position)
                    .map(|o| o.display_url().to_string())
                    .unwrap_or_default(),
                method: None,
                size_bytes: None,
                record_id: None,
                head: None,
                error: Some(error.to_string()),
            },
        };
        outputs.push(output);
    }

    let failed = outputs.iter().filter(|o| o.error.is_some()).count();

    if formatter.is_json() {
        formatter.json(&outputs);
    } else {
        for output in &outputs {
            match (&output.error, &output.head) {
                (Some(error), _) => formatter.error(&format!("{}: {error}", output.url)),
                (None, head) => {
                    let detail = format!(
                        "{}, {}",
                        output.method.map(|m| m.to_string()).unwrap_or_default(),
                        humansize::format_size(output.size_bytes.unwrap_or(0), humansize::BINARY)
                    );
                    formatter.println(&format!("{} {}", output.url, formatter.dim(&detail)));
                    formatter.println(&format!("  {}", head.as_deref().unwrap_or("")));
                }
            }
        }
    }

    if failed == 0 {
        ExitCode::Success
    } else {
        ExitCode::PartialFailure
    }
}
