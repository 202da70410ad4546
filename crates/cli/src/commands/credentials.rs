//! credentials command - Print temporary S3 credentials
//!
//! The credential goes to stdout as JSON and is never written to disk.

use clap::Args;
use ef_core::Scope;
use serde::Serialize;

use super::{fail, load_config};
use crate::exit_code::ExitCode;
use crate::output::{Formatter, OutputConfig};

/// Print temporary S3 credentials
#[derive(Args, Debug)]
pub struct CredentialsArgs {
    /// Provider id (POCLOUD), DAAC name (PODAAC) or s3credentials endpoint URL
    pub scope: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CredentialsOutput {
    access_key_id: String,
    secret_access_key: String,
    session_token: String,
    expiration: String,
    region: String,
}

/// Execute the credentials command
pub async fn execute(args: CredentialsArgs, output_config: OutputConfig) -> ExitCode {
    let formatter = Formatter::new(output_config);

    let scope = Scope::for_name(&args.scope);
    let config = match load_config(&formatter) {
        Ok(config) => config,
        Err(code) => return code,
    };
    let access = match ef_s3::login(&config) {
        Ok(access) => access,
        Err(e) => return fail(&formatter, &e),
    };

    let credential = match access.credentials().acquire(&scope).await {
        Ok(credential) => credential,
        Err(e) => return fail(&formatter, &e),
    };
    tracing::debug!(%scope, credential = ?credential, "Credential issued");

    // Always JSON: this output is meant to be piped into other tools.
    formatter.json(&CredentialsOutput {
        expiration: credential.expires_at.to_string(),
        access_key_id: credential.access_key_id,
        secret_access_key: credential.secret_access_key,
        session_token: credential.session_token,
        region: credential.region,
    });
    ExitCode::Success
}
