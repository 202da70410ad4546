//! Earthdata Login identity provider
//!
//! Obtains a bearer token from Earthdata Login (or uses one supplied by the
//! user) and exchanges it at a data center's `s3credentials` endpoint for
//! temporary S3 credentials.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use jiff::Timestamp;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tokio::sync::Mutex;

use ef_core::config::{AuthConfig, LoginStrategy};
use ef_core::scope::DEFAULT_REGION;
use ef_core::{Credential, EndpointOverride, Error, HttpAuth, IdentityProvider, Result, Scope};

/// Environment variable holding a ready-made bearer token
pub const TOKEN_ENV: &str = "EARTHDATA_TOKEN";
/// Environment variable holding the Earthdata Login username
pub const USERNAME_ENV: &str = "EARTHDATA_USERNAME";
/// Environment variable holding the Earthdata Login password
pub const PASSWORD_ENV: &str = "EARTHDATA_PASSWORD";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// What the user logs in with
#[derive(Clone, PartialEq, Eq)]
pub enum LoginMaterial {
    Token(String),
    Basic { username: String, password: String },
}

impl std::fmt::Debug for LoginMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoginMaterial::Token(_) => f.write_str("Token(<redacted>)"),
            LoginMaterial::Basic { username, .. } => f
                .debug_struct("Basic")
                .field("username", username)
                .field("password", &"<redacted>")
                .finish(),
        }
    }
}

/// Find login material for `strategy`.
///
/// `env` looks up environment variables; `netrc` is the netrc file to read.
pub fn resolve_login(
    strategy: LoginStrategy,
    host: &str,
    env: impl Fn(&str) -> Option<String>,
    netrc: Option<&Path>,
) -> Result<LoginMaterial> {
    let token = || env(TOKEN_ENV).filter(|t| !t.is_empty()).map(LoginMaterial::Token);
    let basic_from_env = || match (env(USERNAME_ENV), env(PASSWORD_ENV)) {
        (Some(username), Some(password)) if !username.is_empty() => {
            Some(LoginMaterial::Basic { username, password })
        }
        _ => None,
    };
    let basic_from_netrc = || -> Result<Option<LoginMaterial>> {
        let Some(path) = netrc else {
            return Ok(None);
        };
        Ok(ef_core::netrc::lookup(path, host)?.map(|entry| LoginMaterial::Basic {
            username: entry.login,
            password: entry.password,
        }))
    };

    let found = match strategy {
        LoginStrategy::Token => token(),
        LoginStrategy::Netrc => basic_from_netrc()?,
        LoginStrategy::Environment => match token().or_else(basic_from_env) {
            Some(material) => Some(material),
            None => basic_from_netrc()?,
        },
    };

    found.ok_or_else(|| {
        Error::Auth(match strategy {
            LoginStrategy::Token => format!("{TOKEN_ENV} is not set"),
            LoginStrategy::Netrc => format!("No netrc entry for {host}"),
            LoginStrategy::Environment => format!(
                "No Earthdata Login credentials: set {TOKEN_ENV}, or {USERNAME_ENV} and {PASSWORD_ENV}, or add {host} to your netrc"
            ),
        })
    })
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct S3CredentialsResponse {
    access_key_id: String,
    secret_access_key: String,
    session_token: String,
    expiration: String,
}

/// Parse an `s3credentials` response body
pub fn parse_s3_credentials(body: &str) -> Result<Credential> {
    let response: S3CredentialsResponse = serde_json::from_str(body)?;
    // Endpoints answer with "2024-05-01 12:00:00+00:00".
    let expires_at: Timestamp = response
        .expiration
        .trim()
        .replacen(' ', "T", 1)
        .parse()
        .map_err(|e| Error::General(format!("Invalid credential expiration '{}': {e}", response.expiration)))?;

    Ok(Credential::new(
        response.access_key_id,
        response.secret_access_key,
        response.session_token,
        expires_at,
        DEFAULT_REGION,
    ))
}

/// Earthdata Login client
pub struct EarthdataLogin {
    client: Client,
    host: String,
    material: LoginMaterial,
    endpoints: Vec<EndpointOverride>,
    token: Mutex<Option<String>>,
}

impl EarthdataLogin {
    pub fn new(
        host: impl Into<String>,
        material: LoginMaterial,
        endpoints: Vec<EndpointOverride>,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .cookie_store(true)
            .build()
            .map_err(|e| Error::Network(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self {
            client,
            host: host.into(),
            material,
            endpoints,
            token: Mutex::new(None),
        })
    }

    /// Build from configuration, reading login material from the process environment
    pub fn from_config(auth: &AuthConfig, endpoints: &[EndpointOverride]) -> Result<Self> {
        let netrc: Option<PathBuf> = ef_core::netrc::default_path();
        let material = resolve_login(
            auth.strategy,
            &auth.host,
            |name| std::env::var(name).ok(),
            netrc.as_deref(),
        )?;
        tracing::debug!(host = %auth.host, strategy = ?auth.strategy, "Earthdata Login material found");
        Self::new(auth.host.clone(), material, endpoints.to_vec())
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// Bearer token, requested from Earthdata Login at most once
    pub async fn bearer_token(&self) -> Result<String> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            return Ok(token.clone());
        }

        let token = match &self.material {
            LoginMaterial::Token(token) => token.clone(),
            LoginMaterial::Basic { username, password } => {
                self.request_token(username, password).await?
            }
        };
        *cached = Some(token.clone());
        Ok(token)
    }

    async fn request_token(&self, username: &str, password: &str) -> Result<String> {
        let url = format!("https://{}/api/users/find_or_create_token", self.host);
        tracing::debug!(host = %self.host, "Requesting Earthdata Login token");

        let response = self
            .client
            .post(&url)
            .basic_auth(username, Some(password))
            .send()
            .await
            .map_err(|e| Error::Network(format!("Earthdata Login unreachable: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(match status {
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                    Error::Auth(format!("Earthdata Login rejected the credentials ({status})"))
                }
                s if s.is_server_error() => {
                    Error::Network(format!("Earthdata Login error ({status}): {body}"))
                }
                _ => Error::Auth(format!("Earthdata Login error ({status}): {body}")),
            });
        }

        let parsed: TokenResponse = response
            .json()
            .await
            .map_err(|e| Error::General(format!("Failed to parse token response: {e}")))?;
        Ok(parsed.access_token)
    }
}

#[async_trait]
impl IdentityProvider for EarthdataLogin {
    async fn s3_credentials(&self, scope: &Scope) -> Result<Credential> {
        let failed = |message: String, transient: bool| Error::CredentialAcquisition {
            scope: scope.to_string(),
            message,
            transient,
        };

        let endpoint = scope.credentials_endpoint(&self.endpoints)?;
        let token = self
            .bearer_token()
            .await
            .map_err(|e| failed(format!("bearer token unavailable: {e}"), e.is_retryable()))?;

        let response = self
            .client
            .get(&endpoint)
            .bearer_auth(&token)
            .send()
            .await
            .map_err(|e| failed(e.to_string(), true))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| failed(e.to_string(), true))?;
        if !status.is_success() {
            return Err(failed(
                format!("{endpoint} returned {status}"),
                status.is_server_error(),
            ));
        }

        let credential = parse_s3_credentials(&body).map_err(|e| failed(e.to_string(), false))?;
        tracing::info!(%scope, expires_at = %credential.expires_at, "Obtained temporary S3 credentials");
        Ok(credential)
    }

    async fn http_auth(&self) -> Result<HttpAuth> {
        Ok(HttpAuth::bearer(self.bearer_token().await?))
    }
}
