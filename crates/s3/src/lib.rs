//! ef-s3: network adapters for earthfetch
//!
//! This crate implements the ef-core seams against the real world:
//! aws-sdk-s3 for direct access, reqwest for the HTTPS fallback and the
//! Earthdata Login API. It is the only crate that depends on the AWS SDK
//! or an HTTP client.

pub mod client;
pub mod edl;
pub mod factory;
pub mod http;

use std::sync::Arc;

use ef_core::{Config, DataAccess, Result};

pub use client::S3Transport;
pub use edl::{EarthdataLogin, LoginMaterial};
pub use factory::AwsTransportFactory;
pub use http::HttpTransport;

/// Log in with the configured strategy and return a ready [`DataAccess`]
pub fn login(config: &Config) -> Result<DataAccess> {
    let identity = EarthdataLogin::from_config(&config.auth, &config.endpoints)?;
    Ok(DataAccess::new(
        Arc::new(identity),
        Arc::new(AwsTransportFactory),
        config.transfer.probe(),
    ))
}
