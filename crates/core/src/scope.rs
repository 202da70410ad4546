//! Credential scopes
//!
//! A scope is the key under which temporary object-store credentials are
//! issued and cached. NASA data centers (DAACs) hand out credentials per
//! endpoint; several cloud providers may map to the same endpoint.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Region all Earthdata cloud buckets live in
pub const DEFAULT_REGION: &str = "us-west-2";

/// Key identifying which cached credential applies
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Scope {
    /// Data center short name, e.g. `PODAAC`
    Daac(String),
    /// Cloud provider id, e.g. `POCLOUD`
    Provider(String),
    /// Explicit S3 credentials endpoint URL
    Endpoint(String),
}

impl Scope {
    /// Best-effort scope for a provider id or DAAC name.
    ///
    /// Known DAAC names map to [`Scope::Daac`], everything else is treated as a provider id.
    pub fn for_name(name: &str) -> Self {
        let upper = name.trim().to_ascii_uppercase();
        if name.starts_with("https://") || name.starts_with("http://") {
            Scope::Endpoint(name.trim().to_string())
        } else if DAACS.iter().any(|d| d.short_name == upper) {
            Scope::Daac(upper)
        } else {
            Scope::Provider(upper)
        }
    }

    /// Resolve this scope to the endpoint that issues its credentials.
    ///
    /// `extra` holds configured provider/DAAC → endpoint overrides and takes precedence.
    pub fn credentials_endpoint(&self, extra: &[EndpointOverride]) -> Result<String> {
        let key = match self {
            Scope::Endpoint(url) => return Ok(url.clone()),
            Scope::Daac(name) | Scope::Provider(name) => name,
        };

        if let Some(entry) = extra.iter().find(|e| e.name.eq_ignore_ascii_case(key)) {
            return Ok(entry.s3_credentials.clone());
        }

        let found = match self {
            Scope::Daac(name) => DAACS.iter().find(|d| d.short_name.eq_ignore_ascii_case(name)),
            Scope::Provider(id) => DAACS
                .iter()
                .find(|d| d.cloud_providers.iter().any(|p| p.eq_ignore_ascii_case(id))),
            Scope::Endpoint(_) => None,
        };

        found
            .map(|d| d.s3_credentials.to_string())
            .ok_or_else(|| Error::Config(format!("No S3 credentials endpoint known for {self}")))
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Daac(name) => write!(f, "daac:{name}"),
            Scope::Provider(id) => write!(f, "provider:{id}"),
            Scope::Endpoint(url) => write!(f, "endpoint:{url}"),
        }
    }
}

/// Configured mapping from a provider or DAAC name to a credentials endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointOverride {
    /// Provider id or DAAC short name
    pub name: String,
    /// S3 credentials endpoint URL
    pub s3_credentials: String,
}

/// Static description of a data center
#[derive(Debug, Clone, Copy)]
pub struct Daac {
    pub short_name: &'static str,
    pub cloud_providers: &'static [&'static str],
    pub s3_credentials: &'static str,
}

/// Data centers with cloud-hosted collections
pub const DAACS: &[Daac] = &[
    Daac {
        short_name: "PODAAC",
        cloud_providers: &["POCLOUD"],
        s3_credentials: "https://archive.podaac.earthdata.nasa.gov/s3credentials",
    },
    Daac {
        short_name: "NSIDC",
        cloud_providers: &["NSIDC_CPRD"],
        s3_credentials: "https://data.nsidc.earthdatacloud.nasa.gov/s3credentials",
    },
    Daac {
        short_name: "LPDAAC",
        cloud_providers: &["LPCLOUD"],
        s3_credentials: "https://data.lpdaac.earthdatacloud.nasa.gov/s3credentials",
    },
    Daac {
        short_name: "ORNLDAAC",
        cloud_providers: &["ORNL_CLOUD"],
        s3_credentials: "https://data.ornldaac.earthdata.nasa.gov/s3credentials",
    },
    Daac {
        short_name: "GES_DISC",
        cloud_providers: &["GES_DISC"],
        s3_credentials: "https://data.gesdisc.earthdata.nasa.gov/s3credentials",
    },
    Daac {
        short_name: "ASF",
        cloud_providers: &["ASF"],
        s3_credentials: "https://sentinel1.asf.alaska.edu/s3credentials",
    },
    Daac {
        short_name: "GHRCDAAC",
        cloud_providers: &["GHRC_DAAC"],
        s3_credentials: "https://data.ghrc.earthdata.nasa.gov/s3credentials",
    },
    Daac {
        short_name: "LAADS",
        cloud_providers: &["LAADS"],
        s3_credentials: "https://data.laadsdaac.earthdatacloud.nasa.gov/s3credentials",
    },
    Daac {
        short_name: "OBDAAC",
        cloud_providers: &["OB_CLOUD"],
        s3_credentials: "https://obdaac-tea.earthdatacloud.nasa.gov/s3credentials",
    },
    Daac {
        short_name: "ASDC",
        cloud_providers: &["LARC_CLOUD"],
        s3_credentials: "https://data.asdc.earthdata.nasa.gov/s3credentials",
    },
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_for_name() {
        assert_eq!(Scope::for_name("podaac"), Scope::Daac("PODAAC".into()));
        assert_eq!(Scope::for_name("POCLOUD"), Scope::Provider("POCLOUD".into()));
        assert_eq!(
            Scope::for_name("https://example.org/s3credentials"),
            Scope::Endpoint("https://example.org/s3credentials".into())
        );
    }

    #[test]
    fn test_provider_and_daac_share_endpoint() {
        let by_daac = Scope::Daac("PODAAC".into()).credentials_endpoint(&[]).unwrap();
        let by_provider = Scope::Provider("POCLOUD".into())
            .credentials_endpoint(&[])
            .unwrap();
        assert_eq!(by_daac, by_provider);
    }

    #[test]
    fn test_override_takes_precedence() {
        let extra = vec![EndpointOverride {
            name: "pocloud".into(),
            s3_credentials: "https://mirror.example/s3credentials".into(),
        }];
        let endpoint = Scope::Provider("POCLOUD".into())
            .credentials_endpoint(&extra)
            .unwrap();
        assert_eq!(endpoint, "https://mirror.example/s3credentials");
    }

    #[test]
    fn test_unknown_provider() {
        let err = Scope::Provider("NOPE".into())
            .credentials_endpoint(&[])
            .unwrap_err();
        assert!(err.to_string().contains("provider:NOPE"));
    }

    #[test]
    fn test_display() {
        assert_eq!(Scope::Daac("ASF".into()).to_string(), "daac:ASF");
    }
}
