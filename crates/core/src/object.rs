//! Remote object descriptors
//!
//! Callers hand the engine either search-result records or bare URLs. Both
//! are turned into [`RemoteObject`]s once, at the API boundary, so the rest
//! of the engine only ever sees one shape.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::scope::Scope;

/// One retrievable file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteObject {
    /// `s3://bucket/key` link usable with temporary credentials
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direct_url: Option<String>,

    /// `https://` link usable with a bearer token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_url: Option<String>,

    /// Expected size in bytes, if known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_hint: Option<u64>,

    /// Id of the record this object came from; passed through unexamined
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record_id: Option<String>,

    /// Cloud provider id used to pick a credential scope
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
}

impl RemoteObject {
    /// Build an object from a single link, classifying it by scheme
    pub fn from_url(url: &str, provider: Option<&str>) -> Result<Self> {
        let url = url.trim();
        let parsed = url::Url::parse(url)?;
        if parsed.host_str().is_none_or(str::is_empty) {
            return Err(Error::InvalidInput(format!("Link has no host or bucket: {url}")));
        }
        let (direct_url, external_url) = match parsed.scheme() {
            "s3" => (Some(url.to_string()), None),
            "https" | "http" => (None, Some(url.to_string())),
            _ => {
                return Err(Error::InvalidInput(format!(
                    "Unsupported link (expected s3:// or https://): {url}"
                )));
            }
        };

        Ok(Self {
            direct_url,
            external_url,
            size_hint: None,
            record_id: None,
            provider: provider.map(|p| p.to_ascii_uppercase()),
        })
    }

    /// The link used for the given method, if any
    pub fn url_for(&self, method: crate::AccessMethod) -> Option<&str> {
        match method {
            crate::AccessMethod::Direct => self.direct_url.as_deref(),
            crate::AccessMethod::External => self.external_url.as_deref(),
        }
    }

    /// Any link for display purposes
    pub fn display_url(&self) -> &str {
        self.external_url
            .as_deref()
            .or(self.direct_url.as_deref())
            .unwrap_or("<no link>")
    }

    /// Local file name derived from the last path segment of a link
    pub fn file_name(&self) -> Option<String> {
        let url = self.external_url.as_deref().or(self.direct_url.as_deref())?;
        let path = url.split(['?', '#']).next().unwrap_or(url);
        path.rsplit('/')
            .next()
            .filter(|name| !name.is_empty())
            .map(str::to_string)
    }
}

/// Subset of a UMM-G granule record needed to locate its data files
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GranuleRecord {
    /// Concept id, e.g. `G1234-POCLOUD`
    pub concept_id: String,

    /// Provider id, e.g. `POCLOUD`
    pub provider: String,

    /// Whether the data lives in the Earthdata cloud
    #[serde(default)]
    pub cloud_hosted: bool,

    #[serde(default)]
    pub related_urls: Vec<RelatedUrl>,

    /// Total size reported by the record, in megabytes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_mb: Option<f64>,
}

/// A `RelatedUrls` entry from a granule record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelatedUrl {
    #[serde(rename = "URL")]
    pub url: String,
    #[serde(rename = "Type")]
    pub kind: String,
}

const GET_DATA: &str = "GET DATA";
const GET_DATA_DIRECT: &str = "GET DATA VIA DIRECT ACCESS";

impl GranuleRecord {
    /// Direct (`s3://`) data links
    pub fn direct_links(&self) -> Vec<&str> {
        self.related_urls
            .iter()
            .filter(|u| u.kind == GET_DATA || u.kind == GET_DATA_DIRECT)
            .map(|u| u.url.as_str())
            .filter(|u| u.starts_with("s3://"))
            .collect()
    }

    /// External (`https://`) data links
    pub fn external_links(&self) -> Vec<&str> {
        self.related_urls
            .iter()
            .filter(|u| u.kind == GET_DATA)
            .map(|u| u.url.as_str())
            .filter(|u| u.starts_with("https://"))
            .collect()
    }

    /// One object per data file.
    ///
    /// Direct and external links are paired by file name so that the same file
    /// can be fetched either way.
    pub fn objects(&self) -> Vec<RemoteObject> {
        let direct = self.direct_links();
        let external = self.external_links();
        let file_count = direct.len().max(external.len()).max(1);
        let size_hint = self
            .size_mb
            .map(|mb| (mb * 1024.0 * 1024.0) as u64 / file_count as u64);

        let mut objects: Vec<RemoteObject> = external
            .iter()
            .map(|https| RemoteObject {
                direct_url: direct
                    .iter()
                    .find(|s3| last_segment(s3) == last_segment(https))
                    .map(|s| s.to_string()),
                external_url: Some(https.to_string()),
                size_hint,
                record_id: Some(self.concept_id.clone()),
                provider: Some(self.provider.clone()),
            })
            .collect();

        for s3 in &direct {
            let paired = objects
                .iter()
                .any(|o| o.direct_url.as_deref() == Some(*s3));
            if !paired {
                objects.push(RemoteObject {
                    direct_url: Some(s3.to_string()),
                    external_url: None,
                    size_hint,
                    record_id: Some(self.concept_id.clone()),
                    provider: Some(self.provider.clone()),
                });
            }
        }

        objects
    }
}

fn last_segment(url: &str) -> &str {
    url.rsplit('/').next().unwrap_or(url)
}

/// What callers may pass to the batch API
#[derive(Debug, Clone, PartialEq)]
pub enum ObjectSource {
    /// A search-result record
    FromRecord(GranuleRecord),
    /// A bare link with an optional provider hint
    FromUrl {
        url: String,
        provider_hint: Option<String>,
    },
}

impl ObjectSource {
    pub fn url(url: impl Into<String>, provider_hint: Option<&str>) -> Self {
        ObjectSource::FromUrl {
            url: url.into(),
            provider_hint: provider_hint.map(str::to_string),
        }
    }

    /// Expand into concrete objects
    pub fn into_objects(self) -> Result<Vec<RemoteObject>> {
        match self {
            ObjectSource::FromRecord(record) => {
                let objects = record.objects();
                if objects.is_empty() {
                    return Err(Error::NoRetrievableLink(record.concept_id));
                }
                Ok(objects)
            }
            ObjectSource::FromUrl { url, provider_hint } => {
                Ok(vec![RemoteObject::from_url(&url, provider_hint.as_deref())?])
            }
        }
    }
}

/// Expand a list of sources into objects, keeping input order
pub fn expand_sources(sources: Vec<ObjectSource>) -> Result<Vec<RemoteObject>> {
    let mut objects = Vec::new();
    for source in sources {
        objects.extend(source.into_objects()?);
    }
    Ok(objects)
}

/// A group of objects sharing one provider, with their positions in the input
#[derive(Debug, Clone)]
pub struct Partition {
    pub provider: Option<String>,
    pub indices: Vec<usize>,
    pub objects: Vec<RemoteObject>,
}

impl Partition {
    /// Credential scope for this partition, if the provider is known
    pub fn scope(&self) -> Option<Scope> {
        self.provider.as_deref().map(Scope::for_name)
    }
}

/// Split a heterogeneous batch by provider, in order of first appearance
pub fn partition_by_provider(objects: &[RemoteObject]) -> Vec<Partition> {
    let mut partitions: Vec<Partition> = Vec::new();
    for (index, object) in objects.iter().enumerate() {
        match partitions
            .iter_mut()
            .find(|p| p.provider == object.provider)
        {
            Some(partition) => {
                partition.indices.push(index);
                partition.objects.push(object.clone());
            }
            None => partitions.push(Partition {
                provider: object.provider.clone(),
                indices: vec![index],
                objects: vec![object.clone()],
            }),
        }
    }
    partitions
}
