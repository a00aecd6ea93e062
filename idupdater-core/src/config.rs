//! Remote update configuration
//!
//! The configuration document is fetched fresh on every check and replaces
//! the previous one entirely. Only schema version 1 is understood; unknown
//! fields are rejected instead of guessing at legacy layouts.

use crate::error::{Result, UpdaterError};
use async_trait::async_trait;
use base64::Engine as _;
use log::{debug, info, warn};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

/// Schema version this client understands
pub const SCHEMA_VERSION: u32 = 1;

/// Raw configuration document as published by the update server
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigDocument {
    schema_version: u32,
    latest_version: String,
    download_url: String,
    #[serde(default)]
    upgrade_code: Option<String>,
    #[serde(default)]
    certificates: Vec<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    message_url: Option<String>,
}

/// Side message attached to a configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SideMessage {
    /// Message text carried inline in the document
    Inline(String),
    /// Message text that has to be fetched from a URL
    Remote(String),
}

/// Parsed, immutable update configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteConfiguration {
    /// Latest advertised product version
    pub latest_version: String,
    /// Where the installer package is downloaded from
    pub download_url: String,
    /// Upgrade code of the product, overrides the local default
    pub upgrade_code: Option<String>,
    /// DER-encoded publisher certificates, in document order
    pub certificates: Vec<Vec<u8>>,
    /// Optional message for the user
    pub message: Option<SideMessage>,
}

impl RemoteConfiguration {
    /// Parse a configuration document
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let doc: ConfigDocument = serde_json::from_slice(bytes)
            .map_err(|e| UpdaterError::InvalidConfig(format!("could not load a valid update file: {}", e)))?;

        if doc.schema_version != SCHEMA_VERSION {
            return Err(UpdaterError::InvalidConfig(format!(
                "unsupported schema version {} (expected {})",
                doc.schema_version, SCHEMA_VERSION
            )));
        }

        if doc.latest_version.trim().is_empty() {
            return Err(UpdaterError::InvalidConfig("latest_version is empty".to_string()));
        }

        url::Url::parse(&doc.download_url).map_err(|e| {
            UpdaterError::InvalidConfig(format!("invalid download_url '{}': {}", doc.download_url, e))
        })?;

        let certificates = doc
            .certificates
            .iter()
            .enumerate()
            .map(|(i, cert)| {
                base64::engine::general_purpose::STANDARD
                    .decode(cert.trim())
                    .map_err(|e| UpdaterError::InvalidConfig(format!("certificate #{} is not base64: {}", i, e)))
            })
            .collect::<Result<Vec<_>>>()?;

        let message = match (non_empty(doc.message), non_empty(doc.message_url)) {
            (Some(text), Some(url)) => {
                warn!("Configuration has both message and message_url, ignoring {}", url);
                Some(SideMessage::Inline(text))
            }
            (Some(text), None) => Some(SideMessage::Inline(text)),
            (None, Some(url)) => Some(SideMessage::Remote(url)),
            (None, None) => None,
        };

        Ok(Self {
            latest_version: doc.latest_version.trim().to_string(),
            download_url: doc.download_url,
            upgrade_code: non_empty(doc.upgrade_code),
            certificates,
            message,
        })
    }

    /// Upgrade code to resolve the installed product with
    pub fn upgrade_code_or<'a>(&'a self, default: &'a str) -> &'a str {
        self.upgrade_code.as_deref().unwrap_or(default)
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Source of the remote configuration
#[async_trait]
pub trait ConfigSource: Send + Sync {
    /// Fetch and parse the current configuration document
    async fn fetch(&self) -> Result<RemoteConfiguration>;

    /// Fetch a remote message document as text
    async fn fetch_message(&self, url: &str) -> Result<String>;
}

/// Build the updater User-Agent header value
pub fn user_agent(installed_version: &str, manual: bool) -> String {
    let mut agent = format!(
        "id-updater/{} ({}; {})",
        installed_version,
        std::env::consts::OS,
        std::env::consts::ARCH
    );
    if manual {
        agent.push_str(" manual");
    }
    agent
}

/// Ensure a URL uses a transport we are willing to talk to
pub fn check_scheme(raw: &str) -> Result<url::Url> {
    let parsed = url::Url::parse(raw)
        .map_err(|e| UpdaterError::ConfigFetch(format!("Invalid url '{}': {}", raw, e)))?;
    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        other => Err(UpdaterError::ConfigFetch(format!(
            "Unsupported protocol in url: {}",
            other
        ))),
    }
}

/// Configuration source backed by an HTTP(S) endpoint
pub struct HttpConfigSource {
    client: reqwest::Client,
    url: url::Url,
}

impl HttpConfigSource {
    pub fn new(url: &str, user_agent: &str) -> Result<Self> {
        let url = check_scheme(url)?;
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| UpdaterError::ConfigFetch(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client, url })
    }

    async fn get_bytes(&self, url: url::Url) -> Result<Vec<u8>> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| UpdaterError::ConfigFetch(format!("Network error: {}", e)))?;

        if !response.status().is_success() {
            return Err(UpdaterError::ConfigFetch(format!(
                "Server returned {}",
                response.status()
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| UpdaterError::ConfigFetch(format!("Failed to read response: {}", e)))?;
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl ConfigSource for HttpConfigSource {
    async fn fetch(&self) -> Result<RemoteConfiguration> {
        info!("Checking for update at {}", self.url);
        let body = self.get_bytes(self.url.clone()).await?;
        debug!("Configuration document: {} bytes", body.len());
        RemoteConfiguration::parse(&body)
    }

    async fn fetch_message(&self, url: &str) -> Result<String> {
        let url = check_scheme(url)?;
        let body = self.get_bytes(url).await?;
        Ok(String::from_utf8_lossy(&body).trim().to_string())
    }
}

/// Stands in for an endpoint that could not be set up
///
/// Every fetch reports the setup failure, so it reaches the observer as a
/// configuration error instead of ending the process early.
pub struct UnavailableConfigSource {
    reason: String,
}

impl UnavailableConfigSource {
    pub fn new(error: UpdaterError) -> Self {
        let reason = match error {
            UpdaterError::ConfigFetch(reason) | UpdaterError::InvalidConfig(reason) => reason,
            other => other.to_string(),
        };
        Self { reason }
    }
}

#[async_trait]
impl ConfigSource for UnavailableConfigSource {
    async fn fetch(&self) -> Result<RemoteConfiguration> {
        Err(UpdaterError::ConfigFetch(self.reason.clone()))
    }

    async fn fetch_message(&self, _url: &str) -> Result<String> {
        Err(UpdaterError::ConfigFetch(self.reason.clone()))
    }
}

/// HTTP source for `url`, or one that reports why `url` cannot be used
pub fn config_source(url: &str, user_agent: &str) -> Arc<dyn ConfigSource> {
    match HttpConfigSource::new(url, user_agent) {
        Ok(source) => Arc::new(source),
        Err(e) => {
            warn!("Configuration source unavailable: {}", e);
            Arc::new(UnavailableConfigSource::new(e))
        }
    }
}
