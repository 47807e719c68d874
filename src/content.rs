//! Content store - off-chain task text storage
//!
//! The ledger only holds opaque content refs; the text itself lives in an
//! external content-addressed store. Two implementations:
//!
//! - [`PinningGateway`]: HTTP pinning service (pin-JSON endpoint for
//!   publish, public gateway for resolve).
//! - [`MemoryContentStore`]: in-process store with sha256 refs, for tests
//!   and offline use.
//!
//! Transport failures surface as `ContentStoreUnavailable`. Content that
//! arrives but does not match the expected schema (a JSON object with a
//! non-empty `task` field) surfaces as `MalformedContent` instead of a
//! missing-field panic at display time.

use crate::error::LedgerError;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use url::Url;
use tracing::{debug, info};

/// The published payload. The stored JSON object carries at minimum a
/// `task` text field; unknown extra fields are tolerated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TaskContent {
    pub task: String,
}

impl TaskContent {
    pub fn new(task: impl Into<String>) -> Self {
        Self { task: task.into() }
    }
}

/// Content store interface: publish by value, resolve by ref.
///
/// No retry policy here; retrying is the caller's business.
#[async_trait::async_trait]
pub trait ContentStore: Send + Sync {
    /// Publish content, returning its content-addressed ref.
    async fn publish(&self, content: &TaskContent) -> Result<String, LedgerError>;

    /// Resolve a ref back to content.
    async fn resolve(&self, content_ref: &str) -> Result<TaskContent, LedgerError>;
}

/// Parse resolved JSON into [`TaskContent`], enforcing the schema.
fn parse_content(content_ref: &str, json: &str) -> Result<TaskContent, LedgerError> {
    let content: TaskContent = serde_json::from_str(json)
        .map_err(|_| LedgerError::MalformedContent(content_ref.to_string()))?;
    if content.task.trim().is_empty() {
        return Err(LedgerError::MalformedContent(content_ref.to_string()));
    }
    Ok(content)
}

/// Configuration for the pinning gateway client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Pin-JSON endpoint, e.g. `https://api.pinata.cloud/pinning/pinJSONToIPFS`
    #[serde(default = "default_pin_url")]
    pub pin_url: String,

    /// Public gateway base for fetches, e.g. `https://gateway.pinata.cloud/ipfs/`
    #[serde(default = "default_fetch_url")]
    pub fetch_url: String,

    /// API key, sent as the `pinata_api_key` header.
    #[serde(default)]
    pub api_key: String,

    /// API secret, sent as the `pinata_secret_api_key` header.
    #[serde(default)]
    pub api_secret: String,
}

fn default_pin_url() -> String {
    "https://api.pinata.cloud/pinning/pinJSONToIPFS".to_string()
}

fn default_fetch_url() -> String {
    "https://gateway.pinata.cloud/ipfs/".to_string()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            pin_url: default_pin_url(),
            fetch_url: default_fetch_url(),
            api_key: String::new(),
            api_secret: String::new(),
        }
    }
}

/// Pin response from the gateway.
#[derive(Debug, Deserialize)]
struct PinResponse {
    #[serde(rename = "IpfsHash")]
    ipfs_hash: String,
}

/// HTTP pinning-gateway content store.
pub struct PinningGateway {
    client: reqwest::Client,
    pin_url: Url,
    fetch_url: Url,
    api_key: String,
    api_secret: String,
}

impl PinningGateway {
    pub fn new(config: GatewayConfig) -> Result<Self, LedgerError> {
        let pin_url = Url::parse(&config.pin_url)
            .map_err(|e| LedgerError::Config(format!("bad pin_url {}: {}", config.pin_url, e)))?;
        let fetch_url = Url::parse(&config.fetch_url)
            .map_err(|e| LedgerError::Config(format!("bad fetch_url {}: {}", config.fetch_url, e)))?;

        Ok(Self {
            client: reqwest::Client::new(),
            pin_url,
            fetch_url,
            api_key: config.api_key,
            api_secret: config.api_secret,
        })
    }

    fn content_url(&self, content_ref: &str) -> Result<Url, LedgerError> {
        self.fetch_url
            .join(content_ref)
            .map_err(|e| LedgerError::InvalidInput(format!("bad content ref {}: {}", content_ref, e)))
    }
}

#[async_trait::async_trait]
impl ContentStore for PinningGateway {
    async fn publish(&self, content: &TaskContent) -> Result<String, LedgerError> {
        let response = self
            .client
            .post(self.pin_url.clone())
            .header("pinata_api_key", &self.api_key)
            .header("pinata_secret_api_key", &self.api_secret)
            .json(content)
            .send()
            .await
            .map_err(|e| LedgerError::ContentStoreUnavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(LedgerError::ContentStoreUnavailable(format!(
                "pin request returned {}",
                response.status()
            )));
        }

        let pin: PinResponse = response
            .json()
            .await
            .map_err(|e| LedgerError::ContentStoreUnavailable(e.to_string()))?;

        info!(content_ref = %pin.ipfs_hash, "Pinned task content");
        Ok(pin.ipfs_hash)
    }

    async fn resolve(&self, content_ref: &str) -> Result<TaskContent, LedgerError> {
        let url = self.content_url(content_ref)?;
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| LedgerError::ContentStoreUnavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(LedgerError::ContentStoreUnavailable(format!(
                "gateway returned {} for {}",
                response.status(),
                content_ref
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| LedgerError::ContentStoreUnavailable(e.to_string()))?;

        debug!(content_ref = %content_ref, bytes = body.len(), "Fetched task content");
        parse_content(content_ref, &body)
    }
}

/// In-memory content store with deterministic sha256 refs.
///
/// Suitable for tests and offline demos; refs look like
/// `sha256-<hex digest of the serialized JSON>`.
#[derive(Default)]
pub struct MemoryContentStore {
    blobs: DashMap<String, String>,
}

impl MemoryContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compute the content ref for serialized JSON.
    pub fn compute_ref(json: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(json.as_bytes());
        format!("sha256-{}", hex::encode(hasher.finalize()))
    }

    /// Pin raw JSON under its computed ref, bypassing schema checks.
    ///
    /// Lets tests and tooling plant arbitrary (including malformed)
    /// content the way a third party could on a shared gateway.
    pub fn pin_raw(&self, json: &str) -> String {
        let content_ref = Self::compute_ref(json);
        self.blobs.insert(content_ref.clone(), json.to_string());
        content_ref
    }
}

#[async_trait::async_trait]
impl ContentStore for MemoryContentStore {
    async fn publish(&self, content: &TaskContent) -> Result<String, LedgerError> {
        let json = serde_json::to_string(content)?;
        let content_ref = Self::compute_ref(&json);
        self.blobs.insert(content_ref.clone(), json);
        debug!(content_ref = %content_ref, "Pinned task content in memory");
        Ok(content_ref)
    }

    async fn resolve(&self, content_ref: &str) -> Result<TaskContent, LedgerError> {
        let json = self.blobs.get(content_ref).ok_or_else(|| {
            LedgerError::ContentStoreUnavailable(format!("no content pinned for {}", content_ref))
        })?;
        parse_content(content_ref, json.value())
    }
}
