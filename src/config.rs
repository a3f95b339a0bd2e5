//! Invocation Configuration
//!
//! Resolved once by the caller from the poller's JSON parameter blob and
//! passed into the extractor explicitly.

use serde::Deserialize;
use std::time::Duration;

use crate::error::{Error, Result};

/// Environment variable carrying the poller's JSON parameter blob
pub const PARAMS_ENV: &str = "AdditionalParams";

/// Port the Neptune stream endpoint listens on
pub const DEFAULT_NEPTUNE_PORT: u16 = 8182;

/// Path of the property-graph stream on a Neptune endpoint
pub const STREAM_PATH: &str = "/pg/stream";

/// Extraction configuration
///
/// Unknown keys in the blob are ignored; the same blob also carries the
/// poller framework's own parameters.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Name of the expiry table
    pub dynamodb_table: String,

    /// Neptune host, without scheme, port or path
    pub neptune_endpoint: String,

    /// Neptune stream port
    #[serde(default = "default_neptune_port")]
    pub neptune_port: u16,

    /// AWS region override (SDK default chain when unset)
    #[serde(default)]
    pub region: Option<String>,

    /// DynamoDB endpoint override, e.g. LocalStack
    #[serde(default)]
    pub dynamodb_endpoint: Option<String>,

    /// Operation timeout for the table and stream clients
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

fn default_neptune_port() -> u16 {
    DEFAULT_NEPTUNE_PORT
}

impl Config {
    /// Create a config for the given table and Neptune host
    pub fn new(dynamodb_table: impl Into<String>, neptune_endpoint: impl Into<String>) -> Self {
        Self {
            dynamodb_table: dynamodb_table.into(),
            neptune_endpoint: neptune_endpoint.into(),
            neptune_port: DEFAULT_NEPTUNE_PORT,
            region: None,
            dynamodb_endpoint: None,
            timeout_ms: None,
        }
    }

    /// Parse a JSON parameter blob
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Config =
            serde_json::from_str(json).map_err(|e| Error::config("parse", e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse the blob from [`PARAMS_ENV`]
    pub fn from_env() -> Result<Self> {
        let json = std::env::var(PARAMS_ENV)
            .map_err(|e| Error::config("read", format!("{PARAMS_ENV}: {e}")))?;
        Self::from_json(&json)
    }

    /// Reject empty required values
    pub fn validate(&self) -> Result<()> {
        if self.dynamodb_table.trim().is_empty() {
            return Err(Error::config("validate", "`dynamodb_table` is empty"));
        }
        if self.neptune_endpoint.trim().is_empty() {
            return Err(Error::config("validate", "`neptune_endpoint` is empty"));
        }
        Ok(())
    }

    /// Full URL of the property-graph stream
    pub fn stream_url(&self) -> String {
        format!(
            "https://{}:{}{}",
            self.neptune_endpoint, self.neptune_port, STREAM_PATH
        )
    }

    /// Operation timeout, if configured
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }

    /// Set AWS region
    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    /// Set DynamoDB endpoint override
    pub fn with_dynamodb_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.dynamodb_endpoint = Some(endpoint.into());
        self
    }

    /// Set operation timeout
    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }
}
