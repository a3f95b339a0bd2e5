//! Stream Client
//!
//! Reads one batch from the Neptune property-graph stream endpoint.
//! Position tracking stays with the caller.

use std::fmt;
use tracing::{debug, error};

use super::{EventId, StreamBatch};
use crate::config::Config;
use crate::error::{Error, Result};

/// Where a read starts relative to the given position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IteratorType {
    AtSequenceNumber,
    #[default]
    AfterSequenceNumber,
    TrimHorizon,
    Latest,
}

impl IteratorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            IteratorType::AtSequenceNumber => "AT_SEQUENCE_NUMBER",
            IteratorType::AfterSequenceNumber => "AFTER_SEQUENCE_NUMBER",
            IteratorType::TrimHorizon => "TRIM_HORIZON",
            IteratorType::Latest => "LATEST",
        }
    }

    /// Whether a read with this iterator needs a commit position
    pub fn needs_position(&self) -> bool {
        matches!(
            self,
            IteratorType::AtSequenceNumber | IteratorType::AfterSequenceNumber
        )
    }
}

impl fmt::Display for IteratorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parameters of one stream read
#[derive(Debug, Clone, Default)]
pub struct StreamQuery {
    pub iterator: IteratorType,
    pub position: Option<EventId>,
    pub limit: Option<u32>,
}

impl StreamQuery {
    /// Read everything after `position`
    pub fn after(position: EventId) -> Self {
        Self {
            iterator: IteratorType::AfterSequenceNumber,
            position: Some(position),
            limit: None,
        }
    }

    /// Read from the oldest retained record
    pub fn trim_horizon() -> Self {
        Self {
            iterator: IteratorType::TrimHorizon,
            position: None,
            limit: None,
        }
    }

    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Query string pairs in the order the endpoint documents them
    pub fn params(&self) -> Result<Vec<(&'static str, String)>> {
        let mut params = vec![("iteratorType", self.iterator.as_str().to_string())];
        match self.position {
            Some(position) => {
                params.push(("commitNum", position.commit_num.to_string()));
                params.push(("opNum", position.op_num.to_string()));
            }
            None if self.iterator.needs_position() => {
                return Err(Error::config(
                    "query",
                    format!("{} requires a commit position", self.iterator),
                ));
            }
            None => {}
        }
        if let Some(limit) = self.limit {
            params.push(("limit", limit.to_string()));
        }
        Ok(params)
    }
}

/// HTTP client bound to one stream endpoint
#[derive(Debug, Clone)]
pub struct StreamClient {
    http: reqwest::Client,
    url: String,
}

impl StreamClient {
    /// Build a client for the endpoint named in `config`
    pub fn new(config: &Config) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = config.timeout() {
            builder = builder.timeout(timeout);
        }
        let http = builder
            .build()
            .map_err(|e| Error::config("http client", e.to_string()))?;
        Ok(Self {
            http,
            url: config.stream_url(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Fetch one batch
    pub async fn fetch(&self, query: &StreamQuery) -> Result<StreamBatch> {
        self.read_batch(query).await.map_err(|e| {
            error!(url = %self.url, iterator = %query.iterator, error = %e, "Stream read failed");
            e
        })
    }

    async fn read_batch(&self, query: &StreamQuery) -> Result<StreamBatch> {
        let params = query.params()?;
        debug!(url = %self.url, ?params, "Reading stream batch");

        let resp = self
            .http
            .get(&self.url)
            .query(&params)
            .send()
            .await
            .map_err(|e| self.source_error(e.to_string()))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| self.source_error(e.to_string()))?;

        if !status.is_success() {
            return Err(self.source_error(format!("{}: {}", status, body)));
        }

        let batch = StreamBatch::from_json(&body)?;
        debug!(
            records = batch.len(),
            last_event = ?batch.last_event_id,
            "Stream batch received"
        );
        Ok(batch)
    }

    fn source_error(&self, detail: String) -> Error {
        Error::Source {
            url: self.url.clone(),
            detail,
        }
    }
}
