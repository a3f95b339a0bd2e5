//! Error Types
//!
//! Every failure aborts the invocation; nothing here is recovered locally.

use crate::sink::SinkError;
use crate::stream::EventId;

/// Errors raised by an extraction invocation
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A record lacks a required field or carries it with the wrong type
    #[error("malformed record #{index} ({}): missing or invalid `{field}`", describe_event(.event))]
    MalformedRecord {
        index: usize,
        event: Option<EventId>,
        field: &'static str,
    },

    /// The batch envelope itself could not be decoded
    #[error("malformed batch: {0}")]
    MalformedBatch(#[source] serde_json::Error),

    /// The sink rejected a write or a flush
    #[error("sink write failed ({target}): {source}")]
    SinkWrite {
        target: String,
        #[source]
        source: SinkError,
    },

    /// Parameters are missing or invalid
    #[error("configuration ({context}): {detail}")]
    Configuration {
        context: &'static str,
        detail: String,
    },

    /// The stream endpoint could not be read
    #[error("stream source ({url}): {detail}")]
    Source { url: String, detail: String },
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn config(context: &'static str, detail: impl Into<String>) -> Self {
        Error::Configuration {
            context,
            detail: detail.into(),
        }
    }
}

fn describe_event(event: &Option<EventId>) -> String {
    match event {
        Some(id) => id.to_string(),
        None => "no event id".to_string(),
    }
}
