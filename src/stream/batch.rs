//! Stream Batch
//!
//! Response envelope of one stream read.

use serde::Deserialize;
use serde_json::Value;
use std::io::Read;
use std::path::Path;

use super::EventId;
use crate::error::{Error, Result};

/// One batch of change records as delivered by the stream
///
/// Records stay undecoded until the extractor reaches them.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamBatch {
    pub records: Vec<Value>,
    #[serde(default)]
    pub last_event_id: Option<EventId>,
    #[serde(default)]
    pub last_trx_timestamp: Option<i64>,
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default)]
    pub total_records: Option<u64>,
}

impl StreamBatch {
    /// Batch over already-decoded JSON records
    pub fn from_records(records: Vec<Value>) -> Self {
        Self {
            records,
            ..Self::default()
        }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(Error::MalformedBatch)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        serde_json::from_reader(reader).map_err(Error::MalformedBatch)
    }

    /// Read a batch from a file
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path).map_err(|e| Error::Source {
            url: path.display().to_string(),
            detail: e.to_string(),
        })?;
        Self::from_reader(std::io::BufReader::new(file))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const RESPONSE: &str = r#"{
        "lastEventId": {"commitNum": 12, "opNum": 3},
        "lastTrxTimestamp": 1700000000123,
        "format": "PG_JSON",
        "records": [
            {"eventId": {"commitNum": 12, "opNum": 1}, "op": "ADD",
             "data": {"id": "v1", "type": "vl", "key": "label", "value": {"value": "person"}}}
        ],
        "totalRecords": 1
    }"#;

    #[test]
    fn test_decode_envelope() {
        let batch = StreamBatch::from_json(RESPONSE).unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(
            batch.last_event_id,
            Some(EventId {
                commit_num: 12,
                op_num: 3
            })
        );
        assert_eq!(batch.format.as_deref(), Some("PG_JSON"));
        assert_eq!(batch.total_records, Some(1));
    }

    #[test]
    fn test_missing_records_is_malformed_batch() {
        let err = StreamBatch::from_json(r#"{"totalRecords": 0}"#).unwrap_err();
        assert!(matches!(err, Error::MalformedBatch(_)));

        let err = StreamBatch::from_json(r#"{"records": {}}"#).unwrap_err();
        assert!(matches!(err, Error::MalformedBatch(_)));
    }

    #[test]
    fn test_from_path() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(RESPONSE.as_bytes()).unwrap();

        let batch = StreamBatch::from_path(file.path()).unwrap();
        assert!(!batch.is_empty());

        let err = StreamBatch::from_path(file.path().with_extension("missing")).unwrap_err();
        assert!(matches!(err, Error::Source { .. }));
    }
}
