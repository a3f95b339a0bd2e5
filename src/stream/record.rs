//! Change Records
//!
//! A record is decoded lazily, one at a time, so a malformed record fails
//! at its own position in the batch rather than up front.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::error::{Error, Result};

/// Position of a record in the stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventId {
    /// Global commit sequence number
    pub commit_num: i64,
    /// Operation sequence number within the commit
    pub op_num: i64,
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "commit {} op {}", self.commit_num, self.op_num)
    }
}

/// Mutation kind of a record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    Add,
    Remove,
    Other(String),
}

impl Operation {
    pub fn parse(op: &str) -> Self {
        match op {
            "ADD" => Operation::Add,
            "REMOVE" => Operation::Remove,
            other => Operation::Other(other.to_string()),
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Add => write!(f, "ADD"),
            Operation::Remove => write!(f, "REMOVE"),
            Operation::Other(op) => write!(f, "{}", op),
        }
    }
}

/// One decoded change-stream record
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeRecord {
    pub event_id: EventId,
    pub operation: Operation,
    /// Graph element id (`data.id`)
    pub object_id: String,
    /// Raw property type (`data.type`), e.g. `vp` or `ep`
    pub object_type: String,
    /// Property name (`data.key`)
    pub key: String,
    /// Property value (`data.value.value`)
    pub value: Value,
}

impl ChangeRecord {
    /// Decode the record at `index` of its batch.
    ///
    /// Every field the extraction reads is required; the first one found
    /// missing is reported together with the event id when that is intact.
    pub fn from_value(index: usize, raw: &Value) -> Result<Self> {
        let op_num = lookup(raw, "eventId.opNum").and_then(Value::as_i64);
        let commit_num = lookup(raw, "eventId.commitNum").and_then(Value::as_i64);
        let event = op_num
            .zip(commit_num)
            .map(|(op_num, commit_num)| EventId { commit_num, op_num });
        let malformed = |field: &'static str| Error::MalformedRecord {
            index,
            event,
            field,
        };

        let object_id = string_at(raw, "data.id").ok_or_else(|| malformed("data.id"))?;
        let object_type = string_at(raw, "data.type").ok_or_else(|| malformed("data.type"))?;
        let key = string_at(raw, "data.key").ok_or_else(|| malformed("data.key"))?;
        let value = lookup(raw, "data.value.value")
            .cloned()
            .ok_or_else(|| malformed("data.value.value"))?;
        let operation = string_at(raw, "op")
            .map(|op| Operation::parse(&op))
            .ok_or_else(|| malformed("op"))?;

        let event_id = match (op_num, commit_num) {
            (Some(op_num), Some(commit_num)) => EventId { commit_num, op_num },
            (None, _) => return Err(malformed("eventId.opNum")),
            (_, None) => return Err(malformed("eventId.commitNum")),
        };

        Ok(Self {
            event_id,
            operation,
            object_id,
            object_type,
            key,
            value,
        })
    }

    /// Acknowledgment for this record
    pub fn ack(&self) -> Acknowledgment {
        Acknowledgment::new(self.event_id)
    }
}

/// Progress marker emitted for every processed record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Acknowledgment {
    pub op_num: i64,
    pub commit_num: i64,
    /// Units of progress; always 1 per record
    pub count: u32,
}

impl Acknowledgment {
    pub fn new(event_id: EventId) -> Self {
        Self {
            op_num: event_id.op_num,
            commit_num: event_id.commit_num,
            count: 1,
        }
    }

    pub fn event_id(&self) -> EventId {
        EventId {
            commit_num: self.commit_num,
            op_num: self.op_num,
        }
    }
}

/// Resolve a dot-separated path, `None` if any segment is missing
fn lookup<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(value, |current, segment| current.get(segment))
}

fn string_at(value: &Value, path: &str) -> Option<String> {
    lookup(value, path).and_then(Value::as_str).map(str::to_string)
}
