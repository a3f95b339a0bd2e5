//! neptune-ttl - Neptune Streams TTL Extractor
//!
//! Reads property-graph change records from a Neptune stream, picks out
//! every `TTL` property set on a vertex or edge, and writes it as an
//! expiry row to a DynamoDB table, acknowledging each record for the
//! caller's checkpointing.

pub mod config;
pub mod error;
pub mod extractor;
pub mod sink;
pub mod stream;

pub use config::Config;
pub use error::{Error, Result};
pub use extractor::{handle_records, TtlExtractor};
pub use sink::{DynamoDbTable, ElementType, ExpiryEntry, ExpirySink, MemoryTable, SinkError};
pub use stream::{Acknowledgment, ChangeRecord, EventId, StreamBatch, StreamClient, StreamQuery};
