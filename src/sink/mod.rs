//! Expiry Sinks
//!
//! Tables that receive expiry rows. A sink hands out one batch-write
//! session per invocation; rows put into a session are durable once
//! the session closes successfully.

mod dynamodb;
mod entry;
mod memory;

pub use dynamodb::{DynamoDbBatchWriter, DynamoDbTable, MAX_BATCH_WRITE_ITEMS};
pub use entry::{ElementType, ExpiryEntry, SOURCE_TAG};
pub use memory::{MemoryBatchWriter, MemoryTable};

use std::future::Future;

/// Errors reported by a sink
#[derive(Debug, Clone, thiserror::Error)]
pub enum SinkError {
    /// The table refused the request (throttling, validation, access)
    #[error("rejected: {0}")]
    Rejected(String),

    /// A flush round left every pending item unprocessed
    #[error("{count} item(s) left unprocessed")]
    Unprocessed { count: usize },

    /// An entry could not be converted to a table item
    #[error("invalid item: {0}")]
    InvalidItem(String),
}

/// A table that accepts expiry rows through batch-write sessions
pub trait ExpirySink {
    type Writer: BatchWriter;

    /// Open a new session
    fn batch_writer(&self) -> Self::Writer;
}

/// Scoped batch-write session
///
/// Dropping a session without [`close`](BatchWriter::close) releases it;
/// whatever was still buffered may or may not have been written.
pub trait BatchWriter: Send {
    /// Queue one row, flushing when the buffer is full
    fn put(&mut self, entry: ExpiryEntry) -> impl Future<Output = Result<(), SinkError>> + Send;

    /// Flush everything still buffered and end the session
    fn close(self) -> impl Future<Output = Result<(), SinkError>> + Send;
}
