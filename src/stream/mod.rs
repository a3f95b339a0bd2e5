//! Change Stream
//!
//! Records, batches and acknowledgments of the Neptune property-graph
//! stream, plus a client that fetches one batch from the endpoint.

mod batch;
mod client;
mod record;

pub use batch::StreamBatch;
pub use client::{IteratorType, StreamClient, StreamQuery};
pub use record::{Acknowledgment, ChangeRecord, EventId, Operation};
