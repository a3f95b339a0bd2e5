//! In-Memory Expiry Table
//!
//! Sharded concurrent map keyed by element id and type, with the same
//! upsert semantics as the production table.

use dashmap::DashMap;
use std::sync::Arc;
use tracing::warn;

use super::{BatchWriter, ElementType, ExpiryEntry, ExpirySink, SinkError};

/// Rows buffered by a session before it writes them through
const DEFAULT_FLUSH_THRESHOLD: usize = 25;

type RowKey = (String, ElementType);

/// Concurrent in-memory expiry table
///
/// Clones share the same rows, so independent sessions may write to one
/// table from several tasks at once.
#[derive(Debug, Clone)]
pub struct MemoryTable {
    inner: Arc<DashMap<RowKey, ExpiryEntry>>,
    flush_threshold: usize,
}

impl Default for MemoryTable {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryTable {
    /// Create a new empty table
    pub fn new() -> Self {
        Self {
            inner: Arc::new(DashMap::new()),
            flush_threshold: DEFAULT_FLUSH_THRESHOLD,
        }
    }

    /// Set how many rows a session buffers before writing through
    pub fn with_flush_threshold(mut self, threshold: usize) -> Self {
        self.flush_threshold = threshold.max(1);
        self
    }

    /// Get the row for an element
    pub fn get(&self, object_id: &str, object_type: ElementType) -> Option<ExpiryEntry> {
        self.inner
            .get(&(object_id.to_string(), object_type))
            .map(|row| row.value().clone())
    }

    /// Insert or replace a row
    pub fn upsert(&self, entry: ExpiryEntry) {
        let key = (entry.object_id.clone(), entry.object_type);
        self.inner.insert(key, entry);
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// All rows, ordered by key
    pub fn entries(&self) -> Vec<ExpiryEntry> {
        let mut rows: Vec<ExpiryEntry> = self.inner.iter().map(|r| r.value().clone()).collect();
        rows.sort_by(|a, b| a.key().cmp(&b.key()));
        rows
    }
}

impl ExpirySink for MemoryTable {
    type Writer = MemoryBatchWriter;

    fn batch_writer(&self) -> Self::Writer {
        MemoryBatchWriter {
            table: self.clone(),
            pending: Vec::with_capacity(self.flush_threshold),
        }
    }
}

/// Buffered session over a [`MemoryTable`]
#[derive(Debug)]
pub struct MemoryBatchWriter {
    table: MemoryTable,
    pending: Vec<ExpiryEntry>,
}

impl MemoryBatchWriter {
    /// Rows not yet written to the table
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    fn flush(&mut self) {
        for entry in self.pending.drain(..) {
            self.table.upsert(entry);
        }
    }
}

impl BatchWriter for MemoryBatchWriter {
    async fn put(&mut self, entry: ExpiryEntry) -> Result<(), SinkError> {
        self.pending.push(entry);
        if self.pending.len() >= self.table.flush_threshold {
            self.flush();
        }
        Ok(())
    }

    async fn close(mut self) -> Result<(), SinkError> {
        self.flush();
        Ok(())
    }
}

impl Drop for MemoryBatchWriter {
    fn drop(&mut self) {
        if !self.pending.is_empty() {
            warn!(
                discarded = self.pending.len(),
                "Session released with unflushed rows"
            );
        }
    }
}
