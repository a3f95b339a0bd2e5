//! TTL Extractor
//!
//! One pass over a stream batch: every ADD of a `TTL` property on a vertex
//! or edge becomes an expiry row, and every record yields an
//! acknowledgment, in input order.
//!
//! The pass holds a single sink session. It is opened before the first
//! record, closed after the last one, and dropped unflushed when a record
//! fails. Acknowledgments are produced lazily, so a caller sees progress
//! record by record; they only become safe checkpoints once the stream
//! ends without an error, because the final flush happens after the last
//! acknowledgment.

use futures::stream::{self, Stream, TryStreamExt};
use tracing::{debug, error, info, info_span, Instrument, Span};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::sink::{BatchWriter, DynamoDbTable, ElementType, ExpiryEntry, ExpirySink};
use crate::stream::{Acknowledgment, ChangeRecord, Operation, StreamBatch};

/// Property name that carries an expiry timestamp
pub const TTL_KEY: &str = "TTL";

/// Extracts TTL properties into an expiry sink
pub struct TtlExtractor<S> {
    sink: S,
    span: Span,
}

impl<S: ExpirySink> TtlExtractor<S> {
    /// Create an extractor writing to `sink` and logging under `span`
    pub fn new(sink: S, span: Span) -> Self {
        Self { sink, span }
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Process a batch, yielding one acknowledgment per record.
    ///
    /// The first error ends the stream; no acknowledgment follows it.
    pub fn process(&self, batch: StreamBatch) -> impl Stream<Item = Result<Acknowledgment>> {
        let span = self.span.clone();
        let pass = Pass {
            records: batch.records.into_iter().enumerate(),
            writer: Some(self.sink.batch_writer()),
            stats: PassStats::default(),
        };
        stream::try_unfold(pass, move |pass| step(pass).instrument(span.clone()))
    }

    /// Process a batch to completion
    pub async fn process_all(&self, batch: StreamBatch) -> Result<Vec<Acknowledgment>> {
        self.process(batch).try_collect().await
    }
}

/// Run one invocation against the DynamoDB table named in `config`
pub async fn handle_records(config: &Config, batch: StreamBatch) -> Result<Vec<Acknowledgment>> {
    if let Err(e) = config.validate() {
        error!(
            table = %config.dynamodb_table,
            endpoint = %config.neptune_endpoint,
            error = %e,
            "Invalid configuration"
        );
        return Err(e);
    }
    let span = info_span!(
        "handle_records",
        table = %config.dynamodb_table,
        records = batch.len()
    );
    let table = DynamoDbTable::connect(config).instrument(span.clone()).await;
    TtlExtractor::new(table, span).process_all(batch).await
}

/// Expiry row for a record, if it sets a TTL on a vertex or edge
pub fn expiry_entry(index: usize, record: &ChangeRecord) -> Result<Option<ExpiryEntry>> {
    if record.operation != Operation::Add || record.key != TTL_KEY {
        return Ok(None);
    }
    let Some(object_type) = ElementType::from_property_type(&record.object_type) else {
        return Ok(None);
    };
    let ttl = ExpiryEntry::ttl_from_value(&record.value).ok_or(Error::MalformedRecord {
        index,
        event: Some(record.event_id),
        field: "data.value.value",
    })?;
    Ok(Some(ExpiryEntry::new(
        record.object_id.clone(),
        object_type,
        ttl,
    )))
}

#[derive(Debug, Default)]
struct PassStats {
    records: usize,
    written: usize,
    ignored: usize,
}

struct Pass<W> {
    records: std::iter::Enumerate<std::vec::IntoIter<serde_json::Value>>,
    /// `None` once the session is closed
    writer: Option<W>,
    stats: PassStats,
}

async fn step<W: BatchWriter>(mut pass: Pass<W>) -> Result<Option<(Acknowledgment, Pass<W>)>> {
    let Some(mut writer) = pass.writer.take() else {
        return Ok(None);
    };

    let Some((index, raw)) = pass.records.next() else {
        writer.close().await.map_err(|source| {
            error!(error = %source, "Closing sink session failed");
            Error::SinkWrite {
                target: "session close".to_string(),
                source,
            }
        })?;
        info!(
            records = pass.stats.records,
            written = pass.stats.written,
            ignored = pass.stats.ignored,
            "Batch complete"
        );
        return Ok(None);
    };

    let record = ChangeRecord::from_value(index, &raw)
        .and_then(|record| expiry_entry(index, &record).map(|entry| (record, entry)));
    let (record, entry) = match record {
        Ok(parsed) => parsed,
        Err(e) => {
            error!(index, error = %e, "Malformed record, aborting batch");
            return Err(e);
        }
    };
    pass.stats.records += 1;

    match entry {
        Some(entry) => {
            debug!(
                object_id = %entry.object_id,
                object_type = %entry.object_type,
                ttl = %entry.ttl,
                event = %record.event_id,
                "Add TTL"
            );
            let target = format!("{} {}", entry.object_type, entry.object_id);
            if let Err(source) = writer.put(entry).await {
                error!(%target, event = %record.event_id, error = %source, "Sink write failed");
                return Err(Error::SinkWrite { target, source });
            }
            pass.stats.written += 1;
        }
        None => pass.stats.ignored += 1,
    }

    pass.writer = Some(writer);
    Ok(Some((record.ack(), pass)))
}
