//! DynamoDB Expiry Table
//!
//! Writes rows with `BatchWriteItem`, up to [`MAX_BATCH_WRITE_ITEMS`] puts
//! per call. Unprocessed items are re-queued and resent on the next flush.

use aws_sdk_dynamodb::config::timeout::TimeoutConfig;
use aws_sdk_dynamodb::error::DisplayErrorContext;
use aws_sdk_dynamodb::types::{AttributeValue, PutRequest, WriteRequest};
use aws_sdk_dynamodb::Client;
use std::collections::HashMap;
use tracing::{debug, error, warn};

use super::{BatchWriter, ExpiryEntry, ExpirySink, SinkError};
use crate::config::Config;

/// Service limit on put requests per `BatchWriteItem` call
pub const MAX_BATCH_WRITE_ITEMS: usize = 25;

const ATTR_OBJECT_ID: &str = "ObjectId";
const ATTR_OBJECT_TYPE: &str = "ObjectType";
const ATTR_TTL: &str = "TTL";
const ATTR_SOURCE: &str = "source";

/// Expiry table backed by DynamoDB
#[derive(Clone)]
pub struct DynamoDbTable {
    client: Client,
    table_name: String,
}

impl std::fmt::Debug for DynamoDbTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DynamoDbTable")
            .field("table_name", &self.table_name)
            .finish()
    }
}

impl DynamoDbTable {
    /// Connect using the ambient AWS configuration plus overrides from `config`
    pub async fn connect(config: &Config) -> Self {
        let sdk_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        Self::from_sdk_config(&sdk_config, config)
    }

    /// Build from an already loaded SDK configuration
    pub fn from_sdk_config(sdk_config: &aws_config::SdkConfig, config: &Config) -> Self {
        let mut builder = aws_sdk_dynamodb::config::Builder::from(sdk_config);

        if let Some(region) = &config.region {
            builder = builder.region(aws_sdk_dynamodb::config::Region::new(region.clone()));
        }

        if let Some(endpoint) = &config.dynamodb_endpoint {
            builder = builder.endpoint_url(endpoint);
        }

        if let Some(timeout) = config.timeout() {
            let timeout_config = TimeoutConfig::builder()
                .operation_timeout(timeout)
                .build();
            builder = builder.timeout_config(timeout_config);
        }

        Self::from_client(Client::from_conf(builder.build()), &config.dynamodb_table)
    }

    /// Create from a pre-built client
    pub fn from_client(client: Client, table_name: impl Into<String>) -> Self {
        Self {
            client,
            table_name: table_name.into(),
        }
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }
}

impl ExpirySink for DynamoDbTable {
    type Writer = DynamoDbBatchWriter;

    fn batch_writer(&self) -> Self::Writer {
        DynamoDbBatchWriter {
            client: self.client.clone(),
            table_name: self.table_name.clone(),
            pending: Vec::with_capacity(MAX_BATCH_WRITE_ITEMS),
        }
    }
}

/// Buffered `BatchWriteItem` session
pub struct DynamoDbBatchWriter {
    client: Client,
    table_name: String,
    pending: Vec<WriteRequest>,
}

impl DynamoDbBatchWriter {
    /// Queue a request, replacing a pending one for the same row
    fn enqueue(&mut self, request: WriteRequest) {
        if let Some(key) = request_key(&request) {
            self.pending
                .retain(|pending| request_key(pending).as_ref() != Some(&key));
        }
        self.pending.push(request);
    }

    /// Send one chunk; unprocessed items go back on the queue.
    ///
    /// Returns how many items the table accepted.
    async fn flush_chunk(&mut self) -> Result<usize, SinkError> {
        let take = self.pending.len().min(MAX_BATCH_WRITE_ITEMS);
        let chunk: Vec<WriteRequest> = self.pending.drain(..take).collect();
        let sent = chunk.len();
        let first = chunk.first().and_then(request_key);
        let last = chunk.last().and_then(request_key);

        let output = self
            .client
            .batch_write_item()
            .request_items(&self.table_name, chunk)
            .send()
            .await
            .map_err(|e| {
                let detail = DisplayErrorContext(&e).to_string();
                error!(
                    table = %self.table_name,
                    items = sent,
                    first = ?first,
                    last = ?last,
                    error = %detail,
                    "Batch write rejected"
                );
                SinkError::Rejected(format!("batch of {sent} items: {detail}"))
            })?;

        let unprocessed = output
            .unprocessed_items()
            .and_then(|items| items.get(&self.table_name))
            .cloned()
            .unwrap_or_default();

        let accepted = sent - unprocessed.len().min(sent);
        if !unprocessed.is_empty() {
            debug!(
                table = %self.table_name,
                unprocessed = unprocessed.len(),
                "Re-queueing unprocessed items"
            );
            for request in unprocessed {
                self.enqueue(request);
            }
        }
        Ok(accepted)
    }
}

impl BatchWriter for DynamoDbBatchWriter {
    async fn put(&mut self, entry: ExpiryEntry) -> Result<(), SinkError> {
        self.enqueue(to_write_request(&entry)?);
        if self.pending.len() >= MAX_BATCH_WRITE_ITEMS {
            self.flush_chunk().await?;
        }
        Ok(())
    }

    async fn close(mut self) -> Result<(), SinkError> {
        while !self.pending.is_empty() {
            if self.flush_chunk().await? == 0 {
                return Err(SinkError::Unprocessed {
                    count: self.pending.len(),
                });
            }
        }
        Ok(())
    }
}

impl Drop for DynamoDbBatchWriter {
    fn drop(&mut self) {
        if !self.pending.is_empty() {
            warn!(
                table = %self.table_name,
                discarded = self.pending.len(),
                "Session released with unflushed items"
            );
        }
    }
}

/// Convert a row to its item attributes
fn to_item(entry: &ExpiryEntry) -> HashMap<String, AttributeValue> {
    HashMap::from([
        (
            ATTR_OBJECT_ID.to_string(),
            AttributeValue::S(entry.object_id.clone()),
        ),
        (
            ATTR_OBJECT_TYPE.to_string(),
            AttributeValue::S(entry.object_type.as_str().to_string()),
        ),
        (ATTR_TTL.to_string(), AttributeValue::N(entry.ttl.to_string())),
        (
            ATTR_SOURCE.to_string(),
            AttributeValue::S(entry.source.clone()),
        ),
    ])
}

fn to_write_request(entry: &ExpiryEntry) -> Result<WriteRequest, SinkError> {
    let put = PutRequest::builder()
        .set_item(Some(to_item(entry)))
        .build()
        .map_err(|e| SinkError::InvalidItem(e.to_string()))?;
    Ok(WriteRequest::builder().put_request(put).build())
}

/// Row key of a pending put request
fn request_key(request: &WriteRequest) -> Option<(String, String)> {
    let item = request.put_request()?.item();
    let id = item.get(ATTR_OBJECT_ID)?.as_s().ok()?;
    let object_type = item.get(ATTR_OBJECT_TYPE)?.as_s().ok()?;
    Some((id.clone(), object_type.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::ElementType;
    use aws_sdk_dynamodb::config::retry::RetryConfig;
    use aws_sdk_dynamodb::config::{BehaviorVersion, Credentials, Region};
    use aws_smithy_runtime::client::http::test_util::{ReplayEvent, StaticReplayClient};
    use aws_smithy_types::body::SdkBody;
    use serde_json::Number;

    fn client(http_client: Option<StaticReplayClient>) -> Client {
        let mut builder = aws_sdk_dynamodb::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new("us-east-1"))
            .credentials_provider(Credentials::new("akid", "secret", None, None, "test"))
            .retry_config(RetryConfig::disabled());
        if let Some(http_client) = http_client {
            builder = builder.http_client(http_client);
        }
        Client::from_conf(builder.build())
    }

    fn writer() -> DynamoDbBatchWriter {
        DynamoDbTable::from_client(client(None), "expiry").batch_writer()
    }

    fn reply(status: u16, body: &str) -> ReplayEvent {
        ReplayEvent::new(
            http::Request::builder()
                .method("POST")
                .uri("https://dynamodb.us-east-1.amazonaws.com/")
                .body(SdkBody::empty())
                .unwrap(),
            http::Response::builder()
                .status(status)
                .body(SdkBody::from(body.to_string()))
                .unwrap(),
        )
    }

    fn accepted() -> ReplayEvent {
        reply(200, r#"{"UnprocessedItems":{}}"#)
    }

    fn unprocessed(ids: &[&str]) -> ReplayEvent {
        let items: Vec<serde_json::Value> = ids
            .iter()
            .map(|id| {
                serde_json::json!({"PutRequest": {"Item": {
                    "ObjectId": {"S": id},
                    "ObjectType": {"S": "vertex"},
                    "TTL": {"N": "1700000000"},
                    "source": {"S": "neptuneStreams"}
                }}})
            })
            .collect();
        let body = serde_json::json!({"UnprocessedItems": {"expiry": items}});
        reply(200, &body.to_string())
    }

    fn replay_table(events: Vec<ReplayEvent>) -> (DynamoDbTable, StaticReplayClient) {
        let http_client = StaticReplayClient::new(events);
        let table = DynamoDbTable::from_client(client(Some(http_client.clone())), "expiry");
        (table, http_client)
    }

    fn vertex(id: &str) -> ExpiryEntry {
        ExpiryEntry::new(id, ElementType::Vertex, Number::from(1700000000))
    }

    /// Put requests carried by each call the table received
    fn sent_items(http_client: &StaticReplayClient) -> Vec<Vec<String>> {
        http_client
            .actual_requests()
            .map(|request| {
                let body: serde_json::Value =
                    serde_json::from_slice(request.body().bytes().unwrap()).unwrap();
                body["RequestItems"]["expiry"]
                    .as_array()
                    .unwrap()
                    .iter()
                    .map(|r| r["PutRequest"]["Item"]["ObjectId"]["S"].as_str().unwrap().to_string())
                    .collect()
            })
            .collect()
    }

    #[test]
    fn test_item_attributes() {
        let entry = ExpiryEntry::new("e7", ElementType::Edge, Number::from(1700000000));
        let item = to_item(&entry);

        assert_eq!(item.len(), 4);
        assert_eq!(item[ATTR_OBJECT_ID].as_s().unwrap(), "e7");
        assert_eq!(item[ATTR_OBJECT_TYPE].as_s().unwrap(), "edge");
        assert_eq!(item[ATTR_TTL].as_n().unwrap(), "1700000000");
        assert_eq!(item[ATTR_SOURCE].as_s().unwrap(), "neptuneStreams");
    }

    #[test]
    fn test_request_key() {
        let request = to_write_request(&vertex("v1")).unwrap();
        assert_eq!(
            request_key(&request),
            Some(("v1".to_string(), "vertex".to_string()))
        );
    }

    #[test]
    fn test_enqueue_replaces_same_row() {
        let mut writer = writer();
        for (id, object_type, ttl) in [
            ("v1", ElementType::Vertex, 1),
            ("v1", ElementType::Edge, 2),
            ("v1", ElementType::Vertex, 3),
        ] {
            let entry = ExpiryEntry::new(id, object_type, Number::from(ttl));
            writer.enqueue(to_write_request(&entry).unwrap());
        }

        assert_eq!(writer.pending.len(), 2);
        let last = writer.pending[1].put_request().unwrap().item();
        assert_eq!(last[ATTR_TTL].as_n().unwrap(), "3");
        writer.pending.clear();
    }

    #[tokio::test]
    async fn test_puts_are_sent_in_chunks_of_25() {
        let (table, http_client) = replay_table(vec![accepted(), accepted()]);
        let mut writer = table.batch_writer();

        for i in 0..30 {
            writer.put(vertex(&format!("v{}", i))).await.unwrap();
            if i == 24 {
                assert_eq!(http_client.actual_requests().count(), 1);
                assert!(writer.pending.is_empty());
            }
        }
        writer.close().await.unwrap();

        let calls = sent_items(&http_client);
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].len(), MAX_BATCH_WRITE_ITEMS);
        assert_eq!(calls[0][0], "v0");
        assert_eq!(calls[1], vec!["v25", "v26", "v27", "v28", "v29"]);
    }

    #[tokio::test]
    async fn test_unprocessed_items_are_resent() {
        let (table, http_client) = replay_table(vec![unprocessed(&["v-retry"]), accepted()]);
        let mut writer = table.batch_writer();

        writer.put(vertex("v-keep")).await.unwrap();
        writer.put(vertex("v-retry")).await.unwrap();
        writer.close().await.unwrap();

        let calls = sent_items(&http_client);
        assert_eq!(calls, vec![vec!["v-keep", "v-retry"], vec!["v-retry"]]);
    }

    #[tokio::test]
    async fn test_no_progress_fails_close() {
        let (table, http_client) = replay_table(vec![unprocessed(&["v1", "v2"])]);
        let mut writer = table.batch_writer();

        writer.put(vertex("v1")).await.unwrap();
        writer.put(vertex("v2")).await.unwrap();
        let result = writer.close().await;

        assert!(matches!(result, Err(SinkError::Unprocessed { count: 2 })));
        assert_eq!(http_client.actual_requests().count(), 1);
    }

    #[tokio::test]
    async fn test_rejected_chunk_reports_its_size() {
        let (table, _http_client) = replay_table(vec![reply(
            400,
            r#"{"__type":"com.amazonaws.dynamodb.v20120810#ValidationException","message":"bad item"}"#,
        )]);
        let mut writer = table.batch_writer();

        for i in 0..24 {
            writer.put(vertex(&format!("v{}", i))).await.unwrap();
        }
        match writer.put(vertex("v24")).await {
            Err(SinkError::Rejected(detail)) => {
                assert!(detail.starts_with("batch of 25 items"), "{}", detail);
            }
            other => panic!("unexpected: {:?}", other),
        }
    }
}
