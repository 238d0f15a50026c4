//! Batch boundary for queue and change-stream invocations.
//!
//! Items of a batch are processed sequentially and independently: a failing
//! item never aborts the rest, and only failed items are reported back so the
//! hosting runtime redelivers just those.

use crate::application::dispatcher::ChangeDispatcher;
use crate::application::worker::AuthorizationWorker;
use crate::domain::event::{AuthorizeVoucherMessage, ChangeEvent};
use crate::error::{AuthorizerError, Result};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

/// One message received from the authorization queue.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
#[serde(rename_all = "camelCase")]
pub struct QueueRecord {
    pub message_id: String,
    pub body: String,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone)]
#[serde(rename_all = "camelCase")]
pub struct BatchItemFailure {
    pub item_identifier: String,
}

/// Partial-batch result: the identifiers of the items to redeliver.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct BatchResponse {
    pub batch_item_failures: Vec<BatchItemFailure>,
}

impl BatchResponse {
    /// Marks an item for redelivery.
    pub fn record_failure(&mut self, item_identifier: impl Into<String>) {
        self.batch_item_failures.push(BatchItemFailure {
            item_identifier: item_identifier.into(),
        });
    }

    pub fn is_success(&self) -> bool {
        self.batch_item_failures.is_empty()
    }

    pub fn failed_items(&self) -> impl Iterator<Item = &str> {
        self.batch_item_failures
            .iter()
            .map(|failure| failure.item_identifier.as_str())
    }
}

/// Feeds authorization queue messages to the [`AuthorizationWorker`].
pub struct QueueBatchProcessor {
    worker: AuthorizationWorker,
}

impl QueueBatchProcessor {
    pub fn new(worker: AuthorizationWorker) -> Self {
        Self { worker }
    }

    pub async fn process(&self, records: &[QueueRecord]) -> BatchResponse {
        let mut response = BatchResponse::default();

        for record in records {
            match self.process_record(record).await {
                Ok(()) => {}
                Err(err) if err.is_dropped() => {
                    warn!(message_id = %record.message_id, error = %err, "dropping queue message");
                }
                Err(err) => {
                    error!(
                        message_id = %record.message_id,
                        retriable = err.is_retriable(),
                        error = %err,
                        "failed to process queue message"
                    );
                    response.record_failure(&record.message_id);
                }
            }
        }

        info!(
            records = records.len(),
            failures = response.batch_item_failures.len(),
            "queue batch processed"
        );
        response
    }

    async fn process_record(&self, record: &QueueRecord) -> Result<()> {
        let message: AuthorizeVoucherMessage = serde_json::from_str(&record.body)
            .map_err(|e| AuthorizerError::MalformedMessage(e.to_string()))?;
        self.worker.process_voucher(&message.access_key).await?;
        Ok(())
    }
}

/// Feeds change-stream records to the [`ChangeDispatcher`].
pub struct StreamBatchProcessor {
    dispatcher: ChangeDispatcher,
}

impl StreamBatchProcessor {
    pub fn new(dispatcher: ChangeDispatcher) -> Self {
        Self { dispatcher }
    }

    pub async fn process(&self, events: &[ChangeEvent]) -> BatchResponse {
        let mut response = BatchResponse::default();

        for event in events {
            if let Err(err) = self.dispatcher.handle(event).await {
                error!(event_id = %event.event_id, error = %err, "failed to dispatch change event");
                response.record_failure(&event.event_id);
            }
        }

        info!(
            records = events.len(),
            failures = response.batch_item_failures.len(),
            "stream batch processed"
        );
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::publisher::NotificationPublisher;
    use crate::domain::event::ChangeEventName;
    use crate::domain::voucher::VoucherImage;
    use crate::infrastructure::in_memory::{
        InMemoryTopic, InMemoryVoucherStore, InMemoryWorkQueue, ScriptedAuthority,
    };
    use std::sync::Arc;

    fn record(message_id: &str, body: &str) -> QueueRecord {
        QueueRecord {
            message_id: message_id.into(),
            body: body.into(),
        }
    }

    #[test]
    fn test_response_wire_shape() {
        let mut response = BatchResponse::default();
        response.record_failure("m-2");
        let json = serde_json::to_string(&response).unwrap();
        assert_eq!(json, r#"{"batchItemFailures":[{"itemIdentifier":"m-2"}]}"#);
    }

    #[tokio::test]
    async fn test_malformed_key_is_dropped_and_bad_body_reported() {
        let worker = AuthorizationWorker::new(
            Arc::new(InMemoryVoucherStore::new()),
            Arc::new(ScriptedAuthority::failing("unused")),
        );
        let processor = QueueBatchProcessor::new(worker);

        let response = processor
            .process(&[
                record("m-1", r#"{"accessKey":"short"}"#),
                record("m-2", "not json"),
            ])
            .await;

        assert_eq!(response.failed_items().collect::<Vec<_>>(), vec!["m-2"]);
    }

    #[tokio::test]
    async fn test_stream_failures_are_isolated() {
        let queue = Arc::new(InMemoryWorkQueue::new());
        let dispatcher = ChangeDispatcher::new(
            queue.clone(),
            NotificationPublisher::new(Arc::new(InMemoryTopic::new())),
            "vouchers",
        );
        let processor = StreamBatchProcessor::new(dispatcher);
        queue.fail_next_sends(1).await;

        let event = |id: &str| ChangeEvent {
            event_id: id.into(),
            event_name: ChangeEventName::Modify,
            table_name: None,
            old_image: Some(VoucherImage {
                status: Some("SIGNED".into()),
                ..Default::default()
            }),
            new_image: Some(VoucherImage {
                status: Some("RECEIVED".into()),
                access_key: Some(format!("key-{id}")),
                ..Default::default()
            }),
        };

        let response = processor
            .process(&[event("e-1"), event("e-2"), event("e-3")])
            .await;

        assert_eq!(response.failed_items().collect::<Vec<_>>(), vec!["e-1"]);
        assert_eq!(queue.sent().await.len(), 2);
    }
}
