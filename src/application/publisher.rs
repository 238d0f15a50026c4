use crate::domain::event::{DispatchEventType, StatusChangeNotification};
use crate::domain::ports::NotificationTopicRef;
use crate::domain::voucher::VoucherStatus;
use crate::error::Result;
use std::collections::BTreeMap;
use tracing::info;

/// Publishes terminal-state events to the status topic.
///
/// Delivery is at-least-once; subscribers dedupe on access key and status.
#[derive(Clone)]
pub struct NotificationPublisher {
    topic: NotificationTopicRef,
}

impl NotificationPublisher {
    pub fn new(topic: NotificationTopicRef) -> Self {
        Self { topic }
    }

    /// Publishes a `STATUS_CHANGE` message and returns the topic's message id.
    pub async fn publish(&self, status: VoucherStatus, access_key: &str) -> Result<String> {
        let notification = StatusChangeNotification::new(status, access_key);
        let message = serde_json::to_string(&notification)?;

        let attributes = BTreeMap::from([
            (
                "eventType".to_string(),
                DispatchEventType::StatusChange.as_str().to_string(),
            ),
            ("status".to_string(), status.to_string()),
        ]);

        let message_id = self.topic.publish(message, attributes).await?;
        info!(%access_key, %status, %message_id, "status change published");
        Ok(message_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::in_memory::InMemoryTopic;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_publish_sets_filter_attributes() {
        let topic = Arc::new(InMemoryTopic::new());
        let publisher = NotificationPublisher::new(topic.clone());

        publisher
            .publish(VoucherStatus::Authorized, "123")
            .await
            .unwrap();

        let published = topic.published().await;
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].attributes["eventType"], "STATUS_CHANGE");
        assert_eq!(published[0].attributes["status"], "AUTHORIZED");

        let body: StatusChangeNotification = serde_json::from_str(&published[0].message).unwrap();
        assert_eq!(body.access_key, "123");
        assert_eq!(body.status, VoucherStatus::Authorized);
    }
}
