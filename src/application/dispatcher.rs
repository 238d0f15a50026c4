use crate::application::publisher::NotificationPublisher;
use crate::domain::event::{ChangeEvent, ChangeEventName, DispatchMessage};
use crate::domain::ports::WorkQueueRef;
use crate::domain::voucher::{VoucherImage, VoucherStatus};
use crate::error::{AuthorizerError, Result};
use tracing::{debug, info, warn};

/// The downstream action a change event calls for.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum Dispatch {
    /// Enqueue an authorization attempt.
    Authorize { access_key: String },
    /// Publish a terminal-state notification.
    Notify {
        status: VoucherStatus,
        access_key: String,
    },
    /// Nothing to do for this event.
    Skip,
}

/// Decides which action, if any, a change event triggers.
///
/// Only `MODIFY` events carrying both images are considered, and only the
/// status *transition* matters: an unchanged status is always a no-op.
/// Missing fields on a matching transition yield `MissingRequiredField`.
pub fn route(event: &ChangeEvent) -> Result<Dispatch> {
    if event.event_name != ChangeEventName::Modify {
        return Ok(Dispatch::Skip);
    }

    let old = image(event, event.old_image.as_ref(), "OldImage")?;
    let new = image(event, event.new_image.as_ref(), "NewImage")?;

    let old_status = old.voucher_status();
    let new_status = new.voucher_status();
    if old_status == new_status {
        return Ok(Dispatch::Skip);
    }

    match (old_status, new_status) {
        (_, Some(new_status)) if new_status.awaits_authorization() => Ok(Dispatch::Authorize {
            access_key: required_access_key(event, new)?,
        }),
        (Some(old_status), Some(VoucherStatus::Authorized))
            if old_status.awaits_authorization() =>
        {
            let access_key = required_access_key(event, new)?;
            if new.status.as_deref().is_none_or(str::is_empty) {
                return Err(missing(event, "status"));
            }
            Ok(Dispatch::Notify {
                status: VoucherStatus::Authorized,
                access_key,
            })
        }
        _ => Ok(Dispatch::Skip),
    }
}

fn image<'a>(
    event: &ChangeEvent,
    image: Option<&'a VoucherImage>,
    field: &'static str,
) -> Result<&'a VoucherImage> {
    image.ok_or_else(|| missing(event, field))
}

fn required_access_key(event: &ChangeEvent, image: &VoucherImage) -> Result<String> {
    image
        .access_key
        .as_deref()
        .filter(|key| !key.is_empty())
        .map(str::to_string)
        .ok_or_else(|| missing(event, "accessKey"))
}

fn missing(event: &ChangeEvent, field: &'static str) -> AuthorizerError {
    AuthorizerError::MissingRequiredField {
        event_id: event.event_id.clone(),
        field,
    }
}

/// Routes voucher table changes to the authorization queue or the status topic.
#[derive(Clone)]
pub struct ChangeDispatcher {
    queue: WorkQueueRef,
    publisher: NotificationPublisher,
    table_name: String,
}

impl ChangeDispatcher {
    /// Creates a dispatcher.
    ///
    /// `table_name` identifies the source table on queued messages whenever
    /// the change event itself does not carry it.
    pub fn new(
        queue: WorkQueueRef,
        publisher: NotificationPublisher,
        table_name: impl Into<String>,
    ) -> Self {
        Self {
            queue,
            publisher,
            table_name: table_name.into(),
        }
    }

    /// Handles one change event.
    ///
    /// Malformed events are logged and dropped. Queue and topic failures are
    /// propagated so the whole event is redelivered.
    pub async fn handle(&self, event: &ChangeEvent) -> Result<Dispatch> {
        let table = event.table_name.as_deref().unwrap_or(&self.table_name);
        debug!(
            event_id = %event.event_id,
            event_name = %event.event_name,
            %table,
            "change event received"
        );

        let dispatch = match route(event) {
            Ok(dispatch) => dispatch,
            Err(err) if err.is_dropped() => {
                warn!(event_id = %event.event_id, %table, error = %err, "dropping change event");
                return Ok(Dispatch::Skip);
            }
            Err(err) => return Err(err),
        };

        match &dispatch {
            Dispatch::Authorize { access_key } => {
                let message = DispatchMessage::authorize(access_key.as_str(), table);
                let body = serde_json::to_string(&message)?;
                let message_id = self.queue.send(body).await?;
                info!(
                    event_id = %event.event_id,
                    %access_key,
                    %message_id,
                    "authorization enqueued"
                );
            }
            Dispatch::Notify { status, access_key } => {
                self.publisher.publish(*status, access_key).await?;
            }
            Dispatch::Skip => {
                debug!(event_id = %event.event_id, "no action for change event");
            }
        }

        Ok(dispatch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::in_memory::{InMemoryTopic, InMemoryWorkQueue};
    use std::sync::Arc;

    const ALL_STATUSES: [VoucherStatus; 9] = [
        VoucherStatus::Error,
        VoucherStatus::Initial,
        VoucherStatus::Generated,
        VoucherStatus::Signed,
        VoucherStatus::Received,
        VoucherStatus::Processing,
        VoucherStatus::Rejected,
        VoucherStatus::Authorized,
        VoucherStatus::NotAuthorized,
    ];

    fn voucher_image(status: Option<VoucherStatus>, access_key: Option<&str>) -> VoucherImage {
        VoucherImage {
            status: status.map(|s| s.to_string()),
            access_key: access_key.map(str::to_string),
            ..Default::default()
        }
    }

    fn modify(old: VoucherStatus, new: VoucherStatus) -> ChangeEvent {
        ChangeEvent {
            event_id: "evt-1".into(),
            event_name: ChangeEventName::Modify,
            table_name: Some("vouchers".into()),
            old_image: Some(voucher_image(Some(old), Some("KEY"))),
            new_image: Some(voucher_image(Some(new), Some("KEY"))),
        }
    }

    fn dispatcher() -> (ChangeDispatcher, Arc<InMemoryWorkQueue>, Arc<InMemoryTopic>) {
        let queue = Arc::new(InMemoryWorkQueue::new());
        let topic = Arc::new(InMemoryTopic::new());
        let dispatcher = ChangeDispatcher::new(
            queue.clone(),
            NotificationPublisher::new(topic.clone()),
            "configured-table",
        );
        (dispatcher, queue, topic)
    }

    #[test]
    fn test_transition_table() {
        for old in ALL_STATUSES {
            for new in ALL_STATUSES {
                let dispatch = route(&modify(old, new)).unwrap();
                let expected = if old == new {
                    Dispatch::Skip
                } else if new.awaits_authorization() {
                    Dispatch::Authorize {
                        access_key: "KEY".into(),
                    }
                } else if old.awaits_authorization() && new == VoucherStatus::Authorized {
                    Dispatch::Notify {
                        status: VoucherStatus::Authorized,
                        access_key: "KEY".into(),
                    }
                } else {
                    Dispatch::Skip
                };
                assert_eq!(dispatch, expected, "{old} -> {new}");
            }
        }
    }

    #[test]
    fn test_non_modify_events_are_ignored() {
        for name in [
            ChangeEventName::Insert,
            ChangeEventName::Remove,
            ChangeEventName::Unknown,
        ] {
            let mut event = modify(VoucherStatus::Signed, VoucherStatus::Received);
            event.event_name = name;
            assert_eq!(route(&event).unwrap(), Dispatch::Skip);
        }
    }

    #[test]
    fn test_missing_access_key_is_reported() {
        let mut event = modify(VoucherStatus::Signed, VoucherStatus::Received);
        event.new_image = Some(voucher_image(Some(VoucherStatus::Received), None));
        assert!(matches!(
            route(&event),
            Err(AuthorizerError::MissingRequiredField {
                field: "accessKey",
                ..
            })
        ));
    }

    #[test]
    fn test_missing_old_status_still_authorizes() {
        let mut event = modify(VoucherStatus::Signed, VoucherStatus::Received);
        event.old_image = Some(voucher_image(None, Some("KEY")));
        assert_eq!(
            route(&event).unwrap(),
            Dispatch::Authorize {
                access_key: "KEY".into()
            }
        );
    }

    #[tokio::test]
    async fn test_received_enqueues_one_message() {
        let (dispatcher, queue, topic) = dispatcher();

        dispatcher
            .handle(&modify(VoucherStatus::Signed, VoucherStatus::Received))
            .await
            .unwrap();

        let sent = queue.sent().await;
        assert_eq!(sent.len(), 1);
        let message: DispatchMessage = serde_json::from_str(&sent[0]).unwrap();
        assert_eq!(message.access_key, "KEY");
        assert_eq!(message.source_table, "vouchers");
        assert!(topic.published().await.is_empty());
    }

    #[tokio::test]
    async fn test_configured_table_is_used_when_event_has_none() {
        let (dispatcher, queue, _) = dispatcher();
        let mut event = modify(VoucherStatus::Signed, VoucherStatus::Received);
        event.table_name = None;

        dispatcher.handle(&event).await.unwrap();

        let message: DispatchMessage = serde_json::from_str(&queue.sent().await[0]).unwrap();
        assert_eq!(message.source_table, "configured-table");
    }

    #[tokio::test]
    async fn test_authorized_publishes_one_notification() {
        let (dispatcher, queue, topic) = dispatcher();

        dispatcher
            .handle(&modify(VoucherStatus::Processing, VoucherStatus::Authorized))
            .await
            .unwrap();

        let published = topic.published().await;
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].attributes["status"], "AUTHORIZED");
        assert!(queue.sent().await.is_empty());
    }

    #[tokio::test]
    async fn test_malformed_event_is_dropped() {
        let (dispatcher, queue, topic) = dispatcher();
        let mut event = modify(VoucherStatus::Received, VoucherStatus::Authorized);
        event.new_image = None;

        let dispatch = dispatcher.handle(&event).await.unwrap();

        assert_eq!(dispatch, Dispatch::Skip);
        assert!(queue.sent().await.is_empty());
        assert!(topic.published().await.is_empty());
    }

    #[tokio::test]
    async fn test_queue_failure_is_propagated() {
        let (dispatcher, queue, _) = dispatcher();
        queue.fail_next_sends(1).await;

        let result = dispatcher
            .handle(&modify(VoucherStatus::Signed, VoucherStatus::Received))
            .await;

        assert!(matches!(result, Err(AuthorizerError::DownstreamPublish(_))));
    }
}
