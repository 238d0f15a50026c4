use crate::domain::ports::{NotificationTopic, WorkQueue};
use crate::error::{AuthorizerError, Result};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::io::Write;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Serialize)]
#[serde(rename_all = "lowercase")]
enum Channel {
    Queue,
    Topic,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct OutboxLine<'a> {
    channel: Channel,
    message_id: String,
    body: Value,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    attributes: &'a BTreeMap<String, String>,
}

/// Queue and topic adapter writing each message as one JSON line.
///
/// Lets the dispatcher run outside the managed services, e.g. from the CLI,
/// with a downstream process picking up the lines.
pub struct JsonLinesOutbox<W: Write + Send> {
    writer: Mutex<W>,
    next_id: AtomicU64,
}

impl<W: Write + Send> JsonLinesOutbox<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn into_inner(self) -> W {
        self.writer
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn emit(
        &self,
        channel: Channel,
        body: &str,
        attributes: &BTreeMap<String, String>,
    ) -> Result<String> {
        let message_id = format!("local-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        let body = serde_json::from_str(body).unwrap_or_else(|_| Value::String(body.to_string()));
        let line = serde_json::to_string(&OutboxLine {
            channel,
            message_id: message_id.clone(),
            body,
            attributes,
        })?;

        let mut writer = self
            .writer
            .lock()
            .map_err(|_| AuthorizerError::DownstreamPublish("outbox lock poisoned".to_string()))?;
        writeln!(writer, "{line}")
            .and_then(|_| writer.flush())
            .map_err(|e| AuthorizerError::DownstreamPublish(e.to_string()))?;
        Ok(message_id)
    }
}

#[async_trait]
impl<W: Write + Send + 'static> WorkQueue for JsonLinesOutbox<W> {
    async fn send(&self, body: String) -> Result<String> {
        self.emit(Channel::Queue, &body, &BTreeMap::new())
    }
}

#[async_trait]
impl<W: Write + Send + 'static> NotificationTopic for JsonLinesOutbox<W> {
    async fn publish(
        &self,
        message: String,
        attributes: BTreeMap<String, String>,
    ) -> Result<String> {
        self.emit(Channel::Topic, &message, &attributes)
    }
}
