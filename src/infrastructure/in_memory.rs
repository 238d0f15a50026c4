use crate::domain::authorization::AuthorizationResponse;
use crate::domain::event::{ChangeEvent, ChangeEventName};
use crate::domain::ports::{
    ArtifactStore, AuthorizationService, NotificationTopic, VoucherStore, WorkQueue,
};
use crate::domain::voucher::{Environment, StatusUpdate, Voucher, VoucherIdentity, VoucherImage};
use crate::error::{AuthorizerError, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};

type RecordKey = (String, String);

#[derive(Default)]
struct Table {
    records: HashMap<RecordKey, Voucher>,
    changes: Vec<ChangeEvent>,
    sequence: u64,
}

impl Table {
    /// Writes a record and, when the feed is on, appends the matching change
    /// event in commit order.
    fn write(&mut self, key: RecordKey, voucher: Voucher, feed: Option<&str>) {
        let new_image = VoucherImage::from(&voucher);
        let old = self.records.insert(key, voucher);
        let Some(table_name) = feed else {
            return;
        };
        self.sequence += 1;

        self.changes.push(ChangeEvent {
            event_id: format!("{:020}", self.sequence),
            event_name: if old.is_some() {
                ChangeEventName::Modify
            } else {
                ChangeEventName::Insert
            },
            table_name: Some(table_name.to_string()),
            old_image: old.as_ref().map(VoucherImage::from),
            new_image: Some(new_image),
        });
    }
}

/// A thread-safe in-memory voucher table with an optional change feed.
///
/// With the feed on, every successful write is appended to it as an `INSERT`
/// or `MODIFY` event carrying old and new images, in commit order. The feed
/// is held until drained with [`InMemoryVoucherStore::take_changes`].
#[derive(Default, Clone)]
pub struct InMemoryVoucherStore {
    table: Arc<RwLock<Table>>,
    change_feed: Option<String>,
}

impl InMemoryVoucherStore {
    /// Creates a new, empty in-memory voucher store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Turns on the change feed, tagging its events with `table_name`.
    pub fn with_change_feed(mut self, table_name: impl Into<String>) -> Self {
        self.change_feed = Some(table_name.into());
        self
    }

    /// Drains the change feed accumulated since the last call.
    pub async fn take_changes(&self) -> Vec<ChangeEvent> {
        let mut table = self.table.write().await;
        std::mem::take(&mut table.changes)
    }

    pub async fn len(&self) -> usize {
        self.table.read().await.records.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl VoucherStore for InMemoryVoucherStore {
    async fn get(&self, company_id: &str, identity: &VoucherIdentity) -> Result<Option<Voucher>> {
        let table = self.table.read().await;
        let key = (company_id.to_string(), identity.store_key());
        Ok(table.records.get(&key).cloned())
    }

    async fn update_status(
        &self,
        company_id: &str,
        identity: &VoucherIdentity,
        update: StatusUpdate,
    ) -> Result<()> {
        let mut table = self.table.write().await;
        let key = (company_id.to_string(), identity.store_key());
        let mut voucher = table
            .records
            .get(&key)
            .cloned()
            .unwrap_or_else(|| Voucher::partial(company_id, identity, update.status));
        voucher.apply(update, Utc::now());
        table.write(key, voucher, self.change_feed.as_deref());
        Ok(())
    }

    async fn put(&self, voucher: Voucher) -> Result<()> {
        let mut table = self.table.write().await;
        let key = (voucher.company_id.clone(), voucher.voucher_id.clone());
        table.write(key, voucher, self.change_feed.as_deref());
        Ok(())
    }
}

/// In-memory authorization queue recording every sent body.
#[derive(Default)]
pub struct InMemoryWorkQueue {
    sent: Mutex<Vec<String>>,
    failures_left: AtomicUsize,
    next_id: AtomicU64,
}

impl InMemoryWorkQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `count` sends fail with `DownstreamPublish`.
    pub async fn fail_next_sends(&self, count: usize) {
        self.failures_left.store(count, Ordering::SeqCst);
    }

    pub async fn sent(&self) -> Vec<String> {
        self.sent.lock().await.clone()
    }

    /// Removes and returns every message sent so far.
    pub async fn drain(&self) -> Vec<String> {
        std::mem::take(&mut *self.sent.lock().await)
    }
}

#[async_trait]
impl WorkQueue for InMemoryWorkQueue {
    async fn send(&self, body: String) -> Result<String> {
        if take_failure(&self.failures_left) {
            return Err(AuthorizerError::DownstreamPublish(
                "queue unavailable".to_string(),
            ));
        }
        self.sent.lock().await.push(body);
        Ok(format!("msg-{}", self.next_id.fetch_add(1, Ordering::SeqCst)))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PublishedMessage {
    pub message: String,
    pub attributes: BTreeMap<String, String>,
}

/// In-memory status topic recording every published message.
#[derive(Default)]
pub struct InMemoryTopic {
    published: Mutex<Vec<PublishedMessage>>,
    failures_left: AtomicUsize,
    next_id: AtomicU64,
}

impl InMemoryTopic {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `count` publishes fail with `DownstreamPublish`.
    pub async fn fail_next_publishes(&self, count: usize) {
        self.failures_left.store(count, Ordering::SeqCst);
    }

    pub async fn published(&self) -> Vec<PublishedMessage> {
        self.published.lock().await.clone()
    }
}

#[async_trait]
impl NotificationTopic for InMemoryTopic {
    async fn publish(
        &self,
        message: String,
        attributes: BTreeMap<String, String>,
    ) -> Result<String> {
        if take_failure(&self.failures_left) {
            return Err(AuthorizerError::DownstreamPublish(
                "topic unavailable".to_string(),
            ));
        }
        self.published.lock().await.push(PublishedMessage {
            message,
            attributes,
        });
        Ok(format!("ntf-{}", self.next_id.fetch_add(1, Ordering::SeqCst)))
    }
}

fn take_failure(failures_left: &AtomicUsize) -> bool {
    failures_left
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoredArtifact {
    pub body: Vec<u8>,
    pub content_type: String,
}

/// In-memory artifact store; later puts to the same key overwrite earlier ones.
#[derive(Default)]
pub struct InMemoryArtifactStore {
    artifacts: RwLock<HashMap<String, StoredArtifact>>,
    puts: AtomicUsize,
}

impl InMemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, key: &str) -> Option<StoredArtifact> {
        self.artifacts.read().await.get(key).cloned()
    }

    pub async fn len(&self) -> usize {
        self.artifacts.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Number of put calls, overwrites included.
    pub async fn put_count(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ArtifactStore for InMemoryArtifactStore {
    async fn put(&self, key: &str, body: Vec<u8>, content_type: &str) -> Result<()> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        self.artifacts.write().await.insert(
            key.to_string(),
            StoredArtifact {
                body,
                content_type: content_type.to_string(),
            },
        );
        Ok(())
    }
}

#[derive(Debug, Clone)]
enum Scripted {
    Respond(AuthorizationResponse),
    Fail(String),
}

/// An authorization service answering from a script.
///
/// Scripted answers are consumed in order; once exhausted, the fallback answer
/// is returned for every further call.
pub struct ScriptedAuthority {
    script: Mutex<VecDeque<Scripted>>,
    fallback: Scripted,
    delay: Option<Duration>,
    calls: Mutex<Vec<(String, Environment)>>,
}

impl ScriptedAuthority {
    fn with_fallback(fallback: Scripted) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback,
            delay: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Always answers with `response`.
    pub fn always(response: AuthorizationResponse) -> Self {
        Self::with_fallback(Scripted::Respond(response))
    }

    /// Always fails with a `RemoteAuthority` error.
    pub fn failing(reason: impl Into<String>) -> Self {
        Self::with_fallback(Scripted::Fail(reason.into()))
    }

    /// Queues a one-off failure ahead of the fallback answer.
    pub fn then_fail(self, reason: impl Into<String>) -> Self {
        self.push(Scripted::Fail(reason.into()))
    }

    /// Queues a one-off answer ahead of the fallback answer.
    pub fn then_respond(self, response: AuthorizationResponse) -> Self {
        self.push(Scripted::Respond(response))
    }

    fn push(mut self, scripted: Scripted) -> Self {
        self.script.get_mut().push_back(scripted);
        self
    }

    /// Delays every answer, to exercise call timeouts.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub async fn calls(&self) -> usize {
        self.calls.lock().await.len()
    }

    /// Access keys and environments of every call, in order.
    pub async fn requests(&self) -> Vec<(String, Environment)> {
        self.calls.lock().await.clone()
    }
}

#[async_trait]
impl AuthorizationService for ScriptedAuthority {
    async fn authorize(
        &self,
        access_key: &str,
        environment: Environment,
    ) -> Result<AuthorizationResponse> {
        self.calls
            .lock()
            .await
            .push((access_key.to_string(), environment));
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let next = self.script.lock().await.pop_front();
        match next.unwrap_or_else(|| self.fallback.clone()) {
            Scripted::Respond(response) => Ok(response),
            Scripted::Fail(reason) => Err(AuthorizerError::RemoteAuthority(reason)),
        }
    }
}
