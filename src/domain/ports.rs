use super::authorization::AuthorizationResponse;
use super::voucher::{Environment, StatusUpdate, Voucher, VoucherIdentity};
use crate::error::Result;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Durable voucher table keyed by company id and compound voucher key.
#[async_trait]
pub trait VoucherStore: Send + Sync {
    async fn get(&self, company_id: &str, identity: &VoucherIdentity) -> Result<Option<Voucher>>;

    /// Overwrites status, messages and `updatedAt` without any condition.
    ///
    /// Updating a key that does not exist creates a partial record, so callers
    /// must confirm existence with [`VoucherStore::get`] first.
    async fn update_status(
        &self,
        company_id: &str,
        identity: &VoucherIdentity,
        update: StatusUpdate,
    ) -> Result<()>;

    /// Inserts or replaces a whole record (producer side).
    async fn put(&self, voucher: Voucher) -> Result<()>;
}

/// At-least-once work queue feeding the authorization worker.
#[async_trait]
pub trait WorkQueue: Send + Sync {
    /// Enqueues a message body and returns the queue's message id.
    async fn send(&self, body: String) -> Result<String>;
}

/// At-least-once pub/sub topic with string attributes for subscriber filtering.
#[async_trait]
pub trait NotificationTopic: Send + Sync {
    async fn publish(&self, message: String, attributes: BTreeMap<String, String>)
    -> Result<String>;
}

/// Blob store addressed by string key.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    async fn put(&self, key: &str, body: Vec<u8>, content_type: &str) -> Result<()>;
}

/// The external authority that grants or denies authorization for a voucher.
#[async_trait]
pub trait AuthorizationService: Send + Sync {
    async fn authorize(
        &self,
        access_key: &str,
        environment: Environment,
    ) -> Result<AuthorizationResponse>;
}

pub type VoucherStoreRef = Arc<dyn VoucherStore>;
pub type WorkQueueRef = Arc<dyn WorkQueue>;
pub type NotificationTopicRef = Arc<dyn NotificationTopic>;
pub type ArtifactStoreRef = Arc<dyn ArtifactStore>;
pub type AuthorizationServiceRef = Arc<dyn AuthorizationService>;
