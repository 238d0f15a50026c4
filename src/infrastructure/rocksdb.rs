use crate::domain::ports::{ArtifactStore, VoucherStore};
use crate::domain::voucher::{StatusUpdate, Voucher, VoucherIdentity};
use crate::error::{AuthorizerError, Result};
use async_trait::async_trait;
use chrono::Utc;
use rocksdb::{ColumnFamilyDescriptor, DB, Options};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Column Family for storing voucher records.
pub const CF_VOUCHERS: &str = "vouchers";
/// Column Family for storing authorized documents.
pub const CF_ARTIFACTS: &str = "artifacts";

#[derive(Serialize, Deserialize)]
struct StoredArtifact {
    content_type: String,
    body: Vec<u8>,
}

/// A persistent voucher table and artifact store backed by RocksDB.
///
/// Vouchers are keyed by `companyId` followed by the compound voucher key, so
/// all records of a company are contiguous. Values are JSON.
///
/// This struct is thread-safe (`Clone` shares the underlying `Arc<DB>`).
#[derive(Clone)]
pub struct RocksDBStore {
    db: Arc<DB>,
    // Serializes read-modify-write status updates within this process.
    write_lock: Arc<Mutex<()>>,
}

impl RocksDBStore {
    /// Opens or creates a RocksDB instance at the specified path.
    ///
    /// Ensures that the required column families ("vouchers" and "artifacts") exist.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_vouchers = ColumnFamilyDescriptor::new(CF_VOUCHERS, Options::default());
        let cf_artifacts = ColumnFamilyDescriptor::new(CF_ARTIFACTS, Options::default());

        let db = DB::open_cf_descriptors(&opts, path, vec![cf_vouchers, cf_artifacts])
            .map_err(store_error)?;

        Ok(Self {
            db: Arc::new(db),
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    fn voucher_key(company_id: &str, voucher_id: &str) -> Vec<u8> {
        format!("{company_id}{voucher_id}").into_bytes()
    }

    fn read_voucher(&self, key: &[u8]) -> Result<Option<Voucher>> {
        let cf = self
            .db
            .cf_handle(CF_VOUCHERS)
            .ok_or_else(|| missing_cf(CF_VOUCHERS))?;

        match self.db.get_cf(&cf, key).map_err(store_error)? {
            Some(bytes) => Ok(Some(
                serde_json::from_slice(&bytes).map_err(store_error)?,
            )),
            None => Ok(None),
        }
    }

    fn write_voucher(&self, voucher: &Voucher) -> Result<()> {
        let cf = self
            .db
            .cf_handle(CF_VOUCHERS)
            .ok_or_else(|| missing_cf(CF_VOUCHERS))?;

        let key = Self::voucher_key(&voucher.company_id, &voucher.voucher_id);
        let value = serde_json::to_vec(voucher).map_err(store_error)?;
        self.db.put_cf(&cf, key, value).map_err(store_error)
    }
}

fn store_error<E: std::error::Error + Send + Sync + 'static>(err: E) -> AuthorizerError {
    AuthorizerError::Store(Box::new(err))
}

fn missing_cf(name: &str) -> AuthorizerError {
    AuthorizerError::Store(format!("{name} column family not found").into())
}

#[async_trait]
impl VoucherStore for RocksDBStore {
    async fn get(&self, company_id: &str, identity: &VoucherIdentity) -> Result<Option<Voucher>> {
        self.read_voucher(&Self::voucher_key(company_id, &identity.store_key()))
    }

    async fn update_status(
        &self,
        company_id: &str,
        identity: &VoucherIdentity,
        update: StatusUpdate,
    ) -> Result<()> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| AuthorizerError::Store("voucher write lock poisoned".into()))?;

        let key = Self::voucher_key(company_id, &identity.store_key());
        let mut voucher = self
            .read_voucher(&key)?
            .unwrap_or_else(|| Voucher::partial(company_id, identity, update.status));
        voucher.apply(update, Utc::now());
        self.write_voucher(&voucher)
    }

    async fn put(&self, voucher: Voucher) -> Result<()> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| AuthorizerError::Store("voucher write lock poisoned".into()))?;
        self.write_voucher(&voucher)
    }
}

#[async_trait]
impl ArtifactStore for RocksDBStore {
    async fn put(&self, key: &str, body: Vec<u8>, content_type: &str) -> Result<()> {
        let cf = self
            .db
            .cf_handle(CF_ARTIFACTS)
            .ok_or_else(|| missing_cf(CF_ARTIFACTS))?;

        let value = serde_json::to_vec(&StoredArtifact {
            content_type: content_type.to_string(),
            body,
        })
        .map_err(|e| AuthorizerError::Artifact(Box::new(e)))?;

        self.db
            .put_cf(&cf, key.as_bytes(), value)
            .map_err(|e| AuthorizerError::Artifact(Box::new(e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::access_key::AccessKey;
    use crate::domain::voucher::VoucherStatus;
    use tempfile::tempdir;

    const KEY: &str = "1810202601179001122300110010020000001231234567819";

    #[tokio::test]
    async fn test_rocksdb_open_cf() {
        let dir = tempdir().unwrap();
        let store = RocksDBStore::open(dir.path()).expect("Failed to open RocksDB");

        // Verify CFs exist
        assert!(store.db.cf_handle(CF_VOUCHERS).is_some());
        assert!(store.db.cf_handle(CF_ARTIFACTS).is_some());
    }

    #[tokio::test]
    async fn test_rocksdb_voucher_store() {
        let dir = tempdir().unwrap();
        let store = RocksDBStore::open(dir.path()).unwrap();
        let key = AccessKey::parse(KEY).unwrap();

        VoucherStore::put(&store, Voucher::new(&key, "<factura/>", VoucherStatus::Received))
            .await
            .unwrap();
        store
            .update_status(
                key.company_id(),
                key.identity(),
                StatusUpdate::new(VoucherStatus::NotAuthorized).with_messages(vec!["x".into()]),
            )
            .await
            .unwrap();

        let voucher = store
            .get(key.company_id(), key.identity())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(voucher.status, VoucherStatus::NotAuthorized);
        assert_eq!(voucher.messages, vec!["x"]);
        assert_eq!(voucher.xml, "<factura/>");

        assert!(store.get("0000000000001", key.identity()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_rocksdb_persistence_recovery() {
        let dir = tempdir().unwrap();
        let key = AccessKey::parse(KEY).unwrap();
        {
            let store = RocksDBStore::open(dir.path()).unwrap();
            VoucherStore::put(&store, Voucher::new(&key, "", VoucherStatus::Signed))
                .await
                .unwrap();
        }

        let store = RocksDBStore::open(dir.path()).unwrap();
        let voucher = store.get(key.company_id(), key.identity()).await.unwrap();
        assert_eq!(voucher.unwrap().status, VoucherStatus::Signed);
    }
}
