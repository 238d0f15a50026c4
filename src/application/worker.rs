use crate::domain::access_key::AccessKey;
use crate::domain::authorization::AuthorizationOutcome;
use crate::domain::ports::{ArtifactStoreRef, AuthorizationServiceRef, VoucherStoreRef};
use crate::domain::voucher::{StatusUpdate, VoucherStatus};
use crate::error::{AuthorizerError, Result};
use std::time::Duration;
use tracing::{error, info, warn};

/// Content type of stored authorized documents.
pub const XML_CONTENT_TYPE: &str = "application/xml; charset=utf-8";
/// Default budget for one remote authorization call.
pub const DEFAULT_REMOTE_TIMEOUT: Duration = Duration::from_secs(60);

/// Performs the remote authorization of a voucher and persists the outcome.
///
/// No lock guards concurrent runs for the same access key. Correctness rests
/// on the remote authority answering repeated queries consistently and on the
/// final status write being an idempotent overwrite.
#[derive(Clone)]
pub struct AuthorizationWorker {
    store: VoucherStoreRef,
    authority: AuthorizationServiceRef,
    artifacts: Option<ArtifactStoreRef>,
    remote_timeout: Duration,
}

impl AuthorizationWorker {
    pub fn new(store: VoucherStoreRef, authority: AuthorizationServiceRef) -> Self {
        Self {
            store,
            authority,
            artifacts: None,
            remote_timeout: DEFAULT_REMOTE_TIMEOUT,
        }
    }

    pub fn with_artifact_store(mut self, artifacts: ArtifactStoreRef) -> Self {
        self.artifacts = Some(artifacts);
        self
    }

    pub fn with_remote_timeout(mut self, remote_timeout: Duration) -> Self {
        self.remote_timeout = remote_timeout;
        self
    }

    /// Authorizes the voucher behind `access_key` and returns its final status.
    ///
    /// A voucher already AUTHORIZED or NOT_AUTHORIZED is returned untouched,
    /// without calling the remote authority.
    ///
    /// Any failure after the record was marked `PROCESSING` leaves it there and
    /// is returned as is, so redelivery retries the whole operation.
    pub async fn process_voucher(&self, access_key: &str) -> Result<VoucherStatus> {
        info!(%access_key, "processing voucher");
        let key = AccessKey::parse(access_key)?;
        let company_id = key.company_id();
        let identity = key.identity();

        let Some(voucher) = self.store.get(company_id, identity).await? else {
            error!(%access_key, "voucher not found");
            return Err(AuthorizerError::VoucherNotFound(access_key.to_string()));
        };
        if voucher.status.is_final() {
            info!(%access_key, status = %voucher.status, "voucher already decided, skipping");
            return Ok(voucher.status);
        }

        self.store
            .update_status(
                company_id,
                identity,
                StatusUpdate::new(VoucherStatus::Processing),
            )
            .await?;

        let result = self.authorize(&key).await;
        if let Err(err) = &result {
            error!(%access_key, error = %err, "authorization failed, voucher left in PROCESSING");
        }
        result
    }

    async fn authorize(&self, key: &AccessKey) -> Result<VoucherStatus> {
        let outcome = self.call_authority(key).await?;
        let detail = outcome.detail;

        if outcome.granted {
            match detail.voucher.as_deref() {
                Some(document) => self.store_document(key, document).await?,
                None => {
                    warn!(access_key = %key, "authorization granted without a signed document");
                }
            }
        }

        let status = if outcome.granted {
            VoucherStatus::Authorized
        } else {
            VoucherStatus::NotAuthorized
        };

        let update = StatusUpdate::new(status)
            .with_messages(detail.messages)
            .with_sri_status(detail.status)
            .with_authorization_date(detail.authorization_date);
        self.store
            .update_status(key.company_id(), key.identity(), update)
            .await?;

        info!(access_key = %key, %status, "voucher status updated");
        Ok(status)
    }

    async fn call_authority(&self, key: &AccessKey) -> Result<AuthorizationOutcome> {
        let call = self.authority.authorize(key.as_str(), key.environment());
        match tokio::time::timeout(self.remote_timeout, call).await {
            Ok(response) => Ok(response?.normalize()),
            Err(_) => Err(AuthorizerError::RemoteAuthority(format!(
                "authorization call for {key} timed out after {:?}",
                self.remote_timeout
            ))),
        }
    }

    async fn store_document(&self, key: &AccessKey, document: &str) -> Result<()> {
        let Some(artifacts) = &self.artifacts else {
            warn!(
                access_key = %key,
                "skipping authorized XML upload: no artifact store configured"
            );
            return Ok(());
        };

        let artifact_key = key.artifact_key();
        artifacts
            .put(&artifact_key, document.as_bytes().to_vec(), XML_CONTENT_TYPE)
            .await?;
        info!(access_key = %key, %artifact_key, "authorized XML stored");
        Ok(())
    }
}
