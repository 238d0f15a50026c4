use thiserror::Error;

pub type Result<T> = std::result::Result<T, AuthorizerError>;

#[derive(Error, Debug)]
pub enum AuthorizerError {
    #[error("Malformed access key '{access_key}': {reason}")]
    MalformedKey { access_key: String, reason: String },
    #[error("Voucher not found for access key {0}")]
    VoucherNotFound(String),
    #[error("Remote authority error: {0}")]
    RemoteAuthority(String),
    #[error("Missing required field '{field}' in change event {event_id}")]
    MissingRequiredField { event_id: String, field: &'static str },
    #[error("Downstream publish failed: {0}")]
    DownstreamPublish(String),
    #[error("Malformed queue message: {0}")]
    MalformedMessage(String),
    #[error("Store error: {0}")]
    Store(Box<dyn std::error::Error + Send + Sync>),
    #[error("Artifact store error: {0}")]
    Artifact(Box<dyn std::error::Error + Send + Sync>),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Configuration error: {0}")]
    Config(String),
}

impl AuthorizerError {
    /// Transient failures worth redelivering.
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            Self::RemoteAuthority(_)
                | Self::DownstreamPublish(_)
                | Self::Store(_)
                | Self::Artifact(_)
                | Self::Io(_)
        )
    }

    /// Errors that are logged and dropped instead of being reported for redelivery.
    pub fn is_dropped(&self) -> bool {
        matches!(
            self,
            Self::MalformedKey { .. } | Self::MissingRequiredField { .. }
        )
    }
}
