use crate::error::{AuthorizerError, Result};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_PRODUCTION_ENDPOINT: &str =
    "https://cel.sri.gob.ec/comprobantes-electronicos-ws/AutorizacionComprobantesOffline?wsdl";
pub const DEFAULT_TEST_ENDPOINT: &str =
    "https://celcer.sri.gob.ec/comprobantes-electronicos-ws/AutorizacionComprobantesOffline?wsdl";
pub const DEFAULT_REMOTE_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, Clone, PartialEq)]
pub struct RemoteAuthorityConfig {
    pub production_endpoint: String,
    pub test_endpoint: String,
    /// Budget for a single authorization call.
    pub timeout: Duration,
}

impl RemoteAuthorityConfig {
    pub fn new(
        production_endpoint: impl Into<String>,
        test_endpoint: impl Into<String>,
        timeout_secs: u64,
    ) -> Result<Self> {
        let config = Self {
            production_endpoint: production_endpoint.into(),
            test_endpoint: test_endpoint.into(),
            timeout: Duration::from_secs(timeout_secs),
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        for (name, endpoint) in [
            ("SRI_ENDPOINT", &self.production_endpoint),
            ("SRI_TEST_ENDPOINT", &self.test_endpoint),
        ] {
            if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
                return Err(AuthorizerError::Config(format!(
                    "{name} must be an http(s) URL, got '{endpoint}'"
                )));
            }
        }
        if self.timeout.is_zero() {
            return Err(AuthorizerError::Config(
                "REMOTE_TIMEOUT_SECS must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for RemoteAuthorityConfig {
    fn default() -> Self {
        Self {
            production_endpoint: DEFAULT_PRODUCTION_ENDPOINT.to_string(),
            test_endpoint: DEFAULT_TEST_ENDPOINT.to_string(),
            timeout: Duration::from_secs(DEFAULT_REMOTE_TIMEOUT_SECS),
        }
    }
}

/// Settings shared by every component touching the voucher table.
#[derive(Debug, Clone, PartialEq)]
pub struct TableConfig {
    /// Name of the voucher table. Required, there is no default.
    pub table_name: String,
    /// Persistent table location; in-memory when absent.
    pub db_path: Option<PathBuf>,
}

impl TableConfig {
    pub fn new(table_name: impl Into<String>, db_path: Option<PathBuf>) -> Result<Self> {
        let table_name = table_name.into();
        if table_name.trim().is_empty() {
            return Err(AuthorizerError::Config(
                "TABLE_NAME must not be empty".to_string(),
            ));
        }
        Ok(Self {
            table_name,
            db_path,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WorkerConfig {
    pub table: TableConfig,
    pub remote: RemoteAuthorityConfig,
    /// Where authorized documents are written; storage is skipped when absent.
    pub artifact_dir: Option<PathBuf>,
}
