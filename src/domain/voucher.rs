use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::access_key::AccessKey;

/// The tax authority environment a voucher was issued for.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Hash, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Test,
    Production,
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Test => f.write_str("test"),
            Self::Production => f.write_str("production"),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Hash, Clone, Copy)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VoucherStatus {
    Error,
    Initial,
    Generated,
    Signed,
    Received,
    Processing,
    Rejected,
    Authorized,
    NotAuthorized,
}

impl VoucherStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Error => "ERROR",
            Self::Initial => "INITIAL",
            Self::Generated => "GENERATED",
            Self::Signed => "SIGNED",
            Self::Received => "RECEIVED",
            Self::Processing => "PROCESSING",
            Self::Rejected => "REJECTED",
            Self::Authorized => "AUTHORIZED",
            Self::NotAuthorized => "NOT_AUTHORIZED",
        }
    }

    /// Outcomes of an authorization attempt; never overwritten by the worker.
    pub fn is_final(&self) -> bool {
        matches!(self, Self::Authorized | Self::NotAuthorized)
    }

    /// Statuses from which an authorization attempt is due.
    pub fn awaits_authorization(&self) -> bool {
        matches!(self, Self::Received | Self::Processing)
    }
}

impl fmt::Display for VoucherStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VoucherStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ERROR" => Ok(Self::Error),
            "INITIAL" => Ok(Self::Initial),
            "GENERATED" => Ok(Self::Generated),
            "SIGNED" => Ok(Self::Signed),
            "RECEIVED" => Ok(Self::Received),
            "PROCESSING" => Ok(Self::Processing),
            "REJECTED" => Ok(Self::Rejected),
            "AUTHORIZED" => Ok(Self::Authorized),
            "NOT_AUTHORIZED" => Ok(Self::NotAuthorized),
            other => Err(format!("unknown voucher status '{other}'")),
        }
    }
}

/// Structured identity of a voucher, derived from its access key.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Hash, Clone)]
#[serde(rename_all = "camelCase")]
pub struct VoucherIdentity {
    pub voucher_type: String,
    pub environment: Environment,
    pub establishment: String,
    pub branch: String,
    pub sequence: String,
}

impl VoucherIdentity {
    /// Compound sort key used by the voucher table.
    pub fn store_key(&self) -> String {
        format!(
            "#{}#{}#{}#{}#{}",
            self.voucher_type, self.environment, self.establishment, self.branch, self.sequence
        )
    }
}

/// A voucher record as held by the voucher table.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Voucher {
    pub company_id: String,
    pub voucher_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_key: Option<String>,
    #[serde(default)]
    pub xml: String,
    pub status: VoucherStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sri_status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorization_date: Option<String>,
    #[serde(default)]
    pub messages: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Voucher {
    /// Creates a record the way an upstream producer would.
    pub fn new(access_key: &AccessKey, xml: impl Into<String>, status: VoucherStatus) -> Self {
        let now = Utc::now();
        Self {
            company_id: access_key.company_id().to_string(),
            voucher_id: access_key.identity().store_key(),
            access_key: Some(access_key.as_str().to_string()),
            xml: xml.into(),
            status,
            sri_status: None,
            authorization_date: None,
            messages: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// A partial record, as left behind by an update to a key that did not exist.
    pub fn partial(company_id: &str, identity: &VoucherIdentity, status: VoucherStatus) -> Self {
        let now = Utc::now();
        Self {
            company_id: company_id.to_string(),
            voucher_id: identity.store_key(),
            access_key: None,
            xml: String::new(),
            status,
            sri_status: None,
            authorization_date: None,
            messages: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Applies a status update, keeping `updated_at` monotonic.
    pub fn apply(&mut self, update: StatusUpdate, now: DateTime<Utc>) {
        self.status = update.status;
        self.messages = update.messages;
        if update.sri_status.is_some() {
            self.sri_status = update.sri_status;
        }
        if update.authorization_date.is_some() {
            self.authorization_date = update.authorization_date;
        }
        self.updated_at = self.updated_at.max(now);
    }
}

/// An unconditional overwrite of a voucher's status and diagnostics.
#[derive(Debug, PartialEq, Clone)]
pub struct StatusUpdate {
    pub status: VoucherStatus,
    pub messages: Vec<String>,
    pub sri_status: Option<String>,
    pub authorization_date: Option<String>,
}

impl StatusUpdate {
    pub fn new(status: VoucherStatus) -> Self {
        Self {
            status,
            messages: Vec::new(),
            sri_status: None,
            authorization_date: None,
        }
    }

    pub fn with_messages(mut self, messages: Vec<String>) -> Self {
        self.messages = messages;
        self
    }

    pub fn with_sri_status(mut self, sri_status: Option<String>) -> Self {
        self.sri_status = sri_status;
        self
    }

    pub fn with_authorization_date(mut self, authorization_date: Option<String>) -> Self {
        self.authorization_date = authorization_date;
        self
    }
}

/// The subset of a record image the change dispatcher inspects.
///
/// Every field is optional: images come from the change feed and may be
/// missing attributes that a complete record would carry.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct VoucherImage {
    #[serde(default)]
    pub company_id: Option<String>,
    #[serde(default)]
    pub voucher_id: Option<String>,
    #[serde(default)]
    pub access_key: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

impl VoucherImage {
    /// The parsed status, `None` when absent or not a known status.
    pub fn voucher_status(&self) -> Option<VoucherStatus> {
        self.status.as_deref().and_then(|s| s.parse().ok())
    }
}

impl From<&Voucher> for VoucherImage {
    fn from(voucher: &Voucher) -> Self {
        Self {
            company_id: Some(voucher.company_id.clone()),
            voucher_id: Some(voucher.voucher_id.clone()),
            access_key: voucher.access_key.clone(),
            status: Some(voucher.status.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_status_wire_names() {
        let json = serde_json::to_string(&VoucherStatus::NotAuthorized).unwrap();
        assert_eq!(json, "\"NOT_AUTHORIZED\"");
        assert_eq!(
            "NOT_AUTHORIZED".parse::<VoucherStatus>().unwrap(),
            VoucherStatus::NotAuthorized
        );
        assert!("AUTORIZADO".parse::<VoucherStatus>().is_err());
    }

    #[test]
    fn test_final_statuses() {
        assert!(VoucherStatus::Authorized.is_final());
        assert!(VoucherStatus::NotAuthorized.is_final());
        assert!(!VoucherStatus::Processing.is_final());
        assert!(!VoucherStatus::Rejected.is_final());
    }

    #[test]
    fn test_store_key_layout() {
        let identity = VoucherIdentity {
            voucher_type: "01".into(),
            environment: Environment::Test,
            establishment: "001".into(),
            branch: "002".into(),
            sequence: "000000123".into(),
        };
        assert_eq!(identity.store_key(), "#01#test#001#002#000000123");
    }

    #[test]
    fn test_apply_keeps_updated_at_monotonic() {
        let identity = VoucherIdentity {
            voucher_type: "01".into(),
            environment: Environment::Production,
            establishment: "001".into(),
            branch: "001".into(),
            sequence: "000000001".into(),
        };
        let mut voucher = Voucher::partial("1790011223001", &identity, VoucherStatus::Received);
        let before = voucher.updated_at;

        voucher.apply(
            StatusUpdate::new(VoucherStatus::Processing),
            before - Duration::seconds(30),
        );

        assert_eq!(voucher.status, VoucherStatus::Processing);
        assert_eq!(voucher.updated_at, before);
    }

    #[test]
    fn test_apply_overwrites_messages_and_keeps_sri_status() {
        let identity = VoucherIdentity {
            voucher_type: "01".into(),
            environment: Environment::Production,
            establishment: "001".into(),
            branch: "001".into(),
            sequence: "000000001".into(),
        };
        let mut voucher = Voucher::partial("1790011223001", &identity, VoucherStatus::Received);
        voucher.apply(
            StatusUpdate::new(VoucherStatus::NotAuthorized)
                .with_messages(vec!["43: CLAVE ACCESO REGISTRADA".into()])
                .with_sri_status(Some("NO AUTORIZADO".into())),
            Utc::now(),
        );
        voucher.apply(StatusUpdate::new(VoucherStatus::Processing), Utc::now());

        assert!(voucher.messages.is_empty());
        assert_eq!(voucher.sri_status.as_deref(), Some("NO AUTORIZADO"));
    }

    #[test]
    fn test_image_ignores_unknown_status() {
        let image = VoucherImage {
            status: Some("ARCHIVED".into()),
            ..Default::default()
        };
        assert_eq!(image.voucher_status(), None);
    }
}
