use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::voucher::{VoucherImage, VoucherStatus};

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeEventName {
    Insert,
    Modify,
    Remove,
    #[serde(other)]
    Unknown,
}

impl fmt::Display for ChangeEventName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Insert => "INSERT",
            Self::Modify => "MODIFY",
            Self::Remove => "REMOVE",
            Self::Unknown => "UNKNOWN",
        };
        f.write_str(name)
    }
}

/// A before/after notification emitted by the voucher table's change feed.
#[derive(Debug, PartialEq, Clone)]
pub struct ChangeEvent {
    pub event_id: String,
    pub event_name: ChangeEventName,
    /// Table the change originated from, when the feed reports it.
    pub table_name: Option<String>,
    pub old_image: Option<VoucherImage>,
    pub new_image: Option<VoucherImage>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DispatchEventType {
    AuthorizeVoucher,
    StatusChange,
}

impl DispatchEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AuthorizeVoucher => "AUTHORIZE_VOUCHER",
            Self::StatusChange => "STATUS_CHANGE",
        }
    }
}

/// Work item placed on the authorization queue.
///
/// Consumers only rely on `accessKey`; redelivery of the same message is safe.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
#[serde(rename_all = "camelCase")]
pub struct DispatchMessage {
    pub access_key: String,
    pub source_table: String,
    pub event_type: DispatchEventType,
    pub timestamp: DateTime<Utc>,
}

impl DispatchMessage {
    pub fn authorize(access_key: impl Into<String>, source_table: impl Into<String>) -> Self {
        Self {
            access_key: access_key.into(),
            source_table: source_table.into(),
            event_type: DispatchEventType::AuthorizeVoucher,
            timestamp: Utc::now(),
        }
    }
}

/// Body of an authorization queue message as the worker reads it.
#[derive(Debug, Deserialize, PartialEq, Clone)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizeVoucherMessage {
    pub access_key: String,
}

/// Terminal-state notification published to the status topic.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
#[serde(rename_all = "camelCase")]
pub struct StatusChangeNotification {
    pub event_type: DispatchEventType,
    pub status: VoucherStatus,
    pub access_key: String,
    pub timestamp: DateTime<Utc>,
}

impl StatusChangeNotification {
    pub fn new(status: VoucherStatus, access_key: impl Into<String>) -> Self {
        Self {
            event_type: DispatchEventType::StatusChange,
            status,
            access_key: access_key.into(),
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_event_name() {
        let name: ChangeEventName = serde_json::from_str("\"TTL_EXPIRE\"").unwrap();
        assert_eq!(name, ChangeEventName::Unknown);
        let name: ChangeEventName = serde_json::from_str("\"MODIFY\"").unwrap();
        assert_eq!(name, ChangeEventName::Modify);
    }

    #[test]
    fn test_authorize_message_wire_shape() {
        let message = DispatchMessage::authorize("123", "vouchers");
        let json = serde_json::to_value(&message).unwrap();
        assert_eq!(json["accessKey"], "123");
        assert_eq!(json["sourceTable"], "vouchers");
        assert_eq!(json["eventType"], "AUTHORIZE_VOUCHER");

        let body: AuthorizeVoucherMessage = serde_json::from_value(json).unwrap();
        assert_eq!(body.access_key, "123");
    }

    #[test]
    fn test_status_change_wire_shape() {
        let notification = StatusChangeNotification::new(VoucherStatus::Authorized, "123");
        let json = serde_json::to_value(&notification).unwrap();
        assert_eq!(json["eventType"], "STATUS_CHANGE");
        assert_eq!(json["status"], "AUTHORIZED");
        assert_eq!(json["accessKey"], "123");
        assert!(json["timestamp"].as_str().unwrap().contains('T'));
    }
}
