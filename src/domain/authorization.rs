use serde::{Deserialize, Serialize};

/// Remote status string meaning the voucher was authorized.
pub const GRANTED_STATUS: &str = "AUTORIZADO";

/// A field the remote authority sends either as a scalar or as a list.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
#[serde(untagged)]
pub enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

impl<T> OneOrMany<T> {
    pub fn into_vec(self) -> Vec<T> {
        match self {
            Self::One(value) => vec![value],
            Self::Many(values) => values,
        }
    }
}

/// The remote authority's answer, as received.
///
/// Any field may be absent. Business logic never reads this type directly;
/// it goes through [`AuthorizationResponse::normalize`] first.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizationResponse {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub voucher: Option<String>,
    #[serde(default)]
    pub authorization_date: Option<String>,
    #[serde(default)]
    pub messages: Option<OneOrMany<String>>,
}

impl AuthorizationResponse {
    /// Converts the raw answer into the fixed shape the worker consumes.
    pub fn normalize(self) -> AuthorizationOutcome {
        let granted = self.status.as_deref() == Some(GRANTED_STATUS);
        AuthorizationOutcome {
            granted,
            detail: AuthorizationDetail {
                status: self.status,
                voucher: self.voucher.filter(|doc| !doc.trim().is_empty()),
                authorization_date: self.authorization_date,
                messages: self.messages.map(OneOrMany::into_vec).unwrap_or_default(),
            },
        }
    }
}

#[derive(Debug, PartialEq, Clone)]
pub struct AuthorizationDetail {
    pub status: Option<String>,
    /// The signed document returned with a granted authorization.
    pub voucher: Option<String>,
    pub authorization_date: Option<String>,
    pub messages: Vec<String>,
}

#[derive(Debug, PartialEq, Clone)]
pub struct AuthorizationOutcome {
    pub granted: bool,
    pub detail: AuthorizationDetail,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_message_is_wrapped() {
        let response: AuthorizationResponse = serde_json::from_str(
            r#"{"status":"NO AUTORIZADO","messages":"45: SECUENCIAL REGISTRADO"}"#,
        )
        .unwrap();
        let outcome = response.normalize();

        assert!(!outcome.granted);
        assert_eq!(outcome.detail.messages, vec!["45: SECUENCIAL REGISTRADO"]);
        assert_eq!(outcome.detail.voucher, None);
    }

    #[test]
    fn test_message_list_is_kept_in_order() {
        let response: AuthorizationResponse = serde_json::from_str(
            r#"{"status":"AUTORIZADO","voucher":"<xml/>","authorizationDate":"2026-10-18T10:00:00-05:00","messages":["a","b"]}"#,
        )
        .unwrap();
        let outcome = response.normalize();

        assert!(outcome.granted);
        assert_eq!(outcome.detail.voucher.as_deref(), Some("<xml/>"));
        assert_eq!(outcome.detail.messages, vec!["a", "b"]);
        assert_eq!(
            outcome.detail.authorization_date.as_deref(),
            Some("2026-10-18T10:00:00-05:00")
        );
    }

    #[test]
    fn test_empty_response_is_not_granted() {
        let outcome = AuthorizationResponse::default().normalize();
        assert!(!outcome.granted);
        assert!(outcome.detail.messages.is_empty());
        assert_eq!(outcome.detail.status, None);
    }

    #[test]
    fn test_blank_document_is_dropped() {
        let outcome = AuthorizationResponse {
            status: Some(GRANTED_STATUS.into()),
            voucher: Some("  ".into()),
            ..Default::default()
        }
        .normalize();
        assert!(outcome.granted);
        assert_eq!(outcome.detail.voucher, None);
    }
}
