use crate::error::{AuthorizerError, Result};
use serde::Serialize;
use std::fmt;
use std::ops::Range;

use super::voucher::{Environment, VoucherIdentity};

/// Minimum length needed to reach every field of an access key.
pub const MIN_ACCESS_KEY_LEN: usize = 39;
/// Length of a complete access key, check digit included.
pub const ACCESS_KEY_LEN: usize = 49;

const VOUCHER_TYPE: Range<usize> = 8..10;
const COMPANY_ID: Range<usize> = 10..23;
const ENVIRONMENT: Range<usize> = 23..24;
const ESTABLISHMENT: Range<usize> = 24..27;
const BRANCH: Range<usize> = 27..30;
const SEQUENCE: Range<usize> = 30..39;

/// Decodes the voucher identity encoded in an access key.
///
/// Pure: the same input always yields the same identity.
pub fn decode(access_key: &str) -> Result<VoucherIdentity> {
    AccessKey::parse(access_key).map(|key| key.identity)
}

/// An access key together with everything decoded from it.
#[derive(Debug, Serialize, PartialEq, Eq, Clone)]
#[serde(rename_all = "camelCase")]
pub struct AccessKey {
    access_key: String,
    company_id: String,
    identity: VoucherIdentity,
}

impl AccessKey {
    /// Parses an access key by fixed character offsets.
    ///
    /// Fails with `MalformedKey` if the key is shorter than
    /// [`MIN_ACCESS_KEY_LEN`] or contains non-ASCII characters.
    pub fn parse(access_key: &str) -> Result<Self> {
        let malformed = |reason: String| AuthorizerError::MalformedKey {
            access_key: access_key.to_string(),
            reason,
        };

        if !access_key.is_ascii() {
            return Err(malformed("contains non-ASCII characters".to_string()));
        }
        if access_key.len() < MIN_ACCESS_KEY_LEN {
            return Err(malformed(format!(
                "expected at least {MIN_ACCESS_KEY_LEN} characters, got {}",
                access_key.len()
            )));
        }

        let field = |range: Range<usize>| access_key[range].to_string();
        let environment = if &access_key[ENVIRONMENT] == "1" {
            Environment::Test
        } else {
            Environment::Production
        };

        Ok(Self {
            access_key: access_key.to_string(),
            company_id: field(COMPANY_ID),
            identity: VoucherIdentity {
                voucher_type: field(VOUCHER_TYPE),
                environment,
                establishment: field(ESTABLISHMENT),
                branch: field(BRANCH),
                sequence: field(SEQUENCE),
            },
        })
    }

    pub fn as_str(&self) -> &str {
        &self.access_key
    }

    pub fn company_id(&self) -> &str {
        &self.company_id
    }

    pub fn identity(&self) -> &VoucherIdentity {
        &self.identity
    }

    pub fn environment(&self) -> Environment {
        self.identity.environment
    }

    /// Location of the authorized document in the artifact store.
    pub fn artifact_key(&self) -> String {
        format!("{}/authorized/{}.xml", self.company_id, self.access_key)
    }
}

impl fmt::Display for AccessKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.access_key)
    }
}
