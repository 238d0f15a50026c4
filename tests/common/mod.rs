#![allow(dead_code)]

use sri_authorizer::domain::access_key::AccessKey;
use sri_authorizer::domain::authorization::AuthorizationResponse;
use sri_authorizer::domain::ports::VoucherStore;
use sri_authorizer::domain::voucher::{Voucher, VoucherStatus};
use sri_authorizer::infrastructure::in_memory::InMemoryVoucherStore;
use std::sync::Arc;

pub const TABLE: &str = "prd-vouchers";

/// Test-environment invoice of company 1790011223001, sequence 123.
pub const KEY: &str = "1810202601179001122300110010020000001231234567819";

/// Builds a 49-character access key from its variable parts.
pub fn access_key(company_id: &str, environment: char, sequence: u32) -> String {
    format!("1810202601{company_id}{environment}001002{sequence:09}123456781{}", sequence % 10)
}

pub fn granted(document: &str) -> AuthorizationResponse {
    AuthorizationResponse {
        status: Some("AUTORIZADO".into()),
        voucher: Some(document.into()),
        authorization_date: Some("2026-10-18T10:00:00-05:00".into()),
        messages: None,
    }
}

pub fn rejected(reason: &str) -> AuthorizationResponse {
    serde_json::from_value(serde_json::json!({
        "status": "NO AUTORIZADO",
        "messages": reason,
    }))
    .unwrap()
}

pub async fn store_with(keys: &[&str], status: VoucherStatus) -> Arc<InMemoryVoucherStore> {
    let store = Arc::new(InMemoryVoucherStore::new().with_change_feed(TABLE));
    for key in keys {
        let key = AccessKey::parse(key).unwrap();
        store
            .put(Voucher::new(&key, "<factura/>", status))
            .await
            .unwrap();
    }
    store
}

pub async fn stored_voucher(store: &InMemoryVoucherStore, key: &str) -> Voucher {
    let key = AccessKey::parse(key).unwrap();
    store
        .get(key.company_id(), key.identity())
        .await
        .unwrap()
        .expect("voucher should exist")
}

pub fn queue_body(key: &str) -> String {
    serde_json::json!({ "accessKey": key }).to_string()
}
