use crate::domain::event::{ChangeEvent, ChangeEventName};
use crate::domain::voucher::VoucherImage;
use crate::error::Result;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::io::Read;
use tracing::error;

/// A typed attribute value as found in change-feed record images.
#[derive(Debug, Deserialize, PartialEq, Clone)]
pub enum AttributeValue {
    #[serde(rename = "S")]
    String(String),
    #[serde(rename = "N")]
    Number(String),
    /// Base64 text, kept undecoded.
    #[serde(rename = "B")]
    Binary(String),
    #[serde(rename = "BOOL")]
    Bool(bool),
    #[serde(rename = "NULL")]
    Null(bool),
    #[serde(rename = "SS")]
    StringSet(Vec<String>),
    #[serde(rename = "NS")]
    NumberSet(Vec<String>),
    #[serde(rename = "BS")]
    BinarySet(Vec<String>),
    #[serde(rename = "L")]
    List(Vec<AttributeValue>),
    #[serde(rename = "M")]
    Map(HashMap<String, AttributeValue>),
}

impl AttributeValue {
    fn as_text(&self) -> Option<&str> {
        match self {
            Self::String(s) | Self::Number(s) => Some(s.as_str()),
            _ => None,
        }
    }
}

pub type AttributeMap = HashMap<String, AttributeValue>;

/// Unmarshalls the attributes the dispatcher inspects from a record image.
pub fn voucher_image(image: &AttributeMap) -> VoucherImage {
    let text = |name: &str| {
        image
            .get(name)
            .and_then(AttributeValue::as_text)
            .map(str::to_string)
    };
    VoucherImage {
        company_id: text("companyId"),
        voucher_id: text("voucherId"),
        access_key: text("accessKey"),
        status: text("status"),
    }
}

/// Extracts the table name from a stream ARN
/// (`arn:...:table/<name>/stream/<label>`).
pub fn table_name_from_arn(arn: &str) -> Option<&str> {
    let (_, rest) = arn.split_once(":table/")?;
    let name = rest.split("/stream").next()?;
    (!name.is_empty()).then_some(name)
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "PascalCase")]
struct StreamImages {
    #[serde(default)]
    old_image: Option<AttributeMap>,
    #[serde(default)]
    new_image: Option<AttributeMap>,
}

#[derive(Debug, Deserialize)]
struct StreamRecord {
    #[serde(rename = "eventID")]
    event_id: String,
    #[serde(rename = "eventName")]
    event_name: ChangeEventName,
    #[serde(rename = "eventSourceARN", default)]
    event_source_arn: Option<String>,
    #[serde(default)]
    dynamodb: StreamImages,
}

impl From<StreamRecord> for ChangeEvent {
    fn from(record: StreamRecord) -> Self {
        Self {
            table_name: record
                .event_source_arn
                .as_deref()
                .and_then(table_name_from_arn)
                .map(str::to_string),
            event_id: record.event_id,
            event_name: record.event_name,
            old_image: record.dynamodb.old_image.as_ref().map(voucher_image),
            new_image: record.dynamodb.new_image.as_ref().map(voucher_image),
        }
    }
}

#[derive(Debug, Deserialize)]
struct StreamEnvelope {
    #[serde(rename = "Records")]
    records: Vec<Value>,
}

/// A decoded change-stream batch.
#[derive(Debug, Default)]
pub struct StreamBatch {
    pub events: Vec<ChangeEvent>,
    /// Identifiers of records that could not be decoded, to be reported as
    /// failed items. The record's `eventID` when present, else `#<index>`.
    pub undecodable: Vec<String>,
}

/// Reads a change-stream batch (`{"Records": [...]}`) into change events.
///
/// Records are decoded one by one; a record that does not decode is set
/// aside without affecting the others. Only a broken envelope fails.
pub fn read_stream_batch<R: Read>(source: R) -> Result<StreamBatch> {
    let envelope: StreamEnvelope = serde_json::from_reader(source)?;
    let mut batch = StreamBatch::default();

    for (index, record) in envelope.records.into_iter().enumerate() {
        let identifier = record
            .get("eventID")
            .and_then(Value::as_str)
            .map_or_else(|| format!("#{index}"), str::to_string);
        match serde_json::from_value::<StreamRecord>(record) {
            Ok(record) => batch.events.push(ChangeEvent::from(record)),
            Err(err) => {
                error!(event_id = %identifier, error = %err, "undecodable change record");
                batch.undecodable.push(identifier);
            }
        }
    }
    Ok(batch)
}
