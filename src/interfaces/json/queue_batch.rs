use crate::application::batch::{BatchResponse, QueueRecord};
use crate::error::Result;
use serde::Deserialize;
use std::io::{Read, Write};

#[derive(Debug, Deserialize)]
struct QueueEnvelope {
    #[serde(rename = "Records")]
    records: Vec<QueueRecord>,
}

/// Reads a queue batch (`{"Records": [{"messageId", "body"}, ...]}`).
pub fn read_queue_batch<R: Read>(source: R) -> Result<Vec<QueueRecord>> {
    let envelope: QueueEnvelope = serde_json::from_reader(source)?;
    Ok(envelope.records)
}

/// Writes a batch response as a single JSON line.
pub fn write_batch_response<W: Write>(mut sink: W, response: &BatchResponse) -> Result<()> {
    serde_json::to_writer(&mut sink, response)?;
    writeln!(sink)?;
    sink.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_queue_batch_ignores_extra_fields() {
        let data = r#"{"Records":[{"messageId":"m-1","receiptHandle":"r","body":"{\"accessKey\":\"K\"}","attributes":{}}]}"#;
        let records = read_queue_batch(data.as_bytes()).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].message_id, "m-1");
        assert_eq!(records[0].body, r#"{"accessKey":"K"}"#);
    }

    #[test]
    fn test_read_queue_batch_rejects_malformed_input() {
        assert!(read_queue_batch("{\"Records\":".as_bytes()).is_err());
    }

    #[test]
    fn test_write_batch_response() {
        let mut out = Vec::new();
        write_batch_response(&mut out, &BatchResponse::default()).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "{\"batchItemFailures\":[]}\n");
    }
}
