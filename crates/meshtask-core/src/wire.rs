//! Wire helpers — what goes out on the command topic and what comes back
//! on the response topic.
//!
//! Command payloads are the compact JSON form of a [`TaskBatch`]. Response
//! payloads are opaque device JSON; only two keys are ever consulted:
//! `type` (matched against requested opcodes) and `error` (boolean).

use serde_json::Value;

use crate::task::TaskBatch;

/// Response key holding the reply kind.
pub const TYPE_KEY: &str = "type";
/// Response key holding the device-side error flag.
pub const ERROR_KEY: &str = "error";

// ── Delivery assurance ────────────────────────────────────────────────────────

/// Pub/sub delivery-assurance level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QoS {
    AtMostOnce,
    #[default]
    AtLeastOnce,
    ExactlyOnce,
}

impl QoS {
    pub fn level(&self) -> u8 {
        match self {
            Self::AtMostOnce => 0,
            Self::AtLeastOnce => 1,
            Self::ExactlyOnce => 2,
        }
    }
}

// ── Command payload ───────────────────────────────────────────────────────────

/// Compact JSON wire form of a batch.
pub fn encode_batch(batch: &TaskBatch) -> Result<Vec<u8>, serde_json::Error> {
    serde_json::to_vec(batch)
}

/// Short BLAKE3 tag for a payload. Only used to correlate log lines.
pub fn batch_digest(payload: &[u8]) -> String {
    hex::encode(&blake3::hash(payload).as_bytes()[..8])
}

// ── Response payload ──────────────────────────────────────────────────────────

/// A message received on the response topic.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponsePayload {
    /// Decoded JSON, or the lossy text as a JSON string when the bytes
    /// were not JSON.
    pub body: Value,
}

impl ResponsePayload {
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let body = serde_json::from_slice(bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(bytes).into_owned()));
        Self { body }
    }

    /// The `type` string, if the payload is an object carrying one.
    pub fn kind(&self) -> Option<&str> {
        self.body.get(TYPE_KEY).and_then(Value::as_str)
    }

    /// True only when `error` is the boolean `true`.
    pub fn is_error(&self) -> bool {
        matches!(self.body.get(ERROR_KEY), Some(Value::Bool(true)))
    }
}

impl From<Value> for ResponsePayload {
    fn from(body: Value) -> Self {
        Self { body }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn at_least_once_is_level_one() {
        assert_eq!(QoS::AtLeastOnce.level(), 1);
        assert_eq!(QoS::default(), QoS::AtLeastOnce);
    }

    #[test]
    fn encode_batch_is_compact() {
        let batch = TaskBatch::removal(["a", "b"]);
        let bytes = encode_batch(&batch).unwrap();
        assert_eq!(bytes, br#"{"actions":[{"name":"a"},{"name":"b"}]}"#.to_vec());
    }

    #[test]
    fn digest_is_stable_and_short() {
        let a = batch_digest(b"payload");
        assert_eq!(a.len(), 16);
        assert_eq!(a, batch_digest(b"payload"));
        assert_ne!(a, batch_digest(b"other"));
    }

    #[test]
    fn response_kind_and_error_flag() {
        let p = ResponsePayload::from(json!({"type": "GET_SETTING", "value": 3}));
        assert_eq!(p.kind(), Some("GET_SETTING"));
        assert!(!p.is_error());

        let p = ResponsePayload::from(json!({"error": true}));
        assert_eq!(p.kind(), None);
        assert!(p.is_error());
    }

    #[test]
    fn error_flag_must_be_boolean_true() {
        assert!(!ResponsePayload::from(json!({"error": false})).is_error());
        assert!(!ResponsePayload::from(json!({"error": 1})).is_error());
        assert!(!ResponsePayload::from(json!({"error": "true"})).is_error());
    }

    #[test]
    fn non_json_bytes_become_text() {
        let p = ResponsePayload::from_bytes(b"not json");
        assert_eq!(p.body, Value::String("not json".into()));
        assert_eq!(p.kind(), None);
        assert!(!p.is_error());
    }

    #[test]
    fn non_object_payloads_have_no_kind() {
        let p = ResponsePayload::from_bytes(b"[1,2,3]");
        assert_eq!(p.kind(), None);
        assert!(!p.is_error());
    }
}
