//! Dead-letter record: the envelope every component publishes on a
//! per-message failure. The original payload is kept as a string so it
//! round-trips bit-for-bit regardless of whether it was ever valid JSON.

use serde::{Deserialize, Serialize};

use crate::signal::ComponentKind;

/// `{"component":str,"error":str,"original_message":str}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DlqRecord {
    pub component: String,
    pub error: String,
    pub original_message: String,
}

impl DlqRecord {
    pub fn new(component: ComponentKind, error: impl Into<String>, original_message: impl Into<String>) -> Self {
        Self {
            component: component.as_str().to_string(),
            error: error.into(),
            original_message: original_message.into(),
        }
    }

    pub fn to_json_bytes(&self) -> anyhow::Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}

/// Pipeline-level counters the API surfaces for a DLQ stream. Maintained by
/// whichever component owns the dead-letter write path; exposed here so the
/// data plane and any metrics exporter agree on field names.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DlqState {
    pub last_received_unix_ms: Option<i64>,
    pub last_consumed_unix_ms: Option<i64>,
    pub total_count: u64,
    pub unconsumed_count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_preserves_original_payload_bit_for_bit() {
        let rec = DlqRecord::new(ComponentKind::Ingestor, "parse error: expected value", "not-json");
        let bytes = rec.to_json_bytes().unwrap();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert!(value.is_object());
        assert_eq!(value["original_message"], "not-json");
        assert_eq!(value["component"], "ingestor");
        assert!(value["error"].as_str().unwrap().contains("parse"));
    }
}
