//! The ingestor's per-message processor chain: decode, optional dedup,
//! optional map, in that fixed order. A batch's messages run through this
//! one at a time; the first fatal error (bus/KV unavailability) aborts the
//! whole batch, everything else becomes a per-message [`Outcome`].

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use gf_bus::KvStore;
use gf_schema::mapper::Mapper;
use gf_schema::SinkMapping;
use serde_json::Value;

use crate::config::DedupConfig;

/// What should happen to one source message after running the chain.
pub enum Outcome {
    /// Publish `payload` downstream, optionally with an idempotency key
    /// (set when dedup is enabled, per spec: the key equals the dedup key).
    Publish { payload: Vec<u8>, idempotency_key: Option<String> },
    /// Deliberate dedup-hit drop: ack the source, do not publish.
    DedupDrop,
    /// Per-message failure: publish `error` + original payload to the DLQ.
    Fail { error: String },
}

pub async fn run_chain(
    raw_payload: &[u8],
    dedup: Option<&DedupConfig>,
    dedup_kv: Option<&(dyn KvStore)>,
    mapping: Option<&SinkMapping>,
) -> anyhow::Result<Outcome> {
    let decoded: Value = match serde_json::from_slice(raw_payload) {
        Ok(v) => v,
        Err(e) => return Ok(Outcome::Fail { error: format!("parse error: {e}") }),
    };

    let mut idempotency_key = None;
    if let Some(dedup_cfg) = dedup {
        let kv = dedup_kv.expect("dedup configured without a KV store");
        match dedup_key(&decoded, dedup_cfg) {
            Ok(key) => {
                let inserted = kv
                    .create_if_absent(&key, now_millis().to_be_bytes().to_vec())
                    .await?;
                if !inserted {
                    return Ok(Outcome::DedupDrop);
                }
                idempotency_key = Some(key);
            }
            Err(e) => return Ok(Outcome::Fail { error: e }),
        }
    }

    let out_payload = if let Some(mapping) = mapping {
        match Mapper::map_single(&decoded, mapping) {
            Ok(row) => match row_to_json_bytes(&row) {
                Ok(bytes) => bytes,
                Err(e) => return Ok(Outcome::Fail { error: e.to_string() }),
            },
            Err(e) => return Ok(Outcome::Fail { error: e.to_string() }),
        }
    } else {
        raw_payload.to_vec()
    };

    Ok(Outcome::Publish { payload: out_payload, idempotency_key })
}

fn dedup_key(decoded: &Value, dedup_cfg: &DedupConfig) -> Result<String, String> {
    let raw = decoded
        .pointer(&dedup_cfg.field)
        .ok_or_else(|| format!("dedup field {} missing", dedup_cfg.field))?;
    let coerced = gf_schema::coerce::coerce(raw, &dedup_cfg.key_type, &dedup_cfg.field)
        .map_err(|e| e.to_string())?;
    Ok(crate::row::clickhouse_value_to_key_string(&coerced))
}

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Serializes a mapped row back into a flat JSON object of
/// `{column_name: value}`, the wire shape every downstream hop (join,
/// sink) expects once a record has passed through a mapping step.
pub fn row_to_json_bytes(row: &gf_schema::Row) -> anyhow::Result<Vec<u8>> {
    let object = crate::row::row_to_json_value(row);
    Ok(serde_json::to_vec(&object)?)
}

pub type SharedKvStore = Arc<dyn KvStore>;

#[cfg(test)]
mod tests {
    use super::*;
    use gf_bus::MemoryKvStore;
    use gf_schema::ColumnType;

    #[tokio::test]
    async fn malformed_json_is_a_per_message_failure() {
        let outcome = run_chain(b"not-json", None, None, None).await.unwrap();
        assert!(matches!(outcome, Outcome::Fail { .. }));
    }

    #[tokio::test]
    async fn identity_pass_through_with_no_dedup_or_mapping() {
        let outcome = run_chain(br#"{"id":1}"#, None, None, None).await.unwrap();
        match outcome {
            Outcome::Publish { payload, idempotency_key } => {
                assert_eq!(payload, br#"{"id":1}"#);
                assert!(idempotency_key.is_none());
            }
            _ => panic!("expected publish"),
        }
    }

    #[tokio::test]
    async fn second_message_with_same_dedup_key_is_dropped() {
        let kv = MemoryKvStore::new();
        let dedup = DedupConfig {
            field: "/id".to_string(),
            key_type: ColumnType::Int64,
            window: gf_core::GoDuration(std::time::Duration::from_secs(60)),
        };

        let first = run_chain(br#"{"id":7}"#, Some(&dedup), Some(&kv), None).await.unwrap();
        assert!(matches!(first, Outcome::Publish { .. }));

        let second = run_chain(br#"{"id":7}"#, Some(&dedup), Some(&kv), None).await.unwrap();
        assert!(matches!(second, Outcome::DedupDrop));
    }

    #[tokio::test]
    async fn mapping_step_renames_and_coerces_before_emit() {
        let mapping = vec![gf_schema::ColumnMapping {
            source_side: None,
            source_field: "/raw_id".to_string(),
            column_name: "id".to_string(),
            column_type: ColumnType::Int64,
            nullable: false,
        }];
        let outcome = run_chain(br#"{"raw_id":42}"#, None, None, Some(&mapping)).await.unwrap();
        match outcome {
            Outcome::Publish { payload, .. } => {
                let value: serde_json::Value = serde_json::from_slice(&payload).unwrap();
                assert_eq!(value["id"], 42);
            }
            _ => panic!("expected publish"),
        }
    }
}
