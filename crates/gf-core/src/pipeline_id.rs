//! Deterministic naming: every replica of a pipeline's components must be
//! able to compute the same stream, subject and consumer-group names from
//! nothing but the pipeline id and a topic name.

use sha2::{Digest, Sha256};

/// Maximum stream name length accepted by the stream bus. NATS JetStream
/// historically caps stream names well under this; staying under it keeps
/// the name portable across bus implementations.
pub const MAX_STREAM_NAME_LEN: usize = 255;

/// First 8 hex characters of SHA-256(pipeline id). Stable for the lifetime
/// of the pipeline id string; used as the short, collision-resistant prefix
/// for every stream/subject/consumer-group name derived from this pipeline.
pub fn pipeline_hash(pipeline_id: &str) -> String {
    let digest = Sha256::digest(pipeline_id.as_bytes());
    hex_prefix(&digest, 8)
}

fn hex_prefix(bytes: &[u8], hex_len: usize) -> String {
    let mut s = String::with_capacity(hex_len);
    for b in bytes {
        if s.len() >= hex_len {
            break;
        }
        s.push_str(&format!("{:02x}", b));
    }
    s.truncate(hex_len);
    s
}

/// Replaces every `.` in a Kafka topic name with `_`, preserving length.
/// Stream/subject names otherwise disallow `.` as a path separator.
pub fn sanitize_topic(topic: &str) -> String {
    topic.replace('.', "_")
}

/// Name of the per-topic ingestor stream: `gf-<h>-<sanitized-topic>`.
/// Truncates the sanitized topic (never the prefix/hash) if the full name
/// would exceed the bus's maximum stream-name length.
pub fn ingestor_stream_name(pipeline_id: &str, topic: &str) -> String {
    let h = pipeline_hash(pipeline_id);
    let sanitized = sanitize_topic(topic);
    let prefix = format!("gf-{}-", h);
    truncate_to_fit(&prefix, &sanitized)
}

/// Name of the join-output stream: `gf-<h>-joined`.
pub fn joined_stream_name(pipeline_id: &str) -> String {
    format!("gf-{}-joined", pipeline_hash(pipeline_id))
}

/// Name of the per-pipeline dead-letter stream: `gf-<h>-dlq`.
pub fn dlq_stream_name(pipeline_id: &str) -> String {
    format!("gf-{}-dlq", pipeline_hash(pipeline_id))
}

/// Kafka consumer group name: `gf-group-<h>`.
pub fn consumer_group_name(pipeline_id: &str) -> String {
    format!("gf-group-{}", pipeline_hash(pipeline_id))
}

/// Well-known subject suffixes within a stream.
pub mod subject {
    pub const INPUT: &str = "input";
    pub const FAILED: &str = "failed";
    pub const WILDCARD: &str = "*";
}

/// Subject for publishing/consuming the input records of a stream.
pub fn input_subject(stream: &str) -> String {
    format!("{}.{}", stream, subject::INPUT)
}

/// Subject for publishing/consuming failed (DLQ) records of a stream.
pub fn failed_subject(stream: &str) -> String {
    format!("{}.{}", stream, subject::FAILED)
}

fn truncate_to_fit(prefix: &str, suffix: &str) -> String {
    let budget = MAX_STREAM_NAME_LEN.saturating_sub(prefix.len());
    if suffix.len() <= budget {
        format!("{}{}", prefix, suffix)
    } else {
        format!("{}{}", prefix, &suffix[..budget])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_eight_hex_chars() {
        let h = pipeline_hash("p1");
        assert_eq!(h.len(), 8);
        assert!(h.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn hash_is_deterministic() {
        assert_eq!(pipeline_hash("p1"), pipeline_hash("p1"));
        assert_ne!(pipeline_hash("p1"), pipeline_hash("p2"));
    }

    #[test]
    fn sanitize_replaces_dots_one_for_one() {
        let out = sanitize_topic("orders.v1.events");
        assert!(!out.contains('.'));
        assert_eq!(out.len(), "orders.v1.events".len());
        assert_eq!(out, "orders_v1_events");
    }

    #[test]
    fn ingestor_stream_name_matches_scenario_1() {
        // pipeline "p1", topic "orders.v1"
        let name = ingestor_stream_name("p1", "orders.v1");
        let h = pipeline_hash("p1");
        assert_eq!(name, format!("gf-{}-orders_v1", h));
    }

    #[test]
    fn long_topic_is_truncated_preserving_prefix_and_hash() {
        let long_topic = "x".repeat(500);
        let name = ingestor_stream_name("p1", &long_topic);
        assert!(name.len() <= MAX_STREAM_NAME_LEN);
        let h = pipeline_hash("p1");
        assert!(name.starts_with(&format!("gf-{}-", h)));
    }

    #[test]
    fn subjects_are_stream_dot_suffix() {
        assert_eq!(input_subject("gf-abc-orders"), "gf-abc-orders.input");
        assert_eq!(failed_subject("gf-abc-dlq"), "gf-abc-dlq.failed");
    }

    proptest::proptest! {
        #[test]
        fn name_determinism_holds_for_any_id_and_topic(id in "[a-zA-Z0-9_-]{1,40}", topic in "[a-zA-Z0-9._-]{1,60}") {
            let a = ingestor_stream_name(&id, &topic);
            let b = ingestor_stream_name(&id, &topic);
            proptest::prop_assert_eq!(a, b);
        }

        #[test]
        fn sanitize_never_contains_dot(topic in "[a-zA-Z0-9._-]{0,80}") {
            let out = sanitize_topic(&topic);
            proptest::prop_assert!(!out.contains('.'));
            proptest::prop_assert_eq!(out.len(), topic.len());
        }
    }
}
