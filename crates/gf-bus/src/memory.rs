//! In-process fakes for `StreamBus` and `KvStore`, used by component tests
//! and the `demo` runner role so the pipeline can run end to end without a
//! NATS server.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use gf_core::{AckHandle, Headers, Message, Origin};

use crate::kv_store::KvStore;
use crate::stream_bus::{FetchedBatch, StreamBus};

/// No-op ack handle for messages that never left the process: there is no
/// redelivery queue to talk back to, so ack/nak/term all succeed trivially.
struct NoopAckHandle;

#[async_trait]
impl AckHandle for NoopAckHandle {
    async fn ack(&self) -> anyhow::Result<()> {
        Ok(())
    }
    async fn nak(&self) -> anyhow::Result<()> {
        Ok(())
    }
    async fn term(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

#[derive(Default)]
struct SubjectQueue {
    messages: VecDeque<(Vec<u8>, HashMap<String, Vec<String>>)>,
    seen_idempotency_keys: std::collections::HashSet<String>,
}

/// An in-memory multi-subject queue standing in for a JetStream stream plus
/// one shared pull cursor per consumer name. Good enough to drive a single
/// ingestor/join/sink chain through a full publish-fetch-ack cycle in tests.
#[derive(Default)]
pub struct MemoryStreamBus {
    subjects: Mutex<HashMap<String, SubjectQueue>>,
}

impl MemoryStreamBus {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StreamBus for MemoryStreamBus {
    async fn ensure_stream(
        &self,
        _name: &str,
        subjects: Vec<String>,
        _dedup_window: Option<Duration>,
    ) -> anyhow::Result<()> {
        let mut guard = self.subjects.lock().unwrap();
        for subject in subjects {
            guard.entry(subject).or_default();
        }
        Ok(())
    }

    async fn ensure_consumer(
        &self,
        _stream: &str,
        _consumer_name: &str,
        _filter_subject: &str,
        _ack_wait: Duration,
    ) -> anyhow::Result<()> {
        Ok(())
    }

    async fn publish(
        &self,
        subject: &str,
        payload: Vec<u8>,
        headers: HashMap<String, Vec<String>>,
        idempotency_key: Option<String>,
    ) -> anyhow::Result<()> {
        let mut guard = self.subjects.lock().unwrap();
        let queue = guard.entry(subject.to_string()).or_default();
        if let Some(key) = &idempotency_key {
            if !queue.seen_idempotency_keys.insert(key.clone()) {
                return Ok(());
            }
        }
        queue.messages.push_back((payload, headers));
        Ok(())
    }

    async fn fetch(
        &self,
        _stream: &str,
        _consumer_name: &str,
        max: usize,
        _max_wait: Duration,
    ) -> anyhow::Result<FetchedBatch> {
        let mut guard = self.subjects.lock().unwrap();
        let mut out = Vec::new();
        for queue in guard.values_mut() {
            while out.len() < max {
                match queue.messages.pop_front() {
                    Some((payload, headers)) => {
                        out.push(Message::new(
                            Origin::JetStream,
                            payload,
                            Headers::from_original(headers),
                            Box::new(NoopAckHandle),
                        ));
                    }
                    None => break,
                }
            }
        }
        Ok(out)
    }
}

/// In-memory `KvStore`. No TTL/expiry: fine for component tests that run to
/// completion in milliseconds, not a substitute for the real bucket's
/// history/expiry semantics.
#[derive(Default)]
pub struct MemoryKvStore {
    entries: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KvStore for MemoryKvStore {
    async fn put(&self, key: &str, value: Vec<u8>) -> anyhow::Result<()> {
        self.entries.lock().unwrap().insert(key.to_string(), value);
        Ok(())
    }

    async fn get(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>> {
        Ok(self.entries.lock().unwrap().get(key).cloned())
    }

    async fn create_if_absent(&self, key: &str, value: Vec<u8>) -> anyhow::Result<bool> {
        let mut guard = self.entries.lock().unwrap();
        if guard.contains_key(key) {
            Ok(false)
        } else {
            guard.insert(key.to_string(), value);
            Ok(true)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_then_fetch_round_trips_payload() {
        let bus = MemoryStreamBus::new();
        bus.ensure_stream("s", vec!["subj".to_string()], None)
            .await
            .unwrap();
        bus.publish("subj", b"hello".to_vec(), HashMap::new(), None)
            .await
            .unwrap();

        let batch = bus.fetch("s", "c", 10, Duration::from_millis(10)).await.unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].payload, b"hello");
    }

    #[tokio::test]
    async fn publish_with_repeated_idempotency_key_is_deduplicated() {
        let bus = MemoryStreamBus::new();
        bus.ensure_stream("s", vec!["subj".to_string()], None)
            .await
            .unwrap();
        bus.publish(
            "subj",
            b"first".to_vec(),
            HashMap::new(),
            Some("k1".to_string()),
        )
        .await
        .unwrap();
        bus.publish(
            "subj",
            b"second".to_vec(),
            HashMap::new(),
            Some("k1".to_string()),
        )
        .await
        .unwrap();

        let batch = bus.fetch("s", "c", 10, Duration::from_millis(10)).await.unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].payload, b"first");
    }

    #[tokio::test]
    async fn create_if_absent_only_wins_once() {
        let kv = MemoryKvStore::new();
        assert!(kv.create_if_absent("k", b"1".to_vec()).await.unwrap());
        assert!(!kv.create_if_absent("k", b"2".to_vec()).await.unwrap());
        assert_eq!(kv.get("k").await.unwrap(), Some(b"1".to_vec()));
    }

    #[tokio::test]
    async fn put_overwrites_regardless_of_prior_value() {
        let kv = MemoryKvStore::new();
        kv.put("k", b"1".to_vec()).await.unwrap();
        kv.put("k", b"2".to_vec()).await.unwrap();
        assert_eq!(kv.get("k").await.unwrap(), Some(b"2".to_vec()));
    }
}
