//! Thin wrapper over a JetStream-compatible bus: create/update stream,
//! create/update durable pull consumer, publish with optional idempotency
//! key, pull-fetch batches with explicit ack.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use gf_core::Message;

/// A fetched batch of messages plus the bus handle each one came from,
/// already wrapped as `gf_core::Message` so callers never see bus-specific
/// types.
pub type FetchedBatch = Vec<Message>;

#[async_trait]
pub trait StreamBus: Send + Sync {
    /// Idempotent stream creation/update. `dedup_window`, when set,
    /// configures the bus's own publish-level duplicate detection so a
    /// publish retry sharing an idempotency key is a no-op.
    async fn ensure_stream(
        &self,
        name: &str,
        subjects: Vec<String>,
        dedup_window: Option<Duration>,
    ) -> anyhow::Result<()>;

    /// Idempotent durable pull-consumer creation/update. One consumer per
    /// (component, stream) pair; explicit ack policy.
    async fn ensure_consumer(
        &self,
        stream: &str,
        consumer_name: &str,
        filter_subject: &str,
        ack_wait: Duration,
    ) -> anyhow::Result<()>;

    /// At-least-once publish. When `idempotency_key` is supplied and falls
    /// within the stream's dedup window, the bus treats the publish as a
    /// no-op.
    async fn publish(
        &self,
        subject: &str,
        payload: Vec<u8>,
        headers: HashMap<String, Vec<String>>,
        idempotency_key: Option<String>,
    ) -> anyhow::Result<()>;

    /// Pull-fetch up to `max` messages, waiting at most `max_wait` for the
    /// first one to arrive (or for the batch to fill). Returns whatever
    /// arrived, which may be empty.
    async fn fetch(
        &self,
        stream: &str,
        consumer_name: &str,
        max: usize,
        max_wait: Duration,
    ) -> anyhow::Result<FetchedBatch>;
}
