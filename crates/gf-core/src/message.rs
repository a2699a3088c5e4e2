//! Unified envelope over a Kafka record or a JetStream message.
//!
//! Polymorphism is over message *origin*, not message content: a `Message`
//! carries mutable payload/header state plus an opaque original which is
//! private to the origin-specific implementation and is only ever touched
//! through `ack`/`nak`/`reject`. The processor chain never sees the
//! original; it only sees the capability interface below.

use std::collections::HashMap;

use async_trait::async_trait;

/// Origin of a message, used for DLQ/signal tagging and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Kafka,
    JetStream,
}

/// Ack/nak/term capability a `Message`'s original handle exposes back to
/// its source bus. Implemented once per origin (Kafka offset commit vs
/// JetStream ack) and hidden behind this trait so the processor chain is
/// origin-agnostic.
#[async_trait]
pub trait AckHandle: Send + Sync {
    /// Confirms processing; for Kafka this stages (does not necessarily
    /// commit) the offset, for JetStream this acks the message.
    async fn ack(&self) -> anyhow::Result<()>;

    /// Requests redelivery without marking permanent failure.
    async fn nak(&self) -> anyhow::Result<()>;

    /// Marks the message as permanently undeliverable (JetStream `term`);
    /// for Kafka this is equivalent to `ack` since there is no separate
    /// terminal disposition on the wire.
    async fn term(&self) -> anyhow::Result<()>;
}

/// A copy-on-write header multimap: reads merge the original headers with
/// any mutations; writes only ever touch the mutation layer so the
/// original headers (as received from the bus) are never modified in
/// place.
#[derive(Debug, Clone, Default)]
pub struct Headers {
    original: HashMap<String, Vec<String>>,
    mutations: HashMap<String, Vec<String>>,
}

impl Headers {
    pub fn from_original(original: HashMap<String, Vec<String>>) -> Self {
        Self {
            original,
            mutations: HashMap::new(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Vec<String>> {
        self.mutations.get(key).or_else(|| self.original.get(key))
    }

    pub fn insert(&mut self, key: impl Into<String>, values: Vec<String>) {
        self.mutations.insert(key.into(), values);
    }

    pub fn remove(&mut self, key: &str) {
        // An empty vec in the mutation layer shadows the original entry
        // without having to distinguish "removed" from "never set".
        self.mutations.insert(key.to_string(), Vec::new());
    }

    /// Merged view: original entries overlaid with any mutations.
    pub fn merged(&self) -> HashMap<String, Vec<String>> {
        let mut merged = self.original.clone();
        for (k, v) in &self.mutations {
            merged.insert(k.clone(), v.clone());
        }
        merged
    }
}

/// The unified message envelope. Mutable payload/headers plus an opaque
/// original used only for ack/nak/term against the source bus.
pub struct Message {
    pub origin: Origin,
    pub payload: Vec<u8>,
    pub headers: Headers,
    ack_handle: Box<dyn AckHandle>,
}

impl Message {
    pub fn new(origin: Origin, payload: Vec<u8>, headers: Headers, ack_handle: Box<dyn AckHandle>) -> Self {
        Self {
            origin,
            payload,
            headers,
            ack_handle,
        }
    }

    pub async fn ack(&self) -> anyhow::Result<()> {
        self.ack_handle.ack().await
    }

    pub async fn nak(&self) -> anyhow::Result<()> {
        self.ack_handle.nak().await
    }

    pub async fn term(&self) -> anyhow::Result<()> {
        self.ack_handle.term().await
    }
}

impl std::fmt::Debug for Message {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Message")
            .field("origin", &self.origin)
            .field("payload_len", &self.payload.len())
            .finish()
    }
}

#[cfg(test)]
pub mod test_support {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Default)]
    pub struct Counters {
        pub acks: AtomicUsize,
        pub naks: AtomicUsize,
        pub terms: AtomicUsize,
    }

    pub struct NoopAckHandle(pub Arc<Counters>);

    #[async_trait::async_trait]
    impl AckHandle for NoopAckHandle {
        async fn ack(&self) -> anyhow::Result<()> {
            self.0.acks.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        async fn nak(&self) -> anyhow::Result<()> {
            self.0.naks.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        async fn term(&self) -> anyhow::Result<()> {
            self.0.terms.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    pub fn message(payload: &[u8]) -> (Message, Arc<Counters>) {
        let counters = Arc::new(Counters::default());
        let msg = Message::new(
            Origin::Kafka,
            payload.to_vec(),
            Headers::default(),
            Box::new(NoopAckHandle(counters.clone())),
        );
        (msg, counters)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headers_merge_original_and_mutations() {
        let mut original = HashMap::new();
        original.insert("a".to_string(), vec!["1".to_string()]);
        original.insert("b".to_string(), vec!["2".to_string()]);
        let mut headers = Headers::from_original(original);
        headers.insert("b", vec!["overwritten".to_string()]);
        headers.insert("c", vec!["3".to_string()]);

        assert_eq!(headers.get("a"), Some(&vec!["1".to_string()]));
        assert_eq!(headers.get("b"), Some(&vec!["overwritten".to_string()]));
        assert_eq!(headers.get("c"), Some(&vec!["3".to_string()]));
        // Original is untouched by mutation.
        assert_eq!(headers.original.get("b"), Some(&vec!["2".to_string()]));
    }

    #[tokio::test]
    async fn ack_reaches_the_original_handle() {
        let (msg, counters) = test_support::message(b"{}");
        msg.ack().await.unwrap();
        assert_eq!(counters.acks.load(std::sync::atomic::Ordering::SeqCst), 1);
    }
}
