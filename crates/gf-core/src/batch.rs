//! A `Batch` is the unit of work a processor chain operates on: an ordered
//! sequence of `Message` plus enough bookkeeping to guarantee that no
//! fetched message is ever silently dropped, no matter how the chain
//! disposes of each one.

use std::collections::HashMap;

use crate::message::Message;

/// An unrecoverable error that aborts the whole batch (bus/KV unavailable
/// beyond retry, etc). Distinct from a per-message failure, which only
/// affects one message.
#[derive(Debug, Clone)]
pub struct FatalError(pub String);

impl std::fmt::Display for FatalError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Ordered sequence of messages flowing through one component's processor
/// chain, plus per-message disposition tracking.
///
/// Invariant: for every input message index, exactly one of the following
/// holds once the batch finishes processing:
/// - a disposition was recorded in `dispositions` (published downstream,
///   published to DLQ, or dropped as a dedup hit), or
/// - the index appears in `failures`, or
/// - `fatal` is set (the whole batch is abandoned).
pub struct Batch {
    pub messages: Vec<Message>,
    dispositions: HashMap<usize, Disposition>,
    failures: HashMap<usize, String>,
    fatal: Option<FatalError>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Published,
    DeadLettered,
    DedupDropped,
}

impl Batch {
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            messages,
            dispositions: HashMap::new(),
            failures: HashMap::new(),
            fatal: None,
        }
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn record_disposition(&mut self, index: usize, disposition: Disposition) {
        self.dispositions.insert(index, disposition);
    }

    pub fn record_failure(&mut self, index: usize, error: impl Into<String>) {
        self.failures.insert(index, error.into());
    }

    pub fn set_fatal(&mut self, error: FatalError) {
        self.fatal = Some(error);
    }

    pub fn fatal(&self) -> Option<&FatalError> {
        self.fatal.as_ref()
    }

    pub fn failures(&self) -> &HashMap<usize, String> {
        &self.failures
    }

    /// True once every message index has a recorded disposition, a
    /// recorded failure, or the batch is fatal. Used by tests and by the
    /// component's own sanity assertions at the end of a batch cycle.
    pub fn every_message_accounted_for(&self) -> bool {
        if self.fatal.is_some() {
            return true;
        }
        (0..self.messages.len())
            .all(|i| self.dispositions.contains_key(&i) || self.failures.contains_key(&i))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::test_support::message;

    #[test]
    fn invariant_holds_once_every_message_is_dispositioned() {
        let (m0, _) = message(b"{}");
        let (m1, _) = message(b"bad");
        let mut batch = Batch::new(vec![m0, m1]);
        assert!(!batch.every_message_accounted_for());

        batch.record_disposition(0, Disposition::Published);
        assert!(!batch.every_message_accounted_for());

        batch.record_failure(1, "parse error");
        assert!(batch.every_message_accounted_for());
    }

    #[test]
    fn fatal_short_circuits_the_invariant() {
        let (m0, _) = message(b"{}");
        let mut batch = Batch::new(vec![m0]);
        batch.set_fatal(FatalError("bus unavailable".into()));
        assert!(batch.every_message_accounted_for());
    }
}
