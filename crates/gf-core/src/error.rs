//! Error taxonomy shared by every component. Mirrors the disposition table:
//! per-message errors route to the dead-letter queue and never abort a
//! batch; fatal errors abort the batch, emit a component signal, and close
//! the component's error channel.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum GfError {
    /// Config/validation error raised at component construction. Never
    /// retried; the component fails fast before doing any work.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Per-message decode/map/coerce/dedup-field-extraction failure. The
    /// caller routes the offending message to the dead-letter queue and
    /// continues processing the rest of the batch.
    #[error("per-message error: {0}")]
    PerMessage(String),

    /// Stream bus error (publish/fetch/ack) that survived the bounded
    /// retry policy.
    #[error("bus error: {0}")]
    Bus(#[source] anyhow::Error),

    /// KV store error (get/put) that survived the bounded retry policy.
    #[error("kv store error: {0}")]
    Kv(#[source] anyhow::Error),

    /// ClickHouse error that survived the bounded retry policy and is not
    /// classified as a fatal schema/constraint violation (see
    /// `GfError::ClickHouseFatal`).
    #[error("clickhouse error: {0}")]
    ClickHouse(#[source] anyhow::Error),

    /// ClickHouse schema mismatch or constraint violation: the whole batch
    /// being flushed is routed to the dead-letter queue rather than
    /// retried, since retrying would repeat the same failure forever.
    #[error("clickhouse fatal error: {0}")]
    ClickHouseFatal(String),

    /// Any other unrecoverable condition. Surfaces to the orchestrator via
    /// the component's error channel.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl GfError {
    /// Whether this error should abort the whole batch/component (true) or
    /// only the one message currently being processed (false).
    pub fn is_fatal(&self) -> bool {
        !matches!(self, GfError::PerMessage(_))
    }
}
