//! Per-pipeline key-value bucket abstraction, used by the Ingestor for its
//! dedup memo and by the Join for its two per-side buffers.

use async_trait::async_trait;

#[async_trait]
pub trait KvStore: Send + Sync {
    /// Unconditional write; last-write-wins on key collision. Used by the
    /// Join buffer, where a newer record for the same key should always
    /// replace the one a previous match probed against.
    async fn put(&self, key: &str, value: Vec<u8>) -> anyhow::Result<()>;

    /// Reads the current value for `key`, or `None` if absent or expired.
    async fn get(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>>;

    /// Atomic compare-and-set insert: writes `value` under `key` only if
    /// no live value exists for it yet. Returns `true` if this call
    /// performed the insert, `false` if another writer (or an earlier call
    /// from this one) already holds the key — the dedup-hit case. Two
    /// concurrent callers racing on the same key are guaranteed to see
    /// exactly one `true` and the rest `false`.
    async fn create_if_absent(&self, key: &str, value: Vec<u8>) -> anyhow::Result<bool>;
}
