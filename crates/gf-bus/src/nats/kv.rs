use async_nats::jetstream::kv::Store;
use async_trait::async_trait;

use crate::kv_store::KvStore;

/// `KvStore` over a JetStream key-value bucket. One bucket per
/// (pipeline, purpose) pair — the dedup memo and each side of a join buffer
/// each get their own bucket so their TTLs and history settings can differ.
pub struct NatsKvStore {
    store: Store,
}

impl NatsKvStore {
    pub fn new(store: Store) -> Self {
        Self { store }
    }
}

#[async_trait]
impl KvStore for NatsKvStore {
    async fn put(&self, key: &str, value: Vec<u8>) -> anyhow::Result<()> {
        self.store.put(key, value.into()).await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>> {
        let entry = self.store.get(key).await?;
        Ok(entry.map(|bytes| bytes.to_vec()))
    }

    async fn create_if_absent(&self, key: &str, value: Vec<u8>) -> anyhow::Result<bool> {
        match self.store.create(key, value.into()).await {
            Ok(_) => Ok(true),
            // `create` fails with a wrong-last-revision style error when the
            // key is already occupied; every other error propagates.
            Err(e) if is_already_exists(&e) => Ok(false),
            Err(e) => Err(anyhow::anyhow!("kv create_if_absent failed: {e}")),
        }
    }
}

fn is_already_exists(err: &async_nats::jetstream::kv::CreateError) -> bool {
    matches!(
        err.kind(),
        async_nats::jetstream::kv::CreateErrorKind::AlreadyExists
    )
}

#[cfg(test)]
mod tests {
    // `NatsKvStore` is exercised against a real JetStream KV bucket in
    // integration tests (requires a running nats-server with JetStream
    // enabled), not here. The CAS semantics themselves are covered by the
    // in-memory `KvStore` fake used throughout the pipeline crate's tests.
}
