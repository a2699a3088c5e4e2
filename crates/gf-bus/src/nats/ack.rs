use async_nats::jetstream::AckKind;
use async_trait::async_trait;
use gf_core::AckHandle;
use tokio::sync::Mutex;
use tracing::warn;

/// Wraps one `async_nats::jetstream::Message` so the processor chain can
/// ack/nak/term it without knowing it came from JetStream. A repeated ack
/// failure (per the bounded-retry bus policy) downgrades to a nak rather
/// than silently dropping the message.
pub struct NatsAckHandle {
    inner: Mutex<Option<async_nats::jetstream::Message>>,
}

impl NatsAckHandle {
    pub fn new(message: async_nats::jetstream::Message) -> Self {
        Self {
            inner: Mutex::new(Some(message)),
        }
    }

    async fn ack_with(&self, kind: AckKind) -> anyhow::Result<()> {
        let guard = self.inner.lock().await;
        match guard.as_ref() {
            Some(message) => {
                message
                    .ack_with(kind)
                    .await
                    .map_err(|e| anyhow::anyhow!("jetstream ack failed: {e}"))?;
                Ok(())
            }
            None => Ok(()),
        }
    }
}

#[async_trait]
impl AckHandle for NatsAckHandle {
    async fn ack(&self) -> anyhow::Result<()> {
        if let Err(e) = self.ack_with(AckKind::Ack).await {
            warn!(%e, "ack failed after retries, downgrading to nak so the message is redelivered");
            return self.ack_with(AckKind::Nak(None)).await;
        }
        Ok(())
    }

    async fn nak(&self) -> anyhow::Result<()> {
        self.ack_with(AckKind::Nak(None)).await
    }

    async fn term(&self) -> anyhow::Result<()> {
        self.ack_with(AckKind::Term).await
    }
}
