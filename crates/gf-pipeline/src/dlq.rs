//! Dead-letter write/read path shared by every component. Writing is just a
//! bus publish of a `DlqRecord` envelope; reading is a paginated, non-acking
//! tail scan used by the (out-of-scope) API surface.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use gf_bus::StreamBus;
use gf_core::retry::{bus_backoff, with_backoff};
use gf_core::{ComponentKind, DlqRecord, DlqState};

/// Publishes `DlqRecord` envelopes to a pipeline's dead-letter stream and
/// keeps the counters the API surfaces (`last_received`, `total_count`,
/// `unconsumed_count`) up to date.
pub struct DlqWriter {
    bus: Arc<dyn StreamBus>,
    subject: String,
    component: ComponentKind,
    last_received_unix_ms: AtomicI64,
    total_count: AtomicU64,
    unconsumed_count: AtomicU64,
}

impl DlqWriter {
    pub fn new(bus: Arc<dyn StreamBus>, subject: String, component: ComponentKind) -> Self {
        Self {
            bus,
            subject,
            component,
            last_received_unix_ms: AtomicI64::new(0),
            total_count: AtomicU64::new(0),
            unconsumed_count: AtomicU64::new(0),
        }
    }

    pub async fn publish(&self, error: impl Into<String>, original_message: impl Into<String>, now_unix_ms: i64) -> anyhow::Result<()> {
        let record = DlqRecord::new(self.component, error, original_message);
        let payload = record.to_json_bytes()?;
        with_backoff(&bus_backoff(), "dlq_publish", || {
            self.bus.publish(&self.subject, payload.clone(), Default::default(), None)
        })
        .await?;
        self.last_received_unix_ms.store(now_unix_ms, Ordering::SeqCst);
        self.total_count.fetch_add(1, Ordering::SeqCst);
        self.unconsumed_count.fetch_add(1, Ordering::SeqCst);
        metrics::counter!("gf_dlq_messages_total", "component" => self.component.as_str()).increment(1);
        Ok(())
    }

    pub fn state(&self) -> DlqState {
        DlqState {
            last_received_unix_ms: match self.last_received_unix_ms.load(Ordering::SeqCst) {
                0 => None,
                ms => Some(ms),
            },
            last_consumed_unix_ms: None,
            total_count: self.total_count.load(Ordering::SeqCst),
            unconsumed_count: self.unconsumed_count.load(Ordering::SeqCst),
        }
    }
}

/// Paginated, non-acking reader over a DLQ stream. The DLQ is a retained
/// tail: reads never ack, so the same records remain visible to every
/// reader and to future pages. This is the data-plane-facing half of the
/// API's DLQ read endpoint; it does not implement HTTP transport.
pub struct DlqReader {
    bus: Arc<dyn StreamBus>,
    stream: String,
    consumer: String,
}

impl DlqReader {
    pub fn new(bus: Arc<dyn StreamBus>, stream: String, consumer: String) -> Self {
        Self { bus, stream, consumer }
    }

    /// Reads up to `page_size` raw envelopes (clamped to 1..=100, default
    /// 100 when 0 is passed), waiting at most `max_wait` for the first one.
    pub async fn read_page(&self, page_size: usize, max_wait: Duration) -> anyhow::Result<Vec<DlqRecord>> {
        let clamped = if page_size == 0 { 100 } else { page_size.min(100) };
        let messages = with_backoff(&bus_backoff(), "dlq_read_page", || {
            self.bus.fetch(&self.stream, &self.consumer, clamped, max_wait)
        })
        .await?;
        let mut records = Vec::with_capacity(messages.len());
        for message in &messages {
            let record: DlqRecord = serde_json::from_slice(&message.payload)?;
            records.push(record);
        }
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gf_bus::MemoryStreamBus;
    use std::time::Duration;

    #[tokio::test]
    async fn publish_increments_counters_and_lands_on_the_dlq_subject() {
        let bus: Arc<dyn StreamBus> = Arc::new(MemoryStreamBus::new());
        bus.ensure_stream("gf-abc-dlq", vec!["gf-abc-dlq.failed".to_string()], None)
            .await
            .unwrap();
        let writer = DlqWriter::new(bus.clone(), "gf-abc-dlq.failed".to_string(), ComponentKind::Ingestor);
        writer.publish("parse error: expected value", "not-json", 1_700_000_000_000).await.unwrap();

        let state = writer.state();
        assert_eq!(state.total_count, 1);
        assert_eq!(state.unconsumed_count, 1);
        assert_eq!(state.last_received_unix_ms, Some(1_700_000_000_000));

        let reader = DlqReader::new(bus, "gf-abc-dlq".to_string(), "dlq-reader".to_string());
        let page = reader.read_page(100, Duration::from_millis(10)).await.unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].original_message, "not-json");
        assert!(page[0].error.contains("parse"));
    }

    #[tokio::test]
    async fn zero_page_size_defaults_to_one_hundred_not_one() {
        let bus: Arc<dyn StreamBus> = Arc::new(MemoryStreamBus::new());
        bus.ensure_stream("gf-abc-dlq", vec!["gf-abc-dlq.failed".to_string()], None)
            .await
            .unwrap();
        let writer = DlqWriter::new(bus.clone(), "gf-abc-dlq.failed".to_string(), ComponentKind::Ingestor);
        for i in 0..3 {
            writer.publish("err", format!("msg-{i}"), 1_700_000_000_000).await.unwrap();
        }

        let reader = DlqReader::new(bus, "gf-abc-dlq".to_string(), "dlq-reader-2".to_string());
        let page = reader.read_page(0, Duration::from_millis(10)).await.unwrap();
        assert_eq!(page.len(), 3);
    }
}
