//! Batches mapped rows and inserts them into ClickHouse. Runs an explicit
//! Idle/Accumulating/Flushing/Draining state machine so only one flush is
//! ever in flight and a stop request always gets one last drain.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use gf_bus::StreamBus;
use gf_core::retry::{bus_backoff, with_backoff, BackoffConfig};
use gf_core::{Component, ComponentKind, ComponentSignal, StopSignal};
use gf_schema::mapper::Mapper;
use gf_schema::Row;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::config::SinkConfig;
use crate::dlq::DlqWriter;
use crate::row::row_to_json_value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SinkState {
    Idle,
    Accumulating,
    Flushing,
    Draining,
}

struct Buffered {
    row: Row,
    message: gf_core::Message,
}

pub struct Sink {
    config: SinkConfig,
    input_stream: String,
    input_consumer: String,
    bus: Arc<dyn StreamBus>,
    dlq: Arc<DlqWriter>,
    client: clickhouse::Client,
}

impl Sink {
    pub fn new(
        config: SinkConfig,
        input_stream: String,
        input_consumer: String,
        bus: Arc<dyn StreamBus>,
        dlq: Arc<DlqWriter>,
    ) -> Self {
        let scheme = if config.clickhouse.secure { "https" } else { "http" };
        let url = format!("{}://{}:{}", scheme, config.clickhouse.host, config.clickhouse.native_port);
        let client = clickhouse::Client::default()
            .with_url(url)
            .with_user(&config.clickhouse.username)
            .with_password(&config.clickhouse.password)
            .with_database(&config.clickhouse.database);

        Self { config, input_stream, input_consumer, bus, dlq, client }
    }

    fn backoff(&self) -> BackoffConfig {
        BackoffConfig {
            initial: Duration::from_millis(200),
            max: self.config.insert_deadline.0,
            multiplier: 2.0,
            max_attempts: 5,
        }
    }
}

#[async_trait]
impl Component for Sink {
    async fn start(&mut self, stop: StopSignal, signals: mpsc::Sender<ComponentSignal>) -> anyhow::Result<()> {
        self.bus
            .ensure_consumer(&self.input_stream, &self.input_consumer, &format!("{}.>", self.input_stream), self.config.ack_wait.0)
            .await?;

        info!(table = %self.config.table, "sink started");

        let mut state = SinkState::Idle;
        let mut buffer: Vec<Buffered> = Vec::with_capacity(self.config.max_batch_size);
        let mut deadline = Instant::now() + self.config.max_delay.0;

        loop {
            if state == SinkState::Idle && stop.is_cancelled() {
                state = SinkState::Draining;
            }

            match state {
                SinkState::Idle | SinkState::Accumulating => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    let want = self.config.max_batch_size - buffer.len();

                    tokio::select! {
                        _ = stop.cancel_token().cancelled(), if stop.is_no_wait() => {
                            state = SinkState::Draining;
                            continue;
                        }
                        fetched = with_backoff(&bus_backoff(), "sink_fetch", || self.bus.fetch(&self.input_stream, &self.input_consumer, want, remaining)) => {
                            let messages = fetched?;
                            for message in messages {
                                match self.stage_row(&message).await {
                                    Ok(Some(row)) => buffer.push(Buffered { row, message }),
                                    Ok(None) => {
                                        message.ack().await?;
                                    }
                                    Err(e) => {
                                        let original = String::from_utf8_lossy(&message.payload).to_string();
                                        self.dlq.publish(e.to_string(), original, now_millis()).await?;
                                        message.ack().await?;
                                    }
                                }
                            }
                            if buffer.is_empty() {
                                state = SinkState::Idle;
                            } else if buffer.len() >= self.config.max_batch_size || Instant::now() >= deadline {
                                state = SinkState::Flushing;
                            } else {
                                state = SinkState::Accumulating;
                            }
                        }
                    }

                    if stop.is_cancelled() && state != SinkState::Flushing {
                        state = SinkState::Draining;
                    }
                }

                SinkState::Flushing => {
                    self.flush(&mut buffer, &signals).await?;
                    deadline = Instant::now() + self.config.max_delay.0;
                    state = if stop.is_cancelled() { SinkState::Draining } else { SinkState::Idle };
                }

                SinkState::Draining => {
                    if !buffer.is_empty() {
                        if stop.is_no_wait() {
                            nak_all(&mut buffer).await?;
                        } else {
                            self.flush(&mut buffer, &signals).await?;
                        }
                    }
                    break;
                }
            }
        }

        info!(table = %self.config.table, "sink stopped");
        Ok(())
    }
}

impl Sink {
    /// Decodes and maps one fetched record into a `Row`, or `None` when the
    /// record is not a row this sink handles (never produced by the rest of
    /// the pipeline, but kept as a defensive decode boundary).
    async fn stage_row(&self, message: &gf_core::Message) -> anyhow::Result<Option<Row>> {
        let decoded: Value = serde_json::from_slice(&message.payload)?;
        let row = Mapper::map_single(&decoded, &self.config.mapping)?;
        Ok(Some(row))
    }

    async fn flush(&self, buffer: &mut Vec<Buffered>, signals: &mpsc::Sender<ComponentSignal>) -> anyhow::Result<()> {
        if buffer.is_empty() {
            return Ok(());
        }

        let table = self.config.table.clone();
        let body = encode_jsoneachrow(buffer);
        let insert_sql = format!("INSERT INTO {table} FORMAT JSONEachRow");
        let batch_size = buffer.len();
        let started = Instant::now();

        let result = with_backoff(&self.backoff(), "clickhouse_insert", || {
            let client = self.client.clone();
            let insert_sql = insert_sql.clone();
            let body = body.clone();
            async move { client.query(&insert_sql).bind(body.as_slice()).execute().await }
        })
        .await;

        metrics::histogram!("gf_sink_flush_duration_seconds", "table" => table.clone()).record(started.elapsed().as_secs_f64());

        match result {
            Ok(()) => {
                metrics::counter!("gf_sink_rows_inserted_total", "table" => table.clone()).increment(batch_size as u64);
                for entry in buffer.drain(..) {
                    entry.message.ack().await?;
                }
                Ok(())
            }
            Err(e) if is_fatal_clickhouse_error(&e) => {
                warn!(table = %self.config.table, %e, "fatal clickhouse error, routing batch to DLQ");
                for entry in buffer.drain(..) {
                    let original = String::from_utf8_lossy(&entry.message.payload).to_string();
                    self.dlq.publish(format!("clickhouse insert rejected: {e}"), original, now_millis()).await?;
                    entry.message.ack().await?;
                }
                Ok(())
            }
            Err(e) => {
                let _ = signals
                    .send(ComponentSignal::failed(&self.config.pipeline_id, ComponentKind::Sink, format!("clickhouse insert failed: {e}")))
                    .await;
                Err(e.into())
            }
        }
    }
}

/// No-wait stop: the buffered rows are still un-acked bus messages, not
/// work left to do, so they are nak'd for redelivery instead of flushed.
async fn nak_all(buffer: &mut Vec<Buffered>) -> anyhow::Result<()> {
    for entry in buffer.drain(..) {
        entry.message.nak().await?;
    }
    Ok(())
}

fn encode_jsoneachrow(buffer: &[Buffered]) -> Vec<u8> {
    let mut body = Vec::new();
    for entry in buffer {
        let value = row_to_json_value(&entry.row);
        serde_json::to_writer(&mut body, &value).expect("serializing a row to JSON cannot fail");
        body.push(b'\n');
    }
    body
}

/// Schema/constraint violations are not solved by retrying: malformed
/// type, unknown column, or a failed table constraint all land here and
/// send the batch to the DLQ instead of escalating to fatal.
fn is_fatal_clickhouse_error(error: &clickhouse::error::Error) -> bool {
    let message = error.to_string().to_ascii_lowercase();
    message.contains("type mismatch")
        || message.contains("unknown column")
        || message.contains("cannot parse")
        || message.contains("constraint")
        || message.contains("code: 117")
        || message.contains("code: 16")
}

fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use gf_core::{AckHandle, Headers, Message, Origin};
    use gf_schema::ClickHouseValue;
    use std::collections::HashMap;

    struct NoopAckHandle;

    #[async_trait::async_trait]
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

    fn fake_message(payload: &[u8]) -> Message {
        Message::new(Origin::Kafka, payload.to_vec(), Headers::from_original(HashMap::new()), Box::new(NoopAckHandle))
    }

    #[test]
    fn jsoneachrow_body_is_one_object_per_line() {
        let row: Row = vec![("id".to_string(), ClickHouseValue::Int64(1))];
        let buffer = vec![Buffered { row, message: fake_message(b"{}") }];
        let body = encode_jsoneachrow(&buffer);
        let text = String::from_utf8(body).unwrap();
        assert_eq!(text.lines().count(), 1);
        assert!(text.contains("\"id\":1"));
    }

    struct CountingAckHandle {
        acks: Arc<std::sync::atomic::AtomicUsize>,
        naks: Arc<std::sync::atomic::AtomicUsize>,
    }

    #[async_trait::async_trait]
    impl AckHandle for CountingAckHandle {
        async fn ack(&self) -> anyhow::Result<()> {
            self.acks.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Ok(())
        }
        async fn nak(&self) -> anyhow::Result<()> {
            self.naks.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Ok(())
        }
        async fn term(&self) -> anyhow::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn no_wait_drain_naks_buffered_rows_instead_of_flushing() {
        let acks = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let naks = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let mut buffer = (0..3)
            .map(|i| Buffered {
                row: vec![("id".to_string(), ClickHouseValue::Int64(i))],
                message: Message::new(
                    Origin::JetStream,
                    b"{}".to_vec(),
                    Headers::from_original(HashMap::new()),
                    Box::new(CountingAckHandle { acks: acks.clone(), naks: naks.clone() }),
                ),
            })
            .collect::<Vec<_>>();

        nak_all(&mut buffer).await.unwrap();

        assert!(buffer.is_empty(), "drained buffer should be empty, no insert attempted");
        assert_eq!(naks.load(std::sync::atomic::Ordering::SeqCst), 3);
        assert_eq!(acks.load(std::sync::atomic::Ordering::SeqCst), 0);
    }
}
