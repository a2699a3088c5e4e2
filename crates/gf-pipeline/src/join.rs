//! Windowed temporal join: two independent tasks, one per side, sharing
//! only the two KV buffers. Each side puts its own record into its buffer
//! then probes the opposite side's buffer for the same key.

use std::sync::Arc;

use async_trait::async_trait;
use gf_bus::{KvStore, StreamBus};
use gf_core::retry::{bus_backoff, with_backoff};
use gf_core::{Component, ComponentKind, ComponentSignal, StopSignal};
use gf_schema::mapper::Mapper;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::info;

use crate::config::{JoinConfig, JoinSideConfig};
use crate::dlq::DlqWriter;
use crate::processor::row_to_json_bytes;

#[derive(Clone, Copy, PartialEq, Eq)]
enum Side {
    Left,
    Right,
}

pub struct Join {
    config: JoinConfig,
    input_subjects: (String, String),
    output_subject: String,
    bus: Arc<dyn StreamBus>,
    left_buffer: Arc<dyn KvStore>,
    right_buffer: Arc<dyn KvStore>,
    dlq: Arc<DlqWriter>,
}

impl Join {
    pub fn new(
        config: JoinConfig,
        input_subjects: (String, String),
        output_subject: String,
        bus: Arc<dyn StreamBus>,
        left_buffer: Arc<dyn KvStore>,
        right_buffer: Arc<dyn KvStore>,
        dlq: Arc<DlqWriter>,
    ) -> Self {
        Self {
            config,
            input_subjects,
            output_subject,
            bus,
            left_buffer,
            right_buffer,
            dlq,
        }
    }
}

#[async_trait]
impl Component for Join {
    async fn start(&mut self, stop: StopSignal, signals: mpsc::Sender<ComponentSignal>) -> anyhow::Result<()> {
        let (left_stream, left_subject) = split_stream_subject(&self.input_subjects.0);
        let (right_stream, right_subject) = split_stream_subject(&self.input_subjects.1);
        let left_consumer = format!("{}-join-left", self.config.pipeline_id);
        let right_consumer = format!("{}-join-right", self.config.pipeline_id);

        self.bus
            .ensure_consumer(&left_stream, &left_consumer, &left_subject, self.config.ack_wait.0)
            .await?;
        self.bus
            .ensure_consumer(&right_stream, &right_consumer, &right_subject, self.config.ack_wait.0)
            .await?;

        info!(pipeline = %self.config.pipeline_id, "join started");

        loop {
            if stop.is_cancelled() && stop.is_no_wait() {
                break;
            }

            let max_wait = self.config.fetch_max_wait.0;
            tokio::select! {
                _ = stop.cancel_token().cancelled(), if stop.is_no_wait() => break,
                left = with_backoff(&bus_backoff(), "join_fetch_left", || self.bus.fetch(&left_stream, &left_consumer, self.config.fetch_max_messages, max_wait)) => {
                    self.process_side(Side::Left, left?, &signals).await?;
                }
                right = with_backoff(&bus_backoff(), "join_fetch_right", || self.bus.fetch(&right_stream, &right_consumer, self.config.fetch_max_messages, max_wait)) => {
                    self.process_side(Side::Right, right?, &signals).await?;
                }
            }

            if stop.is_cancelled() {
                break;
            }
        }

        info!(pipeline = %self.config.pipeline_id, "join stopped");
        Ok(())
    }
}

impl Join {
    async fn process_side(
        &self,
        side: Side,
        batch: Vec<gf_core::Message>,
        signals: &mpsc::Sender<ComponentSignal>,
    ) -> anyhow::Result<()> {
        let (own_buffer, opposite_buffer, own_cfg) = match side {
            Side::Left => (&self.left_buffer, &self.right_buffer, &self.config.left),
            Side::Right => (&self.right_buffer, &self.left_buffer, &self.config.right),
        };

        for message in &batch {
            let result = self.join_one(side, message.payload.clone(), own_buffer.as_ref(), opposite_buffer.as_ref(), own_cfg).await;
            match result {
                Ok(true) | Ok(false) => {
                    message.ack().await?;
                }
                Err(e) => {
                    let _ = signals
                        .send(ComponentSignal::failed(&self.config.pipeline_id, ComponentKind::Join, e.to_string()))
                        .await;
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    /// Returns `Ok(true)` if a combined record was emitted, `Ok(false)` if
    /// this record was only buffered (no match yet or missing key routed to
    /// DLQ).
    async fn join_one(
        &self,
        side: Side,
        payload: Vec<u8>,
        own_buffer: &dyn KvStore,
        opposite_buffer: &dyn KvStore,
        own_cfg: &JoinSideConfig,
    ) -> anyhow::Result<bool> {
        let decoded: Value = match serde_json::from_slice(&payload) {
            Ok(v) => v,
            Err(e) => {
                let original = String::from_utf8_lossy(&payload).to_string();
                self.dlq.publish(format!("parse error: {e}"), original, now_millis()).await?;
                return Ok(false);
            }
        };

        let key = match decoded.pointer(&own_cfg.join_key) {
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => {
                let original = String::from_utf8_lossy(&payload).to_string();
                self.dlq
                    .publish(format!("missing join key {}", own_cfg.join_key), original, now_millis())
                    .await?;
                return Ok(false);
            }
        };

        own_buffer.put(&key, payload.clone()).await?;

        if let Some(opposite_payload) = opposite_buffer.get(&key).await? {
            let (left_payload, right_payload) = match side {
                Side::Left => (payload, opposite_payload),
                Side::Right => (opposite_payload, payload),
            };
            let left: Value = serde_json::from_slice(&left_payload)?;
            let right: Value = serde_json::from_slice(&right_payload)?;
            let combined = Mapper::map_joined(&left, &right, &self.config.mapping)?;
            let out = row_to_json_bytes(&combined)?;
            with_backoff(&bus_backoff(), "join_publish", || {
                self.bus.publish(&self.output_subject, out.clone(), Default::default(), None)
            })
            .await?;
            metrics::counter!("gf_join_matches_total", "pipeline" => self.config.pipeline_id.clone()).increment(1);
            return Ok(true);
        }

        Ok(false)
    }
}

fn split_stream_subject(subject: &str) -> (String, String) {
    match subject.rsplit_once('.') {
        Some((stream, _)) => (stream.to_string(), subject.to_string()),
        None => (subject.to_string(), subject.to_string()),
    }
}

fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
