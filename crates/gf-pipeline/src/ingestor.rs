//! Consumes one Kafka topic, runs each record through the processor chain,
//! and publishes the result (downstream or DLQ), committing Kafka offsets
//! only after every record in the batch has a disposition.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use gf_bus::{KvStore, StreamBus};
use gf_core::retry::{bus_backoff, with_backoff};
use gf_core::{Component, ComponentKind, ComponentSignal, StopSignal};
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::{Message as _, OwnedMessage};
use rdkafka::TopicPartitionList;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{info, warn};

use crate::config::IngestorConfig;
use crate::dlq::DlqWriter;
use crate::processor::{run_chain, Outcome};

pub struct Ingestor {
    config: IngestorConfig,
    output_subject: String,
    bus: Arc<dyn StreamBus>,
    dedup_kv: Option<Arc<dyn KvStore>>,
    dlq: Arc<DlqWriter>,
}

impl Ingestor {
    pub fn new(
        config: IngestorConfig,
        output_subject: String,
        bus: Arc<dyn StreamBus>,
        dedup_kv: Option<Arc<dyn KvStore>>,
        dlq: Arc<DlqWriter>,
    ) -> Self {
        Self { config, output_subject, bus, dedup_kv, dlq }
    }

    fn build_consumer(&self) -> anyhow::Result<StreamConsumer> {
        let group = gf_core::pipeline_id::consumer_group_name(&self.config.pipeline_id);
        let mut client_config = ClientConfig::new();
        client_config
            .set("bootstrap.servers", &self.config.kafka.brokers)
            .set("group.id", &group)
            .set("enable.auto.commit", "false")
            .set("enable.partition.eof", "false")
            .set(
                "auto.offset.reset",
                match self.config.kafka.initial_offset {
                    gf_core::config::InitialOffset::Earliest => "earliest",
                    gf_core::config::InitialOffset::Latest => "latest",
                },
            );
        for (key, value) in self.config.kafka.auth.as_client_config_entries() {
            client_config.set(&key, &value);
        }
        Ok(client_config.create()?)
    }

    async fn fetch_batch(&self, consumer: &StreamConsumer, stop: &StopSignal) -> Vec<OwnedMessage> {
        let poll_timeout = self.config.kafka.poll_timeout.0;
        let mut batch = Vec::with_capacity(self.config.kafka.fetch_max_messages);
        let deadline = tokio::time::Instant::now() + poll_timeout;

        while batch.len() < self.config.kafka.fetch_max_messages {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                break;
            }
            tokio::select! {
                _ = stop.cancel_token().cancelled() => break,
                result = timeout(remaining, consumer.recv()) => {
                    match result {
                        Ok(Ok(borrowed)) => batch.push(borrowed.detach()),
                        Ok(Err(e)) => {
                            warn!(%e, "kafka recv error, retrying within this batch window");
                        }
                        Err(_elapsed) => break,
                    }
                }
            }
        }
        batch
    }
}

#[async_trait]
impl Component for Ingestor {
    async fn start(&mut self, stop: StopSignal, signals: mpsc::Sender<ComponentSignal>) -> anyhow::Result<()> {
        let consumer = self.build_consumer()?;
        consumer.subscribe(&[&self.config.kafka.topic])?;
        info!(topic = %self.config.kafka.topic, "ingestor started");

        loop {
            if stop.is_cancelled() && stop.is_no_wait() {
                break;
            }

            let batch = self.fetch_batch(&consumer, &stop).await;
            if batch.is_empty() {
                if stop.is_cancelled() {
                    break;
                }
                continue;
            }

            let mut last_offset_per_partition: HashMap<i32, i64> = HashMap::new();
            for message in &batch {
                let payload = message.payload().unwrap_or_default();
                let outcome = match run_chain(
                    payload,
                    self.config.dedup.as_ref(),
                    self.dedup_kv.as_deref(),
                    self.config.mapping.as_ref(),
                )
                .await
                {
                    Ok(outcome) => outcome,
                    Err(e) => {
                        let _ = signals
                            .send(ComponentSignal::failed(
                                &self.config.pipeline_id,
                                ComponentKind::Ingestor,
                                format!("bus/kv unavailable: {e}"),
                            ))
                            .await;
                        return Err(e);
                    }
                };

                match outcome {
                    Outcome::Publish { payload, idempotency_key } => {
                        with_backoff(&bus_backoff(), "ingestor_publish", || {
                            self.bus.publish(&self.output_subject, payload.clone(), Default::default(), idempotency_key.clone())
                        })
                        .await?;
                        metrics::counter!("gf_ingestor_messages_published_total", "topic" => self.config.kafka.topic.clone()).increment(1);
                    }
                    Outcome::DedupDrop => {
                        metrics::counter!("gf_ingestor_dedup_drops_total", "topic" => self.config.kafka.topic.clone()).increment(1);
                    }
                    Outcome::Fail { error } => {
                        let original = String::from_utf8_lossy(payload).to_string();
                        self.dlq.publish(error, original, now_millis()).await?;
                    }
                }

                last_offset_per_partition.insert(message.partition(), message.offset());
            }

            let mut tpl = TopicPartitionList::new();
            for (partition, offset) in last_offset_per_partition {
                tpl.add_partition_offset(
                    &self.config.kafka.topic,
                    partition,
                    rdkafka::Offset::Offset(offset + 1),
                )?;
            }
            consumer.commit(&tpl, CommitMode::Sync)?;

            if stop.is_cancelled() {
                break;
            }
        }

        info!(topic = %self.config.kafka.topic, "ingestor stopped");
        Ok(())
    }
}

fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
