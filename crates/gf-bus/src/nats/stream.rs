use std::collections::HashMap;
use std::time::Duration;

use async_nats::jetstream::{
    consumer::{pull::Config as PullConfig, AckPolicy, DeliverPolicy},
    stream::Config as StreamConfig,
    Context as JetStreamContext,
};
use async_trait::async_trait;
use futures::StreamExt;
use gf_core::{Headers, Message, Origin};
use tracing::{debug, info};

use crate::nats::ack::NatsAckHandle;
use crate::stream_bus::{FetchedBatch, StreamBus};

pub struct NatsStreamBus {
    jetstream: JetStreamContext,
}

impl NatsStreamBus {
    pub fn new(jetstream: JetStreamContext) -> Self {
        Self { jetstream }
    }

    pub async fn connect(url: &str) -> anyhow::Result<Self> {
        let client = async_nats::connect(url).await?;
        Ok(Self::new(async_nats::jetstream::new(client)))
    }
}

#[async_trait]
impl StreamBus for NatsStreamBus {
    async fn ensure_stream(
        &self,
        name: &str,
        subjects: Vec<String>,
        dedup_window: Option<Duration>,
    ) -> anyhow::Result<()> {
        let config = StreamConfig {
            name: name.to_string(),
            subjects,
            duplicate_window: dedup_window.unwrap_or_default(),
            ..Default::default()
        };

        match self.jetstream.get_stream(name).await {
            Ok(_) => {
                debug!(stream = name, "stream exists, updating config");
                self.jetstream.update_stream(config).await?;
            }
            Err(_) => {
                info!(stream = name, "creating stream");
                self.jetstream.create_stream(config).await?;
            }
        }
        Ok(())
    }

    async fn ensure_consumer(
        &self,
        stream: &str,
        consumer_name: &str,
        filter_subject: &str,
        ack_wait: Duration,
    ) -> anyhow::Result<()> {
        let stream_handle = self.jetstream.get_stream(stream).await?;
        let config = PullConfig {
            durable_name: Some(consumer_name.to_string()),
            ack_policy: AckPolicy::Explicit,
            deliver_policy: DeliverPolicy::All,
            filter_subject: filter_subject.to_string(),
            ack_wait,
            ..Default::default()
        };
        stream_handle
            .get_or_create_consumer(consumer_name, config)
            .await?;
        Ok(())
    }

    async fn publish(
        &self,
        subject: &str,
        payload: Vec<u8>,
        headers: HashMap<String, Vec<String>>,
        idempotency_key: Option<String>,
    ) -> anyhow::Result<()> {
        let mut nats_headers = async_nats::HeaderMap::new();
        for (key, values) in &headers {
            for value in values {
                nats_headers.insert(key.as_str(), value.as_str());
            }
        }
        if let Some(key) = &idempotency_key {
            nats_headers.insert("Nats-Msg-Id", key.as_str());
        }

        let ack = self
            .jetstream
            .publish_with_headers(subject.to_string(), nats_headers, payload.into())
            .await?;
        ack.await?;
        Ok(())
    }

    async fn fetch(
        &self,
        stream: &str,
        consumer_name: &str,
        max: usize,
        max_wait: Duration,
    ) -> anyhow::Result<FetchedBatch> {
        let stream_handle = self.jetstream.get_stream(stream).await?;
        let consumer: async_nats::jetstream::consumer::PullConsumer =
            stream_handle.get_consumer(consumer_name).await?;

        let mut out = Vec::with_capacity(max);
        let mut batch = consumer
            .batch()
            .max_messages(max)
            .expires(max_wait.as_millis() as u64)
            .messages()
            .await?;

        while let Some(next) = batch.next().await {
            let raw = next?;
            let headers = raw
                .headers
                .as_ref()
                .map(|h| {
                    h.iter()
                        .map(|(k, v)| (k.to_string(), v.iter().map(|s| s.to_string()).collect()))
                        .collect()
                })
                .unwrap_or_default();
            let payload = raw.payload.to_vec();
            let ack_handle = NatsAckHandle::new(raw);
            out.push(Message::new(
                Origin::JetStream,
                payload,
                Headers::from_original(headers),
                Box::new(ack_handle),
            ));
            if out.len() >= max {
                break;
            }
        }

        Ok(out)
    }
}
