//! # gf-runner
//!
//! Starts one or more data-plane components (Ingestor, Join, Sink) in a
//! single process against a real JetStream bus, reading each component's
//! sub-configuration from a YAML file via `gf_core::config::FileConfigStore`.
//!
//! ```bash
//! # Run a single ingestor
//! gf-runner --role ingestor --pipeline-id p1 --config pipeline.yml --source-id orders-source
//!
//! # Run the whole pipeline (ingestor(s) + optional join + sink) in one process
//! gf-runner --role etl --pipeline-id p1 --config pipeline.yml
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_nats::jetstream;
use clap::Parser;
use gf_bus::{KvStore, MemoryKvStore, MemoryStreamBus, NatsKvStore, NatsStreamBus, StreamBus};
use gf_core::config::{get_config, ConfigStore, FileConfigStore};
use gf_core::pipeline_id::{dlq_stream_name, failed_subject, ingestor_stream_name, input_subject, joined_stream_name, pipeline_hash};
use gf_core::{Component, ComponentHandle, ComponentKind, StopOptions, StopSignal};
use gf_pipeline::config::{IngestorConfig, JoinConfig, SinkConfig};
use gf_pipeline::{DlqWriter, Ingestor, Join, Sink};
use tokio::signal;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, clap::ValueEnum)]
enum Role {
    Ingestor,
    Join,
    Sink,
    Etl,
    /// Whole pipeline against in-memory stream/KV fakes instead of a real
    /// JetStream server; still uses real Kafka and ClickHouse. Only the
    /// single-ingestor, no-join linear chain is correct in this mode — see
    /// the note on `MemoryStreamBus::fetch` in `gf-bus`.
    Demo,
}

/// Where a component's KV buckets (dedup memo, join buffers) live: a real
/// JetStream context, or a single shared in-memory store for `--role demo`.
enum KvBackend {
    Nats(jetstream::Context),
    Memory(Arc<MemoryKvStore>),
}

impl KvBackend {
    async fn bucket(&self, bucket: &str, max_age: Duration) -> Result<Arc<dyn KvStore>> {
        match self {
            KvBackend::Nats(ctx) => {
                let store = ctx
                    .create_key_value(jetstream::kv::Config {
                        bucket: bucket.to_string(),
                        max_age,
                        history: 1,
                        ..Default::default()
                    })
                    .await
                    .with_context(|| format!("creating KV bucket {bucket}"))?;
                Ok(Arc::new(NatsKvStore::new(store)))
            }
            // Demo mode only ever allocates one bucket (the dedup memo, if
            // configured) so a single shared map has no cross-purpose key
            // collisions to worry about.
            KvBackend::Memory(kv) => Ok(kv.clone()),
        }
    }
}

/// Command-line arguments for the component runner.
#[derive(Parser, Debug)]
#[command(name = "gf-runner")]
#[command(about = "Runs Ingestor/Join/Sink data-plane components")]
struct Args {
    /// Which component(s) to run in this process.
    #[arg(long, value_enum)]
    role: Role,

    /// Pipeline identifier; every stream, subject and consumer-group name
    /// is deterministically derived from this plus a component source id.
    #[arg(long, env = "GF_PIPELINE_ID")]
    pipeline_id: String,

    /// YAML file backing `FileConfigStore`, keyed `"<pipeline_id>/<source_id>"`.
    #[arg(long, env = "GF_CONFIG_FILE")]
    config: PathBuf,

    /// NATS JetStream URL.
    #[arg(long, env = "GF_NATS_URL", default_value = "nats://localhost:4222")]
    nats_url: String,

    /// Config source id for a single ingestor/join/sink role.
    #[arg(long, env = "GF_SOURCE_ID", default_value = "ingestor")]
    source_id: String,

    /// Comma-separated ingestor source ids, used by `--role etl`. Two ids
    /// feed a join; one id feeds the sink directly.
    #[arg(long, env = "GF_INGESTOR_SOURCE_IDS", value_delimiter = ',', default_values_t = vec!["ingestor".to_string()])]
    ingestor_source_ids: Vec<String>,

    /// Config source id for the join stage, used by `--role etl` when two
    /// ingestor source ids are given.
    #[arg(long, env = "GF_JOIN_SOURCE_ID", default_value = "join")]
    join_source_id: String,

    /// Config source id for the sink stage.
    #[arg(long, env = "GF_SINK_SOURCE_ID", default_value = "sink")]
    sink_source_id: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let config_store: Arc<dyn ConfigStore> = {
        let yaml = std::fs::read_to_string(&args.config)
            .with_context(|| format!("reading config file {}", args.config.display()))?;
        Arc::new(FileConfigStore::from_yaml_str(&yaml)?)
    };

    let (bus, kv_backend): (Arc<dyn StreamBus>, KvBackend) = match args.role {
        Role::Demo => (Arc::new(MemoryStreamBus::new()), KvBackend::Memory(Arc::new(MemoryKvStore::new()))),
        _ => {
            let nats_client = async_nats::connect(&args.nats_url)
                .await
                .with_context(|| format!("connecting to NATS at {}", args.nats_url))?;
            let jetstream_ctx = jetstream::new(nats_client);
            let bus: Arc<dyn StreamBus> = Arc::new(NatsStreamBus::new(jetstream_ctx.clone()));
            (bus, KvBackend::Nats(jetstream_ctx))
        }
    };

    let dlq_stream = dlq_stream_name(&args.pipeline_id);
    bus.ensure_stream(&dlq_stream, vec![failed_subject(&dlq_stream)], None).await?;

    let (signal_tx, mut signal_rx) = mpsc::channel(64);
    tokio::spawn(async move {
        while let Some(signal) = signal_rx.recv().await {
            match signal.reason {
                gf_core::signal::SignalReason::Failed => {
                    error!(pipeline = %signal.pipeline_id, component = %signal.component, text = %signal.text, "component reported a fatal error")
                }
                _ => info!(pipeline = %signal.pipeline_id, component = %signal.component, reason = ?signal.reason, "component lifecycle signal"),
            }
        }
    });

    let mut handles: Vec<(&'static str, ComponentHandle)> = Vec::new();

    match args.role {
        Role::Ingestor => {
            let handle = spawn_ingestor(&args, &args.source_id, config_store.as_ref(), bus.clone(), &kv_backend, &dlq_stream, signal_tx.clone()).await?;
            handles.push(("ingestor", handle));
        }
        Role::Join => {
            let handle = spawn_join(&args, config_store.as_ref(), bus.clone(), &kv_backend, &dlq_stream, signal_tx.clone()).await?;
            handles.push(("join", handle));
        }
        Role::Sink => {
            let handle = spawn_sink(&args, config_store.as_ref(), bus.clone(), &dlq_stream, signal_tx.clone()).await?;
            handles.push(("sink", handle));
        }
        Role::Etl => {
            if args.ingestor_source_ids.len() == 2 {
                for source_id in &args.ingestor_source_ids {
                    let handle = spawn_ingestor(&args, source_id, config_store.as_ref(), bus.clone(), &kv_backend, &dlq_stream, signal_tx.clone()).await?;
                    handles.push(("ingestor", handle));
                }
                let handle = spawn_join(&args, config_store.as_ref(), bus.clone(), &kv_backend, &dlq_stream, signal_tx.clone()).await?;
                handles.push(("join", handle));
            } else {
                for source_id in &args.ingestor_source_ids {
                    let handle = spawn_ingestor(&args, source_id, config_store.as_ref(), bus.clone(), &kv_backend, &dlq_stream, signal_tx.clone()).await?;
                    handles.push(("ingestor", handle));
                }
            }
            let handle = spawn_sink(&args, config_store.as_ref(), bus.clone(), &dlq_stream, signal_tx.clone()).await?;
            handles.push(("sink", handle));
        }
        Role::Demo => {
            // Single ingestor, no join, single sink — the only topology
            // `MemoryStreamBus::fetch` drives correctly.
            let handle = spawn_ingestor(&args, &args.ingestor_source_ids[0], config_store.as_ref(), bus.clone(), &kv_backend, &dlq_stream, signal_tx.clone()).await?;
            handles.push(("ingestor", handle));
            let handle = spawn_sink(&args, config_store.as_ref(), bus.clone(), &dlq_stream, signal_tx.clone()).await?;
            handles.push(("sink", handle));
        }
    }
    drop(signal_tx);

    signal::ctrl_c().await?;
    info!("received ctrl-c, stopping components gracefully");

    for (name, handle) in handles {
        if let Err(e) = handle.stop(StopOptions::graceful()).await {
            warn!(component = name, %e, "component returned an error while stopping");
        }
    }

    Ok(())
}

async fn spawn_ingestor(
    args: &Args,
    source_id: &str,
    config_store: &dyn ConfigStore,
    bus: Arc<dyn StreamBus>,
    kv_backend: &KvBackend,
    dlq_stream: &str,
    signal_tx: mpsc::Sender<gf_core::ComponentSignal>,
) -> Result<ComponentHandle> {
    let config: IngestorConfig = get_config(config_store, &args.pipeline_id, source_id).await?;
    let output_stream = ingestor_stream_name(&args.pipeline_id, &config.kafka.topic);
    let output_subject = input_subject(&output_stream);
    bus.ensure_stream(&output_stream, vec![output_subject.clone()], Some(config.dedup.as_ref().map(|d| d.window.0).unwrap_or_default()))
        .await?;

    let dedup_kv: Option<Arc<dyn KvStore>> = match &config.dedup {
        Some(dedup) => {
            let bucket = format!("gf-{}-dedup-{}", pipeline_hash(&args.pipeline_id), source_id);
            Some(kv_backend.bucket(&bucket, dedup.window.0).await?)
        }
        None => None,
    };

    let dlq = Arc::new(DlqWriter::new(bus.clone(), failed_subject(dlq_stream), ComponentKind::Ingestor));
    let mut component = Ingestor::new(config, output_subject, bus, dedup_kv, dlq);
    let stop_signal = StopSignal::new();
    let task_stop = stop_signal.clone();
    let join = tokio::spawn(async move { component.start(task_stop, signal_tx).await });
    Ok(ComponentHandle::new(stop_signal, join))
}

async fn spawn_join(
    args: &Args,
    config_store: &dyn ConfigStore,
    bus: Arc<dyn StreamBus>,
    kv_backend: &KvBackend,
    dlq_stream: &str,
    signal_tx: mpsc::Sender<gf_core::ComponentSignal>,
) -> Result<ComponentHandle> {
    let config: JoinConfig = get_config(config_store, &args.pipeline_id, &args.join_source_id).await?;
    let h = pipeline_hash(&args.pipeline_id);

    let left_stream = ingestor_stream_name(&args.pipeline_id, &config.left.topic);
    let right_stream = ingestor_stream_name(&args.pipeline_id, &config.right.topic);
    let left_subject = input_subject(&left_stream);
    let right_subject = input_subject(&right_stream);

    let joined_stream = joined_stream_name(&args.pipeline_id);
    let joined_subject = input_subject(&joined_stream);
    bus.ensure_stream(&joined_stream, vec![joined_subject.clone()], None).await?;

    let left_buffer = kv_backend.bucket(&format!("gf-{h}-join-left"), config.left.window.0).await?;
    let right_buffer = kv_backend.bucket(&format!("gf-{h}-join-right"), config.right.window.0).await?;

    let dlq = Arc::new(DlqWriter::new(bus.clone(), failed_subject(dlq_stream), ComponentKind::Join));
    let mut component = Join::new(config, (left_subject, right_subject), joined_subject, bus, left_buffer, right_buffer, dlq);
    let stop_signal = StopSignal::new();
    let task_stop = stop_signal.clone();
    let join_handle = tokio::spawn(async move { component.start(task_stop, signal_tx).await });
    Ok(ComponentHandle::new(stop_signal, join_handle))
}

async fn spawn_sink(
    args: &Args,
    config_store: &dyn ConfigStore,
    bus: Arc<dyn StreamBus>,
    dlq_stream: &str,
    signal_tx: mpsc::Sender<gf_core::ComponentSignal>,
) -> Result<ComponentHandle> {
    let config: SinkConfig = get_config(config_store, &args.pipeline_id, &args.sink_source_id).await?;

    let input_stream = if args.ingestor_source_ids.len() == 2 {
        joined_stream_name(&args.pipeline_id)
    } else {
        let ingestor_config: IngestorConfig = get_config(config_store, &args.pipeline_id, &args.ingestor_source_ids[0]).await?;
        ingestor_stream_name(&args.pipeline_id, &ingestor_config.kafka.topic)
    };
    let consumer_name = format!("{}-sink", pipeline_hash(&args.pipeline_id));

    let dlq = Arc::new(DlqWriter::new(bus.clone(), failed_subject(dlq_stream), ComponentKind::Sink));
    let mut component = Sink::new(config, input_stream, consumer_name, bus, dlq);
    let stop_signal = StopSignal::new();
    let task_stop = stop_signal.clone();
    let join_handle = tokio::spawn(async move { component.start(task_stop, signal_tx).await });
    Ok(ComponentHandle::new(stop_signal, join_handle))
}
