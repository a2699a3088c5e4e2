//! Per-component sub-configuration, the shape each component fetches
//! through `gf_core::config::ConfigStore` keyed by pipeline id + its own
//! source id.

use gf_core::config::{ClickHouseConnConfig, KafkaConsumerConfig};
use gf_core::duration::GoDuration;
use gf_schema::{ColumnType, SinkMapping};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DedupConfig {
    /// JSON-pointer path to the dedup key field.
    pub field: String,
    pub key_type: ColumnType,
    pub window: GoDuration,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestorConfig {
    pub pipeline_id: String,
    pub kafka: KafkaConsumerConfig,
    #[serde(default)]
    pub dedup: Option<DedupConfig>,
    #[serde(default)]
    pub mapping: Option<SinkMapping>,
    pub ack_wait: GoDuration,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinSideConfig {
    pub topic: String,
    /// JSON-pointer path to the join key field.
    pub join_key: String,
    pub window: GoDuration,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinConfig {
    pub pipeline_id: String,
    pub left: JoinSideConfig,
    pub right: JoinSideConfig,
    pub mapping: SinkMapping,
    pub fetch_max_messages: usize,
    pub fetch_max_wait: GoDuration,
    pub ack_wait: GoDuration,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SinkConfig {
    pub pipeline_id: String,
    pub clickhouse: ClickHouseConnConfig,
    pub table: String,
    pub mapping: SinkMapping,
    pub max_batch_size: usize,
    pub max_delay: GoDuration,
    pub insert_deadline: GoDuration,
    pub fetch_max_messages: usize,
    pub fetch_max_wait: GoDuration,
    pub ack_wait: GoDuration,
}
