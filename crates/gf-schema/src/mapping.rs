use serde::{Deserialize, Serialize};

use crate::column_type::ColumnType;

/// Which side of a join a mapped column's source field comes from. Ignored
/// by `map_single`, where there is only one source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceSide {
    Left,
    Right,
}

/// One target-column rule in a sink mapping: which source field to pull,
/// what ClickHouse column it becomes, and whether a missing field is an
/// error or a null.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnMapping {
    /// `None` for a single-source (ingest-only) pipeline; required for a
    /// joined pipeline so the mapper knows which payload to pull from.
    #[serde(default)]
    pub source_side: Option<SourceSide>,
    /// JSON-pointer path into the source payload, e.g. `/user/id`.
    pub source_field: String,
    pub column_name: String,
    pub column_type: ColumnType,
    #[serde(default)]
    pub nullable: bool,
}

pub type SinkMapping = Vec<ColumnMapping>;
