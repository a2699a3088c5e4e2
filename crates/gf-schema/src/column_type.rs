//! ClickHouse column types the sink mapper can coerce into, and the coerced
//! value representation produced by [`crate::mapper::coerce`].

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// One Enum8/Enum16 variant table: name -> numeric index. Matching tries
/// the name first, then falls back to treating the source value as the
/// index itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnumVariants(pub HashMap<String, i16>);

impl EnumVariants {
    pub fn resolve(&self, name: &str) -> Option<i16> {
        self.0.get(name).copied()
    }

    pub fn resolve_index(&self, index: i16) -> Option<&str> {
        self.0
            .iter()
            .find(|(_, v)| **v == index)
            .map(|(k, _)| k.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum ColumnType {
    Int8,
    Int16,
    Int32,
    Int64,
    Float32,
    Float64,
    String,
    FixedString(usize),
    Bool,
    Uuid,
    DateTime,
    DateTime64,
    Enum8(EnumVariants),
    Enum16(EnumVariants),
}

/// A coerced value ready for insertion. Kept separate from `serde_json::Value`
/// so the sink's ClickHouse client sees only values it already knows the
/// wire representation for.
#[derive(Debug, Clone, PartialEq)]
pub enum ClickHouseValue {
    Int8(i8),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Float32(f32),
    Float64(f64),
    String(String),
    Bool(bool),
    Uuid(uuid::Uuid),
    /// Seconds since epoch.
    DateTime(i64),
    /// Milliseconds since epoch.
    DateTime64(i64),
    /// Resolved numeric index plus the matched variant name, for logging.
    Enum(i16, String),
    Null,
}
