//! # gf-schema
//!
//! Typed mapping from JSON source field paths to ClickHouse columns: field
//! extraction by JSON pointer, per-field type coercion, and the single- and
//! joined-source mapping entry points used by the sink.

pub mod coerce;
pub mod column_type;
pub mod error;
pub mod mapper;
pub mod mapping;

pub use column_type::{ClickHouseValue, ColumnType, EnumVariants};
pub use error::MapError;
pub use mapper::{Mapper, Row};
pub use mapping::{ColumnMapping, SinkMapping, SourceSide};
