use serde_json::Value;

use crate::coerce::coerce;
use crate::column_type::ClickHouseValue;
use crate::error::MapError;
use crate::mapping::{ColumnMapping, SinkMapping, SourceSide};

/// One output row: column name in mapping order paired with its coerced
/// value, ready for the sink's ClickHouse insert.
pub type Row = Vec<(String, ClickHouseValue)>;

pub struct Mapper;

impl Mapper {
    /// Single-source mapping, used by the ingest-only path. Every column's
    /// `source_side` is ignored; all fields come from `payload`.
    pub fn map_single(payload: &Value, mapping: &SinkMapping) -> Result<Row, MapError> {
        let mut row = Row::with_capacity(mapping.len());
        for column in mapping {
            row.push((column.column_name.clone(), extract_and_coerce(payload, column)?));
        }
        Ok(row)
    }

    /// Joined mapping: each column declares which side's payload it reads
    /// from via `source_side`.
    pub fn map_joined(left: &Value, right: &Value, mapping: &SinkMapping) -> Result<Row, MapError> {
        let mut row = Row::with_capacity(mapping.len());
        for column in mapping {
            let source = match column.source_side {
                Some(SourceSide::Left) => left,
                Some(SourceSide::Right) => right,
                None => return Err(MapError::MissingSourceSide(column.column_name.clone())),
            };
            row.push((column.column_name.clone(), extract_and_coerce(source, column)?));
        }
        Ok(row)
    }
}

fn extract_and_coerce(source: &Value, column: &ColumnMapping) -> Result<ClickHouseValue, MapError> {
    match source.pointer(&column.source_field) {
        Some(value) if !value.is_null() => coerce(value, &column.column_type, &column.source_field),
        _ if column.nullable => Ok(ClickHouseValue::Null),
        _ => Err(MapError::MissingRequiredField(column.source_field.clone())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column_type::ColumnType;
    use serde_json::json;

    fn column(field: &str, name: &str, ty: ColumnType, nullable: bool) -> ColumnMapping {
        ColumnMapping {
            source_side: None,
            source_field: field.to_string(),
            column_name: name.to_string(),
            column_type: ty,
            nullable,
        }
    }

    #[test]
    fn map_single_extracts_and_coerces_every_column() {
        let payload = json!({"id": 7, "name": "ada"});
        let mapping = vec![
            column("/id", "id", ColumnType::Int64, false),
            column("/name", "name", ColumnType::String, false),
        ];
        let row = Mapper::map_single(&payload, &mapping).unwrap();
        assert_eq!(row[0], ("id".to_string(), ClickHouseValue::Int64(7)));
        assert_eq!(row[1], ("name".to_string(), ClickHouseValue::String("ada".to_string())));
    }

    #[test]
    fn missing_field_is_null_when_nullable_else_error() {
        let payload = json!({"id": 7});
        let nullable_mapping = vec![column("/missing", "m", ColumnType::String, true)];
        let row = Mapper::map_single(&payload, &nullable_mapping).unwrap();
        assert_eq!(row[0].1, ClickHouseValue::Null);

        let required_mapping = vec![column("/missing", "m", ColumnType::String, false)];
        let err = Mapper::map_single(&payload, &required_mapping).unwrap_err();
        assert!(matches!(err, MapError::MissingRequiredField(_)));
    }

    #[test]
    fn map_joined_pulls_from_the_declared_side() {
        let left = json!({"x": 1});
        let right = json!({"y": 2});
        let mapping = vec![
            ColumnMapping {
                source_side: Some(SourceSide::Left),
                source_field: "/x".to_string(),
                column_name: "x".to_string(),
                column_type: ColumnType::Int64,
                nullable: false,
            },
            ColumnMapping {
                source_side: Some(SourceSide::Right),
                source_field: "/y".to_string(),
                column_name: "y".to_string(),
                column_type: ColumnType::Int64,
                nullable: false,
            },
        ];
        let row = Mapper::map_joined(&left, &right, &mapping).unwrap();
        assert_eq!(row[0], ("x".to_string(), ClickHouseValue::Int64(1)));
        assert_eq!(row[1], ("y".to_string(), ClickHouseValue::Int64(2)));
    }

    #[test]
    fn map_joined_absent_field_on_declared_side_is_explicit_null() {
        let left = json!({});
        let right = json!({"y": 2});
        let mapping = vec![ColumnMapping {
            source_side: Some(SourceSide::Left),
            source_field: "/x".to_string(),
            column_name: "x".to_string(),
            column_type: ColumnType::Int64,
            nullable: true,
        }];
        let row = Mapper::map_joined(&left, &right, &mapping).unwrap();
        assert_eq!(row[0].1, ClickHouseValue::Null);
    }
}
