use chrono::DateTime as ChronoDateTime;
use serde_json::Value;

use crate::column_type::{ClickHouseValue, ColumnType};
use crate::error::MapError;

/// Coerces one already-extracted JSON value into its declared ClickHouse
/// representation. `field` is only used for error messages.
pub fn coerce(value: &Value, column_type: &ColumnType, field: &str) -> Result<ClickHouseValue, MapError> {
    if value.is_null() {
        return Ok(ClickHouseValue::Null);
    }

    match column_type {
        ColumnType::Int8 => coerce_int(value, field, "Int8")
            .and_then(|n| narrow::<i8>(n, field, "Int8"))
            .map(ClickHouseValue::Int8),
        ColumnType::Int16 => coerce_int(value, field, "Int16")
            .and_then(|n| narrow::<i16>(n, field, "Int16"))
            .map(ClickHouseValue::Int16),
        ColumnType::Int32 => coerce_int(value, field, "Int32")
            .and_then(|n| narrow::<i32>(n, field, "Int32"))
            .map(ClickHouseValue::Int32),
        ColumnType::Int64 => coerce_int(value, field, "Int64").map(ClickHouseValue::Int64),
        ColumnType::Float32 => coerce_float(value, field, "Float32").map(|n| ClickHouseValue::Float32(n as f32)),
        ColumnType::Float64 => coerce_float(value, field, "Float64").map(ClickHouseValue::Float64),
        ColumnType::String => coerce_string(value, field).map(ClickHouseValue::String),
        ColumnType::FixedString(width) => {
            let s = coerce_string(value, field)?;
            if s.len() > *width {
                return Err(MapError::Coercion {
                    field: field.to_string(),
                    target: "FixedString",
                    reason: format!("value is {} bytes, column width is {width}", s.len()),
                });
            }
            Ok(ClickHouseValue::String(s))
        }
        ColumnType::Bool => match value {
            Value::Bool(b) => Ok(ClickHouseValue::Bool(*b)),
            other => Err(type_mismatch(field, "Bool", other)),
        },
        ColumnType::Uuid => {
            let s = coerce_string(value, field)?;
            uuid::Uuid::parse_str(&s)
                .map(ClickHouseValue::Uuid)
                .map_err(|e| MapError::Coercion {
                    field: field.to_string(),
                    target: "UUID",
                    reason: e.to_string(),
                })
        }
        ColumnType::DateTime => coerce_epoch(value, field, "DateTime")
            .map(|millis| ClickHouseValue::DateTime(millis / 1000)),
        ColumnType::DateTime64 => {
            coerce_epoch(value, field, "DateTime64").map(ClickHouseValue::DateTime64)
        }
        ColumnType::Enum8(variants) | ColumnType::Enum16(variants) => {
            let target = if matches!(column_type, ColumnType::Enum8(_)) {
                "Enum8"
            } else {
                "Enum16"
            };
            match value {
                Value::String(name) => variants
                    .resolve(name)
                    .map(|idx| ClickHouseValue::Enum(idx, name.clone()))
                    .ok_or_else(|| MapError::Coercion {
                        field: field.to_string(),
                        target,
                        reason: format!("no variant named {name:?}"),
                    }),
                Value::Number(n) => {
                    let idx = n
                        .as_i64()
                        .ok_or_else(|| MapError::Coercion {
                            field: field.to_string(),
                            target,
                            reason: "expected an integer enum index".to_string(),
                        })? as i16;
                    let name = variants.resolve_index(idx).ok_or_else(|| MapError::Coercion {
                        field: field.to_string(),
                        target,
                        reason: format!("no variant with index {idx}"),
                    })?;
                    Ok(ClickHouseValue::Enum(idx, name.to_string()))
                }
                other => Err(type_mismatch(field, target, other)),
            }
        }
    }
}

fn type_mismatch(field: &str, target: &'static str, got: &Value) -> MapError {
    MapError::Coercion {
        field: field.to_string(),
        target,
        reason: format!("value is not a {target}: {got}"),
    }
}

fn coerce_int(value: &Value, field: &str, target: &'static str) -> Result<i64, MapError> {
    value.as_i64().ok_or_else(|| type_mismatch(field, target, value))
}

/// Range-checks a parsed `i64` against a narrower integer width. `as` casts
/// wrap silently (JSON `300` would become `Int8` `44`); this rejects values
/// that don't fit instead.
fn narrow<T>(n: i64, field: &str, target: &'static str) -> Result<T, MapError>
where
    T: TryFrom<i64>,
{
    T::try_from(n).map_err(|_| MapError::Coercion {
        field: field.to_string(),
        target,
        reason: format!("{n} does not fit in {target}"),
    })
}

fn coerce_float(value: &Value, field: &str, target: &'static str) -> Result<f64, MapError> {
    value.as_f64().ok_or_else(|| type_mismatch(field, target, value))
}

fn coerce_string(value: &Value, field: &str) -> Result<String, MapError> {
    match value {
        Value::String(s) => Ok(s.clone()),
        other => Err(type_mismatch(field, "String", other)),
    }
}

/// Accepts RFC3339 strings or epoch milliseconds, returns epoch milliseconds.
fn coerce_epoch(value: &Value, field: &str, target: &'static str) -> Result<i64, MapError> {
    match value {
        Value::String(s) => ChronoDateTime::parse_from_rfc3339(s)
            .map(|dt| dt.timestamp_millis())
            .map_err(|e| MapError::Coercion {
                field: field.to_string(),
                target,
                reason: e.to_string(),
            }),
        Value::Number(n) => n.as_i64().ok_or_else(|| MapError::Coercion {
            field: field.to_string(),
            target,
            reason: "expected epoch milliseconds as an integer".to_string(),
        }),
        other => Err(type_mismatch(field, target, other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn coerces_int_within_range() {
        let v = serde_json::json!(42);
        assert_eq!(
            coerce(&v, &ColumnType::Int32, "/x").unwrap(),
            ClickHouseValue::Int32(42)
        );
    }

    #[test]
    fn null_value_coerces_to_null_regardless_of_type() {
        let v = Value::Null;
        assert_eq!(coerce(&v, &ColumnType::Int64, "/x").unwrap(), ClickHouseValue::Null);
    }

    #[test]
    fn rfc3339_datetime_coerces_to_epoch_seconds() {
        let v = serde_json::json!("2024-01-01T00:00:00Z");
        assert_eq!(
            coerce(&v, &ColumnType::DateTime, "/ts").unwrap(),
            ClickHouseValue::DateTime(1704067200)
        );
    }

    #[test]
    fn epoch_millis_datetime64_passes_through() {
        let v = serde_json::json!(1704067200123i64);
        assert_eq!(
            coerce(&v, &ColumnType::DateTime64, "/ts").unwrap(),
            ClickHouseValue::DateTime64(1704067200123)
        );
    }

    #[test]
    fn enum_matches_by_name_then_by_index() {
        let mut variants = HashMap::new();
        variants.insert("active".to_string(), 1i16);
        variants.insert("inactive".to_string(), 0i16);
        let column_type = ColumnType::Enum8(crate::column_type::EnumVariants(variants));

        let by_name = serde_json::json!("active");
        assert_eq!(
            coerce(&by_name, &column_type, "/status").unwrap(),
            ClickHouseValue::Enum(1, "active".to_string())
        );

        let by_index = serde_json::json!(0);
        assert_eq!(
            coerce(&by_index, &column_type, "/status").unwrap(),
            ClickHouseValue::Enum(0, "inactive".to_string())
        );
    }

    #[test]
    fn fixed_string_rejects_overlong_values() {
        let v = serde_json::json!("toolong");
        let err = coerce(&v, &ColumnType::FixedString(3), "/code").unwrap_err();
        assert!(matches!(err, MapError::Coercion { .. }));
    }

    #[test]
    fn bool_rejects_non_boolean_json() {
        let v = serde_json::json!("true");
        let err = coerce(&v, &ColumnType::Bool, "/flag").unwrap_err();
        assert!(matches!(err, MapError::Coercion { .. }));
    }

    #[test]
    fn out_of_range_int_is_a_coercion_error_not_a_silent_wrap() {
        let v = serde_json::json!(300);
        let err = coerce(&v, &ColumnType::Int8, "/x").unwrap_err();
        assert!(matches!(err, MapError::Coercion { .. }));

        let v = serde_json::json!(70_000);
        let err = coerce(&v, &ColumnType::Int16, "/x").unwrap_err();
        assert!(matches!(err, MapError::Coercion { .. }));
    }

    #[test]
    fn int_within_narrower_range_still_coerces() {
        let v = serde_json::json!(-100);
        assert_eq!(coerce(&v, &ColumnType::Int8, "/x").unwrap(), ClickHouseValue::Int8(-100));
    }
}
