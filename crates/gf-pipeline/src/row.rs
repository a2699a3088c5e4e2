//! Conversions between a mapped [`gf_schema::Row`] and the flat JSON object
//! used on the wire between pipeline hops, plus the dedup-key string
//! representation used as both the KV key and the bus idempotency key.

use gf_schema::{ClickHouseValue, Row};
use serde_json::{Map, Value};

pub fn row_to_json_value(row: &Row) -> Value {
    let mut map = Map::with_capacity(row.len());
    for (name, value) in row {
        map.insert(name.clone(), clickhouse_value_to_json(value));
    }
    Value::Object(map)
}

fn clickhouse_value_to_json(value: &ClickHouseValue) -> Value {
    match value {
        ClickHouseValue::Int8(n) => Value::from(*n),
        ClickHouseValue::Int16(n) => Value::from(*n),
        ClickHouseValue::Int32(n) => Value::from(*n),
        ClickHouseValue::Int64(n) => Value::from(*n),
        ClickHouseValue::Float32(n) => Value::from(*n),
        ClickHouseValue::Float64(n) => Value::from(*n),
        ClickHouseValue::String(s) => Value::from(s.clone()),
        ClickHouseValue::Bool(b) => Value::from(*b),
        ClickHouseValue::Uuid(u) => Value::from(u.to_string()),
        ClickHouseValue::DateTime(secs) => Value::from(*secs),
        ClickHouseValue::DateTime64(millis) => Value::from(*millis),
        ClickHouseValue::Enum(_, name) => Value::from(name.clone()),
        ClickHouseValue::Null => Value::Null,
    }
}

/// Stable string form of a coerced value, used as the dedup KV key and as
/// the bus publish idempotency key. Must be a pure function of the value:
/// equal inputs, equal keys.
pub fn clickhouse_value_to_key_string(value: &ClickHouseValue) -> String {
    match value {
        ClickHouseValue::Int8(n) => n.to_string(),
        ClickHouseValue::Int16(n) => n.to_string(),
        ClickHouseValue::Int32(n) => n.to_string(),
        ClickHouseValue::Int64(n) => n.to_string(),
        ClickHouseValue::Float32(n) => n.to_string(),
        ClickHouseValue::Float64(n) => n.to_string(),
        ClickHouseValue::String(s) => s.clone(),
        ClickHouseValue::Bool(b) => b.to_string(),
        ClickHouseValue::Uuid(u) => u.to_string(),
        ClickHouseValue::DateTime(secs) => secs.to_string(),
        ClickHouseValue::DateTime64(millis) => millis.to_string(),
        ClickHouseValue::Enum(idx, _) => idx.to_string(),
        ClickHouseValue::Null => "null".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_round_trips_through_json() {
        let row: Row = vec![
            ("id".to_string(), ClickHouseValue::Int64(7)),
            ("name".to_string(), ClickHouseValue::String("ada".to_string())),
            ("deleted".to_string(), ClickHouseValue::Null),
        ];
        let value = row_to_json_value(&row);
        assert_eq!(value["id"], 7);
        assert_eq!(value["name"], "ada");
        assert!(value["deleted"].is_null());
    }

    #[test]
    fn key_string_is_stable_for_equal_values() {
        let a = clickhouse_value_to_key_string(&ClickHouseValue::Int64(7));
        let b = clickhouse_value_to_key_string(&ClickHouseValue::Int64(7));
        assert_eq!(a, b);
    }
}
