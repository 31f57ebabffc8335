use serde_json::{Value, json};
use sqlx::postgres::PgRow;
use sqlx::{Column, Row, TypeInfo};

use crate::RowMap;

/// Decode one result row into a column-name → value mapping.
///
/// Values the driver cannot decode come back as `Null` rather than failing
/// the whole row.
pub(crate) fn row_to_map(row: &PgRow) -> RowMap {
    let mut map = RowMap::new();
    for (i, col) in row.columns().iter().enumerate() {
        map.insert(
            col.name().to_string(),
            decode_column(row, i, col.type_info().name()),
        );
    }
    map
}

fn decode_column(row: &PgRow, i: usize, type_name: &str) -> Value {
    match type_name {
        "UUID" => row
            .try_get::<uuid::Uuid, _>(i)
            .map(|v| json!(v))
            .unwrap_or(Value::Null),

        "TEXT" | "VARCHAR" | "CHAR" | "BPCHAR" | "NAME" => row
            .try_get::<String, _>(i)
            .map(|v| json!(v))
            .unwrap_or(Value::Null),

        "DATE" => row
            .try_get::<chrono::NaiveDate, _>(i)
            .map(|v| json!(v.format("%Y-%m-%d").to_string()))
            .unwrap_or(Value::Null),

        "TIMESTAMP" => row
            .try_get::<chrono::NaiveDateTime, _>(i)
            .map(|dt| json!(dt.format("%Y-%m-%dT%H:%M:%S").to_string()))
            .unwrap_or(Value::Null),

        "TIMESTAMPTZ" => row
            .try_get::<chrono::DateTime<chrono::Utc>, _>(i)
            .map(|dt| json!(dt.to_rfc3339()))
            .unwrap_or(Value::Null),

        "INT2" => row
            .try_get::<i16, _>(i)
            .map(|v| json!(v))
            .unwrap_or(Value::Null),

        "INT4" => row
            .try_get::<i32, _>(i)
            .map(|v| json!(v))
            .unwrap_or(Value::Null),

        "INT8" => row
            .try_get::<i64, _>(i)
            .map(|v| json!(v))
            .unwrap_or(Value::Null),

        "FLOAT4" => row
            .try_get::<f32, _>(i)
            .map(|v| json!(v))
            .unwrap_or(Value::Null),

        "FLOAT8" => row
            .try_get::<f64, _>(i)
            .map(|v| json!(v))
            .unwrap_or(Value::Null),

        "NUMERIC" => row
            .try_get::<rust_decimal::Decimal, _>(i)
            .map(|v| json!(v))
            .unwrap_or(Value::Null),

        "JSON" | "JSONB" => row.try_get::<Value, _>(i).unwrap_or(Value::Null),

        "BOOL" => row
            .try_get::<bool, _>(i)
            .map(|v| json!(v))
            .unwrap_or(Value::Null),

        _ => match row.try_get_raw(i) {
            Ok(raw) => match raw.as_bytes() {
                Ok(bytes) => std::str::from_utf8(bytes)
                    .map(|s| json!(s))
                    .unwrap_or(Value::Null),
                Err(_) => Value::Null,
            },
            Err(_) => Value::Null,
        },
    }
}
