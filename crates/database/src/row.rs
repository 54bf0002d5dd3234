use crate::error::DbError;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use core_types::Value;
use rust_decimal::Decimal;
use sqlx::mysql::MySqlRow;
use sqlx::{Column, Row, TypeInfo};

/// Decodes every column of a MySQL row into a `Value`, keyed by the declared column type.
pub fn decode_row(row: &MySqlRow) -> Result<Vec<Value>, DbError> {
    (0..row.columns().len())
        .map(|idx| decode_cell(row, idx))
        .collect()
}

fn decode_cell(row: &MySqlRow, idx: usize) -> Result<Value, DbError> {
    let type_name = row.columns()[idx].type_info().name().to_ascii_uppercase();
    let base = type_name.split_whitespace().next().unwrap_or_default();
    let unsigned = type_name.ends_with("UNSIGNED");

    let value = match base {
        "NULL" => Value::Null,
        "BOOLEAN" => row.try_get::<Option<bool>, _>(idx)?.map_or(Value::Null, Value::Bool),
        "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" | "YEAR" | "BIT" if unsigned => {
            match row.try_get_unchecked::<Option<u64>, _>(idx)? {
                None => Value::Null,
                Some(v) => i64::try_from(v).map_or(Value::Float(v as f64), Value::Int),
            }
        }
        "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" | "YEAR" | "BIT" => row
            .try_get_unchecked::<Option<i64>, _>(idx)?
            .map_or(Value::Null, Value::Int),
        "FLOAT" | "DOUBLE" => row
            .try_get_unchecked::<Option<f64>, _>(idx)?
            .map_or(Value::Null, Value::Float),
        "DECIMAL" => row
            .try_get::<Option<Decimal>, _>(idx)?
            .map_or(Value::Null, Value::Decimal),
        "DATE" => row
            .try_get::<Option<NaiveDate>, _>(idx)?
            .map_or(Value::Null, Value::Date),
        "DATETIME" | "TIMESTAMP" => row
            .try_get::<Option<NaiveDateTime>, _>(idx)?
            .map_or(Value::Null, Value::DateTime),
        "TIME" => row
            .try_get::<Option<NaiveTime>, _>(idx)?
            .map_or(Value::Null, |t| Value::Text(t.to_string())),
        "BINARY" | "VARBINARY" | "BLOB" | "TINYBLOB" | "MEDIUMBLOB" | "LONGBLOB" | "GEOMETRY" => {
            row.try_get_unchecked::<Option<Vec<u8>>, _>(idx)?
                .map_or(Value::Null, Value::Bytes)
        }
        // CHAR, VARCHAR, TEXT, ENUM, SET, JSON
        _ => row
            .try_get_unchecked::<Option<String>, _>(idx)?
            .map_or(Value::Null, Value::Text),
    };

    Ok(value)
}
