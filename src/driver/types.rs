//! Row materialization.
//!
//! Every backend row is turned into a [`Row`] (column name to JSON value, in
//! column order) before the statement call returns. The column's type name
//! picks a [`TypeCategory`]; each backend then decodes the categories it
//! supports and falls back to text.

use crate::models::{DatabaseType, Row};
use serde_json::Value as JsonValue;
use sqlx::error::BoxDynError;
use sqlx::mysql::{MySqlRow, MySqlTypeInfo, MySqlValueRef};
use sqlx::postgres::{PgRow, PgTypeInfo, PgValueFormat, PgValueRef};
use sqlx::sqlite::{SqliteRow, SqliteTypeInfo};
use sqlx::{Column, ColumnIndex, Database, Decode, Row as _, Type, TypeInfo, ValueRef};

/// Logical category for database column types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeCategory {
    Integer,
    Float,
    Decimal,
    Boolean,
    Text,
    Binary,
    Json,
    Timestamp,
    Date,
    Time,
    Unknown,
}

/// Classify a database type name into a logical category.
pub fn categorize_type(type_name: &str, db: DatabaseType) -> TypeCategory {
    let lower = type_name.to_lowercase();

    // Before the float checks: "numeric" overlaps
    if lower.contains("decimal") || lower.contains("numeric") {
        // SQLite's NUMERIC affinity holds plain numbers
        if db == DatabaseType::SQLite && lower == "numeric" {
            return TypeCategory::Float;
        }
        return TypeCategory::Decimal;
    }

    if lower.contains("int") || lower.contains("serial") {
        return TypeCategory::Integer;
    }

    if lower == "bool" || lower == "boolean" {
        return TypeCategory::Boolean;
    }

    if lower.contains("float") || lower.contains("double") || lower == "real" {
        return TypeCategory::Float;
    }

    if lower == "json" || lower == "jsonb" {
        return TypeCategory::Json;
    }

    if lower.contains("blob") || lower.contains("binary") || lower == "bytea" {
        return TypeCategory::Binary;
    }

    // SQLite stores dates as text
    if db != DatabaseType::SQLite {
        if lower.starts_with("timestamp") || lower == "datetime" {
            return TypeCategory::Timestamp;
        }
        if lower == "date" {
            return TypeCategory::Date;
        }
        if lower.starts_with("time") {
            return TypeCategory::Time;
        }
    }

    if lower.contains("char") || lower.contains("text") || lower == "name" {
        return TypeCategory::Text;
    }

    TypeCategory::Unknown
}

/// Exact DECIMAL/NUMERIC value in its decimal string form.
#[derive(Debug)]
pub struct RawDecimal(pub String);

impl Type<sqlx::MySql> for RawDecimal {
    fn type_info() -> MySqlTypeInfo {
        <String as Type<sqlx::MySql>>::type_info()
    }

    fn compatible(ty: &MySqlTypeInfo) -> bool {
        ty.name().eq_ignore_ascii_case("decimal")
    }
}

impl<'r> Decode<'r, sqlx::MySql> for RawDecimal {
    fn decode(value: MySqlValueRef<'r>) -> Result<Self, BoxDynError> {
        // MySQL sends DECIMAL as text in both protocols
        let s = <&str as Decode<sqlx::MySql>>::decode(value)?;
        Ok(RawDecimal(s.to_string()))
    }
}

impl Type<sqlx::Postgres> for RawDecimal {
    fn type_info() -> PgTypeInfo {
        PgTypeInfo::with_name("numeric")
    }

    fn compatible(ty: &PgTypeInfo) -> bool {
        ty.name().eq_ignore_ascii_case("numeric")
    }
}

impl<'r> Decode<'r, sqlx::Postgres> for RawDecimal {
    fn decode(value: PgValueRef<'r>) -> Result<Self, BoxDynError> {
        match value.format() {
            PgValueFormat::Binary => Ok(RawDecimal(pg_numeric_to_string(value.as_bytes()?)?)),
            PgValueFormat::Text => Ok(RawDecimal(value.as_str()?.to_string())),
        }
    }
}

/// Render PostgreSQL's binary NUMERIC: a header of `ndigits`, `weight`,
/// `sign`, `dscale` followed by base-10000 digits, most significant first.
fn pg_numeric_to_string(bytes: &[u8]) -> Result<String, BoxDynError> {
    let word = |at: usize| -> Result<u16, BoxDynError> {
        bytes
            .get(at..at + 2)
            .map(|b| u16::from_be_bytes([b[0], b[1]]))
            .ok_or_else(|| "truncated NUMERIC value".into())
    };

    let ndigits = usize::from(word(0)?);
    let weight = i32::from(word(2)? as i16);
    let sign = word(4)?;
    let dscale = usize::from(word(6)?);

    match sign {
        0xC000 => return Ok("NaN".to_string()),
        0xD000 => return Ok("Infinity".to_string()),
        0xF000 => return Ok("-Infinity".to_string()),
        _ => {}
    }

    let digits = (0..ndigits)
        .map(|i| word(8 + 2 * i))
        .collect::<Result<Vec<_>, _>>()?;
    // Digit at `index` carries the power 10000^(weight - index)
    let digit = |index: i32| -> u16 {
        usize::try_from(index)
            .ok()
            .and_then(|i| digits.get(i).copied())
            .unwrap_or(0)
    };

    let mut out = String::new();
    if sign == 0x4000 {
        out.push('-');
    }
    if weight < 0 {
        out.push('0');
    } else {
        out.push_str(&digit(0).to_string());
        for index in 1..=weight {
            out.push_str(&format!("{:04}", digit(index)));
        }
    }

    if dscale > 0 {
        let mut fraction = String::with_capacity(dscale + 4);
        let mut index = weight + 1;
        while fraction.len() < dscale {
            fraction.push_str(&format!("{:04}", digit(index)));
            index += 1;
        }
        fraction.truncate(dscale);
        out.push('.');
        out.push_str(&fraction);
    }

    Ok(out)
}

/// Encode binary data as a base64 JSON string.
pub fn encode_binary_value(bytes: &[u8]) -> JsonValue {
    use base64::{Engine as _, engine::general_purpose::STANDARD};

    JsonValue::String(STANDARD.encode(bytes))
}

fn float_value(v: f64) -> JsonValue {
    serde_json::Number::from_f64(v)
        .map(JsonValue::Number)
        .unwrap_or_else(|| JsonValue::String(v.to_string()))
}

/// Decode column `idx` as `T`, `None` when the column does not hold a `T`.
fn get<'r, R, T>(row: &'r R, idx: usize) -> Option<T>
where
    R: sqlx::Row,
    usize: ColumnIndex<R>,
    T: Decode<'r, R::Database> + Type<R::Database>,
{
    row.try_get::<T, _>(idx).ok()
}

/// Walk the columns of `row`; NULLs short-circuit, everything else goes
/// through `decode` with the column's declared type.
fn collect_row<R, F>(row: &R, mut decode: F) -> Row
where
    R: sqlx::Row,
    usize: ColumnIndex<R>,
    F: FnMut(usize, &<R::Database as Database>::TypeInfo) -> Option<JsonValue>,
{
    row.columns()
        .iter()
        .enumerate()
        .map(|(idx, col)| {
            let value = match row.try_get_raw(idx) {
                Ok(raw) if raw.is_null() => None,
                Ok(_) => decode(idx, col.type_info()),
                Err(_) => None,
            };
            (col.name().to_string(), value.unwrap_or(JsonValue::Null))
        })
        .collect()
}

/// Trait for converting backend rows into [`Row`] maps.
pub trait RowToJson {
    fn to_json_map(&self) -> Row;
}

impl RowToJson for MySqlRow {
    fn to_json_map(&self) -> Row {
        collect_row(self, |idx, ty| {
            mysql_value(self, idx, categorize_type(ty.name(), DatabaseType::MySQL))
        })
    }
}

impl RowToJson for PgRow {
    fn to_json_map(&self) -> Row {
        collect_row(self, |idx, ty| {
            postgres_value(self, idx, categorize_type(ty.name(), DatabaseType::PostgreSQL))
        })
    }
}

impl RowToJson for SqliteRow {
    fn to_json_map(&self) -> Row {
        collect_row(self, |idx, ty| sqlite_value(self, idx, ty))
    }
}

fn decimal<R>(row: &R, idx: usize) -> Option<JsonValue>
where
    R: sqlx::Row,
    usize: ColumnIndex<R>,
    RawDecimal: for<'r> Decode<'r, R::Database> + Type<R::Database>,
{
    match row.try_get::<RawDecimal, _>(idx) {
        Ok(v) => Some(JsonValue::String(v.0)),
        Err(e) => {
            tracing::warn!(column = idx, error = %e, "Failed to decode DECIMAL");
            None
        }
    }
}

/// Temporal columns as ISO-8601 strings; zoned timestamps in RFC 3339.
fn temporal<R>(row: &R, idx: usize, category: TypeCategory) -> Option<JsonValue>
where
    R: sqlx::Row,
    usize: ColumnIndex<R>,
    chrono::DateTime<chrono::Utc>: for<'r> Decode<'r, R::Database> + Type<R::Database>,
    chrono::NaiveDateTime: for<'r> Decode<'r, R::Database> + Type<R::Database>,
    chrono::NaiveDate: for<'r> Decode<'r, R::Database> + Type<R::Database>,
    chrono::NaiveTime: for<'r> Decode<'r, R::Database> + Type<R::Database>,
{
    let text = match category {
        TypeCategory::Timestamp => get::<_, chrono::DateTime<chrono::Utc>>(row, idx)
            .map(|v| v.to_rfc3339())
            .or_else(|| get::<_, chrono::NaiveDateTime>(row, idx).map(|v| v.to_string())),
        TypeCategory::Date => get::<_, chrono::NaiveDate>(row, idx).map(|v| v.to_string()),
        _ => get::<_, chrono::NaiveTime>(row, idx).map(|v| v.to_string()),
    };
    text.map(JsonValue::String)
}

fn mysql_value(row: &MySqlRow, idx: usize, category: TypeCategory) -> Option<JsonValue> {
    match category {
        // Signed first; unsigned BIGINT only fits u64
        TypeCategory::Integer => get::<_, i64>(row, idx)
            .map(JsonValue::from)
            .or_else(|| get::<_, u64>(row, idx).map(JsonValue::from)),
        TypeCategory::Decimal => decimal(row, idx),
        TypeCategory::Boolean => get::<_, bool>(row, idx).map(JsonValue::Bool),
        TypeCategory::Float => get::<_, f64>(row, idx)
            .or_else(|| get::<_, f32>(row, idx).map(f64::from))
            .map(float_value),
        TypeCategory::Binary => get::<_, Vec<u8>>(row, idx).map(|v| encode_binary_value(&v)),
        TypeCategory::Json => get::<_, JsonValue>(row, idx),
        TypeCategory::Timestamp | TypeCategory::Date | TypeCategory::Time => {
            temporal(row, idx, category)
        }
        _ => get::<_, String>(row, idx).map(JsonValue::String),
    }
}

fn postgres_value(row: &PgRow, idx: usize, category: TypeCategory) -> Option<JsonValue> {
    match category {
        // Integer types only decode at their exact width
        TypeCategory::Integer => get::<_, i64>(row, idx)
            .or_else(|| get::<_, i32>(row, idx).map(i64::from))
            .or_else(|| get::<_, i16>(row, idx).map(i64::from))
            .map(JsonValue::from),
        TypeCategory::Decimal => decimal(row, idx),
        TypeCategory::Boolean => get::<_, bool>(row, idx).map(JsonValue::Bool),
        TypeCategory::Float => get::<_, f64>(row, idx)
            .or_else(|| get::<_, f32>(row, idx).map(f64::from))
            .map(float_value),
        TypeCategory::Binary => get::<_, Vec<u8>>(row, idx).map(|v| encode_binary_value(&v)),
        TypeCategory::Json => get::<_, JsonValue>(row, idx),
        TypeCategory::Timestamp | TypeCategory::Date | TypeCategory::Time => {
            temporal(row, idx, category)
        }
        _ => get::<_, String>(row, idx).map(JsonValue::String),
    }
}

/// SQLite is dynamically typed: expression columns (`COUNT(*)`, `1 + 1`)
/// carry no declared type, so the stored value's type decides.
fn sqlite_value(row: &SqliteRow, idx: usize, declared: &SqliteTypeInfo) -> Option<JsonValue> {
    let category = if declared.is_null() {
        let raw = row.try_get_raw(idx).ok()?;
        categorize_type(raw.type_info().name(), DatabaseType::SQLite)
    } else {
        categorize_type(declared.name(), DatabaseType::SQLite)
    };

    let text = || get::<_, String>(row, idx).map(JsonValue::String);
    match category {
        TypeCategory::Integer => get::<_, i64>(row, idx).map(JsonValue::from).or_else(text),
        TypeCategory::Float | TypeCategory::Decimal => {
            get::<_, f64>(row, idx).map(float_value).or_else(text)
        }
        TypeCategory::Boolean => get::<_, bool>(row, idx).map(JsonValue::Bool),
        TypeCategory::Binary => get::<_, Vec<u8>>(row, idx).map(|v| encode_binary_value(&v)),
        _ => text(),
    }
}
