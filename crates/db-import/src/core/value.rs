//! Row values and their conversion from raw source encodings.
//!
//! Drivers hand the copy loop a [`RawRecord`] holding each field exactly as
//! the source produced it (text protocol bytes, or a TSV cell). Conversion
//! into typed [`Value`]s happens once the destination column types are known.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

use super::schema::ColumnType;

/// A converted field value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Int64(i64),
    Float64(f64),
    Text(String),
    Bytes(Vec<u8>),
    Bool(bool),
    DateTime(NaiveDateTime),
    Date(NaiveDate),
    Time(NaiveTime),
}

impl Value {
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Convert a raw field into a value of the given destination type.
    ///
    /// `None` is SQL NULL. A field that cannot be parsed as `column_type`
    /// becomes `Null` rather than failing the row. Blob fields are taken
    /// byte for byte; source-specific blob encodings are undone by the driver.
    pub fn from_raw(raw: Option<&[u8]>, column_type: ColumnType) -> Value {
        let Some(bytes) = raw else {
            return Value::Null;
        };

        if column_type == ColumnType::Blob {
            return Value::Bytes(bytes.to_vec());
        }

        let text = String::from_utf8_lossy(bytes);
        let trimmed = text.trim();

        match column_type {
            ColumnType::Byte
            | ColumnType::ShortInteger
            | ColumnType::Integer
            | ColumnType::BigInteger => parse_integer(trimmed, column_type)
                .map(Value::Int64)
                .unwrap_or(Value::Null),
            ColumnType::Float | ColumnType::Double => trimmed
                .parse::<f64>()
                .map(Value::Float64)
                .unwrap_or(Value::Null),
            ColumnType::Boolean => parse_bool(trimmed).map(Value::Bool).unwrap_or(Value::Null),
            ColumnType::Date => parse_date(trimmed).map(Value::Date).unwrap_or(Value::Null),
            ColumnType::DateTime => parse_datetime(trimmed)
                .map(Value::DateTime)
                .unwrap_or(Value::Null),
            ColumnType::Time => parse_time(trimmed).map(Value::Time).unwrap_or(Value::Null),
            ColumnType::Text | ColumnType::LongText | ColumnType::Unknown => {
                Value::Text(text.into_owned())
            }
            ColumnType::Blob => Value::Null,
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int64(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float64(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

/// One source row in its raw encoding. `None` fields are SQL NULL.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawRecord {
    fields: Vec<Option<Vec<u8>>>,
}

impl RawRecord {
    pub fn new(fields: Vec<Option<Vec<u8>>>) -> Self {
        Self { fields }
    }

    /// Build a record from text fields.
    pub fn from_text<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = Option<S>>,
        S: Into<String>,
    {
        Self {
            fields: fields
                .into_iter()
                .map(|f| f.map(|s| s.into().into_bytes()))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Replace field `index`; out-of-range indices are ignored.
    pub fn set(&mut self, index: usize, field: Option<Vec<u8>>) {
        if let Some(slot) = self.fields.get_mut(index) {
            *slot = field;
        }
    }

    /// Raw bytes of field `index`; `None` for NULL or out of range.
    pub fn get(&self, index: usize) -> Option<&[u8]> {
        self.fields.get(index).and_then(|f| f.as_deref())
    }

    /// Field `index` as text, if present and valid UTF-8.
    pub fn text(&self, index: usize) -> Option<&str> {
        self.get(index).and_then(|b| std::str::from_utf8(b).ok())
    }

    /// Sum of field byte lengths.
    pub fn byte_len(&self) -> usize {
        self.fields.iter().flatten().map(Vec::len).sum()
    }

    /// Convert the first `types.len()` fields into values.
    ///
    /// Fields missing from the record are converted as NULL.
    pub fn to_values(&self, types: &[ColumnType]) -> Vec<Value> {
        types
            .iter()
            .enumerate()
            .map(|(i, ty)| Value::from_raw(self.get(i), *ty))
            .collect()
    }
}

fn parse_integer(s: &str, column_type: ColumnType) -> Option<i64> {
    let v = s.parse::<i64>().ok()?;
    let fits = match column_type {
        ColumnType::Byte => i8::try_from(v).is_ok() || u8::try_from(v).is_ok(),
        ColumnType::ShortInteger => i16::try_from(v).is_ok(),
        ColumnType::Integer => i32::try_from(v).is_ok(),
        _ => true,
    };
    fits.then_some(v)
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.to_ascii_lowercase().as_str() {
        "t" | "true" | "1" | "y" | "yes" | "on" => Some(true),
        "f" | "false" | "0" | "n" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()
}

fn parse_time(s: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(s, "%H:%M:%S%.f")
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M"))
        .ok()
}

fn parse_datetime(s: &str) -> Option<NaiveDateTime> {
    const FORMATS: [&str; 3] = ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M"];
    // PostgreSQL appends an offset for timestamptz; keep the wall-clock part.
    let base = strip_offset(s);
    FORMATS
        .iter()
        .find_map(|f| NaiveDateTime::parse_from_str(base, f).ok())
        .or_else(|| parse_date(base).and_then(|d| d.and_hms_opt(0, 0, 0)))
}

fn strip_offset(s: &str) -> &str {
    // Offsets look like "+02", "-05:30" or "Z" after the time part.
    if let Some(stripped) = s.strip_suffix('Z') {
        return stripped;
    }
    if let Some(pos) = s.rfind(['+', '-']) {
        if pos > 10 && s[pos + 1..].chars().all(|c| c.is_ascii_digit() || c == ':') {
            return &s[..pos];
        }
    }
    s
}
