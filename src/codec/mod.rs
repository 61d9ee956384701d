//! Value codec
//!
//! Converts between the store's native value trees and the portable,
//! JSON-safe trees written into backup payloads. Dates and provider
//! timestamps become tagged wrappers:
//!
//! ```json
//! { "__backupType": "timestamp", "value": "2024-03-01T12:00:00.000Z" }
//! ```
//!
//! Decoding turns both wrapper kinds back into the store's native timestamp
//! type. [`stable_stringify`] gives a canonical text form used to compare
//! trees during restore verification.

mod stable;

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::storage::{FromDateTime, StoreValue, TimestampLike};

pub use stable::{stable_stringify, stable_stringify_opt};

/// Key marking a tagged wrapper object
pub const BACKUP_TYPE_KEY: &str = "__backupType";

/// Key holding the wrapped ISO-8601 string
pub const BACKUP_VALUE_KEY: &str = "value";

const DATE_TAG: &str = "date";
const TIMESTAMP_TAG: &str = "timestamp";

/// Errors raised by the strict decoder
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("invalid {tag} value at {path}: {value}")]
    InvalidDate {
        tag: String,
        path: String,
        value: String,
    },
}

/// Render an instant the way backups store it: UTC, millisecond precision
pub fn format_iso(datetime: &DateTime<Utc>) -> String {
    datetime.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse an ISO-8601 string. Accepts full RFC 3339, offset-less date-times
/// (taken as UTC) and bare dates (midnight UTC).
pub fn parse_iso(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(naive.and_utc());
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

fn wrap(tag: &str, datetime: &DateTime<Utc>) -> Value {
    let mut map = Map::new();
    map.insert(BACKUP_TYPE_KEY.to_string(), Value::String(tag.to_string()));
    map.insert(
        BACKUP_VALUE_KEY.to_string(),
        Value::String(format_iso(datetime)),
    );
    Value::Object(map)
}

/// Map a native value into the portable tree
pub fn serialize_value<T: TimestampLike>(value: &StoreValue<T>) -> Value {
    match value {
        StoreValue::Null => Value::Null,
        StoreValue::Date(dt) => wrap(DATE_TAG, dt),
        StoreValue::Timestamp(ts) => wrap(TIMESTAMP_TAG, &ts.to_datetime()),
        StoreValue::Array(items) => Value::Array(items.iter().map(serialize_value).collect()),
        StoreValue::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), serialize_value(v)))
                .collect(),
        ),
        StoreValue::Bool(b) => Value::Bool(*b),
        StoreValue::Number(n) => Value::Number(n.clone()),
        StoreValue::String(s) => Value::String(s.clone()),
    }
}

/// The wrapper tag of an object, if it is a date or timestamp wrapper
fn wrapper_tag(map: &Map<String, Value>) -> Option<&str> {
    match map.get(BACKUP_TYPE_KEY) {
        Some(Value::String(tag)) if tag == DATE_TAG || tag == TIMESTAMP_TAG => Some(tag.as_str()),
        _ => None,
    }
}

fn decode<T: FromDateTime>(tree: &Value, path: &mut String) -> Result<StoreValue<T>, CodecError> {
    Ok(match tree {
        Value::Null => StoreValue::Null,
        Value::Bool(b) => StoreValue::Bool(*b),
        Value::Number(n) => StoreValue::Number(n.clone()),
        Value::String(s) => StoreValue::String(s.clone()),
        Value::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for (i, item) in items.iter().enumerate() {
                let len = path.len();
                path.push_str(&format!("[{}]", i));
                out.push(decode(item, path)?);
                path.truncate(len);
            }
            StoreValue::Array(out)
        }
        Value::Object(map) => {
            if let Some(tag) = wrapper_tag(map) {
                let raw = map.get(BACKUP_VALUE_KEY);
                let parsed = raw.and_then(Value::as_str).and_then(parse_iso);
                return match parsed {
                    Some(dt) => Ok(StoreValue::Timestamp(T::from_datetime(dt))),
                    None => Err(CodecError::InvalidDate {
                        tag: tag.to_string(),
                        path: if path.is_empty() { "$".to_string() } else { path.clone() },
                        value: raw.map(Value::to_string).unwrap_or_else(|| "<missing>".into()),
                    }),
                };
            }
            let mut out = std::collections::BTreeMap::new();
            for (key, item) in map {
                let len = path.len();
                if !path.is_empty() {
                    path.push('.');
                }
                path.push_str(key);
                out.insert(key.clone(), decode(item, path)?);
                path.truncate(len);
            }
            StoreValue::Object(out)
        }
    })
}

/// Map a portable tree back into native values, failing on a wrapper whose
/// string is not a parsable date
pub fn try_deserialize_value<T: FromDateTime>(tree: &Value) -> Result<StoreValue<T>, CodecError> {
    decode(tree, &mut String::new())
}

/// Map a portable tree back into native values. A wrapper whose string does
/// not parse becomes `Null`.
pub fn deserialize_value<T: FromDateTime>(tree: &Value) -> StoreValue<T> {
    match tree {
        Value::Array(items) => StoreValue::Array(items.iter().map(deserialize_value).collect()),
        Value::Object(map) => {
            if wrapper_tag(map).is_some() {
                return map
                    .get(BACKUP_VALUE_KEY)
                    .and_then(Value::as_str)
                    .and_then(parse_iso)
                    .map_or(StoreValue::Null, |dt| StoreValue::Timestamp(T::from_datetime(dt)));
            }
            StoreValue::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), deserialize_value(v)))
                    .collect(),
            )
        }
        other => StoreValue::from(other.clone()),
    }
}
