//! Native value model of the document store
//!
//! Documents live in the store as trees of [`StoreValue`]. Dates and
//! provider timestamps are first-class members of the tree; the codec turns
//! them into tagged wrappers when a backup is taken.

use std::collections::BTreeMap;

use chrono::{DateTime, TimeZone, Utc};
use serde_json::{Number, Value};

/// Capability of a store's native timestamp type
///
/// Anything that can be viewed as an instant with integer seconds and
/// nanoseconds is backed up as a `timestamp` wrapper.
pub trait TimestampLike {
    /// Convert to a UTC instant
    fn to_datetime(&self) -> DateTime<Utc>;

    /// Whole seconds since the Unix epoch
    fn seconds(&self) -> i64;

    /// Nanoseconds within the second
    fn nanoseconds(&self) -> u32;
}

/// Construction of a store's native timestamp from a UTC instant
pub trait FromDateTime: Sized {
    fn from_datetime(datetime: DateTime<Utc>) -> Self;
}

/// Timestamp type used by the bundled stores
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp {
    seconds: i64,
    nanoseconds: u32,
}

impl Timestamp {
    /// Create a timestamp, returning `None` if `nanoseconds` is out of range
    /// or the instant is not representable
    pub fn new(seconds: i64, nanoseconds: u32) -> Option<Self> {
        if nanoseconds >= 1_000_000_000 {
            return None;
        }
        Utc.timestamp_opt(seconds, nanoseconds).single()?;
        Some(Self {
            seconds,
            nanoseconds,
        })
    }

    /// The current instant
    pub fn now() -> Self {
        Self::from_datetime(Utc::now())
    }
}

impl TimestampLike for Timestamp {
    fn to_datetime(&self) -> DateTime<Utc> {
        // Range is checked in `new` and `from_datetime`
        Utc.timestamp_opt(self.seconds, self.nanoseconds)
            .single()
            .unwrap_or_default()
    }

    fn seconds(&self) -> i64 {
        self.seconds
    }

    fn nanoseconds(&self) -> u32 {
        self.nanoseconds
    }
}

impl FromDateTime for Timestamp {
    fn from_datetime(datetime: DateTime<Utc>) -> Self {
        Self {
            seconds: datetime.timestamp(),
            nanoseconds: datetime.timestamp_subsec_nanos(),
        }
    }
}

/// A value as held by the document store
#[derive(Debug, Clone, PartialEq)]
pub enum StoreValue<T = Timestamp> {
    Null,
    Bool(bool),
    Number(Number),
    String(String),
    /// A plain date value
    Date(DateTime<Utc>),
    /// The provider's own timestamp type
    Timestamp(T),
    Array(Vec<StoreValue<T>>),
    Object(BTreeMap<String, StoreValue<T>>),
}

impl<T> StoreValue<T> {
    /// Build an object from key/value pairs
    pub fn object<K, I>(entries: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, StoreValue<T>)>,
    {
        Self::Object(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Look up a field of an object value
    pub fn get(&self, key: &str) -> Option<&StoreValue<T>> {
        match self {
            Self::Object(map) => map.get(key),
            _ => None,
        }
    }
}

impl<T> Default for StoreValue<T> {
    fn default() -> Self {
        Self::Null
    }
}

impl<T> From<bool> for StoreValue<T> {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl<T> From<i64> for StoreValue<T> {
    fn from(value: i64) -> Self {
        Self::Number(value.into())
    }
}

impl<T> From<f64> for StoreValue<T> {
    fn from(value: f64) -> Self {
        Number::from_f64(value).map_or(Self::Null, Self::Number)
    }
}

impl<T> From<&str> for StoreValue<T> {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl<T> From<String> for StoreValue<T> {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl<T> From<DateTime<Utc>> for StoreValue<T> {
    fn from(value: DateTime<Utc>) -> Self {
        Self::Date(value)
    }
}

impl<T> From<Vec<StoreValue<T>>> for StoreValue<T> {
    fn from(value: Vec<StoreValue<T>>) -> Self {
        Self::Array(value)
    }
}

/// Plain structural conversion. Tagged wrappers are NOT interpreted here;
/// use [`crate::codec::deserialize_value`] for that.
impl<T> From<Value> for StoreValue<T> {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Bool(b),
            Value::Number(n) => Self::Number(n),
            Value::String(s) => Self::String(s),
            Value::Array(items) => Self::Array(items.into_iter().map(Self::from).collect()),
            Value::Object(map) => {
                Self::Object(map.into_iter().map(|(k, v)| (k, Self::from(v))).collect())
            }
        }
    }
}

/// A document as listed from a collection
#[derive(Debug, Clone, PartialEq)]
pub struct StoredDocument<T = Timestamp> {
    pub id: String,
    pub data: StoreValue<T>,
}

impl<T> StoredDocument<T> {
    pub fn new(id: impl Into<String>, data: impl Into<StoreValue<T>>) -> Self {
        Self {
            id: id.into(),
            data: data.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_timestamp_rejects_out_of_range_nanos() {
        assert!(Timestamp::new(0, 999_999_999).is_some());
        assert!(Timestamp::new(0, 1_000_000_000).is_none());
    }

    #[test]
    fn test_timestamp_datetime_conversion() {
        let dt = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap();
        let ts = Timestamp::from_datetime(dt);
        assert_eq!(ts.seconds(), dt.timestamp());
        assert_eq!(ts.nanoseconds(), 0);
        assert_eq!(ts.to_datetime(), dt);
    }

    #[test]
    fn test_from_json_is_structural() {
        let value: StoreValue = json!({
            "name": "Ana",
            "tags": ["a", 1, null],
            "__backupType": "date"
        })
        .into();

        assert_eq!(value.get("name"), Some(&StoreValue::from("Ana")));
        assert!(matches!(value.get("tags"), Some(StoreValue::Array(items)) if items.len() == 3));
        // wrappers stay plain strings without the codec
        assert_eq!(value.get("__backupType"), Some(&StoreValue::from("date")));
    }

    #[test]
    fn test_non_finite_float_becomes_null() {
        let value: StoreValue = f64::NAN.into();
        assert!(value.is_null());
    }
}
