use std::borrow::Cow;
use std::io::{self, Write};
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{LocalResult, TimeZone, Utc};
use serde::{Serialize, Serializer};

/// Serializable form of a set of resource attributes.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Resource {
    attributes: Vec<KeyValue>,
}

impl From<&app_obs::Resource> for Resource {
    fn from(value: &app_obs::Resource) -> Self {
        Resource {
            attributes: value
                .iter()
                .map(|(key, value)| KeyValue {
                    key: key.as_str().to_owned().into(),
                    value: value.clone().into(),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub(crate) enum Value {
    #[serde(rename = "boolValue")]
    Bool(bool),
    #[serde(rename = "intValue")]
    Int(i64),
    #[serde(rename = "doubleValue")]
    Double(f64),
    #[serde(rename = "stringValue")]
    String(String),
}

impl From<app_obs::Value> for Value {
    fn from(value: app_obs::Value) -> Self {
        match value {
            app_obs::Value::Bool(b) => Value::Bool(b),
            app_obs::Value::I64(i) => Value::Int(i),
            app_obs::Value::F64(f) => Value::Double(f),
            app_obs::Value::String(s) => Value::String(s.into_owned()),
            other => Value::String(other.as_str().into_owned()),
        }
    }
}

#[derive(Debug, Serialize, PartialEq, Clone)]
#[serde(rename_all = "camelCase")]
pub(crate) struct KeyValue {
    key: Cow<'static, str>,
    value: Value,
}

impl From<app_obs::KeyValue> for KeyValue {
    fn from(value: app_obs::KeyValue) -> Self {
        KeyValue {
            key: value.key.as_str().to_owned().into(),
            value: value.value.into(),
        }
    }
}

pub(crate) fn as_human_readable<S>(time: &SystemTime, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&human_readable(time).map_err(serde::ser::Error::custom)?)
}

pub(crate) fn human_readable(time: &SystemTime) -> Result<String, &'static str> {
    let duration_since_epoch = time.duration_since(UNIX_EPOCH).unwrap_or_default();

    match Utc.timestamp_opt(
        duration_since_epoch.as_secs() as i64,
        duration_since_epoch.subsec_nanos(),
    ) {
        LocalResult::Single(datetime) => {
            Ok(datetime.format("%Y-%m-%d %H:%M:%S.%3f").to_string())
        }
        _ => Err("Invalid Timestamp."),
    }
}

pub(crate) fn as_unix_nano<S>(time: &SystemTime, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    let nanos = time
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();

    serializer.serialize_u128(nanos)
}

/// Where encoded output goes.
pub(crate) type SharedWriter = Arc<Mutex<Box<dyn Write + Send + Sync>>>;

pub(crate) fn stdout_writer() -> SharedWriter {
    Arc::new(Mutex::new(Box::new(io::stdout())))
}
