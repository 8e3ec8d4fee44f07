use crate::common::human_readable;
use app_obs::logs::{FieldValue, LogRecord};
use serde_json::{json, Map, Value};

/// Renders a record as a flat JSON object.
///
/// The fixed keys come first, followed by the record fields in the order
/// they were added. A field reusing a fixed key is written with a `field.`
/// prefix so it cannot hide the correlation ids.
pub(crate) fn to_json(record: &LogRecord) -> Map<String, Value> {
    let mut object = Map::with_capacity(6 + record.fields.len());
    object.insert(
        "time".into(),
        human_readable(&record.timestamp).map_or(Value::Null, Value::from),
    );
    object.insert("level".into(), record.level.as_str().into());
    object.insert("msg".into(), Value::String(record.message.to_string()));
    object.insert(
        "trace_id".into(),
        record.trace_id_or_sentinel().into_owned().into(),
    );
    object.insert(
        "span_id".into(),
        record.span_id_or_sentinel().into_owned().into(),
    );
    if let Some(location) = record.source {
        object.insert(
            "source".into(),
            json!({ "file": location.file(), "line": location.line() }),
        );
    }

    for field in &record.fields {
        let key = match field.key.as_str() {
            reserved @ ("time" | "level" | "msg" | "trace_id" | "span_id" | "source") => {
                format!("field.{reserved}")
            }
            key => key.to_owned(),
        };
        object.insert(key, field_value(&field.value));
    }
    object
}

fn field_value(value: &FieldValue) -> Value {
    match value {
        FieldValue::Str(s) => Value::String(s.to_string()),
        FieldValue::I64(i) => Value::from(*i),
        FieldValue::F64(f) => Value::from(*f),
        FieldValue::Bool(b) => Value::from(*b),
        other => Value::from(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use app_obs::logs::{Field, Level};
    use app_obs::trace::{SpanId, TraceId};
    use std::time::SystemTime;

    #[test]
    fn fields_keep_their_order_after_fixed_keys() {
        let record = LogRecord {
            timestamp: SystemTime::UNIX_EPOCH,
            level: Level::Error,
            message: "lookup failed".into(),
            fields: vec![
                Field::new("productID", 42),
                Field::new("cached", false),
                Field::new("error", FieldValue::error(std::fmt::Error)),
                Field::new("level", "shadowed"),
            ],
            trace_id: Some(TraceId::from(0x4bf9_2f35_77b3_4da6_a3ce_929d_0e0e_4736_u128)),
            span_id: Some(SpanId::from(0x00f0_67aa_0ba9_02b7_u64)),
            source: None,
        };

        let json = to_json(&record);
        let keys: Vec<&str> = json.keys().map(String::as_str).collect();
        assert_eq!(
            keys,
            vec![
                "time",
                "level",
                "msg",
                "trace_id",
                "span_id",
                "productID",
                "cached",
                "error",
                "field.level"
            ]
        );
        assert_eq!(json["time"], "1970-01-01 00:00:00.000");
        assert_eq!(json["level"], "ERROR");
        assert_eq!(json["trace_id"], "4bf92f3577b34da6a3ce929d0e0e4736");
        assert_eq!(json["span_id"], "00f067aa0ba902b7");
        assert_eq!(json["productID"], 42);
        assert_eq!(json["error"], std::fmt::Error.to_string());
        assert!(!json.contains_key("source"));
    }

    #[test]
    fn source_follows_correlation_ids() {
        let location = std::panic::Location::caller();
        let record = LogRecord {
            timestamp: SystemTime::UNIX_EPOCH,
            level: Level::Info,
            message: "located".into(),
            fields: vec![Field::new("source", "shadowed")],
            trace_id: None,
            span_id: None,
            source: Some(location),
        };

        let json = to_json(&record);
        let keys: Vec<&str> = json.keys().map(String::as_str).collect();
        assert_eq!(
            keys,
            vec!["time", "level", "msg", "trace_id", "span_id", "source", "field.source"]
        );
        assert_eq!(json["source"]["file"], file!());
        assert_eq!(json["source"]["line"], location.line());
    }
}
