use crate::common::{as_human_readable, as_unix_nano, KeyValue, Resource};
use serde::Serialize;
use std::{borrow::Cow, time::SystemTime};

/// Transformed trace data that can be serialized
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpanData {
    resource_spans: Vec<ResourceSpans>,
}

impl From<Vec<app_obs::trace::SpanData>> for SpanData {
    fn from(spans: Vec<app_obs::trace::SpanData>) -> Self {
        let mut resource_spans: Vec<ResourceSpans> = Vec::with_capacity(1);
        for span in spans {
            let resource = Resource::from(span.resource.as_ref());
            match resource_spans.iter_mut().find(|rs| rs.resource == resource) {
                Some(rs) => rs.spans.push(span.into()),
                None => resource_spans.push(ResourceSpans {
                    resource,
                    spans: vec![span.into()],
                }),
            }
        }

        SpanData { resource_spans }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ResourceSpans {
    resource: Resource,
    spans: Vec<Span>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Span {
    trace_id: String,
    span_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    trace_state: Option<String>,
    parent_span_id: String,
    name: Cow<'static, str>,
    #[serde(serialize_with = "as_unix_nano")]
    start_time_unix_nano: SystemTime,
    #[serde(serialize_with = "as_human_readable")]
    start_time: SystemTime,
    #[serde(serialize_with = "as_unix_nano")]
    end_time_unix_nano: SystemTime,
    #[serde(serialize_with = "as_human_readable")]
    end_time: SystemTime,
    attributes: Vec<KeyValue>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    events: Vec<Event>,
    status: Status,
}

impl From<app_obs::trace::SpanData> for Span {
    fn from(value: app_obs::trace::SpanData) -> Self {
        Span {
            trace_id: value.span_context.trace_id().to_string(),
            span_id: value.span_context.span_id().to_string(),
            trace_state: Some(value.span_context.trace_state().header()).filter(|s| !s.is_empty()),
            parent_span_id: Some(value.parent_span_id)
                .filter(|id| *id != app_obs::trace::SpanId::INVALID)
                .map(|id| id.to_string())
                .unwrap_or_default(),
            name: value.name,
            start_time_unix_nano: value.start_time,
            start_time: value.start_time,
            end_time_unix_nano: value.end_time,
            end_time: value.end_time,
            attributes: value.attributes.into_iter().map(Into::into).collect(),
            events: value.events.into_iter().map(Into::into).collect(),
            status: value.status.into(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Event {
    name: Cow<'static, str>,
    #[serde(serialize_with = "as_unix_nano")]
    time_unix_nano: SystemTime,
    attributes: Vec<KeyValue>,
}

impl From<app_obs::trace::Event> for Event {
    fn from(value: app_obs::trace::Event) -> Self {
        Event {
            name: value.name,
            time_unix_nano: value.timestamp,
            attributes: value.attributes.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Status {
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<Cow<'static, str>>,
    #[serde(skip_serializing_if = "is_zero")]
    code: u32,
}

fn is_zero(v: &u32) -> bool {
    *v == 0
}

impl From<app_obs::trace::Status> for Status {
    fn from(value: app_obs::trace::Status) -> Self {
        match value {
            app_obs::trace::Status::Unset => Status {
                message: None,
                code: 0,
            },
            app_obs::trace::Status::Error { description } => Status {
                message: Some(description),
                code: 1,
            },
            app_obs::trace::Status::Ok => Status {
                message: None,
                code: 2,
            },
        }
    }
}
