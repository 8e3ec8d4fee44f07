//! # Trace context propagation
//!
//! Outgoing requests carry the caller's span context in headers; incoming
//! requests are handled as children of it. A [`TextMapPropagator`] defines
//! the header format and reads and writes it through the [`Injector`] and
//! [`Extractor`] carrier traits, implemented here for `HashMap`s and for
//! `http::HeaderMap` (through [`HeaderInjector`] and [`HeaderExtractor`]).
//!
//! Two formats are available:
//!
//! * [`TraceContextPropagator`]: W3C `traceparent` / `tracestate`;
//! * [`DatadogPropagator`]: `x-datadog-*` headers with decimal ids.
use crate::Context;
use std::collections::HashMap;
use std::fmt::Debug;

mod datadog;
mod trace_context;

pub use datadog::DatadogPropagator;
pub use trace_context::TraceContextPropagator;

/// Injector provides an interface for adding fields to an underlying carrier
/// like a `HashMap` or a header map.
pub trait Injector {
    /// Add a key and value to the underlying data.
    fn set(&mut self, key: &str, value: String);
}

/// Extractor provides an interface for reading fields from an underlying
/// carrier like a `HashMap` or a header map.
pub trait Extractor {
    /// Get a value for a key from the underlying data.
    fn get(&self, key: &str) -> Option<&str>;

    /// Collect all the keys from the underlying data.
    fn keys(&self) -> Vec<&str>;
}

impl<S: std::hash::BuildHasher> Injector for HashMap<String, String, S> {
    /// Set a key and value in the HashMap. Keys are stored lower case.
    fn set(&mut self, key: &str, value: String) {
        self.insert(key.to_lowercase(), value);
    }
}

impl<S: std::hash::BuildHasher> Extractor for HashMap<String, String, S> {
    /// Get a value for a key from the HashMap, ignoring case.
    fn get(&self, key: &str) -> Option<&str> {
        self.get(&key.to_lowercase()).map(String::as_str)
    }

    /// Collect all the keys from the HashMap.
    fn keys(&self) -> Vec<&str> {
        self.keys().map(String::as_str).collect()
    }
}

/// Helper for injecting headers into HTTP requests.
#[derive(Debug)]
pub struct HeaderInjector<'a>(pub &'a mut http::HeaderMap);

impl Injector for HeaderInjector<'_> {
    /// Set a key and value in the HeaderMap. Does nothing if the key or value
    /// are not valid header inputs.
    fn set(&mut self, key: &str, value: String) {
        if let Ok(name) = http::header::HeaderName::from_bytes(key.as_bytes()) {
            if let Ok(val) = http::header::HeaderValue::from_str(&value) {
                self.0.insert(name, val);
            }
        }
    }
}

/// Helper for extracting headers from HTTP requests.
#[derive(Debug)]
pub struct HeaderExtractor<'a>(pub &'a http::HeaderMap);

impl Extractor for HeaderExtractor<'_> {
    /// Get a value for a key from the HeaderMap. Returns `None` for values
    /// that are not valid ASCII.
    fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(|value| value.to_str().ok())
    }

    /// Collect all the keys from the HeaderMap.
    fn keys(&self) -> Vec<&str> {
        self.0.keys().map(|name| name.as_str()).collect()
    }
}

/// Reads and writes a span context as string key/value pairs.
pub trait TextMapPropagator: Debug + Send + Sync {
    /// Writes the span context active in `cx` into `injector`.
    ///
    /// Nothing is written when `cx` has no valid span context.
    fn inject_context(&self, cx: &Context, injector: &mut dyn Injector);

    /// Returns a copy of `cx` whose active span is the remote parent read
    /// from `extractor`, or `cx` itself when no valid parent is present.
    fn extract_with_context(&self, cx: &Context, extractor: &dyn Extractor) -> Context;

    /// Reads a remote parent into a fresh context.
    fn extract(&self, extractor: &dyn Extractor) -> Context {
        self.extract_with_context(&Context::new(), extractor)
    }

    /// The header names this propagator reads and writes.
    fn fields(&self) -> &'static [&'static str];
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_map_get() {
        let mut carrier: HashMap<String, String> = HashMap::new();
        carrier.set("headerName", "value".to_string());

        assert_eq!(
            Extractor::get(&carrier, "HEADERNAME"),
            Some("value"),
            "case insensitive extraction"
        );
    }

    #[test]
    fn hash_map_keys() {
        let mut carrier: HashMap<String, String> = HashMap::new();
        carrier.set("headerName1", "value1".to_string());
        carrier.set("headerName2", "value2".to_string());

        let mut got = Extractor::keys(&carrier);
        got.sort();
        assert_eq!(got, ["headername1", "headername2"]);
    }

    #[test]
    fn http_headers_round_trip() {
        let mut headers = http::HeaderMap::new();
        HeaderInjector(&mut headers).set("Traceparent", "value".to_string());
        HeaderInjector(&mut headers).set("bad header", "ignored".to_string());

        let extractor = HeaderExtractor(&headers);
        assert_eq!(extractor.get("traceparent"), Some("value"));
        assert_eq!(extractor.keys(), ["traceparent"]);
        assert!(format!("{extractor:?}").contains("traceparent"));
    }
}
