use super::ids::{SpanId, TraceFlags, TraceId};
use std::str::FromStr;
use thiserror::Error;

/// Vendor-specific key/value pairs carried in the W3C `tracestate` header.
///
/// Values are immutable: [`insert`](TraceState::insert) and
/// [`delete`](TraceState::delete) return new states. The most recently
/// updated entry is kept first, as required for propagation.
#[derive(Clone, Debug, Default, Eq, PartialEq, Hash)]
pub struct TraceState(Option<Vec<(String, String)>>);

/// Error returned when a `tracestate` entry is malformed.
#[derive(Error, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum TraceStateError {
    /// The key does not follow the W3C key grammar.
    #[error("{0} is not a valid tracestate key")]
    Key(String),

    /// The value contains a `,` or `=` or is too long.
    #[error("{0} is not a valid tracestate value")]
    Value(String),

    /// A list member has no `=` separator.
    #[error("{0} is not a valid tracestate list member")]
    List(String),
}

impl TraceState {
    /// The empty trace state.
    pub const NONE: TraceState = TraceState(None);

    fn valid_key(key: &str) -> bool {
        let bytes = key.as_bytes();
        if bytes.is_empty() || bytes.len() > 256 {
            return false;
        }
        if !(bytes[0].is_ascii_lowercase() || bytes[0].is_ascii_digit()) {
            return false;
        }

        // Multi-tenant keys look like `tenant@vendor` with a vendor of at most 14 chars.
        let mut at = None;
        for (i, &b) in bytes.iter().enumerate() {
            match b {
                b'a'..=b'z' | b'0'..=b'9' | b'_' | b'-' | b'*' | b'/' => {}
                b'@' if at.is_none() && bytes.len() - i <= 15 => at = Some(i),
                _ => return false,
            }
        }
        match at {
            Some(i) => bytes
                .get(i + 1)
                .is_some_and(|b| b.is_ascii_lowercase() || b.is_ascii_digit()),
            None => true,
        }
    }

    fn valid_value(value: &str) -> bool {
        value.len() <= 256 && !value.contains([',', '='])
    }

    /// Creates a trace state from ordered key/value pairs.
    ///
    /// # Examples
    ///
    /// ```
    /// use app_obs::trace::TraceState;
    ///
    /// let state = TraceState::from_key_value([("foo", "bar"), ("apple", "banana")]).unwrap();
    /// assert_eq!(state.header(), "foo=bar,apple=banana");
    /// ```
    pub fn from_key_value<T, K, V>(pairs: T) -> Result<Self, TraceStateError>
    where
        T: IntoIterator<Item = (K, V)>,
        K: ToString,
        V: ToString,
    {
        let entries = pairs
            .into_iter()
            .map(|(key, value)| {
                let (key, value) = (key.to_string(), value.to_string());
                if !Self::valid_key(&key) {
                    return Err(TraceStateError::Key(key));
                }
                if !Self::valid_value(&value) {
                    return Err(TraceStateError::Value(value));
                }
                Ok((key, value))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(TraceState((!entries.is_empty()).then_some(entries)))
    }

    /// Returns the value stored for `key`, if any.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .as_ref()?
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Returns a new state with `key` set to `value`, moved to the front.
    pub fn insert<K, V>(&self, key: K, value: V) -> Result<TraceState, TraceStateError>
    where
        K: Into<String>,
        V: Into<String>,
    {
        let (key, value) = (key.into(), value.into());
        if !Self::valid_key(&key) {
            return Err(TraceStateError::Key(key));
        }
        if !Self::valid_value(&value) {
            return Err(TraceStateError::Value(value));
        }

        let mut entries = self.without(&key);
        entries.insert(0, (key, value));
        Ok(TraceState(Some(entries)))
    }

    /// Returns a new state without `key`.
    pub fn delete(&self, key: &str) -> Result<TraceState, TraceStateError> {
        if !Self::valid_key(key) {
            return Err(TraceStateError::Key(key.to_string()));
        }
        let entries = self.without(key);
        Ok(TraceState((!entries.is_empty()).then_some(entries)))
    }

    fn without(&self, key: &str) -> Vec<(String, String)> {
        self.0
            .iter()
            .flatten()
            .filter(|(k, _)| k != key)
            .cloned()
            .collect()
    }

    /// Renders the state as a `tracestate` header value.
    pub fn header(&self) -> String {
        self.0
            .iter()
            .flatten()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(",")
    }
}

impl FromStr for TraceState {
    type Err = TraceStateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let pairs = s
            .split_terminator(',')
            .map(|member| {
                member
                    .trim()
                    .split_once('=')
                    .ok_or_else(|| TraceStateError::List(member.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        TraceState::from_key_value(pairs)
    }
}

/// The immutable, propagatable identity of a span.
///
/// A new span always gets a new `SpanContext`; starting a child never
/// changes the parent's. This is the value written to and read from
/// `traceparent` and friends.
#[derive(Clone, Debug, PartialEq, Hash, Eq)]
pub struct SpanContext {
    trace_id: TraceId,
    span_id: SpanId,
    trace_flags: TraceFlags,
    is_remote: bool,
    trace_state: TraceState,
}

impl SpanContext {
    /// An invalid span context
    pub const NONE: SpanContext = SpanContext {
        trace_id: TraceId::INVALID,
        span_id: SpanId::INVALID,
        trace_flags: TraceFlags::NOT_SAMPLED,
        is_remote: false,
        trace_state: TraceState::NONE,
    };

    /// Construct a new `SpanContext`
    pub fn new(
        trace_id: TraceId,
        span_id: SpanId,
        trace_flags: TraceFlags,
        is_remote: bool,
        trace_state: TraceState,
    ) -> Self {
        SpanContext {
            trace_id,
            span_id,
            trace_flags,
            is_remote,
            trace_state,
        }
    }

    /// The [`TraceId`] for this span context.
    pub fn trace_id(&self) -> TraceId {
        self.trace_id
    }

    /// The [`SpanId`] for this span context.
    pub fn span_id(&self) -> SpanId {
        self.span_id
    }

    /// The [`TraceFlags`] for this span context.
    pub fn trace_flags(&self) -> TraceFlags {
        self.trace_flags
    }

    /// Returns `true` if both the trace id and span id are non-zero.
    pub fn is_valid(&self) -> bool {
        self.trace_id != TraceId::INVALID && self.span_id != SpanId::INVALID
    }

    /// Returns `true` if the span context was extracted from a remote parent.
    pub fn is_remote(&self) -> bool {
        self.is_remote
    }

    /// Returns `true` if the `sampled` trace flag is set.
    pub fn is_sampled(&self) -> bool {
        self.trace_flags.is_sampled()
    }

    /// A reference to the span context's [`TraceState`].
    pub fn trace_state(&self) -> &TraceState {
        &self.trace_state
    }
}
