//! Context extensions for tracing
use crate::common::KeyValue;
use crate::trace::{Span, SpanContext, Status};
use crate::Context;
use std::borrow::Cow;
use std::error::Error;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

static NOOP_SPAN: SynchronizedSpan = SynchronizedSpan {
    span_context: SpanContext::NONE,
    inner: None,
    parent: None,
    ended: AtomicBool::new(false),
};

/// The span shared between a [`Context`] and the [`SpanGuard`] that owns it.
///
/// Spans started in this process carry their backend span in `inner`; spans
/// extracted from a remote caller only carry a span context.
///
/// [`SpanGuard`]: crate::trace::SpanGuard
#[derive(Debug)]
pub(crate) struct SynchronizedSpan {
    span_context: SpanContext,
    inner: Option<Mutex<Box<dyn Span>>>,
    parent: Option<Arc<SynchronizedSpan>>,
    ended: AtomicBool,
}

impl SynchronizedSpan {
    pub(crate) fn new(span: Box<dyn Span>, parent: Option<Arc<SynchronizedSpan>>) -> Self {
        SynchronizedSpan {
            span_context: span.span_context().clone(),
            inner: Some(Mutex::new(span)),
            parent,
            ended: AtomicBool::new(false),
        }
    }

    pub(crate) fn remote(span_context: SpanContext) -> Self {
        SynchronizedSpan {
            span_context,
            inner: None,
            parent: None,
            ended: AtomicBool::new(false),
        }
    }

    pub(crate) fn span_context(&self) -> &SpanContext {
        &self.span_context
    }

    fn with_inner_mut<T>(&self, f: impl FnOnce(&mut Box<dyn Span>) -> T) -> Option<T> {
        let inner = self.inner.as_ref()?;
        match inner.lock() {
            Ok(mut locked) => Some(f(&mut locked)),
            Err(err) => {
                obs_warn!(name: "Span.LockPoisoned", error = err.to_string());
                None
            }
        }
    }

    fn is_recording(&self) -> bool {
        !self.ended.load(Ordering::Acquire)
            && self.with_inner_mut(|span| span.is_recording()).unwrap_or(false)
    }

    /// Ends the span exactly once.
    ///
    /// A status left `Unset` becomes `Ok`. Ending an already ended span is a
    /// no-op reported as a diagnostic.
    pub(crate) fn end(&self, status: Option<Status>) {
        if self.inner.is_none() {
            return;
        }
        if self.ended.swap(true, Ordering::AcqRel) {
            obs_warn!(
                name: "Span.AlreadyEnded",
                trace_id = self.span_context.trace_id().to_string(),
                span_id = self.span_context.span_id().to_string(),
                message = "End was called on a span that has already ended; the call is ignored"
            );
            return;
        }
        self.with_inner_mut(|span| {
            if let Some(status) = status {
                span.set_status(status);
            }
            span.set_status(Status::Ok);
            span.end();
        });
    }

    /// Marks every still-open local ancestor of this span as failed.
    pub(crate) fn mark_ancestors_error(&self, description: &Cow<'static, str>) {
        let mut next = self.parent.as_deref();
        while let Some(ancestor) = next {
            if !ancestor.ended.load(Ordering::Acquire) {
                ancestor.with_inner_mut(|span| span.set_status(Status::error(description.clone())));
            }
            next = ancestor.parent.as_deref();
        }
    }
}

/// A reference to the span active in a [`Context`].
///
/// All operations are no-ops when the context has no recording span.
#[derive(Debug, Clone, Copy)]
pub struct SpanRef<'a>(&'a SynchronizedSpan);

impl<'a> SpanRef<'a> {
    pub(crate) fn from_synchronized(span: &'a SynchronizedSpan) -> Self {
        SpanRef(span)
    }

    /// The identity of this span.
    pub fn span_context(&self) -> &'a SpanContext {
        self.0.span_context()
    }
}

impl SpanRef<'_> {
    /// Records an event on this span.
    pub fn add_event<T>(&self, name: T, attributes: Vec<KeyValue>)
    where
        T: Into<Cow<'static, str>>,
    {
        self.0
            .with_inner_mut(|inner| inner.add_event(name.into(), attributes));
    }

    /// Records an error on this span.
    ///
    /// This does not change the span status; pair it with
    /// [`set_status`](SpanRef::set_status) when the operation failed.
    pub fn record_error(&self, err: &dyn Error, attributes: Vec<KeyValue>) {
        self.0
            .with_inner_mut(|inner| inner.record_error(err, attributes));
    }

    /// Returns `true` if this span is started here and still recording.
    pub fn is_recording(&self) -> bool {
        self.0.is_recording()
    }

    /// Sets a single attribute on this span.
    pub fn set_attribute(&self, attribute: KeyValue) {
        self.0.with_inner_mut(|inner| inner.set_attribute(attribute));
    }

    /// Sets several attributes on this span.
    pub fn set_attributes(&self, attributes: impl IntoIterator<Item = KeyValue>) {
        self.0.with_inner_mut(|inner| {
            for attribute in attributes {
                inner.set_attribute(attribute);
            }
        });
    }

    /// Updates the status of this span, see [`Status`] for the precedence rules.
    pub fn set_status(&self, status: Status) {
        self.0.with_inner_mut(|inner| inner.set_status(status));
    }

    /// Ends the span now.
    ///
    /// The owning [`SpanGuard`](crate::trace::SpanGuard) will not end it a
    /// second time; it reports the extra call instead.
    pub fn end(&self) {
        self.0.end(None);
    }

    pub(crate) fn mark_ancestors_error(&self, description: &Cow<'static, str>) {
        self.0.mark_ancestors_error(description);
    }
}

/// Methods for storing and retrieving trace data in a [`Context`].
pub trait TraceContextExt {
    /// Returns a reference to this context's span, or the default no-op span
    /// if none has been set.
    ///
    /// # Examples
    ///
    /// ```
    /// use app_obs::{trace::TraceContextExt, Context};
    ///
    /// // Add an event to the currently active span
    /// Context::map_current(|cx| cx.span().add_event("An event!", vec![]));
    /// ```
    fn span(&self) -> SpanRef<'_>;

    /// Returns whether or not a span context, local or remote, is set.
    fn has_active_span(&self) -> bool;

    /// Returns a copy of this context with a span created from a remote
    /// caller's span context as its parent.
    fn with_remote_span_context(&self, span_context: SpanContext) -> Self;
}

impl TraceContextExt for Context {
    fn span(&self) -> SpanRef<'_> {
        match &self.span {
            Some(span) => SpanRef(span),
            None => SpanRef(&NOOP_SPAN),
        }
    }

    fn has_active_span(&self) -> bool {
        self.span.is_some()
    }

    fn with_remote_span_context(&self, span_context: SpanContext) -> Self {
        self.with_synchronized_span(Arc::new(SynchronizedSpan::remote(span_context)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::{SpanId, TraceFlags, TraceId, TraceState};

    #[test]
    fn empty_context_has_noop_span() {
        let cx = Context::new();
        assert!(!cx.has_active_span());
        assert!(!cx.span().is_recording());
        assert_eq!(cx.span().span_context(), &SpanContext::NONE);
        // no-ops, must not panic
        cx.span().add_event("ignored", vec![]);
        cx.span().end();
    }

    #[test]
    fn remote_span_context_is_not_recording() {
        let remote = SpanContext::new(
            TraceId::from(0x1234),
            SpanId::from(0x42),
            TraceFlags::SAMPLED,
            true,
            TraceState::NONE,
        );
        let cx = Context::new().with_remote_span_context(remote.clone());
        assert!(cx.has_active_span());
        assert!(!cx.span().is_recording());
        assert_eq!(cx.span().span_context(), &remote);
    }

    #[test]
    fn span_context_borrows_from_context() {
        let remote = SpanContext::new(
            TraceId::from(7),
            SpanId::from(8),
            TraceFlags::SAMPLED,
            true,
            TraceState::NONE,
        );
        let cx = Context::new().with_remote_span_context(remote);
        let span_context = cx.span().span_context();
        assert!(span_context.is_valid());
        assert_eq!(span_context.span_id(), SpanId::from(8));
    }
}
