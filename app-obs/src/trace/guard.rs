use crate::trace::{SpanContext, SpanRef, Status, SynchronizedSpan};
use std::sync::Arc;

/// Owns a started span and ends it when it goes out of scope.
///
/// Every exit path ends the span exactly once: an explicit
/// [`end`](SpanGuard::end), an early return or `?`, a panic unwinding through
/// the scope, or a future being dropped mid-flight. A span whose status is
/// still unset when it ends is marked `Ok`; one dropped while the thread is
/// panicking is marked as an error.
///
/// The guard never touches the caller's context. Starting a span produced a
/// *new* context for the child, so once the guard is gone the caller simply
/// keeps using the context it already had.
#[must_use = "dropping the guard ends the span immediately"]
#[derive(Debug)]
pub struct SpanGuard {
    span: Arc<SynchronizedSpan>,
    finished: bool,
}

impl SpanGuard {
    pub(crate) fn new(span: Arc<SynchronizedSpan>) -> Self {
        SpanGuard {
            span,
            finished: false,
        }
    }

    /// The identity of the guarded span.
    pub fn span_context(&self) -> &SpanContext {
        self.span.span_context()
    }

    /// A reference to the guarded span, for attributes and events.
    pub fn span(&self) -> SpanRef<'_> {
        SpanRef::from_synchronized(&self.span)
    }

    /// Ends the span, leaving an error status in place and otherwise
    /// marking it `Ok`.
    pub fn end(mut self) {
        self.finish(None);
    }

    /// Ends the span with an explicit status.
    pub fn end_with_status(mut self, status: Status) {
        self.finish(Some(status));
    }

    fn finish(&mut self, status: Option<Status>) {
        if !self.finished {
            self.finished = true;
            self.span.end(status);
        }
    }
}

impl Drop for SpanGuard {
    fn drop(&mut self) {
        let status =
            std::thread::panicking().then(|| Status::error("span dropped while panicking"));
        self.finish(status);
    }
}
