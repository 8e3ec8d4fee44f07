//! Execution-scoped context propagation.
//!
//! A [`Context`] is an immutable bag holding the active span plus any typed
//! values. Every write produces a new context, so passing one by value down a
//! call chain or into a spawned task can never leak a child's state back into
//! its caller.
//!
//! For code that cannot take the context as a parameter, a context can be
//! attached to the current thread with [`Context::attach`]. The returned
//! [`ContextGuard`] restores the previous context when dropped, and
//! [`FutureContextExt::with_context`] does the same around every poll of a
//! future.
use crate::trace::SynchronizedSpan;
use std::any::{Any, TypeId};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::hash::{BuildHasherDefault, Hasher};
use std::marker::PhantomData;
use std::sync::Arc;

mod future_ext;

pub use future_ext::{FutureContextExt, WithContext};

thread_local! {
    static CURRENT_CONTEXT: RefCell<ContextStack> = RefCell::new(ContextStack::default());
}

type EntryMap = HashMap<TypeId, Arc<dyn Any + Sync + Send>, BuildHasherDefault<IdHasher>>;

/// An execution-scoped collection of values.
///
/// # Examples
///
/// ```
/// use app_obs::Context;
///
/// #[derive(Debug, PartialEq)]
/// struct RequestPath(&'static str);
///
/// let cx = Context::new().with_value(RequestPath("/products/42"));
/// assert_eq!(cx.get::<RequestPath>(), Some(&RequestPath("/products/42")));
///
/// {
///     let _guard = cx.attach();
///     assert_eq!(Context::current().get::<RequestPath>(), Some(&RequestPath("/products/42")));
/// }
///
/// // the previous context is back once the guard is dropped
/// assert_eq!(Context::current().get::<RequestPath>(), None);
/// ```
#[derive(Clone, Default)]
pub struct Context {
    pub(crate) span: Option<Arc<SynchronizedSpan>>,
    entries: Option<Arc<EntryMap>>,
}

impl Context {
    /// Creates an empty `Context`.
    pub fn new() -> Self {
        Context::default()
    }

    /// Returns an immutable snapshot of the context attached to this thread.
    pub fn current() -> Self {
        Self::map_current(|cx| cx.clone())
    }

    /// Applies a function to the current context, returning its value.
    ///
    /// This avoids cloning the context when only a value needs to be read.
    pub fn map_current<T>(f: impl FnOnce(&Context) -> T) -> T {
        CURRENT_CONTEXT.with(|cx| cx.borrow().map_current_cx(f))
    }

    /// Returns a reference to the entry for the corresponding value type.
    pub fn get<T: 'static>(&self) -> Option<&T> {
        self.entries
            .as_ref()?
            .get(&TypeId::of::<T>())?
            .downcast_ref()
    }

    /// Returns a copy of this context with the given value included.
    ///
    /// A value of the same type already present is replaced in the copy; the
    /// original context is unchanged.
    pub fn with_value<T: 'static + Send + Sync>(&self, value: T) -> Self {
        let entries = if let Some(current_entries) = &self.entries {
            let mut inner_entries = (**current_entries).clone();
            inner_entries.insert(TypeId::of::<T>(), Arc::new(value));
            Some(Arc::new(inner_entries))
        } else {
            let mut entries = EntryMap::default();
            entries.insert(TypeId::of::<T>(), Arc::new(value));
            Some(Arc::new(entries))
        };
        Context {
            entries,
            span: self.span.clone(),
        }
    }

    /// Replaces the current context on this thread with this context.
    ///
    /// Dropping the returned [`ContextGuard`] resets the current context to
    /// the previous value.
    pub fn attach(self) -> ContextGuard {
        let cx_id = CURRENT_CONTEXT.with(|cx| cx.borrow_mut().push(self));

        ContextGuard {
            cx_pos: cx_id,
            _marker: PhantomData,
        }
    }

    pub(crate) fn with_synchronized_span(&self, span: Arc<SynchronizedSpan>) -> Self {
        Context {
            span: Some(span),
            entries: self.entries.clone(),
        }
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut dbg = f.debug_struct("Context");
        match &self.span {
            Some(span) => dbg.field("span", span.span_context()),
            None => dbg.field("span", &"None"),
        };
        dbg.field(
            "entries count",
            &self.entries.as_ref().map_or(0, |e| e.len()),
        )
        .finish()
    }
}

/// A guard that resets the current context to the prior context when dropped.
#[derive(Debug)]
pub struct ContextGuard {
    cx_pos: u16,
    // Thread locals back the stack, so the guard must stay on this thread.
    _marker: PhantomData<*const ()>,
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        let id = self.cx_pos;
        if id > ContextStack::BASE_POS && id < ContextStack::MAX_POS {
            CURRENT_CONTEXT.with(|context_stack| context_stack.borrow_mut().pop_id(id));
        }
    }
}

/// `TypeId`s are already hashes, so the hasher passes them through.
#[derive(Clone, Default, Debug)]
struct IdHasher(u64);

impl Hasher for IdHasher {
    fn write(&mut self, _: &[u8]) {
        unreachable!("TypeId calls write_u64");
    }

    #[inline]
    fn write_u64(&mut self, id: u64) {
        self.0 = id;
    }

    #[inline]
    fn finish(&self) -> u64 {
        self.0
    }
}

/// The contexts attached to one thread.
///
/// Guards pop by position so they may be dropped out of order; the current
/// context only changes once the topmost entry is popped.
struct ContextStack {
    current_cx: Context,
    stack: Vec<Option<Context>>,
    _marker: PhantomData<*const ()>,
}

impl ContextStack {
    const BASE_POS: u16 = 0;
    const MAX_POS: u16 = u16::MAX;
    const INITIAL_CAPACITY: usize = 8;

    fn push(&mut self, cx: Context) -> u16 {
        let next_id = self.stack.len() + 1;
        if next_id < ContextStack::MAX_POS.into() {
            let previous = std::mem::replace(&mut self.current_cx, cx);
            self.stack.push(Some(previous));
            next_id as u16
        } else {
            obs_warn!(
                name: "Context.AttachFailed",
                message = format!(
                    "Too many attached contexts (max {}); Context::current() is unchanged",
                    ContextStack::MAX_POS
                )
            );
            ContextStack::MAX_POS
        }
    }

    fn pop_id(&mut self, pos: u16) {
        let len: u16 = self.stack.len() as u16;
        if pos == len {
            // Skip entries already released by out of order drops.
            while let Some(None) = self.stack.last() {
                _ = self.stack.pop();
            }
            if let Some(Some(next_cx)) = self.stack.pop() {
                self.current_cx = next_cx;
            }
        } else if pos < len {
            _ = self.stack[pos as usize].take();
        } else {
            obs_warn!(
                name: "Context.PopOutOfBounds",
                position = pos,
                stack_length = len
            );
        }
    }

    fn map_current_cx<T>(&self, f: impl FnOnce(&Context) -> T) -> T {
        f(&self.current_cx)
    }
}

impl Default for ContextStack {
    fn default() -> Self {
        ContextStack {
            current_cx: Context::default(),
            stack: Vec::with_capacity(ContextStack::INITIAL_CAPACITY),
            _marker: PhantomData,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct ValueA(u64);
    #[derive(Debug, PartialEq)]
    struct ValueB(&'static str);

    #[test]
    fn with_value_leaves_original_untouched() {
        let base = Context::new().with_value(ValueA(1));
        let derived = base.with_value(ValueB("b")).with_value(ValueA(2));

        assert_eq!(base.get::<ValueA>(), Some(&ValueA(1)));
        assert_eq!(base.get::<ValueB>(), None);
        assert_eq!(derived.get::<ValueA>(), Some(&ValueA(2)));
        assert_eq!(derived.get::<ValueB>(), Some(&ValueB("b")));
    }

    #[test]
    fn nested_attach_restores_in_order() {
        let _outer = Context::new().with_value(ValueA(1)).attach();
        {
            let _inner = Context::current().with_value(ValueA(2)).attach();
            assert_eq!(Context::current().get::<ValueA>(), Some(&ValueA(2)));
        }
        assert_eq!(Context::current().get::<ValueA>(), Some(&ValueA(1)));
    }

    #[test]
    fn out_of_order_drop_restores_once_top_is_released() {
        let first = Context::new().with_value(ValueA(1)).attach();
        let second = Context::new().with_value(ValueA(2)).attach();
        let third = Context::new().with_value(ValueA(3)).attach();

        drop(second);
        assert_eq!(Context::current().get::<ValueA>(), Some(&ValueA(3)));

        drop(third);
        assert_eq!(Context::current().get::<ValueA>(), Some(&ValueA(1)));

        drop(first);
        assert_eq!(Context::current().get::<ValueA>(), None);
    }

    #[test]
    fn attach_survives_panic_unwinding() {
        let result = std::panic::catch_unwind(|| {
            let _guard = Context::new().with_value(ValueA(7)).attach();
            panic!("boom");
        });
        assert!(result.is_err());
        assert_eq!(Context::current().get::<ValueA>(), None);
    }
}
