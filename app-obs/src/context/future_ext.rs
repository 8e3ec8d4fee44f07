use crate::Context;
use pin_project_lite::pin_project;
use std::pin::Pin;
use std::task::Context as TaskContext;
use std::task::Poll;

pin_project! {
    /// A future with an associated [`Context`] attached while it is polled.
    #[derive(Clone, Debug)]
    pub struct WithContext<T> {
        #[pin]
        inner: T,
        cx: Context,
    }
}

impl<T: std::future::Future> std::future::Future for WithContext<T> {
    type Output = T::Output;

    fn poll(self: Pin<&mut Self>, task_cx: &mut TaskContext<'_>) -> Poll<Self::Output> {
        let this = self.project();
        let _guard = this.cx.clone().attach();

        this.inner.poll(task_cx)
    }
}

/// Extension trait allowing futures to carry a [`Context`].
pub trait FutureContextExt: Sized {
    /// Attaches `cx` for the duration of every poll of this future.
    ///
    /// Tasks may move between threads at await points, so a thread-attached
    /// context would otherwise be lost or, worse, seen by another task.
    ///
    /// # Examples
    ///
    /// ```
    /// use app_obs::{Context, FutureContextExt};
    ///
    /// #[derive(Debug, PartialEq)]
    /// struct Tenant(&'static str);
    ///
    /// let fut = async {
    ///     assert_eq!(Context::current().get::<Tenant>(), Some(&Tenant("acme")));
    /// }
    /// .with_context(Context::new().with_value(Tenant("acme")));
    ///
    /// futures_executor::block_on(fut);
    /// ```
    fn with_context(self, cx: Context) -> WithContext<Self> {
        WithContext { inner: self, cx }
    }

    /// Attaches the thread's current context to this future.
    fn with_current_context(self) -> WithContext<Self> {
        self.with_context(Context::current())
    }
}

impl<T: std::future::Future> FutureContextExt for T {}
