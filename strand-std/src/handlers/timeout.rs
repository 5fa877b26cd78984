//! Time-limited handler execution.

use std::time::Duration;
use strand_core::{BoxError, Handler, HandlerTimeout, HookResult, IntoResponse, Message};

/// A handler that fails with [`HandlerTimeout`] when the inner handler does
/// not finish within `duration`.
///
/// The time spent inside a wait counts against the budget, so a handler
/// that waits for a reply needs a budget larger than its wait timeout.
///
/// # Example
///
/// ```rust,ignore
/// use strand_std::{HandlerDescriptor, handlers::Timeout};
///
/// let descriptor = HandlerDescriptor::new("slow", Timeout::secs(slow_handler, 5));
/// ```
#[derive(Debug, Clone)]
pub struct Timeout<H> {
    inner: H,
    duration: Duration,
}

impl<H> Timeout<H> {
    /// Wrap `inner` with a `duration` budget.
    pub fn new(inner: H, duration: Duration) -> Self {
        Self { inner, duration }
    }

    /// Budget in seconds.
    pub fn secs(inner: H, seconds: u64) -> Self {
        Self::new(inner, Duration::from_secs(seconds))
    }

    /// Budget in milliseconds.
    pub fn millis(inner: H, millis: u64) -> Self {
        Self::new(inner, Duration::from_millis(millis))
    }

    /// The configured budget.
    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// The wrapped handler.
    pub fn inner(&self) -> &H {
        &self.inner
    }
}

impl<In, H> Handler<In> for Timeout<H>
where
    In: Message,
    H: Handler<In>,
    H::Output: IntoResponse,
{
    type Output = Result<HookResult, BoxError>;

    async fn call(&self, input: In) -> Self::Output {
        match tokio::time::timeout(self.duration, self.inner.call(input)).await {
            Ok(output) => output.into_response(),
            Err(_) => Err(Box::new(HandlerTimeout(self.duration)) as BoxError),
        }
    }
}
