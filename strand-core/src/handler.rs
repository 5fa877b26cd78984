//! # Handlers
//!
//! A handler is the terminal point of dispatch: the place where business
//! logic runs for one event. The engine invokes it from inside a lane and
//! awaits it to completion before the lane takes the owner's next event, so
//! a handler may suspend (for I/O or to wait for the owner's next event)
//! without giving up its owner's ordering guarantee.
//!
//! # Usage Patterns
//!
//! 1. **Direct closure**: `|input| async move { ... }`
//! 2. **Struct implementation**: `impl Handler<MyInput> for MyHandler`
//!
//! The output is converted into a [`HookResult`] through [`IntoResponse`],
//! so `()`, `bool`, `HookResult` and `Result<_, E>` all work as outputs.
//!
//! [`HookResult`]: crate::HookResult
//! [`IntoResponse`]: crate::IntoResponse

use crate::{error::BoxError, message::Message, response::IntoResponse};
use std::{future::Future, pin::Pin};

/// A marker trait for the result of a handler invocation.
pub trait HandlerResult: Send + Sync + 'static {}
impl<T: Send + Sync + 'static> HandlerResult for T {}

/// The endpoint invoked for an event.
///
/// # Example
///
/// ```rust
/// use strand_core::Handler;
///
/// struct Greeter;
///
/// impl Handler<String> for Greeter {
///     type Output = ();
///
///     async fn call(&self, input: String) -> Self::Output {
///         println!("hello {input}");
///     }
/// }
/// ```
#[diagnostic::on_unimplemented(
    message = "`{Self}` cannot handle input of type `{In}`",
    label = "missing `Handler<{In}>` implementation",
    note = "Handlers must implement the `call` method for the input type `{In}`."
)]
pub trait Handler<In: Message>: Send + Sync + 'static {
    /// The output type of the handler, usually `()`, `HookResult` or a `Result`.
    type Output: HandlerResult;

    /// Executes the handler logic.
    fn call(&self, input: In) -> impl Future<Output = Self::Output> + Send;
}

// Blanket impl for closures
impl<F, In, Out, Fut> Handler<In> for F
where
    In: Message,
    Out: HandlerResult,
    F: Fn(In) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Out> + Send,
{
    type Output = Out;

    fn call(&self, input: In) -> impl Future<Output = Self::Output> + Send {
        (self)(input)
    }
}

/// The future returned by [`DynHandler::call_dyn`].
pub type HandlerFuture<'a> =
    Pin<Box<dyn Future<Output = Result<crate::HookResult, BoxError>> + Send + 'a>>;

/// Object-safe form of [`Handler`] with the output already converted.
///
/// Every `Handler` whose output implements [`IntoResponse`] is a
/// `DynHandler`; registries store handlers as `Arc<dyn DynHandler<In>>`.
pub trait DynHandler<In: Message>: Send + Sync + 'static {
    /// Invoke the handler and convert its output.
    fn call_dyn(&self, input: In) -> HandlerFuture<'_>;
}

impl<In, H> DynHandler<In> for H
where
    In: Message,
    H: Handler<In>,
    H::Output: IntoResponse,
{
    fn call_dyn(&self, input: In) -> HandlerFuture<'_> {
        Box::pin(async move { self.call(input).await.into_response() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::HookResult;

    struct Doubler;

    impl Handler<i32> for Doubler {
        type Output = i32;

        async fn call(&self, input: i32) -> i32 {
            input * 2
        }
    }

    struct Picky;

    impl Handler<i32> for Picky {
        type Output = bool;

        async fn call(&self, input: i32) -> bool {
            input > 10
        }
    }

    #[tokio::test]
    async fn test_struct_handler() {
        assert_eq!(Doubler.call(21).await, 42);
    }

    #[tokio::test]
    async fn test_closure_handler() {
        let handler = |input: i32| async move { input + 1 };
        assert_eq!(handler.call(1).await, 2);
    }

    #[tokio::test]
    async fn test_dyn_handler_converts_output() {
        let handler: Box<dyn DynHandler<i32>> = Box::new(Picky);
        assert_eq!(handler.call_dyn(11).await.unwrap(), HookResult::Stop);
        assert_eq!(handler.call_dyn(1).await.unwrap(), HookResult::Next);

        let unit: Box<dyn DynHandler<i32>> = Box::new(|_input: i32| async {});
        assert_eq!(unit.call_dyn(0).await.unwrap(), HookResult::Stop);
    }
}
