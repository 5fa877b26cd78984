//! Handler outcomes and response conversion.

use crate::error::BoxError;

/// What the dispatch pipeline should do after a handler returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookResult {
    /// The event was observed or partially handled; offer it to the next
    /// matching handler of the same layer.
    Next,
    /// The event was handled for this layer; move on to the next layer.
    Stop,
    /// The event is fully handled; no further layer sees it.
    Halt,
}

/// Trait for converting a handler's output into a [`HookResult`].
///
/// # Default Implementations
///
/// - `()` → `Stop`
/// - `bool` → `true` = `Stop`, `false` = `Next`
/// - `HookResult` → As is
/// - `Option<T>` → inner `T`, or `Next` for `None`
/// - `Result<T, E>` → Delegates to inner `T` or propagates error
#[diagnostic::on_unimplemented(
    message = "`{Self}` is not an `IntoResponse`",
    label = "missing `IntoResponse` implementation",
    note = "IntoResponse must implement the `into_response` method."
)]
pub trait IntoResponse {
    /// Convert the output into propagation behavior and optional error.
    fn into_response(self) -> Result<HookResult, BoxError>;
}

impl IntoResponse for () {
    fn into_response(self) -> Result<HookResult, BoxError> {
        Ok(HookResult::Stop)
    }
}

impl IntoResponse for bool {
    fn into_response(self) -> Result<HookResult, BoxError> {
        Ok(if self {
            HookResult::Stop
        } else {
            HookResult::Next
        })
    }
}

impl IntoResponse for HookResult {
    fn into_response(self) -> Result<HookResult, BoxError> {
        Ok(self)
    }
}

impl<T: IntoResponse> IntoResponse for Option<T> {
    fn into_response(self) -> Result<HookResult, BoxError> {
        match self {
            Some(t) => t.into_response(),
            None => Ok(HookResult::Next),
        }
    }
}

impl<T, E> IntoResponse for Result<T, E>
where
    T: IntoResponse,
    E: Into<BoxError>,
{
    fn into_response(self) -> Result<HookResult, BoxError> {
        match self {
            Ok(t) => t.into_response(),
            Err(e) => Err(e.into()),
        }
    }
}
