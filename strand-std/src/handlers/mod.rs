//! Handler wrappers.
//!
//! - [`Timeout`] - bound a handler's execution time
//! - [`Traced`] - run a handler inside a `tracing` span

mod timeout;
mod traced;

pub use timeout::Timeout;
pub use traced::Traced;
