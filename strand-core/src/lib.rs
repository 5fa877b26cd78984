//! # strand-core
//!
//! Core traits and types for the Strand event engine.
//!
//! This crate has minimal dependencies and is meant to be imported by code
//! that writes handlers or predicates without pulling in the runtime from
//! `strand-std`.
//!
//! # Building Blocks
//!
//! - [`OwnerId`] / [`LaneId`] - who an event belongs to, and where it runs
//! - [`Message`] - marker for every event type
//! - [`Predicate`] - opaque "does this event concern me" test, used both by
//!   handler descriptors and by waits
//! - [`Handler`] - the invoked endpoint, with [`IntoResponse`] turning its
//!   output into a [`HookResult`]
//!
//! # Error Types
//!
//! - [`StrandError`] - Top-level error type
//! - [`SubmitError`], [`WaitError`], [`DispatchError`], [`ConfigError`]

#![deny(clippy::wildcard_imports)]
#![warn(missing_docs)]

mod error;
mod handler;
mod id;
mod message;
mod predicate;
mod response;

// Re-exports
pub use error::{
    BoxError, ConfigError, DispatchError, HandlerTimeout, StrandError, SubmitError, WaitError,
};
pub use handler::{DynHandler, Handler, HandlerFuture, HandlerResult};
pub use id::{LaneId, OwnerId};
pub use message::Message;
pub use predicate::{Always, And, BoxPredicate, Not, Or, Predicate};
pub use response::{HookResult, IntoResponse};
