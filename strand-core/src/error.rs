//! Error types for Strand.
//!
//! This module provides a structured error hierarchy using `thiserror`:
//!
//! - [`StrandError`] - Top-level error type for all Strand operations
//! - [`SubmitError`] - Errors while submitting an event
//! - [`WaitError`] - Misuse of the "wait for next event" primitive
//! - [`DispatchError`] - Failures while handling one event
//! - [`ConfigError`] - Invalid distributor configuration
//!
//! A timed-out or cancelled wait is not an error; it is a regular outcome.

use crate::id::{LaneId, OwnerId};
use std::time::Duration;
use thiserror::Error;

/// A boxed error type for dynamic error handling.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Top-level error type for all Strand operations.
#[derive(Error, Debug)]
pub enum StrandError {
    /// An event could not be submitted.
    #[error("submit error: {0}")]
    Submit(#[from] SubmitError),

    /// A wait request was rejected.
    #[error("wait error: {0}")]
    Wait(#[from] WaitError),

    /// An event failed during dispatch.
    #[error("dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    /// The configuration was rejected.
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
}

/// Errors returned by `submit`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SubmitError {
    /// The distributor no longer accepts events.
    #[error("distributor has been shut down")]
    Shutdown,

    /// The owner's lane is at capacity and the overflow policy rejects.
    #[error("{lane} is full ({capacity} queued events)")]
    QueueFull {
        /// The saturated lane.
        lane: LaneId,
        /// The configured capacity.
        capacity: usize,
    },
}

/// Programming errors in the use of `wait`.
///
/// These are reported immediately instead of surfacing as a timeout.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WaitError {
    /// `wait` was called outside of a handler invocation driven by a lane.
    #[error("wait requested outside of a lane's handler invocation")]
    OutsideLane,

    /// A handler asked to wait for another owner's events.
    #[error("handler serving owner {current} cannot wait for owner {requested}")]
    ForeignOwner {
        /// The owner whose event is being handled.
        current: OwnerId,
        /// The owner named in the wait request.
        requested: OwnerId,
    },
}

/// Errors raised while one event travels through the dispatch pipeline.
///
/// They are fatal to the event and never to the lane.
#[derive(Error, Debug)]
pub enum DispatchError {
    /// A handler returned an error.
    #[error("handler `{handler}` failed: {source}")]
    Handler {
        /// Name of the failing handler descriptor.
        handler: String,
        /// The handler's error.
        #[source]
        source: BoxError,
    },

    /// A handler panicked.
    #[error("handler panicked: {0}")]
    Panic(String),
}

/// Error produced by a handler that exceeded its time budget.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("handler timed out after {0:?}")]
pub struct HandlerTimeout(pub Duration);

/// Invalid distributor configuration.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A pool needs at least one lane.
    #[error("max_lanes must be at least 1")]
    ZeroLanes,

    /// A bounded queue needs room for at least one event.
    #[error("queue_capacity must be at least 1 when set")]
    ZeroCapacity,

    /// The distributor was built outside of a tokio runtime and no handle was given.
    #[error("no tokio runtime available: {0}")]
    NoRuntime(String),
}

impl From<BoxError> for DispatchError {
    fn from(err: BoxError) -> Self {
        DispatchError::Handler {
            handler: String::from("<unnamed>"),
            source: err,
        }
    }
}
