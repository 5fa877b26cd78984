//! # strand-std
//!
//! The Strand runtime: lanes, the distributor, the wait registry and the
//! dispatch pipeline, on top of `tokio`.
//!
//! # Components
//!
//! - [`Distributor`] - binds owners to lanes and routes submissions
//! - [`Envelope`] - what a handler receives, including `wait_next`
//! - [`DispatchPipeline`] / [`HandlerDescriptor`] - ranked handler invocation
//! - [`ErrorHandler`] - where per-event failures are reported
//! - [`handlers`] - [`Timeout`](handlers::Timeout) and [`Traced`](handlers::Traced) wrappers
//! - [`testing`] - recording handlers for tests
//!
//! # Features
//!
//! - `serde`: `Serialize`/`Deserialize` for [`DistributorConfig`]

#![deny(clippy::wildcard_imports)]
#![warn(missing_docs)]

mod config;
mod distributor;
mod envelope;
pub mod handlers;
mod lane;
mod pipeline;
mod sink;
pub mod testing;
mod wait;

pub use config::{AssignmentStrategy, DistributorConfig, OverflowPolicy};
pub use distributor::{
    Distributor, DistributorBuilder, LaneMetrics, PoolMetrics, Routed, ShutdownReport,
};
pub use envelope::Envelope;
pub use pipeline::{DispatchPipeline, DispatchReport, EnabledHandle, HandlerDescriptor};
pub use sink::{ErrorHandler, LogErrors};
pub use wait::WaitOutcome;
