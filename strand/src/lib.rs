//! # strand - Owner-Ordered Event Lanes
//!
//! `strand` routes a stream of owner-tagged events (a chat, a user) to
//! handler logic so that:
//!
//! - events of one owner are handled strictly in submission order, one at a time;
//! - unrelated owners make progress in parallel on independent lanes;
//! - a running handler can pause and receive the *next* matching event of its
//!   own owner, with a timeout, without letting later events overtake it.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::time::Duration;
//! use strand::prelude::*;
//!
//! let distributor = Distributor::builder()
//!     .handler(
//!         HandlerDescriptor::new("confirm", |envelope: Envelope<String>| async move {
//!             let answer = envelope
//!                 .wait_next(|text: &String| text == "yes" || text == "no", Duration::from_secs(30))
//!                 .await?;
//!             match answer {
//!                 WaitOutcome::Matched(text) => println!("got {text}"),
//!                 WaitOutcome::TimedOut | WaitOutcome::Cancelled => println!("no answer"),
//!             }
//!             Ok::<_, BoxError>(())
//!         })
//!         .filter(|text: &String| text == "/confirm"),
//!     )
//!     .build()?;
//!
//! distributor.submit(42, "/confirm".to_string())?;
//! distributor.submit(42, "yes".to_string())?;
//! distributor.wait_idle().await;
//! ```

#![deny(clippy::wildcard_imports)]
#![warn(missing_docs)]

pub use strand_core::{
    // Predicates
    Always,
    And,
    // Errors
    BoxError,
    BoxPredicate,
    ConfigError,
    DispatchError,
    // Handler
    DynHandler,
    Handler,
    HandlerFuture,
    HandlerResult,
    HandlerTimeout,
    // Response
    HookResult,
    IntoResponse,
    // Identifiers
    LaneId,
    // Message
    Message,
    Not,
    Or,
    OwnerId,
    Predicate,
    StrandError,
    SubmitError,
    WaitError,
};

pub use strand_std::{
    // Configuration
    AssignmentStrategy,
    // Pipeline
    DispatchPipeline,
    DispatchReport,
    // Distributor
    Distributor,
    DistributorBuilder,
    DistributorConfig,
    EnabledHandle,
    // Envelope and waits
    Envelope,
    // Error sinks
    ErrorHandler,
    HandlerDescriptor,
    LaneMetrics,
    LogErrors,
    OverflowPolicy,
    PoolMetrics,
    Routed,
    ShutdownReport,
    WaitOutcome,
};

/// Handler wrappers.
pub mod handlers {
    pub use strand_std::handlers::{Timeout, Traced};
}

/// Testing utilities.
pub mod testing {
    pub use strand_std::testing::{
        CollectErrors, CountingHandler, FailingHandler, RecordingHandler,
    };
}

/// Prelude module - common imports for Strand.
///
/// # Usage
///
/// ```rust,ignore
/// use strand::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{
        BoxError, Distributor, DistributorConfig, Envelope, HandlerDescriptor, HookResult,
        OwnerId, Predicate, Routed, WaitOutcome,
    };
}
