//! Testing utilities for Strand.
//!
//! Ready-made handlers and sinks that record what happened, so tests can
//! assert on dispatch order, counts and failures.
//!
//! # Example
//!
//! ```rust,ignore
//! use strand_std::testing::RecordingHandler;
//!
//! let recorder = RecordingHandler::new();
//! let distributor = Distributor::builder()
//!     .handler(HandlerDescriptor::new("record", recorder.clone()))
//!     .build()?;
//!
//! distributor.submit(1, "a".to_string())?;
//! distributor.wait_idle().await;
//! assert_eq!(recorder.events(), vec!["a".to_string()]);
//! ```

use crate::{envelope::Envelope, sink::ErrorHandler};
use async_trait::async_trait;
use std::sync::{
    Arc, Mutex, PoisonError,
    atomic::{AtomicUsize, Ordering},
};
use strand_core::{BoxError, DispatchError, Handler, Message, OwnerId};

/// A handler that records every event it sees, with its owner.
#[derive(Debug)]
pub struct RecordingHandler<E> {
    seen: Arc<Mutex<Vec<(OwnerId, E)>>>,
}

impl<E> Clone for RecordingHandler<E> {
    fn clone(&self) -> Self {
        Self {
            seen: Arc::clone(&self.seen),
        }
    }
}

impl<E> Default for RecordingHandler<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> RecordingHandler<E> {
    /// Create an empty recorder.
    pub fn new() -> Self {
        Self {
            seen: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Number of recorded events.
    pub fn len(&self) -> usize {
        self.seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Returns `true` if nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<E: Clone> RecordingHandler<E> {
    /// All recorded events, in dispatch order.
    pub fn events(&self) -> Vec<E> {
        self.seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, event)| event.clone())
            .collect()
    }

    /// Recorded events of one owner, in dispatch order.
    pub fn events_of(&self, owner: impl Into<OwnerId>) -> Vec<E> {
        let owner = owner.into();
        self.seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|(seen, _)| *seen == owner)
            .map(|(_, event)| event.clone())
            .collect()
    }
}

impl<E: Message + Clone> Handler<Envelope<E>> for RecordingHandler<E> {
    type Output = ();

    async fn call(&self, input: Envelope<E>) {
        self.seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((input.owner(), input.event().clone()));
    }
}

/// A handler that only counts its invocations.
#[derive(Debug, Clone, Default)]
pub struct CountingHandler {
    count: Arc<AtomicUsize>,
}

impl CountingHandler {
    /// Create a counter at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of invocations so far.
    pub fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }
}

impl<E: Message> Handler<Envelope<E>> for CountingHandler {
    type Output = ();

    async fn call(&self, _input: Envelope<E>) {
        self.count.fetch_add(1, Ordering::SeqCst);
    }
}

/// A handler that always fails with the same message.
#[derive(Debug, Clone)]
pub struct FailingHandler {
    message: String,
}

impl FailingHandler {
    /// Create a handler failing with `message`.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl<E: Message> Handler<Envelope<E>> for FailingHandler {
    type Output = Result<(), BoxError>;

    async fn call(&self, _input: Envelope<E>) -> Self::Output {
        Err(self.message.clone().into())
    }
}

/// An error sink that keeps every reported error as `(owner, message)`.
#[derive(Debug, Clone, Default)]
pub struct CollectErrors {
    errors: Arc<Mutex<Vec<(OwnerId, String)>>>,
}

impl CollectErrors {
    /// Create an empty collector.
    pub fn new() -> Self {
        Self::default()
    }

    /// The collected errors, in reporting order.
    pub fn errors(&self) -> Vec<(OwnerId, String)> {
        self.errors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl<E: Message> ErrorHandler<E> for CollectErrors {
    async fn on_error(&self, envelope: &Envelope<E>, error: DispatchError) {
        self.errors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((envelope.owner(), error.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_recording_handler() {
        let recorder = RecordingHandler::new();
        recorder.call(Envelope::detached(1, "a")).await;
        recorder.call(Envelope::detached(2, "b")).await;
        recorder.clone().call(Envelope::detached(1, "c")).await;

        assert_eq!(recorder.len(), 3);
        assert_eq!(recorder.events(), vec!["a", "b", "c"]);
        assert_eq!(recorder.events_of(1), vec!["a", "c"]);
    }

    #[tokio::test]
    async fn test_counting_and_failing() {
        let counter = CountingHandler::new();
        counter.call(Envelope::detached(1, 0_u8)).await;
        counter.call(Envelope::detached(1, 0_u8)).await;
        assert_eq!(counter.count(), 2);

        let failing = FailingHandler::new("boom");
        let err = failing.call(Envelope::detached(1, 0_u8)).await.unwrap_err();
        assert_eq!(err.to_string(), "boom");
    }

    #[tokio::test]
    async fn test_collect_errors() {
        let sink = CollectErrors::new();
        sink.on_error(
            &Envelope::detached(7, 0_u8),
            DispatchError::Panic("bad".into()),
        )
        .await;
        assert_eq!(
            sink.errors(),
            vec![(OwnerId(7), "handler panicked: bad".to_string())]
        );
    }
}
