//! Error sinks: where per-event failures go.

use crate::envelope::Envelope;
use async_trait::async_trait;
use std::sync::Arc;
use strand_core::{DispatchError, Message};
use tracing::error;

/// Receives every error that ended the dispatch of an event.
///
/// The lane keeps draining after reporting; what to do with the failed event
/// (retry, drop, alert) is up to the implementation.
#[async_trait]
pub trait ErrorHandler<E: Message>: Send + Sync + 'static {
    /// Called once per failed event, on the lane that ran it.
    async fn on_error(&self, envelope: &Envelope<E>, error: DispatchError);
}

#[async_trait]
impl<E, T> ErrorHandler<E> for Arc<T>
where
    E: Message,
    T: ErrorHandler<E> + ?Sized,
{
    async fn on_error(&self, envelope: &Envelope<E>, error: DispatchError) {
        (**self).on_error(envelope, error).await
    }
}

/// Logs errors with `tracing::error!`. The default sink.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogErrors;

#[async_trait]
impl<E: Message> ErrorHandler<E> for LogErrors {
    async fn on_error(&self, envelope: &Envelope<E>, error: DispatchError) {
        error!(
            owner = %envelope.owner(),
            lane = %envelope.lane(),
            sequence = envelope.sequence(),
            error = %error,
            "event dispatch failed"
        );
    }
}
