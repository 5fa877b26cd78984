//! The envelope handed to handlers.

use crate::{distributor::Distributor, wait::WaitOutcome};
use std::{fmt, sync::Arc, time::Duration};
use strand_core::{LaneId, Message, OwnerId, Predicate, WaitError};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// One event on its way through the dispatch pipeline.
///
/// An envelope is immutable and cheap to clone. Besides the raw event it
/// records who owns the event and which lane is running it, and it keeps a
/// handle on the distributor so the handler can wait for the owner's next
/// event with [`wait_next`](Self::wait_next).
///
/// # Example
///
/// ```rust,ignore
/// let handler = |envelope: Envelope<String>| async move {
///     if envelope.event() == "/confirm" {
///         let answer = envelope
///             .wait_next(|text: &String| text == "yes" || text == "no", Duration::from_secs(30))
///             .await?;
///         // ...
///     }
///     Ok::<_, BoxError>(())
/// };
/// ```
pub struct Envelope<E: Message> {
    inner: Arc<EnvelopeInner<E>>,
}

struct EnvelopeInner<E: Message> {
    event: E,
    owner: OwnerId,
    lane: LaneId,
    sequence: u64,
    received_at: Instant,
    distributor: Option<Distributor<E>>,
}

impl<E: Message> Clone for Envelope<E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<E: Message> Envelope<E> {
    pub(crate) fn new(
        event: E,
        owner: OwnerId,
        lane: LaneId,
        sequence: u64,
        received_at: Instant,
        distributor: Distributor<E>,
    ) -> Self {
        Self {
            inner: Arc::new(EnvelopeInner {
                event,
                owner,
                lane,
                sequence,
                received_at,
                distributor: Some(distributor),
            }),
        }
    }

    /// Build an envelope that is not attached to any distributor.
    ///
    /// Useful to exercise handlers and pipelines directly. Waits requested
    /// through a detached envelope fail with [`WaitError::OutsideLane`].
    pub fn detached(owner: impl Into<OwnerId>, event: E) -> Self {
        Self {
            inner: Arc::new(EnvelopeInner {
                event,
                owner: owner.into(),
                lane: LaneId(0),
                sequence: 0,
                received_at: Instant::now(),
                distributor: None,
            }),
        }
    }

    /// The raw event.
    pub fn event(&self) -> &E {
        &self.inner.event
    }

    /// The owner of the event.
    pub fn owner(&self) -> OwnerId {
        self.inner.owner
    }

    /// The lane running the event.
    pub fn lane(&self) -> LaneId {
        self.inner.lane
    }

    /// Submission sequence number, unique per distributor.
    ///
    /// Every event accepted onto a lane takes the next number. Events handed
    /// straight to a wait or rejected by a full lane take none.
    pub fn sequence(&self) -> u64 {
        self.inner.sequence
    }

    /// When the event was submitted.
    pub fn received_at(&self) -> Instant {
        self.inner.received_at
    }

    /// Wait for the owner's next event accepted by `predicate`.
    ///
    /// The lane stays busy while waiting, so later events of this owner that
    /// do not match stay queued behind the current one.
    pub async fn wait_next<P>(
        &self,
        predicate: P,
        timeout: Duration,
    ) -> Result<WaitOutcome<E>, WaitError>
    where
        P: Predicate<E>,
    {
        match &self.inner.distributor {
            Some(distributor) => distributor.wait(self.owner(), predicate, timeout).await,
            None => Err(WaitError::OutsideLane),
        }
    }

    /// [`wait_next`](Self::wait_next) with the distributor's default timeout.
    pub async fn wait_next_default<P>(&self, predicate: P) -> Result<WaitOutcome<E>, WaitError>
    where
        P: Predicate<E>,
    {
        match &self.inner.distributor {
            Some(distributor) => {
                let timeout = distributor.config().default_wait_timeout;
                distributor.wait(self.owner(), predicate, timeout).await
            }
            None => Err(WaitError::OutsideLane),
        }
    }

    /// Token cancelled when the distributor begins shutting down.
    pub fn cancellation(&self) -> CancellationToken {
        match &self.inner.distributor {
            Some(distributor) => distributor.cancellation(),
            None => CancellationToken::new(),
        }
    }

    /// The distributor that delivered this event, if any.
    pub fn distributor(&self) -> Option<&Distributor<E>> {
        self.inner.distributor.as_ref()
    }
}

impl<E: Message + fmt::Debug> fmt::Debug for Envelope<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Envelope")
            .field("event", &self.inner.event)
            .field("owner", &self.inner.owner)
            .field("lane", &self.inner.lane)
            .field("sequence", &self.inner.sequence)
            .finish_non_exhaustive()
    }
}
