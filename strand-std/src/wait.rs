//! Wait registry: one-shot intercepts for an owner's next matching event.
//!
//! A handler that waits registers a slot holding its predicate, its deadline
//! and the sending half of a oneshot channel. `submit` offers every event to
//! the open slots of its owner, oldest first, before the event may reach a
//! lane. Each slot carries an atomic claim, and only the claimer may resolve
//! it, so a slot is resolved once even when a matching event races the
//! deadline or shutdown.

use dashmap::DashMap;
use std::{
    collections::VecDeque,
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    time::Duration,
};
use strand_core::{BoxPredicate, OwnerId, Predicate};
use tokio::{
    sync::oneshot,
    time::{Instant, sleep_until},
};
use tokio_util::sync::CancellationToken;
use tracing::trace;

/// How a wait ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitOutcome<E> {
    /// A matching event arrived before the deadline.
    Matched(E),
    /// The deadline passed first.
    TimedOut,
    /// The distributor shut down while waiting.
    Cancelled,
}

impl<E> WaitOutcome<E> {
    /// The matched event, if any.
    pub fn matched(self) -> Option<E> {
        match self {
            WaitOutcome::Matched(event) => Some(event),
            _ => None,
        }
    }

    /// Returns `true` for [`WaitOutcome::Matched`].
    pub fn is_matched(&self) -> bool {
        matches!(self, WaitOutcome::Matched(_))
    }

    /// Returns `true` for [`WaitOutcome::TimedOut`].
    pub fn is_timed_out(&self) -> bool {
        matches!(self, WaitOutcome::TimedOut)
    }

    /// Returns `true` for [`WaitOutcome::Cancelled`].
    pub fn is_cancelled(&self) -> bool {
        matches!(self, WaitOutcome::Cancelled)
    }
}

struct WaitSlot<E> {
    id: u64,
    predicate: BoxPredicate<E>,
    deadline: Instant,
    claimed: AtomicBool,
    sender: Mutex<Option<oneshot::Sender<E>>>,
}

impl<E> WaitSlot<E> {
    /// Wins the right to resolve this slot. Succeeds at most once.
    fn claim(&self) -> bool {
        self.claimed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn is_open(&self, now: Instant) -> bool {
        !self.claimed.load(Ordering::Acquire) && self.deadline > now
    }

    fn take_sender(&self) -> Option<oneshot::Sender<E>> {
        self.sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

/// Outstanding waits, keyed by owner.
pub(crate) struct WaitRegistry<E> {
    slots: DashMap<OwnerId, VecDeque<Arc<WaitSlot<E>>>>,
    next_id: AtomicU64,
}

impl<E: 'static> WaitRegistry<E> {
    pub(crate) fn new() -> Self {
        Self {
            slots: DashMap::new(),
            next_id: AtomicU64::new(0),
        }
    }

    /// Offer an event to the open waits of `owner`, oldest first.
    ///
    /// Returns the event back when no wait took it.
    pub(crate) fn offer(&self, owner: OwnerId, event: E) -> Result<(), E> {
        // Predicates run outside of the map's shard lock.
        let candidates: Vec<Arc<WaitSlot<E>>> = match self.slots.get(&owner) {
            Some(queue) => queue.iter().cloned().collect(),
            None => return Err(event),
        };

        let now = Instant::now();
        let mut event = event;
        for slot in candidates {
            if !slot.is_open(now) || !slot.predicate.matches(&event) || !slot.claim() {
                continue;
            }
            self.remove(owner, slot.id);
            let Some(sender) = slot.take_sender() else {
                continue;
            };
            match sender.send(event) {
                Ok(()) => {
                    trace!(%owner, wait = slot.id, "event delivered to waiting handler");
                    return Ok(());
                }
                // The waiting side is gone; try the next wait.
                Err(returned) => event = returned,
            }
        }
        Err(event)
    }

    /// Register a wait and suspend until it resolves.
    pub(crate) async fn wait(
        &self,
        owner: OwnerId,
        predicate: BoxPredicate<E>,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> WaitOutcome<E> {
        let (sender, mut receiver) = oneshot::channel();
        let slot = Arc::new(WaitSlot {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            predicate,
            deadline: Instant::now() + timeout,
            claimed: AtomicBool::new(false),
            sender: Mutex::new(Some(sender)),
        });
        self.slots
            .entry(owner)
            .or_default()
            .push_back(Arc::clone(&slot));
        trace!(%owner, wait = slot.id, ?timeout, "wait registered");

        let _registration = Registration {
            registry: self,
            owner,
            slot: Arc::clone(&slot),
        };

        tokio::select! {
            biased;
            delivered = &mut receiver => resolved(delivered),
            _ = sleep_until(slot.deadline) => {
                if slot.claim() {
                    trace!(%owner, wait = slot.id, "wait timed out");
                    WaitOutcome::TimedOut
                } else {
                    resolved(receiver.await)
                }
            }
            _ = cancel.cancelled() => {
                if slot.claim() {
                    trace!(%owner, wait = slot.id, "wait cancelled");
                    WaitOutcome::Cancelled
                } else {
                    resolved(receiver.await)
                }
            }
        }
    }

    /// Number of waits that can still be resolved by an event.
    pub(crate) fn open_waits(&self) -> usize {
        let now = Instant::now();
        self.slots
            .iter()
            .map(|queue| queue.iter().filter(|slot| slot.is_open(now)).count())
            .sum()
    }

    pub(crate) fn has_waits(&self, owner: OwnerId) -> bool {
        self.slots.contains_key(&owner)
    }

    fn remove(&self, owner: OwnerId, id: u64) {
        let emptied = match self.slots.get_mut(&owner) {
            Some(mut queue) => {
                queue.retain(|slot| slot.id != id);
                queue.is_empty()
            }
            None => false,
        };
        if emptied {
            self.slots.remove_if(&owner, |_, queue| queue.is_empty());
        }
    }
}

fn resolved<E>(delivered: Result<E, oneshot::error::RecvError>) -> WaitOutcome<E> {
    match delivered {
        Ok(event) => WaitOutcome::Matched(event),
        Err(_) => WaitOutcome::Cancelled,
    }
}

/// Deregisters a wait when the waiting future completes or is dropped.
struct Registration<'a, E: 'static> {
    registry: &'a WaitRegistry<E>,
    owner: OwnerId,
    slot: Arc<WaitSlot<E>>,
}

impl<E: 'static> Drop for Registration<'_, E> {
    fn drop(&mut self) {
        self.slot.claimed.store(true, Ordering::Release);
        self.registry.remove(self.owner, self.slot.id);
    }
}
