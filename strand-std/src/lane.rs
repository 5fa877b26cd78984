//! Lanes: single-consumer FIFO queues drained by one task at a time.

use crate::{config::OverflowPolicy, distributor::Distributor, envelope::Envelope};
use futures::FutureExt;
use std::{
    any::Any,
    collections::VecDeque,
    panic::AssertUnwindSafe,
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicU64, AtomicUsize, Ordering},
    },
};
use strand_core::{DispatchError, LaneId, Message, OwnerId, SubmitError};
use tokio::{sync::Notify, time::Instant};
use tracing::{trace, warn};

tokio::task_local! {
    /// Owner and lane of the handler invocation running on the current task.
    static CURRENT: LaneContext;
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct LaneContext {
    pub(crate) owner: OwnerId,
    pub(crate) lane: LaneId,
}

impl LaneContext {
    /// The context of the invocation running on this task, if any.
    pub(crate) fn current() -> Option<LaneContext> {
        CURRENT.try_with(|context| *context).ok()
    }
}

/// Counts submitted events that have not finished yet.
pub(crate) struct InFlight {
    count: AtomicUsize,
    idle: Notify,
}

impl InFlight {
    pub(crate) fn new() -> Self {
        Self {
            count: AtomicUsize::new(0),
            idle: Notify::new(),
        }
    }

    pub(crate) fn count(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }

    /// Resolves once no event is queued or running.
    pub(crate) async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.count() == 0 {
                return;
            }
            notified.await;
        }
    }
}

/// Accounting for one accepted event, released when the event is finished
/// or discarded.
pub(crate) struct Ticket {
    owner_pending: Arc<AtomicUsize>,
    in_flight: Arc<InFlight>,
}

impl Ticket {
    pub(crate) fn issue(owner_pending: &Arc<AtomicUsize>, in_flight: &Arc<InFlight>) -> Self {
        owner_pending.fetch_add(1, Ordering::AcqRel);
        in_flight.count.fetch_add(1, Ordering::AcqRel);
        Self {
            owner_pending: Arc::clone(owner_pending),
            in_flight: Arc::clone(in_flight),
        }
    }
}

impl Drop for Ticket {
    fn drop(&mut self) {
        self.owner_pending.fetch_sub(1, Ordering::AcqRel);
        if self.in_flight.count.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.in_flight.idle.notify_waiters();
        }
    }
}

/// An event waiting in a lane.
pub(crate) struct Job<E> {
    pub(crate) owner: OwnerId,
    pub(crate) event: E,
    pub(crate) sequence: u64,
    pub(crate) received_at: Instant,
    pub(crate) ticket: Ticket,
}

struct LaneState<E> {
    queue: VecDeque<Job<E>>,
    processing: bool,
}

/// A sequential worker shared by one or more owners.
pub(crate) struct Lane<E> {
    id: LaneId,
    created_at: Instant,
    owners: AtomicUsize,
    processed: AtomicU64,
    state: Mutex<LaneState<E>>,
}

impl<E: Message> Lane<E> {
    pub(crate) fn new(id: LaneId) -> Self {
        Self {
            id,
            created_at: Instant::now(),
            owners: AtomicUsize::new(0),
            processed: AtomicU64::new(0),
            state: Mutex::new(LaneState {
                queue: VecDeque::new(),
                processing: false,
            }),
        }
    }

    pub(crate) fn id(&self) -> LaneId {
        self.id
    }

    pub(crate) fn created_at(&self) -> Instant {
        self.created_at
    }

    pub(crate) fn owner_count(&self) -> usize {
        self.owners.load(Ordering::Acquire)
    }

    pub(crate) fn attach(&self) {
        self.owners.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn detach(&self) {
        self.owners.fetch_sub(1, Ordering::AcqRel);
    }

    pub(crate) fn processed(&self) -> u64 {
        self.processed.load(Ordering::Acquire)
    }

    pub(crate) fn depth(&self) -> usize {
        self.lock().queue.len()
    }

    pub(crate) fn is_processing(&self) -> bool {
        self.lock().processing
    }

    fn lock(&self) -> MutexGuard<'_, LaneState<E>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a job to the tail, stamping it with the next number from
    /// `sequence`.
    ///
    /// A rejected job takes no number, so accepted events are numbered
    /// without gaps. Returns the job's number and `true` when the lane was
    /// idle; the caller then owns starting the drain task.
    pub(crate) fn enqueue(
        &self,
        mut job: Job<E>,
        sequence: &AtomicU64,
        capacity: Option<usize>,
        overflow: OverflowPolicy,
    ) -> Result<(u64, bool), SubmitError> {
        let mut dropped = None;
        let accepted = {
            let mut state = self.lock();
            if let Some(capacity) = capacity {
                if state.queue.len() >= capacity {
                    match overflow {
                        OverflowPolicy::Reject => {
                            return Err(SubmitError::QueueFull {
                                lane: self.id,
                                capacity,
                            });
                        }
                        OverflowPolicy::DropOldest => dropped = state.queue.pop_front(),
                    }
                }
            }
            job.sequence = sequence.fetch_add(1, Ordering::Relaxed);
            let number = job.sequence;
            state.queue.push_back(job);
            (number, !std::mem::replace(&mut state.processing, true))
        };

        if let Some(old) = dropped {
            warn!(
                lane = %self.id,
                owner = %old.owner,
                sequence = old.sequence,
                "lane full, dropped oldest queued event"
            );
        }
        Ok(accepted)
    }

    /// Pop the head, or mark the lane idle when the queue is empty.
    fn next_job(&self) -> Option<Job<E>> {
        let mut state = self.lock();
        let job = state.queue.pop_front();
        if job.is_none() {
            state.processing = false;
        }
        job
    }

    /// Remove every queued job, leaving the running one alone.
    pub(crate) fn discard_queued(&self) -> usize {
        let discarded: Vec<Job<E>> = self.lock().queue.drain(..).collect();
        discarded.len()
    }
}

/// Drain `lane` until its queue is empty.
pub(crate) async fn drain<E: Message>(distributor: Distributor<E>, lane: Arc<Lane<E>>) {
    while let Some(job) = lane.next_job() {
        if distributor.is_aborted() {
            warn!(
                owner = %job.owner,
                sequence = job.sequence,
                "distributor stopped, discarding queued event"
            );
            continue;
        }

        let Job {
            owner,
            event,
            sequence,
            received_at,
            ticket,
        } = job;
        let envelope = Envelope::new(
            event,
            owner,
            lane.id(),
            sequence,
            received_at,
            distributor.clone(),
        );
        let pipeline = distributor.pipeline();
        let context = LaneContext {
            owner,
            lane: lane.id(),
        };

        trace!(%owner, sequence, "dispatching event");
        let outcome = CURRENT
            .scope(
                context,
                AssertUnwindSafe(pipeline.dispatch(&envelope)).catch_unwind(),
            )
            .await;

        let failure = match outcome {
            Ok(Ok(report)) => {
                trace!(%owner, sequence, invoked = ?report.invoked, halted = report.halted, "event handled");
                None
            }
            Ok(Err(error)) => Some(error),
            Err(panic) => Some(DispatchError::Panic(panic_message(panic.as_ref()))),
        };
        if let Some(error) = failure {
            distributor.report_error(&envelope, error).await;
        }

        lane.processed.fetch_add(1, Ordering::AcqRel);
        drop(ticket);
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&'static str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        String::from("non-string panic payload")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(in_flight: &Arc<InFlight>, pending: &Arc<AtomicUsize>, event: u32) -> Job<u32> {
        Job {
            owner: OwnerId(1),
            event,
            sequence: 0,
            received_at: Instant::now(),
            ticket: Ticket::issue(pending, in_flight),
        }
    }

    #[test]
    fn test_enqueue_starts_drain_once() {
        let lane = Lane::<u32>::new(LaneId(0));
        let in_flight = Arc::new(InFlight::new());
        let pending = Arc::new(AtomicUsize::new(0));
        let sequence = AtomicU64::new(0);

        let first = lane
            .enqueue(job(&in_flight, &pending, 10), &sequence, None, OverflowPolicy::Reject)
            .unwrap();
        let second = lane
            .enqueue(job(&in_flight, &pending, 11), &sequence, None, OverflowPolicy::Reject)
            .unwrap();
        assert_eq!(first, (0, true));
        assert_eq!(second, (1, false));
        assert!(lane.is_processing());
        assert_eq!(lane.depth(), 2);
        assert_eq!(pending.load(Ordering::Acquire), 2);

        assert_eq!(lane.next_job().map(|job| (job.sequence, job.event)), Some((0, 10)));
        assert_eq!(lane.next_job().map(|job| (job.sequence, job.event)), Some((1, 11)));
        assert!(lane.next_job().is_none());
        assert!(!lane.is_processing());
        assert_eq!(pending.load(Ordering::Acquire), 0);
        assert_eq!(in_flight.count(), 0);
    }

    #[test]
    fn test_overflow_policies() {
        let lane = Lane::<u32>::new(LaneId(3));
        let in_flight = Arc::new(InFlight::new());
        let pending = Arc::new(AtomicUsize::new(0));
        let sequence = AtomicU64::new(0);

        lane.enqueue(job(&in_flight, &pending, 0), &sequence, Some(2), OverflowPolicy::Reject)
            .unwrap();
        lane.enqueue(job(&in_flight, &pending, 1), &sequence, Some(2), OverflowPolicy::Reject)
            .unwrap();
        let err = lane
            .enqueue(job(&in_flight, &pending, 2), &sequence, Some(2), OverflowPolicy::Reject)
            .unwrap_err();
        assert_eq!(
            err,
            SubmitError::QueueFull {
                lane: LaneId(3),
                capacity: 2
            }
        );
        // The rejected job released its accounting and took no number.
        assert_eq!(pending.load(Ordering::Acquire), 2);
        assert_eq!(sequence.load(Ordering::Relaxed), 2);

        let (number, _) = lane
            .enqueue(job(&in_flight, &pending, 3), &sequence, Some(2), OverflowPolicy::DropOldest)
            .unwrap();
        assert_eq!(number, 2);
        assert_eq!(lane.depth(), 2);
        assert_eq!(pending.load(Ordering::Acquire), 2);
        assert_eq!(lane.next_job().map(|job| (job.sequence, job.event)), Some((1, 1)));
        assert_eq!(lane.next_job().map(|job| (job.sequence, job.event)), Some((2, 3)));
    }

    #[test]
    fn test_discard_queued_keeps_processing_flag() {
        let lane = Lane::<u32>::new(LaneId(0));
        let in_flight = Arc::new(InFlight::new());
        let pending = Arc::new(AtomicUsize::new(0));
        let sequence = AtomicU64::new(0);

        lane.enqueue(job(&in_flight, &pending, 0), &sequence, None, OverflowPolicy::Reject)
            .unwrap();
        lane.enqueue(job(&in_flight, &pending, 1), &sequence, None, OverflowPolicy::Reject)
            .unwrap();
        assert_eq!(lane.discard_queued(), 2);
        assert!(lane.is_processing());
        assert_eq!(in_flight.count(), 0);
    }

    #[tokio::test]
    async fn test_wait_idle_resolves_after_last_ticket() {
        let in_flight = Arc::new(InFlight::new());
        let pending = Arc::new(AtomicUsize::new(0));
        in_flight.wait_idle().await;

        let ticket = Ticket::issue(&pending, &in_flight);
        let waiter = {
            let in_flight = Arc::clone(&in_flight);
            tokio::spawn(async move { in_flight.wait_idle().await })
        };
        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());

        drop(ticket);
        waiter.await.unwrap();
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn Any + Send> = Box::new("static");
        assert_eq!(panic_message(payload.as_ref()), "static");
        let payload: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(payload.as_ref()), "owned");
        let payload: Box<dyn Any + Send> = Box::new(7_u8);
        assert_eq!(panic_message(payload.as_ref()), "non-string panic payload");
    }

    #[test]
    fn test_no_context_outside_lane() {
        assert!(LaneContext::current().is_none());
    }
}
