//! The distributor: owner-to-lane binding, submission and lifecycle.
//!
//! Every owner is bound to exactly one lane the first time it is seen and
//! stays there until it is evicted, so its events are always drained by the
//! same sequential worker. Lanes are created lazily up to
//! [`DistributorConfig::max_lanes`]; after that owners share lanes according
//! to the [`AssignmentStrategy`].
//!
//! Before an event reaches a lane it is offered to the waits its owner has
//! open, oldest first. A wait that accepts it receives it directly and the
//! dispatch pipeline never sees it.

use crate::{
    config::{AssignmentStrategy, DistributorConfig},
    envelope::Envelope,
    lane::{InFlight, Job, Lane, LaneContext, Ticket, drain},
    pipeline::{DispatchPipeline, HandlerDescriptor},
    sink::{ErrorHandler, LogErrors},
    wait::{WaitOutcome, WaitRegistry},
};
use dashmap::DashMap;
use futures::FutureExt;
use std::{
    fmt,
    panic::AssertUnwindSafe,
    sync::{
        Arc, PoisonError, RwLock,
        atomic::{AtomicU64, AtomicUsize, Ordering},
    },
    time::Duration,
};
use strand_core::{
    ConfigError, DispatchError, LaneId, Message, OwnerId, Predicate, SubmitError, WaitError,
};
use tokio::{runtime::Handle, time::Instant};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, trace, warn};

/// Where a submitted event went.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Routed {
    /// A waiting handler of the owner took the event.
    Waiter,
    /// The event was queued on the owner's lane.
    Lane(LaneId),
}

/// Load snapshot of one lane.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaneMetrics {
    /// Lane identifier.
    pub id: LaneId,
    /// Events queued behind the running one.
    pub depth: usize,
    /// Whether a drain task is active.
    pub processing: bool,
    /// Owners bound to the lane.
    pub owners: usize,
    /// Events the lane has finished.
    pub processed: u64,
    /// Time since the lane was created.
    pub age: Duration,
}

/// Load snapshot of the whole distributor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolMetrics {
    /// Per-lane metrics, by lane id.
    pub lanes: Vec<LaneMetrics>,
    /// Owners currently bound to a lane.
    pub owners: usize,
    /// Waits that can still be resolved by an event.
    pub open_waits: usize,
}

/// Result of [`Distributor::shutdown`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Every accepted event finished within the grace period.
    pub idle: bool,
    /// Events unfinished when the grace period ended. Queued ones among
    /// them were discarded.
    pub pending: usize,
}

struct Assignment<E> {
    lane: Arc<Lane<E>>,
    assigned_at: Instant,
    pending: Arc<AtomicUsize>,
}

struct Shared<E: Message> {
    config: DistributorConfig,
    lanes: RwLock<Vec<Arc<Lane<E>>>>,
    owners: DashMap<OwnerId, Assignment<E>>,
    rotation: AtomicUsize,
    sequence: AtomicU64,
    waits: WaitRegistry<E>,
    pipeline: RwLock<Arc<DispatchPipeline<E>>>,
    errors: Arc<dyn ErrorHandler<E>>,
    in_flight: Arc<InFlight>,
    shutdown: CancellationToken,
    abort: CancellationToken,
    runtime: Handle,
}

/// Routes owner-tagged events to lanes and serves in-handler waits.
///
/// `Distributor` is a cheap handle; clones share the same lanes.
///
/// # Example
///
/// ```rust,ignore
/// let distributor = Distributor::builder()
///     .config(DistributorConfig::new().with_max_lanes(8))
///     .handler(HandlerDescriptor::new("echo", |envelope: Envelope<String>| async move {
///         println!("{}: {}", envelope.owner(), envelope.event());
///     }))
///     .build()?;
///
/// distributor.submit(42, "hello".to_string())?;
/// distributor.wait_idle().await;
/// ```
pub struct Distributor<E: Message> {
    shared: Arc<Shared<E>>,
}

impl<E: Message> Clone for Distributor<E> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<E: Message> Distributor<E> {
    /// Start building a distributor.
    pub fn builder() -> DistributorBuilder<E> {
        DistributorBuilder::new()
    }

    /// The configuration the distributor runs with.
    pub fn config(&self) -> &DistributorConfig {
        &self.shared.config
    }

    /// Submit an event for `owner`. Never waits for the event to be handled.
    pub fn submit(&self, owner: impl Into<OwnerId>, event: E) -> Result<Routed, SubmitError> {
        let owner = owner.into();
        let shared = &self.shared;
        if shared.shutdown.is_cancelled() {
            return Err(SubmitError::Shutdown);
        }

        let event = match shared.waits.offer(owner, event) {
            Ok(()) => return Ok(Routed::Waiter),
            Err(event) => event,
        };

        // The shard lock serializes binding and ticketing with eviction.
        let (lane, ticket) = {
            let assignment = shared
                .owners
                .entry(owner)
                .or_insert_with(|| self.bind(owner));
            let ticket = Ticket::issue(&assignment.pending, &shared.in_flight);
            (Arc::clone(&assignment.lane), ticket)
        };

        let job = Job {
            owner,
            event,
            sequence: 0,
            received_at: Instant::now(),
            ticket,
        };
        let (sequence, start) = lane.enqueue(
            job,
            &shared.sequence,
            shared.config.queue_capacity,
            shared.config.overflow,
        )?;
        trace!(%owner, lane = %lane.id(), sequence, "event queued");

        if start {
            let span = tracing::debug_span!("lane", id = lane.id().index());
            shared
                .runtime
                .spawn(drain(self.clone(), Arc::clone(&lane)).instrument(span));
        }
        Ok(Routed::Lane(lane.id()))
    }

    /// Pick a lane for a first-seen owner.
    fn bind(&self, owner: OwnerId) -> Assignment<E> {
        let shared = &self.shared;
        let mut lanes = shared
            .lanes
            .write()
            .unwrap_or_else(PoisonError::into_inner);

        let lane = if let Some(vacant) = lanes.iter().find(|lane| lane.owner_count() == 0) {
            Arc::clone(vacant)
        } else if lanes.len() < shared.config.max_lanes {
            let lane = Arc::new(Lane::new(LaneId(lanes.len())));
            debug!(lane = %lane.id(), "lane created");
            lanes.push(Arc::clone(&lane));
            lane
        } else {
            let index = match shared.config.assignment {
                AssignmentStrategy::RoundRobin => {
                    shared.rotation.fetch_add(1, Ordering::Relaxed) % lanes.len()
                }
                AssignmentStrategy::LeastLoaded => lanes
                    .iter()
                    .enumerate()
                    .min_by_key(|(index, lane)| (lane.owner_count(), lane.depth(), *index))
                    .map(|(index, _)| index)
                    .unwrap_or(0),
            };
            Arc::clone(&lanes[index])
        };

        lane.attach();
        debug!(%owner, lane = %lane.id(), "owner bound");
        Assignment {
            lane,
            assigned_at: Instant::now(),
            pending: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Wait for the next event of `owner` accepted by `predicate`.
    ///
    /// Only a handler running on a lane for `owner` may wait; anything else
    /// is rejected immediately. While waiting the lane stays busy, so later
    /// events of the owner that the predicate refuses stay queued in order.
    pub async fn wait<P>(
        &self,
        owner: impl Into<OwnerId>,
        predicate: P,
        timeout: Duration,
    ) -> Result<WaitOutcome<E>, WaitError>
    where
        P: Predicate<E>,
    {
        let owner = owner.into();
        let context = LaneContext::current().ok_or(WaitError::OutsideLane)?;
        if context.owner != owner {
            return Err(WaitError::ForeignOwner {
                current: context.owner,
                requested: owner,
            });
        }
        if self.shared.shutdown.is_cancelled() {
            return Ok(WaitOutcome::Cancelled);
        }

        trace!(%owner, lane = %context.lane, "handler waiting for next event");
        Ok(self
            .shared
            .waits
            .wait(owner, predicate.boxed(), timeout, &self.shared.shutdown)
            .await)
    }

    /// Add handler descriptors to the running pipeline.
    ///
    /// Events already being dispatched finish with the pipeline they started
    /// with.
    pub fn register_handlers(&self, descriptors: impl IntoIterator<Item = HandlerDescriptor<E>>) {
        let mut pipeline = self
            .shared
            .pipeline
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let extended = pipeline.extended(descriptors);
        debug!(descriptors = extended.len(), "handlers registered");
        *pipeline = Arc::new(extended);
    }

    pub(crate) fn pipeline(&self) -> Arc<DispatchPipeline<E>> {
        Arc::clone(
            &self
                .shared
                .pipeline
                .read()
                .unwrap_or_else(PoisonError::into_inner),
        )
    }

    /// Hand a failure to the error handler. A panicking error handler is
    /// logged and otherwise ignored so the lane keeps draining.
    pub(crate) async fn report_error(&self, envelope: &Envelope<E>, error: DispatchError) {
        let reported = AssertUnwindSafe(self.shared.errors.on_error(envelope, error))
            .catch_unwind()
            .await;
        if reported.is_err() {
            error!(
                owner = %envelope.owner(),
                sequence = envelope.sequence(),
                "error handler panicked"
            );
        }
    }

    pub(crate) fn is_aborted(&self) -> bool {
        self.shared.abort.is_cancelled()
    }

    /// The lane `owner` is bound to, if it has been seen.
    pub fn lane_of(&self, owner: impl Into<OwnerId>) -> Option<LaneId> {
        self.shared
            .owners
            .get(&owner.into())
            .map(|assignment| assignment.lane.id())
    }

    /// How long `owner` has been bound to its lane.
    pub fn bound_for(&self, owner: impl Into<OwnerId>) -> Option<Duration> {
        self.shared
            .owners
            .get(&owner.into())
            .map(|assignment| assignment.assigned_at.elapsed())
    }

    /// Snapshot the current load.
    pub fn metrics(&self) -> PoolMetrics {
        // Owner map first: binding holds a shard lock while taking the lanes lock.
        let owners = self.shared.owners.len();
        let open_waits = self.shared.waits.open_waits();
        let lanes = self
            .shared
            .lanes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|lane| LaneMetrics {
                id: lane.id(),
                depth: lane.depth(),
                processing: lane.is_processing(),
                owners: lane.owner_count(),
                processed: lane.processed(),
                age: lane.created_at().elapsed(),
            })
            .collect();

        PoolMetrics {
            lanes,
            owners,
            open_waits,
        }
    }

    /// Unbind owners with nothing queued, nothing running and no open wait.
    ///
    /// Returns the number of owners removed. An evicted owner is bound anew
    /// on its next submission; a lane left without owners is reused first.
    pub fn evict_idle_owners(&self) -> usize {
        let shared = &self.shared;
        let candidates: Vec<OwnerId> = shared
            .owners
            .iter()
            .filter(|entry| entry.pending.load(Ordering::Acquire) == 0)
            .map(|entry| *entry.key())
            .collect();

        let mut evicted = 0;
        for owner in candidates {
            let removed = shared.owners.remove_if(&owner, |_, assignment| {
                assignment.pending.load(Ordering::Acquire) == 0 && !shared.waits.has_waits(owner)
            });
            if let Some((_, assignment)) = removed {
                assignment.lane.detach();
                debug!(%owner, lane = %assignment.lane.id(), "owner evicted");
                evicted += 1;
            }
        }
        evicted
    }

    /// Resolves once no accepted event is queued or running.
    pub async fn wait_idle(&self) {
        self.shared.in_flight.wait_idle().await;
    }

    /// Token cancelled when shutdown begins.
    pub fn cancellation(&self) -> CancellationToken {
        self.shared.shutdown.clone()
    }

    /// Whether shutdown has begun.
    pub fn is_shut_down(&self) -> bool {
        self.shared.shutdown.is_cancelled()
    }

    /// Stop accepting events and wind the lanes down.
    ///
    /// Open waits resolve as [`WaitOutcome::Cancelled`] and the cancellation
    /// token handed to handlers fires. Lanes keep draining for at most
    /// `grace`; whatever is still queued afterwards is discarded, while a
    /// handler already running is left to finish on its own.
    pub async fn shutdown(&self, grace: Duration) -> ShutdownReport {
        let shared = &self.shared;
        info!(?grace, in_flight = shared.in_flight.count(), "distributor shutting down");
        shared.shutdown.cancel();

        if tokio::time::timeout(grace, self.wait_idle()).await.is_ok() {
            info!("distributor stopped");
            return ShutdownReport {
                idle: true,
                pending: 0,
            };
        }

        let pending = shared.in_flight.count();
        shared.abort.cancel();
        let lanes: Vec<Arc<Lane<E>>> = shared
            .lanes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let discarded: usize = lanes.iter().map(|lane| lane.discard_queued()).sum();
        warn!(pending, discarded, "grace period elapsed, discarded queued events");

        ShutdownReport {
            idle: false,
            pending,
        }
    }

    /// [`shutdown`](Self::shutdown) with the configured grace period.
    pub async fn close(&self) -> ShutdownReport {
        self.shutdown(self.shared.config.shutdown_grace).await
    }
}

impl<E: Message> fmt::Debug for Distributor<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Distributor")
            .field("config", &self.shared.config)
            .field("owners", &self.shared.owners.len())
            .field("in_flight", &self.shared.in_flight.count())
            .finish_non_exhaustive()
    }
}

/// Builder for a [`Distributor`].
pub struct DistributorBuilder<E: Message> {
    config: DistributorConfig,
    descriptors: Vec<HandlerDescriptor<E>>,
    errors: Option<Arc<dyn ErrorHandler<E>>>,
    runtime: Option<Handle>,
}

impl<E: Message> Default for DistributorBuilder<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Message> DistributorBuilder<E> {
    /// Create a builder with the default configuration and no handlers.
    pub fn new() -> Self {
        Self {
            config: DistributorConfig::default(),
            descriptors: Vec::new(),
            errors: None,
            runtime: None,
        }
    }

    /// Use `config`.
    pub fn config(mut self, config: DistributorConfig) -> Self {
        self.config = config;
        self
    }

    /// Register one handler descriptor.
    pub fn handler(mut self, descriptor: HandlerDescriptor<E>) -> Self {
        self.descriptors.push(descriptor);
        self
    }

    /// Register several handler descriptors, in order.
    pub fn handlers(mut self, descriptors: impl IntoIterator<Item = HandlerDescriptor<E>>) -> Self {
        self.descriptors.extend(descriptors);
        self
    }

    /// Send dispatch failures to `errors` instead of [`LogErrors`].
    pub fn error_handler<H: ErrorHandler<E>>(mut self, errors: H) -> Self {
        self.errors = Some(Arc::new(errors));
        self
    }

    /// Spawn lane tasks on `runtime` instead of the current runtime.
    pub fn runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    /// Validate the configuration and create the distributor.
    pub fn build(self) -> Result<Distributor<E>, ConfigError> {
        self.config.validate()?;
        let runtime = match self.runtime {
            Some(runtime) => runtime,
            None => Handle::try_current().map_err(|err| ConfigError::NoRuntime(err.to_string()))?,
        };
        let errors: Arc<dyn ErrorHandler<E>> = match self.errors {
            Some(errors) => errors,
            None => Arc::new(LogErrors),
        };

        debug!(
            max_lanes = self.config.max_lanes,
            handlers = self.descriptors.len(),
            "distributor built"
        );
        Ok(Distributor {
            shared: Arc::new(Shared {
                config: self.config,
                lanes: RwLock::new(Vec::new()),
                owners: DashMap::new(),
                rotation: AtomicUsize::new(0),
                sequence: AtomicU64::new(0),
                waits: WaitRegistry::new(),
                pipeline: RwLock::new(Arc::new(DispatchPipeline::new(self.descriptors))),
                errors,
                in_flight: Arc::new(InFlight::new()),
                shutdown: CancellationToken::new(),
                abort: CancellationToken::new(),
                runtime,
            }),
        })
    }
}
