use std::{
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};
use strand::{
    AssignmentStrategy, DistributorConfig, Envelope, HandlerDescriptor, LaneId, OverflowPolicy,
    SubmitError, testing::RecordingHandler,
};
use tokio::sync::{Barrier, Notify};

mod common;
use common::{distributor, until};

/// Blocks on `gate` for events named "hold", counting started invocations.
fn gated(
    gate: &Arc<Notify>,
    started: &Arc<AtomicUsize>,
    recorder: &RecordingHandler<String>,
) -> HandlerDescriptor<String> {
    let gate = gate.clone();
    let started = started.clone();
    let recorder = recorder.clone();
    HandlerDescriptor::new("gated", move |envelope: Envelope<String>| {
        let gate = gate.clone();
        let started = started.clone();
        let recorder = recorder.clone();
        async move {
            started.fetch_add(1, Ordering::SeqCst);
            if envelope.event() == "hold" {
                gate.notified().await;
            }
            strand::Handler::call(&recorder, envelope).await;
        }
    })
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_two_lanes_shared_by_five_owners() {
    let recorder = RecordingHandler::new();
    let distributor = distributor(
        DistributorConfig::new().with_max_lanes(2),
        vec![HandlerDescriptor::new("record", recorder.clone())],
    );

    for round in 0..20 {
        for owner in 0..5_i64 {
            distributor
                .submit(owner, format!("{owner}-{round}"))
                .unwrap();
        }
    }
    distributor.wait_idle().await;

    // Round robin once both lanes exist.
    let lanes: Vec<LaneId> = (0..5_i64)
        .map(|owner| distributor.lane_of(owner).unwrap())
        .collect();
    assert_eq!(
        lanes,
        vec![LaneId(0), LaneId(1), LaneId(0), LaneId(1), LaneId(0)]
    );

    for owner in 0..5_i64 {
        let expected: Vec<String> = (0..20).map(|round| format!("{owner}-{round}")).collect();
        assert_eq!(recorder.events_of(owner), expected);
    }
    assert_eq!(recorder.len(), 100);

    let metrics = distributor.metrics();
    assert_eq!(metrics.owners, 5);
    assert_eq!(metrics.lanes.len(), 2);
    assert_eq!(metrics.lanes[0].owners, 3);
    assert_eq!(metrics.lanes[1].owners, 2);
    assert_eq!(metrics.lanes[0].processed, 60);
    assert_eq!(metrics.lanes[1].processed, 40);
    assert!(metrics.lanes.iter().all(|lane| lane.depth == 0));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_first_seen_owners_share_two_lanes() {
    let recorder = RecordingHandler::new();
    let distributor = distributor(
        DistributorConfig::new().with_max_lanes(2),
        vec![HandlerDescriptor::new("record", recorder.clone())],
    );

    let barrier = Arc::new(Barrier::new(5));
    let submitters: Vec<_> = (0..5_i64)
        .map(|owner| {
            let distributor = distributor.clone();
            let barrier = barrier.clone();
            tokio::spawn(async move {
                barrier.wait().await;
                for round in 0..20 {
                    distributor
                        .submit(owner, format!("{owner}-{round}"))
                        .unwrap();
                    tokio::task::yield_now().await;
                }
            })
        })
        .collect();
    for submitter in submitters {
        submitter.await.unwrap();
    }
    distributor.wait_idle().await;

    let bound: Vec<LaneId> = (0..5_i64)
        .map(|owner| distributor.lane_of(owner).unwrap())
        .collect();
    assert!(bound.iter().all(|lane| lane.index() < 2));

    let metrics = distributor.metrics();
    assert_eq!(metrics.owners, 5);
    assert_eq!(metrics.lanes.len(), 2);
    let mut owners: Vec<usize> = metrics.lanes.iter().map(|lane| lane.owners).collect();
    owners.sort_unstable();
    assert_eq!(owners, vec![2, 3]);
    for lane in &metrics.lanes {
        assert_eq!(lane.processed, 20 * lane.owners as u64);
        assert_eq!(
            bound.iter().filter(|id| **id == lane.id).count(),
            lane.owners
        );
    }

    for owner in 0..5_i64 {
        let expected: Vec<String> = (0..20).map(|round| format!("{owner}-{round}")).collect();
        assert_eq!(recorder.events_of(owner), expected);
    }
    assert_eq!(recorder.len(), 100);

    // Bindings survive further traffic.
    for owner in 0..5_i64 {
        distributor.submit(owner, format!("{owner}-late")).unwrap();
    }
    distributor.wait_idle().await;
    let rebound: Vec<LaneId> = (0..5_i64)
        .map(|owner| distributor.lane_of(owner).unwrap())
        .collect();
    assert_eq!(rebound, bound);
    assert_eq!(recorder.len(), 105);
}

#[tokio::test]
async fn test_least_loaded_assignment() {
    let distributor = distributor(
        DistributorConfig::new()
            .with_max_lanes(2)
            .with_assignment(AssignmentStrategy::LeastLoaded),
        vec![],
    );

    for owner in 0..4_i64 {
        distributor.submit(owner, "hi".to_string()).unwrap();
        distributor.wait_idle().await;
    }

    assert_eq!(distributor.lane_of(0), Some(LaneId(0)));
    assert_eq!(distributor.lane_of(1), Some(LaneId(1)));
    assert_eq!(distributor.lane_of(2), Some(LaneId(0)));
    assert_eq!(distributor.lane_of(3), Some(LaneId(1)));
}

#[tokio::test]
async fn test_overflow_rejects_when_lane_is_full() {
    let gate = Arc::new(Notify::new());
    let started = Arc::new(AtomicUsize::new(0));
    let recorder = RecordingHandler::new();
    let distributor = distributor(
        DistributorConfig::new()
            .with_max_lanes(1)
            .with_queue_capacity(1),
        vec![gated(&gate, &started, &recorder)],
    );

    distributor.submit(1, "hold".to_string()).unwrap();
    until(|| started.load(Ordering::SeqCst) == 1).await;

    distributor.submit(1, "queued".to_string()).unwrap();
    let err = distributor.submit(2, "rejected".to_string()).unwrap_err();
    assert_eq!(
        err,
        SubmitError::QueueFull {
            lane: LaneId(0),
            capacity: 1,
        }
    );
    assert_eq!(distributor.metrics().lanes[0].depth, 1);

    gate.notify_one();
    distributor.wait_idle().await;
    assert_eq!(recorder.events(), vec!["hold", "queued"]);
}

#[tokio::test]
async fn test_overflow_drops_oldest() {
    let gate = Arc::new(Notify::new());
    let started = Arc::new(AtomicUsize::new(0));
    let recorder = RecordingHandler::new();
    let distributor = distributor(
        DistributorConfig::new()
            .with_max_lanes(1)
            .with_queue_capacity(2)
            .with_overflow(OverflowPolicy::DropOldest),
        vec![gated(&gate, &started, &recorder)],
    );

    distributor.submit(1, "hold".to_string()).unwrap();
    until(|| started.load(Ordering::SeqCst) == 1).await;

    for event in ["a", "b", "c", "d"] {
        distributor.submit(1, event.to_string()).unwrap();
    }
    assert_eq!(distributor.metrics().lanes[0].depth, 2);

    gate.notify_one();
    distributor.wait_idle().await;
    assert_eq!(recorder.events(), vec!["hold", "c", "d"]);
}

#[tokio::test]
async fn test_evict_idle_owners_frees_lanes() {
    let gate = Arc::new(Notify::new());
    let started = Arc::new(AtomicUsize::new(0));
    let recorder = RecordingHandler::new();
    let distributor = distributor(
        DistributorConfig::new().with_max_lanes(2),
        vec![gated(&gate, &started, &recorder)],
    );

    distributor.submit(1, "one".to_string()).unwrap();
    distributor.submit(2, "hold".to_string()).unwrap();
    until(|| started.load(Ordering::SeqCst) == 2).await;

    // Owner 2 is still running.
    assert_eq!(distributor.evict_idle_owners(), 1);
    assert_eq!(distributor.lane_of(1), None);
    assert_eq!(distributor.lane_of(2), Some(LaneId(1)));

    // Lane 0 has no owner left and is reused before rotating.
    assert_eq!(
        distributor.submit(3, "three".to_string()).unwrap(),
        strand::Routed::Lane(LaneId(0))
    );

    gate.notify_one();
    distributor.wait_idle().await;
    assert_eq!(distributor.evict_idle_owners(), 2);

    let metrics = distributor.metrics();
    assert_eq!(metrics.owners, 0);
    assert_eq!(metrics.lanes.len(), 2);
    assert!(metrics.lanes.iter().all(|lane| lane.owners == 0));

    // An evicted owner is bound again on its next event.
    distributor.submit(1, "again".to_string()).unwrap();
    distributor.wait_idle().await;
    assert_eq!(distributor.lane_of(1), Some(LaneId(0)));
    assert_eq!(recorder.events_of(1), vec!["one", "again"]);
}

#[tokio::test(start_paused = true)]
async fn test_metrics_report_busy_lane() {
    let gate = Arc::new(Notify::new());
    let started = Arc::new(AtomicUsize::new(0));
    let recorder = RecordingHandler::new();
    let distributor = distributor(
        DistributorConfig::new().with_max_lanes(4),
        vec![gated(&gate, &started, &recorder)],
    );

    distributor.submit(9, "hold".to_string()).unwrap();
    distributor.submit(9, "next".to_string()).unwrap();
    until(|| started.load(Ordering::SeqCst) == 1).await;
    tokio::time::advance(Duration::from_secs(2)).await;

    let metrics = distributor.metrics();
    assert_eq!(metrics.lanes.len(), 1);
    let lane = &metrics.lanes[0];
    assert!(lane.processing);
    assert_eq!(lane.depth, 1);
    assert_eq!(lane.owners, 1);
    assert_eq!(lane.processed, 0);
    assert!(lane.age >= Duration::from_secs(2));

    gate.notify_one();
    distributor.wait_idle().await;
    until(|| !distributor.metrics().lanes[0].processing).await;
    assert_eq!(distributor.metrics().lanes[0].processed, 2);
}
