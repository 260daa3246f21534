//! Integration tests for the refresh pipeline.
//!
//! These tests drive the coordinator with a manual clock against a real
//! worker thread, covering:
//! - Refill → fetch → advance across several entities
//! - Sticky holds and operator resume
//! - Non-blocking consumption under lock contention
//! - Bounded shutdown and fetcher panic containment
//!
//! Run with: `cargo test --test refresh_pipeline_integration`

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use chrono::{Duration as ChronoDuration, TimeZone, Utc};
use proptest::prelude::*;

use orbitstream::coordinator::{AdvanceOutcome, RefreshCoordinator};
use orbitstream::entity::{EntityId, EntityState, GeoCoordinate, PositionQueue, PositionSample};
use orbitstream::fetch::{FetchOutcome, HoldAfterFailures};
use orbitstream::pipeline::RefreshPipeline;
use orbitstream::projection::WorldProjection;
use orbitstream::ticker::ManualClock;
use orbitstream::worker::FetchWorker;

// ============================================================================
// Helper Functions
// ============================================================================

const E1: EntityId = EntityId::new(25338);
const E2: EntityId = EntityId::new(28654);
const E3: EntityId = EntityId::new(33591);

fn sample(seq: i64, latitude: f64) -> PositionSample {
    let base = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
    PositionSample::new(
        base + ChronoDuration::seconds(seq),
        GeoCoordinate::new(latitude, 10.0, 850.0),
    )
}

fn setup(ids: &[EntityId]) -> (Arc<RefreshPipeline>, RefreshCoordinator<ManualClock>, ManualClock) {
    let pipeline = Arc::new(RefreshPipeline::new(ids.iter().copied()).unwrap());
    let clock = ManualClock::new();
    let coordinator = RefreshCoordinator::with_clock(
        Arc::clone(&pipeline),
        1.0,
        WorldProjection::default(),
        clock.clone(),
    )
    .unwrap();
    (pipeline, coordinator, clock)
}

/// Poll until `condition` holds or five seconds pass.
fn wait_until(condition: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(1));
    }
    condition()
}

// ============================================================================
// Integration Tests
// ============================================================================

/// Three empty entities: one tick requests all three, the worker serves E1
/// and E3 and holds E2.
#[test]
fn test_hold_one_of_three() {
    let (pipeline, mut coordinator, clock) = setup(&[E1, E2, E3]);

    clock.advance_secs(1.0);
    let report = coordinator.refresh().unwrap();
    assert_eq!(report.count(|o| *o == AdvanceOutcome::RefillRequested), 3);
    assert_eq!(pipeline.pending_count(), 3);

    let fetcher = |id: EntityId, queue: &mut PositionQueue| {
        if id == E2 {
            return FetchOutcome::Hold;
        }
        queue.push_back(sample(0, 45.0));
        FetchOutcome::Ok
    };
    let mut worker = FetchWorker::new(Arc::clone(&pipeline), fetcher)
        .unwrap()
        .spawn()
        .unwrap();

    assert!(wait_until(|| pipeline.pending_count() == 0));
    assert_eq!(pipeline.entity_state(E2).unwrap(), EntityState::Held);

    clock.advance_secs(1.0);
    let report = coordinator.refresh().unwrap();
    assert!(matches!(report.outcome(E1), Some(AdvanceOutcome::Advanced(_))));
    assert!(matches!(report.outcome(E3), Some(AdvanceOutcome::Advanced(_))));
    assert_eq!(report.outcome(E2), Some(AdvanceOutcome::Held));

    // Held indefinitely: further ticks never request a refill for E2.
    for _ in 0..5 {
        clock.advance_secs(1.0);
        let report = coordinator.refresh().unwrap();
        assert_eq!(report.outcome(E2), Some(AdvanceOutcome::Held));
    }
    assert!(!pipeline.entity(E2).unwrap().is_pending());
    assert_eq!(pipeline.entity(E2).unwrap().len(), Some(0));

    worker.join().unwrap();
}

/// After resume, the next empty tick re-requests and the fetcher runs again.
#[test]
fn test_resume_readmits_held_entity() {
    let (pipeline, mut coordinator, clock) = setup(&[E1]);
    let calls = Arc::new(AtomicUsize::new(0));
    let counted = Arc::clone(&calls);

    let fetcher = move |_: EntityId, queue: &mut PositionQueue| {
        let call = counted.fetch_add(1, Ordering::SeqCst);
        if call == 0 {
            FetchOutcome::Hold
        } else {
            queue.push_back(sample(call as i64, 0.0));
            FetchOutcome::Ok
        }
    };
    let _worker = FetchWorker::new(Arc::clone(&pipeline), fetcher)
        .unwrap()
        .spawn()
        .unwrap();

    clock.advance_secs(1.0);
    coordinator.refresh().unwrap();
    assert!(wait_until(|| pipeline.entity(E1).unwrap().is_held()));
    assert!(wait_until(|| pipeline.pending_count() == 0));

    clock.advance_secs(1.0);
    coordinator.refresh().unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    assert!(pipeline.resume(E1).unwrap());
    clock.advance_secs(1.0);
    let report = coordinator.refresh().unwrap();
    assert_eq!(report.outcome(E1), Some(AdvanceOutcome::RefillRequested));

    assert!(wait_until(|| pipeline.entity(E1).unwrap().len() == Some(1)));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert!(coordinator.advance(E1).is_some());
}

/// A consumer facing a locked queue skips it without waiting.
#[test]
fn test_contended_entity_does_not_block_others() {
    let (pipeline, mut coordinator, clock) = setup(&[E1, E2]);
    pipeline.append_batch(E1, [sample(0, 10.0)]).unwrap();
    pipeline.append_batch(E2, [sample(0, 20.0)]).unwrap();

    let guard = pipeline.entity(E1).unwrap().lock_queue();
    clock.advance_secs(1.0);
    let started = Instant::now();
    let report = coordinator.refresh().unwrap();
    let elapsed = started.elapsed();
    drop(guard);

    assert!(elapsed < Duration::from_millis(500), "refresh took {elapsed:?}");
    assert_eq!(report.outcome(E1), Some(AdvanceOutcome::Contended));
    assert!(matches!(report.outcome(E2), Some(AdvanceOutcome::Advanced(_))));
}

/// Stop and join return promptly whether the worker is idle or has backlog.
#[test]
fn test_shutdown_is_bounded() {
    for backlog in [false, true] {
        let (pipeline, mut coordinator, clock) = setup(&[E1, E2, E3]);
        let mut worker = FetchWorker::new(
            Arc::clone(&pipeline),
            |_: EntityId, _: &mut PositionQueue| FetchOutcome::Retry,
        )
        .unwrap()
        .spawn()
        .unwrap();

        if backlog {
            clock.advance_secs(1.0);
            coordinator.refresh().unwrap();
        }

        let started = Instant::now();
        assert!(worker.stop());
        worker.join().unwrap();
        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(pipeline.is_stopped());

        // Requests after shutdown are ignored.
        assert!(!pipeline.request_refill(E1).unwrap());
    }
}

/// A panicking fetcher is contained; the worker keeps serving.
#[test]
fn test_panicking_fetcher_keeps_worker_alive() {
    let (pipeline, mut coordinator, clock) = setup(&[E1]);
    let calls = Arc::new(AtomicUsize::new(0));
    let counted = Arc::clone(&calls);

    let fetcher = move |_: EntityId, queue: &mut PositionQueue| {
        if counted.fetch_add(1, Ordering::SeqCst) == 0 {
            panic!("decoder exploded");
        }
        queue.push_back(sample(0, 5.0));
        FetchOutcome::Ok
    };
    let mut worker = FetchWorker::new(Arc::clone(&pipeline), fetcher)
        .unwrap()
        .spawn()
        .unwrap();

    clock.advance_secs(1.0);
    coordinator.refresh().unwrap();
    assert!(wait_until(|| calls.load(Ordering::SeqCst) == 1 && pipeline.pending_count() == 0));

    clock.advance_secs(1.0);
    coordinator.refresh().unwrap();
    assert!(wait_until(|| pipeline.entity(E1).unwrap().len() == Some(1)));

    assert!(!worker.is_finished());
    worker.join().unwrap();
    assert_eq!(pipeline.metrics().snapshot().fetch_panics, 1);
}

/// Escalation wrapper holds an entity that keeps failing.
#[test]
fn test_repeated_failures_escalate_to_hold() {
    let (pipeline, mut coordinator, clock) = setup(&[E1]);
    let fetcher = HoldAfterFailures::with_threshold(
        |_: EntityId, _: &mut PositionQueue| FetchOutcome::Reject,
        3,
    );
    let _worker = FetchWorker::new(Arc::clone(&pipeline), fetcher)
        .unwrap()
        .spawn()
        .unwrap();

    for _ in 0..10 {
        clock.advance_secs(1.0);
        coordinator.refresh().unwrap();
        if !wait_until(|| pipeline.pending_count() == 0) {
            break;
        }
        if pipeline.entity(E1).unwrap().is_held() {
            break;
        }
    }

    assert_eq!(pipeline.entity_state(E1).unwrap(), EntityState::Held);
    let snapshot = pipeline.metrics().snapshot();
    assert_eq!(snapshot.fetches_rejected, 2);
    assert_eq!(snapshot.fetches_held, 1);
}

/// Concurrent requesters never double-count one entity.
#[test]
fn test_concurrent_requests_single_in_flight() {
    let pipeline = Arc::new(RefreshPipeline::new([E1]).unwrap());
    let granted = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let pipeline = Arc::clone(&pipeline);
            let granted = Arc::clone(&granted);
            thread::spawn(move || {
                for _ in 0..100 {
                    if pipeline.request_refill(E1).unwrap() {
                        granted.fetch_add(1, Ordering::SeqCst);
                    }
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(granted.load(Ordering::SeqCst), 1);
    assert_eq!(pipeline.pending_count(), 1);
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #[test]
    fn prop_samples_consumed_in_arrival_order(
        latitudes in prop::collection::vec(-89.0f64..89.0, 1..40)
    ) {
        let (pipeline, mut coordinator, _clock) = setup(&[E1]);
        let samples: Vec<_> = latitudes
            .iter()
            .enumerate()
            .map(|(i, lat)| sample(i as i64, *lat))
            .collect();
        pipeline.append_batch(E1, samples.clone()).unwrap();

        let projection = WorldProjection::default();
        for expected in &samples {
            let position = coordinator.advance(E1);
            prop_assert_eq!(position, Some(projection.project(&expected.coordinate())));
        }
        prop_assert!(coordinator.advance(E1).is_none());
        prop_assert_eq!(pipeline.entity_state(E1).unwrap(), EntityState::Pending);
    }

    #[test]
    fn prop_counter_matches_distinct_pending(
        requests in prop::collection::vec(0usize..3, 0..50)
    ) {
        let ids = [E1, E2, E3];
        let pipeline = RefreshPipeline::new(ids).unwrap();
        for index in &requests {
            pipeline.request_refill(ids[*index]).unwrap();
        }

        let pending = pipeline.entities().iter().filter(|e| e.is_pending()).count();
        let mut distinct = requests.clone();
        distinct.sort_unstable();
        distinct.dedup();
        prop_assert_eq!(pipeline.pending_count(), pending as i64);
        prop_assert_eq!(pending, distinct.len());
    }
}
