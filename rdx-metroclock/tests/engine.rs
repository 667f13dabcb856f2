use metroclock::prelude::*;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;

const EPS: f64 = 1e-9;

fn drain<T: Clone>(rx: &mut broadcast::Receiver<T>) -> Vec<T> {
    let mut out = Vec::new();
    while let Ok(event) = rx.try_recv() {
        out.push(event);
    }
    out
}

fn manual_engine(clock: &ManualClock) -> MetroEngine {
    MetroEngine::with_clock(MetroConfig::default(), Arc::new(clock.clone())).unwrap()
}

#[tokio::test(start_paused = true)]
async fn first_poll_commits_only_the_first_step() {
    let clock = ManualClock::new(0.0);
    let engine = manual_engine(&clock);
    let mut commits = engine.subscribe_commits();

    engine.start().await;
    engine.poll_once().await;
    let first = drain(&mut commits);
    assert_eq!(first.len(), 1);
    assert_eq!(first[0].step_index, 0);
    assert!((first[0].due_time - 0.1).abs() < EPS);
    assert!(first[0].is_accent);
    assert!(first[0].should_sound);

    clock.set(0.2);
    engine.poll_once().await;
    let next = drain(&mut commits);
    assert_eq!(next.len(), 1);
    assert_eq!(next[0].step_index, 1);
    assert!((next[0].due_time - 0.225).abs() < EPS);
    assert!(!next[0].is_accent);
    assert!(!next[0].should_sound);

    engine.stop().await;
}

#[tokio::test(start_paused = true)]
async fn restart_resets_cursor() {
    let clock = ManualClock::new(0.0);
    let engine = manual_engine(&clock);
    let mut system = engine.subscribe_system_events();

    engine.start().await;
    clock.set(0.3);
    engine.poll_once().await;
    engine.stop().await;
    engine.stop().await;
    assert!(!engine.is_running().await);
    assert_ne!(engine.cursor().await.step_index, 0);

    clock.set(3.0);
    engine.start().await;
    engine.start().await;
    let cursor = engine.cursor().await;
    assert!(cursor.running);
    assert_eq!(cursor.step_index, 0);
    assert!((cursor.next_due_time - 3.1).abs() < EPS);

    let events = drain(&mut system);
    let starts: Vec<_> = events
        .iter()
        .filter(|e| matches!(e, SystemEvent::Started { .. }))
        .collect();
    let stops = events
        .iter()
        .filter(|e| matches!(e, SystemEvent::Stopped { .. }))
        .count();
    assert_eq!(starts.len(), 2);
    assert_eq!(stops, 1);
    match starts[1] {
        SystemEvent::Started { now, first_due } => {
            assert_eq!(*now, 3.0);
            assert!((first_due - 3.1).abs() < EPS);
        }
        other => panic!("unexpected event {other:?}"),
    }

    engine.stop().await;
}

#[tokio::test(start_paused = true)]
async fn driver_loop_streams_ordered_steps_until_stopped() {
    let engine = MetroEngine::new(MetroConfig::default()).unwrap();
    let mut commits = engine.subscribe_commits();
    let mut steps = engine.subscribe_steps();

    engine.start().await;
    tokio::time::sleep(Duration::from_secs(1)).await;
    engine.stop().await;

    let committed = drain(&mut commits);
    assert!((8..=9).contains(&committed.len()), "got {}", committed.len());
    for (n, event) in committed.iter().enumerate() {
        assert_eq!(event.step_index, n % 4);
        let expected = 0.1 + 0.125 * n as f64;
        assert!((event.due_time - expected).abs() < 1e-6);
    }

    // Nothing new is committed once stopped, but pending notifications still land.
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(drain(&mut commits).is_empty());
    let observed = drain(&mut steps);
    assert_eq!(observed.len(), committed.len());
    for (event, step) in committed.iter().zip(&observed) {
        assert_eq!(step.step_index, event.step_index);
    }
}

#[tokio::test(start_paused = true)]
async fn pattern_changes_apply_to_later_steps() {
    let clock = ManualClock::new(0.0);
    let engine = manual_engine(&clock);
    let mut commits = engine.subscribe_commits();

    engine.start().await;
    clock.set(0.3);
    engine.poll_once().await;
    let before = drain(&mut commits);
    assert_eq!(before.iter().map(|e| e.step_index).collect::<Vec<_>>(), vec![0, 1, 2]);

    engine.set_step_count(2).await;
    engine.toggle_step(1).await;
    engine.set_accent_first_step(false).await;
    clock.set(1.0);
    engine.poll_once().await;
    let after = drain(&mut commits);
    assert!(!after.is_empty());
    // The cursor was at step 3; it wraps into the two-step cycle.
    assert_eq!(after[0].step_index, 1);
    assert!(after.iter().all(|e| e.step_index < 2 && e.should_sound && !e.is_accent));
    assert!(after[0].due_time > before[2].due_time);

    engine.stop().await;
}

#[tokio::test(start_paused = true)]
async fn tempo_and_steps_per_beat_are_clamped() {
    let clock = ManualClock::new(0.0);
    let engine = manual_engine(&clock);
    engine.set_tempo(0.0).await;
    assert_eq!(engine.tempo().await, 1.0);
    engine.set_tempo(450.0).await;
    assert_eq!(engine.tempo().await, 300.0);
    engine.set_steps_per_beat(100).await;
    assert_eq!(engine.pattern().await.steps_per_beat(), 32);
    engine.set_step_count(200).await;
    assert_eq!(engine.pattern().await.step_count(), 128);
}

#[tokio::test(start_paused = true)]
async fn instances_are_independent() {
    let clock_a = ManualClock::new(0.0);
    let clock_b = ManualClock::new(0.0);
    let a = manual_engine(&clock_a);
    let b = manual_engine(&clock_b);
    let mut commits_a = a.subscribe_commits();
    let mut commits_b = b.subscribe_commits();

    a.start().await;
    b.set_tempo(60.0).await;
    clock_a.set(1.0);
    clock_b.set(1.0);
    a.poll_once().await;
    b.poll_once().await;

    assert!(!drain(&mut commits_a).is_empty());
    assert!(drain(&mut commits_b).is_empty());
    assert_eq!(a.tempo().await, 120.0);
    assert!(!b.is_running().await);

    a.stop().await;
}

#[derive(Clone, Default)]
struct RecordingSink {
    log: Arc<Mutex<Vec<(CommitEvent, Duration)>>>,
}

impl TriggerSink for RecordingSink {
    fn commit(&mut self, event: &CommitEvent) {
        self.log.lock().unwrap().push((*event, Duration::MAX));
    }

    fn notify(&mut self, event: StepEvent, delay: Duration) {
        let mut log = self.log.lock().unwrap();
        let last = log.last_mut().expect("notify follows commit");
        assert_eq!(last.0.step_index, event.step_index);
        last.1 = delay;
    }
}

#[tokio::test(start_paused = true)]
async fn late_steps_are_notified_immediately() {
    let clock = ManualClock::new(0.0);
    let sink = RecordingSink::default();
    let engine = MetroEngine::with_sink(
        MetroConfig::default(),
        Arc::new(clock.clone()),
        Box::new(sink.clone()),
    )
    .unwrap();

    engine.start().await;
    engine.poll_once().await;
    {
        let log = sink.log.lock().unwrap();
        assert_eq!(log.len(), 1);
        assert!((log[0].1.as_secs_f64() - 0.1).abs() < 1e-6);
    }

    // A stalled host: the next poll arrives long after several steps were due.
    clock.set(2.0);
    engine.poll_once().await;
    engine.stop().await;

    let log = sink.log.lock().unwrap();
    assert!(log.len() > 10);
    for (event, delay) in log.iter().skip(1) {
        if event.due_time <= 2.0 {
            assert_eq!(*delay, Duration::ZERO);
        } else {
            assert!(*delay > Duration::ZERO);
        }
    }
    for pair in log.windows(2) {
        assert!(pair[1].0.due_time > pair[0].0.due_time);
    }
}

#[test]
fn engine_rejects_short_horizon() {
    let mut config = MetroConfig::default();
    config.timing.schedule_ahead_time = 0.03;
    let clock = Arc::new(ManualClock::new(0.0));
    assert!(MetroEngine::with_clock(config, clock).is_err());
}

#[tokio::test(start_paused = true)]
async fn non_finite_tempo_builds_a_clamped_engine() {
    let config = MetroConfig {
        tempo: f64::INFINITY,
        ..MetroConfig::default()
    };
    let engine = MetroEngine::new(config).unwrap();
    assert_eq!(engine.tempo().await, 300.0);

    let config = MetroConfig {
        tempo: f64::NAN,
        ..MetroConfig::default()
    };
    let engine = MetroEngine::new(config).unwrap();
    assert_eq!(engine.tempo().await, 1.0);
}
