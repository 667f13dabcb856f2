//! The engine that wires one scheduler instance to its clock, pattern, and sink.

use crate::common::{clamp_tempo, Seconds, StepIndex};
use crate::components::pattern::PatternState;
use crate::components::scheduler::{LookaheadScheduler, SchedulerCursor};
use crate::components::sink::{dispatch, BroadcastSink, TriggerSink};
use crate::config::{MetroConfig, TimingConfig};
use crate::events::{CommitEvent, StepEvent, SystemEvent};
use crate::time::{MonotonicClock, ReferenceClock};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex, RwLock};
use tokio::time::MissedTickBehavior;
use tracing::{info, trace};

/// One running instance of the metronome.
///
/// Owns the pattern, the scheduler, a reference clock, and a trigger sink, and
/// drives the scheduler from a polling task while started. The `MetroEngine`
/// is a cloneable handle: clones control the same instance. Separately
/// constructed engines share nothing and may run side by side.
///
/// The pattern sits behind a read/write lock, so configuration may be changed
/// from any task while the driver is polling; a poll always sees a whole
/// pattern, never a half-resized one.
#[derive(Clone)]
pub struct MetroEngine {
    timing: Arc<TimingConfig>,
    clock: Arc<dyn ReferenceClock>,
    pattern: Arc<RwLock<PatternState>>,
    scheduler: Arc<Mutex<LookaheadScheduler>>,
    sink: Arc<Mutex<Box<dyn TriggerSink>>>,
    commit_sender: broadcast::Sender<CommitEvent>,
    step_sender: broadcast::Sender<StepEvent>,
    system_event_sender: broadcast::Sender<SystemEvent>,
    driver: Arc<Mutex<Option<broadcast::Sender<()>>>>,
}

// Construction and the driver loop.
impl MetroEngine {
    /// Creates an engine on a [`MonotonicClock`] that publishes triggers on
    /// its broadcast channels.
    pub fn new(config: MetroConfig) -> anyhow::Result<Self> {
        Self::with_clock(config, Arc::new(MonotonicClock::new()))
    }

    /// Creates an engine on the given clock that publishes triggers on its
    /// broadcast channels.
    pub fn with_clock(config: MetroConfig, clock: Arc<dyn ReferenceClock>) -> anyhow::Result<Self> {
        const CHANNEL_CAPACITY: usize = 256;
        let (commit_sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        let (step_sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        let sink = BroadcastSink::new(commit_sender.clone(), step_sender.clone());
        Self::assemble(config, clock, Box::new(sink), commit_sender, step_sender)
    }

    /// Creates an engine that hands triggers to a custom sink.
    ///
    /// The commit and step subscriptions stay silent for such an engine; the
    /// sink receives everything instead.
    pub fn with_sink(
        config: MetroConfig,
        clock: Arc<dyn ReferenceClock>,
        sink: Box<dyn TriggerSink>,
    ) -> anyhow::Result<Self> {
        let (commit_sender, _) = broadcast::channel(1);
        let (step_sender, _) = broadcast::channel(1);
        Self::assemble(config, clock, sink, commit_sender, step_sender)
    }

    fn assemble(
        config: MetroConfig,
        clock: Arc<dyn ReferenceClock>,
        sink: Box<dyn TriggerSink>,
        commit_sender: broadcast::Sender<CommitEvent>,
        step_sender: broadcast::Sender<StepEvent>,
    ) -> anyhow::Result<Self> {
        config.validate()?;
        let (system_event_sender, _) = broadcast::channel(64);

        let mut scheduler = LookaheadScheduler::new(&config.timing);
        scheduler.set_tempo(config.initial_tempo());

        Ok(Self {
            pattern: Arc::new(RwLock::new(config.pattern.build())),
            scheduler: Arc::new(Mutex::new(scheduler)),
            timing: Arc::new(config.timing),
            clock,
            sink: Arc::new(Mutex::new(sink)),
            commit_sender,
            step_sender,
            system_event_sender,
            driver: Arc::new(Mutex::new(None)),
        })
    }

    /// Runs one driver iteration: reads the clock, ticks the scheduler against
    /// a snapshot of the pattern, and forwards what it commits to the sink.
    ///
    /// Returns the number of steps committed. The driver task calls this every
    /// poll interval; it is public so callers can drive an engine by hand.
    pub async fn poll_once(&self) -> usize {
        let now = self.clock.now();
        let pattern = self.pattern.read().await.clone();
        let committed = self.scheduler.lock().await.tick(now, &pattern);
        if committed.is_empty() {
            return 0;
        }

        let mut sink = self.sink.lock().await;
        dispatch(&mut **sink, &committed, self.clock.now());
        committed.len()
    }

    #[doc(hidden)]
    async fn driver_loop(self, mut shutdown_rx: broadcast::Receiver<()>) {
        let mut ticker = tokio::time::interval(Duration::from_secs_f64(self.timing.poll_interval));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(poll_interval = self.timing.poll_interval, "Driver loop started.");
        loop {
            tokio::select! {
                biased;
                _ = shutdown_rx.recv() => break,
                _ = ticker.tick() => {
                    let count = self.poll_once().await;
                    trace!(count, "Poll complete.");
                }
            }
        }
        info!("Driver loop stopped.");
    }
}

// Public API implementation block.
impl MetroEngine {
    /// Starts the scheduler at the current clock reading and spawns the driver
    /// task. Does nothing if already started. Must be called inside a tokio
    /// runtime.
    pub async fn start(&self) {
        let mut driver = self.driver.lock().await;
        if driver.is_some() {
            return;
        }

        let now = self.clock.now();
        let pattern = self.pattern.read().await.clone();
        let first_due = {
            let mut scheduler = self.scheduler.lock().await;
            let tempo = scheduler.tempo();
            scheduler.start(now, tempo, &pattern);
            scheduler.cursor().next_due_time
        };

        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let engine = self.clone();
        tokio::spawn(async move { engine.driver_loop(shutdown_rx).await });
        *driver = Some(shutdown_tx);

        info!(now, first_due, "MetroEngine started.");
        self.system_event_sender
            .send(SystemEvent::Started { now, first_due })
            .ok();
    }

    /// Stops the scheduler and the driver task. Steps already handed to the
    /// sink are not rescinded. Does nothing if not started.
    pub async fn stop(&self) {
        let shutdown_tx = {
            let mut driver = self.driver.lock().await;
            match driver.take() {
                Some(tx) => tx,
                None => return,
            }
        };
        self.scheduler.lock().await.stop();
        shutdown_tx.send(()).ok();

        let now = self.clock.now();
        info!(now, "MetroEngine stopped.");
        self.system_event_sender.send(SystemEvent::Stopped { now }).ok();
    }

    /// Starts the engine, then runs until Ctrl+C is received.
    pub async fn run_until_ctrl_c(&self) -> anyhow::Result<()> {
        self.start().await;
        info!("Running. Press Ctrl+C to stop.");
        tokio::signal::ctrl_c().await?;
        info!("Shutdown signal received.");
        self.stop().await;
        Ok(())
    }

    /// Sets the tempo, clamped into range. Applies to steps computed afterwards.
    pub async fn set_tempo(&self, bpm: f64) {
        let bpm = clamp_tempo(bpm);
        self.scheduler.lock().await.set_tempo(bpm);
        self.system_event_sender
            .send(SystemEvent::TempoChanged { bpm })
            .ok();
    }

    pub async fn set_step_count(&self, n: usize) {
        self.pattern.write().await.set_step_count(n);
        self.pattern_changed();
    }

    pub async fn set_steps_per_beat(&self, n: u32) {
        self.pattern.write().await.set_steps_per_beat(n);
        self.pattern_changed();
    }

    pub async fn toggle_step(&self, index: StepIndex) {
        self.pattern.write().await.toggle_step(index);
        self.pattern_changed();
    }

    pub async fn set_accent_first_step(&self, accent: bool) {
        self.pattern.write().await.set_accent_first_step(accent);
        self.pattern_changed();
    }

    fn pattern_changed(&self) {
        self.system_event_sender.send(SystemEvent::PatternChanged).ok();
    }

    /// A snapshot of the current pattern.
    pub async fn pattern(&self) -> PatternState {
        self.pattern.read().await.clone()
    }

    pub async fn tempo(&self) -> f64 {
        self.scheduler.lock().await.tempo()
    }

    pub async fn is_running(&self) -> bool {
        self.scheduler.lock().await.is_running()
    }

    pub async fn cursor(&self) -> SchedulerCursor {
        self.scheduler.lock().await.cursor()
    }

    pub fn timing(&self) -> &TimingConfig {
        &self.timing
    }

    /// The engine's reference clock reading.
    pub fn now(&self) -> Seconds {
        self.clock.now()
    }

    /// Subscribes to the hard-real-time `CommitEvent` stream.
    pub fn subscribe_commits(&self) -> broadcast::Receiver<CommitEvent> {
        self.commit_sender.subscribe()
    }

    /// Subscribes to the soft-real-time `StepEvent` stream.
    pub fn subscribe_steps(&self) -> broadcast::Receiver<StepEvent> {
        self.step_sender.subscribe()
    }

    /// Subscribes to the `SystemEvent` stream.
    pub fn subscribe_system_events(&self) -> broadcast::Receiver<SystemEvent> {
        self.system_event_sender.subscribe()
    }
}
