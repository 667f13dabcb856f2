//! The lookahead scheduler: the state machine that decides, on every poll,
//! which upcoming steps must be committed now so none is scheduled late.
//!
//! The scheduler never reads a timer itself. Callers pass the reference
//! clock's current reading into [`LookaheadScheduler::start`] and
//! [`LookaheadScheduler::tick`], which keeps it free of side effects and
//! testable without real time.

use crate::common::{clamp_tempo, seconds_per_step, Seconds, StepIndex};
use crate::components::pattern::PatternState;
use crate::config::TimingConfig;
use crate::events::CommitEvent;
use tracing::trace;

/// The two states of the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Running,
}

/// The scheduler's position on the timeline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SchedulerCursor {
    /// Beats per minute, always within `TEMPO_RANGE`.
    pub tempo: f64,
    /// The step that is due next.
    pub step_index: StepIndex,
    /// The exact time `step_index` is due.
    pub next_due_time: Seconds,
    pub running: bool,
}

/// Commits steps of a [`PatternState`] ahead of their due times.
///
/// Due times accumulate from the start time by adding one step duration per
/// committed step, so they never depend on when the polls actually happen.
#[derive(Debug, Clone)]
pub struct LookaheadScheduler {
    cursor: SchedulerCursor,
    schedule_ahead_time: Seconds,
    start_latency: Seconds,
}

impl Default for LookaheadScheduler {
    fn default() -> Self {
        Self::new(&TimingConfig::default())
    }
}

impl LookaheadScheduler {
    /// Creates an idle scheduler using the horizon and start latency from `timing`.
    pub fn new(timing: &TimingConfig) -> Self {
        Self {
            cursor: SchedulerCursor {
                tempo: 120.0,
                step_index: 0,
                next_due_time: 0.0,
                running: false,
            },
            schedule_ahead_time: timing.schedule_ahead_time,
            start_latency: timing.start_latency,
        }
    }

    pub fn state(&self) -> SchedulerState {
        if self.cursor.running {
            SchedulerState::Running
        } else {
            SchedulerState::Idle
        }
    }

    pub fn is_running(&self) -> bool {
        self.cursor.running
    }

    pub fn cursor(&self) -> SchedulerCursor {
        self.cursor
    }

    pub fn tempo(&self) -> f64 {
        self.cursor.tempo
    }

    pub fn schedule_ahead_time(&self) -> Seconds {
        self.schedule_ahead_time
    }

    pub fn start_latency(&self) -> Seconds {
        self.start_latency
    }

    /// Sets the tempo, clamped into range. Steps already committed keep their
    /// due times; the new rate applies from the next advance on.
    pub fn set_tempo(&mut self, bpm: f64) {
        self.cursor.tempo = clamp_tempo(bpm);
    }

    /// Moves from `Idle` to `Running`, placing step 0 at `now + start_latency`.
    ///
    /// Does nothing if already running.
    pub fn start(&mut self, now: Seconds, tempo: f64, pattern: &PatternState) {
        if self.cursor.running {
            return;
        }
        self.cursor = SchedulerCursor {
            tempo: clamp_tempo(tempo),
            step_index: 0,
            next_due_time: now + self.start_latency,
            running: true,
        };
        trace!(
            now,
            first_due = self.cursor.next_due_time,
            step_count = pattern.step_count(),
            "Scheduler started."
        );
    }

    /// Moves to `Idle`. The cursor keeps its last position until the next start.
    pub fn stop(&mut self) {
        self.cursor.running = false;
    }

    /// Commits every step due before `now + schedule_ahead_time`.
    ///
    /// Returns the committed events in increasing due-time order. Returns an
    /// empty vector while idle.
    pub fn tick(&mut self, now: Seconds, pattern: &PatternState) -> Vec<CommitEvent> {
        let mut committed = Vec::new();
        if !self.cursor.running {
            return committed;
        }

        let horizon = now + self.schedule_ahead_time;
        while self.cursor.next_due_time < horizon {
            // The pattern may have shrunk since the cursor last advanced.
            let step_count = pattern.step_count();
            let index = self.cursor.step_index % step_count;

            committed.push(CommitEvent {
                step_index: index,
                due_time: self.cursor.next_due_time,
                is_accent: pattern.is_accent(index),
                should_sound: pattern.is_on(index),
            });

            self.cursor.next_due_time += seconds_per_step(self.cursor.tempo, pattern.steps_per_beat());
            self.cursor.step_index = (index + 1) % step_count;
        }

        trace!(now, count = committed.len(), "Tick committed steps.");
        committed
    }
}
