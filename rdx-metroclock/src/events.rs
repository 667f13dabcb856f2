//! Defines all public event types produced by the Metroclock engine.
//!
//! Subscribers receive these over the engine's broadcast channels. Commit and
//! step events are plain values; nothing here captures a callback.

use crate::common::{Seconds, StepIndex};

/// The scheduler's output record for one step, handed to the hard-real-time
/// renderer ahead of its due time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CommitEvent {
    /// The step within the cycle this event belongs to.
    pub step_index: StepIndex,
    /// The exact instant, on the reference clock's timeline, the step is due.
    pub due_time: Seconds,
    /// Whether the step should be rendered with emphasis.
    pub is_accent: bool,
    /// Whether the step's mask cell is on.
    pub should_sound: bool,
}

/// A soft-real-time notification that a step is sounding now, for observers
/// such as a step indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepEvent {
    pub step_index: StepIndex,
}

impl From<&CommitEvent> for StepEvent {
    fn from(event: &CommitEvent) -> Self {
        Self {
            step_index: event.step_index,
        }
    }
}

/// Events related to the lifecycle of an engine instance.
#[derive(Debug, Clone, PartialEq)]
pub enum SystemEvent {
    /// The scheduler started; the first step is due at `first_due`.
    Started { now: Seconds, first_due: Seconds },
    /// The scheduler stopped. Events already committed are not rescinded.
    Stopped { now: Seconds },
    /// The tempo changed. Applies to steps computed after the change.
    TempoChanged { bpm: f64 },
    /// The pattern was mutated.
    PatternChanged,
}
