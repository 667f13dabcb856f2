//! Trigger sinks: where committed steps go once the scheduler has produced them.
//!
//! A sink has two channels. The hard-real-time channel receives every
//! [`CommitEvent`] as soon as it is committed and is responsible for rendering
//! it exactly at its due time. The soft-real-time channel receives a
//! [`StepEvent`] together with the delay after which it should be observed.

use crate::common::Seconds;
use crate::events::{CommitEvent, StepEvent};
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::debug;

/// Receives the output of the driver loop.
pub trait TriggerSink: Send {
    /// Hard-real-time channel. Called at commit time, ahead of `event.due_time`.
    fn commit(&mut self, event: &CommitEvent);

    /// Soft-real-time channel. `event` should be observed after `delay`.
    fn notify(&mut self, event: StepEvent, delay: Duration);
}

/// The delay from `now` until `due`, floored at zero.
///
/// A step whose due time has already passed is delivered immediately rather
/// than skipped.
pub fn notify_delay(due: Seconds, now: Seconds) -> Duration {
    let remaining = due - now;
    if remaining.is_finite() && remaining > 0.0 {
        Duration::from_secs_f64(remaining)
    } else {
        Duration::ZERO
    }
}

/// Hands each committed step to `sink`: the commit first, then the step
/// notification, delayed until the step's due time as seen from `now`.
pub fn dispatch(sink: &mut dyn TriggerSink, committed: &[CommitEvent], now: Seconds) {
    for event in committed {
        debug!(
            step = event.step_index,
            due = event.due_time,
            accent = event.is_accent,
            sound = event.should_sound,
            "Committed step."
        );
        sink.commit(event);
        sink.notify(StepEvent::from(event), notify_delay(event.due_time, now));
    }
}

/// Publishes both channels on tokio broadcast channels.
///
/// Commits are sent immediately. Step notifications are sent from a spawned
/// task after their delay, so `notify` must be called inside a tokio runtime.
#[derive(Debug, Clone)]
pub struct BroadcastSink {
    commit_sender: broadcast::Sender<CommitEvent>,
    step_sender: broadcast::Sender<StepEvent>,
}

impl BroadcastSink {
    pub fn new(
        commit_sender: broadcast::Sender<CommitEvent>,
        step_sender: broadcast::Sender<StepEvent>,
    ) -> Self {
        Self {
            commit_sender,
            step_sender,
        }
    }
}

impl TriggerSink for BroadcastSink {
    fn commit(&mut self, event: &CommitEvent) {
        self.commit_sender.send(*event).ok();
    }

    fn notify(&mut self, event: StepEvent, delay: Duration) {
        if delay.is_zero() {
            self.step_sender.send(event).ok();
            return;
        }
        let step_sender = self.step_sender.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            step_sender.send(event).ok();
        });
    }
}

/// Records everything it receives, in order. Handy for offline runs and tests.
#[derive(Debug, Clone, Default)]
pub struct CollectingSink {
    pub commits: Vec<CommitEvent>,
    pub notifications: Vec<(StepEvent, Duration)>,
}

impl TriggerSink for CollectingSink {
    fn commit(&mut self, event: &CommitEvent) {
        self.commits.push(*event);
    }

    fn notify(&mut self, event: StepEvent, delay: Duration) {
        self.notifications.push((event, delay));
    }
}
