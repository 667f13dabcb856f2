//! # Metroclock
//!
//! A drift-free lookahead step scheduler for rhythmic trigger streams.
//!
//! Metroclock turns a declarative pattern (tempo, step count, accent rule)
//! into a stream of precisely timed trigger events. Each event is committed
//! ahead of its due time, so a downstream renderer (audio, a visual flash,
//! MIDI out) can fire exactly on schedule even though the engine itself is
//! only polled by a coarse, non-real-time timer.
//!
//! ## Core Concepts
//!
//! - **ReferenceClock**: A monotonic source of elapsed seconds. The engine only reads it.
//! - **PatternState**: The rhythm: step count, steps per beat, an on/off mask
//!   and an accent rule. Every mutation clamps instead of failing.
//! - **LookaheadScheduler**: On every poll, commits each step due before
//!   `now + schedule_ahead_time`. Due times accumulate from the start time, so
//!   poll jitter never leaks into them.
//! - **TriggerSink**: Receives each `CommitEvent` at commit time (hard real
//!   time) and a `StepEvent` to be observed near the due time (soft real time).
//! - **MetroEngine**: Wires the above together and owns the polling task.
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use metroclock::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     // 1. Load the configuration (defaults, optional file, METRO_ env vars).
//!     let config = MetroConfig::load(None)?;
//!
//!     // 2. Create the engine.
//!     let engine = MetroEngine::new(config)?;
//!
//!     // 3. Subscribe to the commit stream before starting the engine.
//!     let mut commits = engine.subscribe_commits();
//!     tokio::spawn(async move {
//!         while let Ok(event) = commits.recv().await {
//!             println!("step {} due at {:.3}s", event.step_index, event.due_time);
//!         }
//!     });
//!
//!     // 4. Run until Ctrl+C.
//!     engine.run_until_ctrl_c().await?;
//!
//!     Ok(())
//! }
//! ```

pub const ENGINE_NAME: &str = "Metroclock";
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// Declare all the modules in the crate.
pub mod common;
pub mod components;
pub mod config;
pub mod engine;
pub mod events;
pub mod time;

/// A prelude module for easy importing of the most common Metroclock types.
pub mod prelude {
    pub use crate::common::{Seconds, StepIndex};
    pub use crate::components::pattern::PatternState;
    pub use crate::components::scheduler::{LookaheadScheduler, SchedulerCursor, SchedulerState};
    pub use crate::components::sink::{dispatch, notify_delay, BroadcastSink, CollectingSink, TriggerSink};
    pub use crate::config::{MetroConfig, PatternConfig, TimingConfig};
    pub use crate::engine::MetroEngine;
    pub use crate::events::{CommitEvent, StepEvent, SystemEvent};
    pub use crate::time::{ManualClock, MonotonicClock, ReferenceClock};
}
