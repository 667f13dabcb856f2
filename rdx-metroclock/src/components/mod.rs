//! Contains the building blocks the engine is assembled from.
//!
//! The pattern describes the rhythm, the scheduler walks it against the
//! reference clock, and sinks receive what the scheduler commits. The
//! `MetroEngine` owns one of each and drives them.

pub mod pattern;
pub mod scheduler;
pub mod sink;
