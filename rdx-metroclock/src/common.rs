//! Contains common, primitive types shared across the Metroclock engine.
//!
//! Every numeric input the engine accepts is clamped into one of the ranges
//! defined here rather than rejected. Keeping the ranges in one place lets the
//! configuration layer, the pattern, and the scheduler agree on them.

use std::ops::RangeInclusive;

/// A point or span on the reference clock's timeline, in seconds.
pub type Seconds = f64;

/// The position of a step within one cycle of the pattern.
pub type StepIndex = usize;

/// Valid tempo range, in beats per minute.
pub const TEMPO_RANGE: RangeInclusive<f64> = 1.0..=300.0;

/// Valid number of steps in one cycle.
pub const STEP_COUNT_RANGE: RangeInclusive<usize> = 1..=128;

/// Valid number of steps that make up one beat.
pub const STEPS_PER_BEAT_RANGE: RangeInclusive<u32> = 1..=32;

/// Clamps a tempo into [`TEMPO_RANGE`].
///
/// A NaN tempo collapses to the lower bound so that no step interval can ever
/// become infinite or undefined.
pub fn clamp_tempo(bpm: f64) -> f64 {
    if bpm.is_nan() {
        return *TEMPO_RANGE.start();
    }
    bpm.clamp(*TEMPO_RANGE.start(), *TEMPO_RANGE.end())
}

/// The duration of a single step, `(60 / tempo) / steps_per_beat`.
pub fn seconds_per_step(tempo: f64, steps_per_beat: u32) -> Seconds {
    (60.0 / tempo) / f64::from(steps_per_beat)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tempo_clamps_to_range() {
        assert_eq!(clamp_tempo(0.0), 1.0);
        assert_eq!(clamp_tempo(-40.0), 1.0);
        assert_eq!(clamp_tempo(900.0), 300.0);
        assert_eq!(clamp_tempo(f64::NAN), 1.0);
        assert_eq!(clamp_tempo(133.5), 133.5);
    }

    #[test]
    fn step_duration_at_120_bpm_sixteenths() {
        assert_eq!(seconds_per_step(120.0, 4), 0.125);
        assert_eq!(seconds_per_step(60.0, 1), 1.0);
    }
}
