//! Defines the rhythmic pattern the scheduler walks through.

use crate::common::{StepIndex, STEPS_PER_BEAT_RANGE, STEP_COUNT_RANGE};

/// A cyclic on/off step pattern with an accent rule.
///
/// All mutators are total: out-of-range input is clamped or ignored, never
/// reported as an error. The mask length always equals the step count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternState {
    steps_per_beat: u32,
    mask: Vec<bool>,
    accent_first_step: bool,
}

impl Default for PatternState {
    /// Four steps, four steps per beat, only the first step sounding, accented.
    fn default() -> Self {
        Self {
            steps_per_beat: 4,
            mask: vec![true, false, false, false],
            accent_first_step: true,
        }
    }
}

impl PatternState {
    /// Builds a pattern from raw parts, clamping every value into range.
    ///
    /// `mask` is resized to `step_count` with the same prefix-preserving rule
    /// as [`PatternState::set_step_count`].
    pub fn new(step_count: usize, steps_per_beat: u32, mask: Vec<bool>, accent: bool) -> Self {
        let mut pattern = Self {
            steps_per_beat: 0,
            mask,
            accent_first_step: accent,
        };
        pattern.set_step_count(step_count);
        pattern.set_steps_per_beat(steps_per_beat);
        pattern
    }

    pub fn step_count(&self) -> usize {
        self.mask.len()
    }

    pub fn steps_per_beat(&self) -> u32 {
        self.steps_per_beat
    }

    pub fn mask(&self) -> &[bool] {
        &self.mask
    }

    pub fn accent_first_step(&self) -> bool {
        self.accent_first_step
    }

    /// Whether step `index` produces sound. Out-of-range indices are silent.
    pub fn is_on(&self, index: StepIndex) -> bool {
        self.mask.get(index).copied().unwrap_or(false)
    }

    /// Whether a trigger at step `index` is accented.
    pub fn is_accent(&self, index: StepIndex) -> bool {
        self.accent_first_step && index == 0
    }

    /// Resizes the cycle. Existing cells keep their position, new cells are
    /// off, and shrinking drops cells from the tail.
    pub fn set_step_count(&mut self, n: usize) {
        let n = n.clamp(*STEP_COUNT_RANGE.start(), *STEP_COUNT_RANGE.end());
        self.mask.resize(n, false);
    }

    pub fn set_steps_per_beat(&mut self, n: u32) {
        self.steps_per_beat = n.clamp(*STEPS_PER_BEAT_RANGE.start(), *STEPS_PER_BEAT_RANGE.end());
    }

    /// Flips step `index`. Indices outside the cycle are ignored.
    pub fn toggle_step(&mut self, index: StepIndex) {
        if let Some(cell) = self.mask.get_mut(index) {
            *cell = !*cell;
        }
    }

    pub fn set_accent_first_step(&mut self, accent: bool) {
        self.accent_first_step = accent;
    }
}
