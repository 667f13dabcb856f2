//! Defines all configuration structures for the Metroclock engine.
//!
//! These structs are deserialized with `serde` through the `config` crate, so
//! an engine can be described by a TOML file and adjusted with `METRO_`
//! environment variables (e.g. `METRO_TEMPO=96`,
//! `METRO_TIMING__POLL_INTERVAL=0.02`).

use crate::common::{clamp_tempo, Seconds};
use crate::components::pattern::PatternState;
use anyhow::{ensure, Context, Result};
use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;
use std::path::Path;

/// The top-level configuration for a `MetroEngine`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct MetroConfig {
    /// Polling cadence, lookahead horizon, and start latency.
    pub timing: TimingConfig,
    /// Initial tempo in beats per minute. Clamped when applied.
    pub tempo: f64,
    /// The initial pattern.
    pub pattern: PatternConfig,
}

/// Timing constants of the driver loop and scheduler, in seconds.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// How often the driver loop polls the scheduler.
    pub poll_interval: Seconds,
    /// How far past the current clock reading steps are committed.
    pub schedule_ahead_time: Seconds,
    /// Headroom between `start` and the first step's due time.
    pub start_latency: Seconds,
}

/// The initial pattern. Values are clamped by [`PatternConfig::build`].
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct PatternConfig {
    pub step_count: usize,
    pub steps_per_beat: u32,
    /// Per-step on/off cells. When absent only the first step sounds.
    pub mask: Option<Vec<bool>>,
    pub accent_first_step: bool,
}

impl Default for MetroConfig {
    fn default() -> Self {
        Self {
            timing: TimingConfig::default(),
            tempo: 120.0,
            pattern: PatternConfig::default(),
        }
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            poll_interval: 0.025,
            schedule_ahead_time: 0.1,
            start_latency: 0.1,
        }
    }
}

impl Default for PatternConfig {
    fn default() -> Self {
        Self {
            step_count: 4,
            steps_per_beat: 4,
            mask: None,
            accent_first_step: true,
        }
    }
}

impl PatternConfig {
    /// Builds the clamped [`PatternState`] this section describes.
    pub fn build(&self) -> PatternState {
        let mask = self.mask.clone().unwrap_or_else(|| vec![true]);
        PatternState::new(self.step_count, self.steps_per_beat, mask, self.accent_first_step)
    }
}

impl TimingConfig {
    /// Checks that the horizon can cover a delayed poll.
    ///
    /// The horizon must be at least twice the poll interval; otherwise a
    /// single late poll can let a step slip past its due time uncommitted.
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("poll_interval", self.poll_interval),
            ("schedule_ahead_time", self.schedule_ahead_time),
        ] {
            ensure!(
                value.is_finite() && value > 0.0,
                "timing.{name} must be a positive number of seconds, got {value}"
            );
        }
        ensure!(
            self.start_latency.is_finite() && self.start_latency >= 0.0,
            "timing.start_latency must be a non-negative number of seconds, got {}",
            self.start_latency
        );
        ensure!(
            self.schedule_ahead_time >= 2.0 * self.poll_interval,
            "timing.schedule_ahead_time ({}s) must be at least twice timing.poll_interval ({}s)",
            self.schedule_ahead_time,
            self.poll_interval
        );
        Ok(())
    }
}

impl MetroConfig {
    /// Loads defaults, then the optional TOML file at `path`, then `METRO_`
    /// environment overrides, and validates the result.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).format(FileFormat::Toml));
        }
        let config: Self = builder
            .add_source(
                Environment::with_prefix("METRO")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("failed to read metroclock configuration")?
            .try_deserialize()
            .context("invalid metroclock configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Parses and validates a configuration from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = Config::builder()
            .add_source(File::from_str(text, FileFormat::Toml))
            .build()
            .context("failed to parse metroclock configuration")?
            .try_deserialize()
            .context("invalid metroclock configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Checks the timing constants. The tempo is never rejected; it is
    /// clamped by [`MetroConfig::initial_tempo`].
    pub fn validate(&self) -> Result<()> {
        self.timing.validate()
    }

    /// The configured tempo, clamped into range.
    pub fn initial_tempo(&self) -> f64 {
        clamp_tempo(self.tempo)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_constants() {
        let config = MetroConfig::default();
        assert_eq!(config.timing.poll_interval, 0.025);
        assert_eq!(config.timing.schedule_ahead_time, 0.1);
        assert_eq!(config.timing.start_latency, 0.1);
        assert_eq!(config.tempo, 120.0);
        assert_eq!(config.pattern.build(), PatternState::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn parses_partial_toml() {
        let config = MetroConfig::from_toml_str(
            r#"
            tempo = 96.0

            [timing]
            poll_interval = 0.02

            [pattern]
            step_count = 6
            mask = [true, false, true]
            accent_first_step = false
            "#,
        )
        .unwrap();
        assert_eq!(config.tempo, 96.0);
        assert_eq!(config.timing.poll_interval, 0.02);
        assert_eq!(config.timing.schedule_ahead_time, 0.1);

        let pattern = config.pattern.build();
        assert_eq!(pattern.mask(), &[true, false, true, false, false, false]);
        assert_eq!(pattern.steps_per_beat(), 4);
        assert!(!pattern.accent_first_step());
    }

    #[test]
    fn rejects_short_horizon() {
        let err = MetroConfig::from_toml_str(
            r#"
            [timing]
            poll_interval = 0.06
            schedule_ahead_time = 0.1
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("at least twice"));
    }

    #[test]
    fn rejects_non_positive_timing() {
        let timing = TimingConfig {
            poll_interval: 0.0,
            ..TimingConfig::default()
        };
        assert!(timing.validate().is_err());

        let timing = TimingConfig {
            start_latency: -0.1,
            ..TimingConfig::default()
        };
        assert!(timing.validate().is_err());
    }

    #[test]
    fn environment_overrides_apply() {
        std::env::set_var("METRO_TEMPO", "96");
        std::env::set_var("METRO_TIMING__POLL_INTERVAL", "0.02");
        let loaded = MetroConfig::load(None);
        std::env::remove_var("METRO_TEMPO");
        std::env::remove_var("METRO_TIMING__POLL_INTERVAL");

        let config = loaded.unwrap();
        assert_eq!(config.tempo, 96.0);
        assert_eq!(config.timing.poll_interval, 0.02);
        assert_eq!(config.timing.schedule_ahead_time, 0.1);
    }

    #[test]
    fn non_finite_tempo_is_clamped_not_rejected() {
        for (tempo, expected) in [(f64::INFINITY, 300.0), (f64::NEG_INFINITY, 1.0), (f64::NAN, 1.0)] {
            let config = MetroConfig {
                tempo,
                ..MetroConfig::default()
            };
            assert!(config.validate().is_ok());
            assert_eq!(config.initial_tempo(), expected);
        }
    }

    #[test]
    fn out_of_range_values_are_clamped_not_rejected() {
        let config = MetroConfig::from_toml_str(
            r#"
            tempo = 1000.0
            [pattern]
            step_count = 500
            steps_per_beat = 0
            "#,
        )
        .unwrap();
        assert_eq!(config.initial_tempo(), 300.0);
        let pattern = config.pattern.build();
        assert_eq!(pattern.step_count(), 128);
        assert_eq!(pattern.steps_per_beat(), 1);
    }
}
