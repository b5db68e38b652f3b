//! Queue configuration.
//!
//! Tunables are passed to the queue at construction. They can also be read from
//! or written to TOML.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{QueueError, QueueResult};

/// Configuration of a `DelayQueue`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Interval between runs of the sort and signal tasks.
    pub tick_interval_ms: u64,

    /// Items maturing within this window are waited out by the mover task
    /// instead of being put back in the wait list.
    pub enqueue_threshold_ms: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 10,
            enqueue_threshold_ms: 3000,
        }
    }
}

impl QueueConfig {
    /// Returns a copy using the given tick interval.
    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval_ms = millis_rounded_up(interval);
        self
    }

    /// Returns a copy using the given enqueue threshold.
    pub fn with_enqueue_threshold(mut self, threshold: Duration) -> Self {
        self.enqueue_threshold_ms = millis_rounded_up(threshold);
        self
    }

    /// The tick interval as a `Duration`.
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    /// The enqueue threshold as a `Duration`.
    pub fn enqueue_threshold(&self) -> Duration {
        Duration::from_millis(self.enqueue_threshold_ms)
    }

    /// Checks that the configuration can drive a queue.
    pub fn validate(&self) -> QueueResult<()> {
        if self.tick_interval_ms == 0 {
            return Err(QueueError::invalid_config(
                "tick interval must be greater than 0",
            ));
        }
        Ok(())
    }

    /// Parses a configuration from TOML. Missing fields take their defaults.
    pub fn from_toml_str(toml_str: &str) -> QueueResult<Self> {
        let config: QueueConfig =
            toml::from_str(toml_str).map_err(|e| QueueError::invalid_config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Serializes the configuration to TOML.
    pub fn to_toml_string(&self) -> QueueResult<String> {
        toml::to_string_pretty(self).map_err(|e| QueueError::invalid_config(e.to_string()))
    }
}

/// Whole milliseconds in `duration`. A non-zero sub-millisecond duration counts as one
/// millisecond; values beyond `u64::MAX` saturate.
fn millis_rounded_up(duration: Duration) -> u64 {
    let millis = duration.as_millis();
    if millis == 0 && !duration.is_zero() {
        return 1;
    }
    u64::try_from(millis).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = QueueConfig::default();
        assert_eq!(config.tick_interval(), Duration::from_millis(10));
        assert_eq!(config.enqueue_threshold(), Duration::from_secs(3));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn builder_methods() {
        let config = QueueConfig::default()
            .with_tick_interval(Duration::from_millis(5))
            .with_enqueue_threshold(Duration::from_millis(250));
        assert_eq!(config.tick_interval_ms, 5);
        assert_eq!(config.enqueue_threshold_ms, 250);
    }

    #[test]
    fn sub_millisecond_durations_round_up() {
        let config = QueueConfig::default()
            .with_tick_interval(Duration::from_micros(500))
            .with_enqueue_threshold(Duration::MAX);

        assert_eq!(config.tick_interval_ms, 1);
        assert_eq!(config.enqueue_threshold_ms, u64::MAX);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_tick_is_rejected() {
        let config = QueueConfig::default().with_tick_interval(Duration::from_millis(0));
        assert!(matches!(config.validate(), Err(QueueError::InvalidConfig(_))));
    }

    #[test]
    fn config_from_toml() {
        let config = QueueConfig::from_toml_str("tick_interval_ms = 20\n").unwrap();
        assert_eq!(config.tick_interval_ms, 20);
        assert_eq!(config.enqueue_threshold_ms, 3000);

        assert!(QueueConfig::from_toml_str("tick_interval_ms = 0\n").is_err());
        assert!(QueueConfig::from_toml_str("tick_interval_ms = \"fast\"\n").is_err());
    }

    #[test]
    fn config_toml_output() {
        let toml_str = QueueConfig::default().to_toml_string().unwrap();
        assert!(toml_str.contains("tick_interval_ms = 10"));
        assert!(toml_str.contains("enqueue_threshold_ms = 3000"));
    }
}
