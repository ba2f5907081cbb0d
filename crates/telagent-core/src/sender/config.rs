//! Delivery policy configuration.

use std::time::Duration;

/// Error type for invalid configuration values.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// A value is out of its allowed range.
    Invalid { field: &'static str, reason: String },
    /// A required value is missing or empty.
    Missing(&'static str),
}

impl ConfigError {
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Invalid { field, reason } => write!(f, "invalid {}: {}", field, reason),
            ConfigError::Missing(field) => write!(f, "{} is required", field),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Flush policy of the sender.
///
/// Immutable once the sender is built. Use [`DeliveryConfig::validate`]
/// before handing it over.
#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryConfig {
    /// Item count that triggers an immediate flush; also the chunk size.
    pub fill_threshold: usize,
    /// Time since the last successful send after which a partial chunk is flushed.
    pub idle_interval: Duration,
    /// How often the idle condition is checked.
    pub idle_tick: Duration,
    /// Hard cap on buffered app metrics; the oldest excess is discarded.
    pub overflow_ceiling: usize,
    /// How often the overflow condition is checked.
    pub overflow_tick: Duration,
    /// Delay before a failed chunk is requeued.
    pub retry_backoff: Duration,
    /// Upper bound for the final flush at shutdown.
    pub drain_timeout: Duration,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            fill_threshold: 200,
            idle_interval: Duration::from_secs(10),
            idle_tick: Duration::from_secs(1),
            overflow_ceiling: 20_000,
            overflow_tick: Duration::from_secs(5),
            retry_backoff: Duration::from_secs(5),
            drain_timeout: Duration::from_secs(5),
        }
    }
}

impl DeliveryConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.fill_threshold == 0 {
            return Err(ConfigError::invalid("fill_threshold", "must be at least 1"));
        }
        if self.overflow_ceiling < self.fill_threshold {
            return Err(ConfigError::invalid(
                "overflow_ceiling",
                format!(
                    "{} is below the fill threshold ({})",
                    self.overflow_ceiling, self.fill_threshold
                ),
            ));
        }
        if self.idle_interval.is_zero() {
            return Err(ConfigError::invalid("idle_interval", "must be non-zero"));
        }
        if self.idle_tick.is_zero() {
            return Err(ConfigError::invalid("idle_tick", "must be non-zero"));
        }
        if self.overflow_tick.is_zero() {
            return Err(ConfigError::invalid("overflow_tick", "must be non-zero"));
        }
        Ok(())
    }
}
