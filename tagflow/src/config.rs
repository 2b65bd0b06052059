//! Run configuration for the registration pipeline.
//!
//! Values come from defaults, an optional JSON document and `TAGFLOW_*`
//! environment overrides, applied in that order.

use crate::channel::ChannelConfig;
use crate::errors::ConfigError;
use crate::stages::AssignIdentifier;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Environment variable holding a comma-separated list of item names.
pub const ENV_ITEMS: &str = "TAGFLOW_ITEMS";
/// Environment variable holding the channel capacity.
pub const ENV_CAPACITY: &str = "TAGFLOW_CAPACITY";
/// Environment variable holding the first identifier.
pub const ENV_ID_BASE: &str = "TAGFLOW_ID_BASE";
/// Environment variable holding the submit delay in seconds.
pub const ENV_SUBMIT_DELAY: &str = "TAGFLOW_SUBMIT_DELAY";
/// Environment variable holding the processing delay in seconds.
pub const ENV_PROCESS_DELAY: &str = "TAGFLOW_PROCESS_DELAY";

/// Configuration for one registration run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Pipeline name, used in logs and reports.
    #[serde(default = "default_name")]
    pub name: String,
    /// Names submitted by the source, in order.
    #[serde(default = "default_items")]
    pub items: Vec<String>,
    /// Shared channel parameters.
    #[serde(default)]
    pub channel: ChannelConfig,
    /// Identifier assigned to the first processed item.
    #[serde(default = "default_id_base")]
    pub id_base: u32,
    /// Wait before each submission, in seconds.
    #[serde(default = "default_submit_delay")]
    pub submit_delay_seconds: f64,
    /// Wait before each identifier assignment, in seconds.
    #[serde(default = "default_process_delay")]
    pub process_delay_seconds: f64,
    /// Wait before each confirmation is logged, in seconds.
    #[serde(default)]
    pub log_delay_seconds: f64,
}

fn default_name() -> String {
    "registration".to_string()
}

fn default_items() -> Vec<String> {
    vec!["Alice".to_string(), "Bob".to_string(), "Charlie".to_string()]
}

fn default_id_base() -> u32 {
    AssignIdentifier::DEFAULT_BASE
}

fn default_submit_delay() -> f64 {
    1.0
}

fn default_process_delay() -> f64 {
    3.0
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            items: default_items(),
            channel: ChannelConfig::default(),
            id_base: default_id_base(),
            submit_delay_seconds: default_submit_delay(),
            process_delay_seconds: default_process_delay(),
            log_delay_seconds: 0.0,
        }
    }
}

impl PipelineConfig {
    /// Creates a configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The three-name registration run with its one and three second waits.
    #[must_use]
    pub fn registration() -> Self {
        Self::default()
    }

    /// Parses a JSON document; missing fields take their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] if the document is malformed.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Builds the default configuration with process environment overrides.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] for an unparseable variable.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().apply_overrides(|key| std::env::var(key).ok())
    }

    /// Applies `TAGFLOW_*` overrides looked up through `lookup`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] for an unparseable value.
    pub fn apply_overrides<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup(ENV_ITEMS) {
            self.items = raw
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
        }
        if let Some(raw) = lookup(ENV_CAPACITY) {
            self.channel.capacity = parse(ENV_CAPACITY, &raw)?;
        }
        if let Some(raw) = lookup(ENV_ID_BASE) {
            self.id_base = parse(ENV_ID_BASE, &raw)?;
        }
        if let Some(raw) = lookup(ENV_SUBMIT_DELAY) {
            self.submit_delay_seconds = parse(ENV_SUBMIT_DELAY, &raw)?;
            seconds(ENV_SUBMIT_DELAY, self.submit_delay_seconds)?;
        }
        if let Some(raw) = lookup(ENV_PROCESS_DELAY) {
            self.process_delay_seconds = parse(ENV_PROCESS_DELAY, &raw)?;
            seconds(ENV_PROCESS_DELAY, self.process_delay_seconds)?;
        }
        Ok(self)
    }

    /// Sets the item names.
    #[must_use]
    pub fn with_items<I, S>(mut self, items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.items = items.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the channel configuration.
    #[must_use]
    pub fn with_channel(mut self, channel: ChannelConfig) -> Self {
        self.channel = channel;
        self
    }

    /// Sets the first identifier.
    #[must_use]
    pub fn with_id_base(mut self, base: u32) -> Self {
        self.id_base = base;
        self
    }

    /// Sets the submit and processing delays.
    #[must_use]
    pub fn with_delays(mut self, submit_seconds: f64, process_seconds: f64) -> Self {
        self.submit_delay_seconds = submit_seconds;
        self.process_delay_seconds = process_seconds;
        self
    }

    /// Zeroes every delay.
    #[must_use]
    pub fn without_delays(mut self) -> Self {
        self.submit_delay_seconds = 0.0;
        self.process_delay_seconds = 0.0;
        self.log_delay_seconds = 0.0;
        self
    }

    /// Returns the submit delay, or `None` when zero.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] for a negative or non-finite value.
    pub fn submit_delay(&self) -> Result<Option<Duration>, ConfigError> {
        seconds("submit_delay_seconds", self.submit_delay_seconds)
    }

    /// Returns the processing delay, or `None` when zero.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] for a negative or non-finite value.
    pub fn process_delay(&self) -> Result<Option<Duration>, ConfigError> {
        seconds("process_delay_seconds", self.process_delay_seconds)
    }

    /// Returns the logging delay, or `None` when zero.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] for a negative or non-finite value.
    pub fn log_delay(&self) -> Result<Option<Duration>, ConfigError> {
        seconds("log_delay_seconds", self.log_delay_seconds)
    }
}

fn parse<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T, ConfigError> {
    raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value: raw.to_string(),
    })
}

fn seconds(key: &str, value: f64) -> Result<Option<Duration>, ConfigError> {
    let duration = Duration::try_from_secs_f64(value).map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    })?;
    Ok((!duration.is_zero()).then_some(duration))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_registration_defaults() {
        let config = PipelineConfig::registration();
        assert_eq!(config.items, vec!["Alice", "Bob", "Charlie"]);
        assert_eq!(config.channel.capacity, 10);
        assert_eq!(config.id_base, 1001);
        assert_eq!(config.submit_delay().unwrap(), Some(Duration::from_secs(1)));
        assert_eq!(config.process_delay().unwrap(), Some(Duration::from_secs(3)));
        assert_eq!(config.log_delay().unwrap(), None);
    }

    #[test]
    fn test_from_json_fills_defaults() {
        let config = PipelineConfig::from_json(r#"{"items": ["Dana"], "channel": {"capacity": 2}}"#).unwrap();
        assert_eq!(config.items, vec!["Dana"]);
        assert_eq!(config.channel.capacity, 2);
        assert_eq!(config.id_base, 1001);
        assert_eq!(config.name, "registration");
    }

    #[test]
    fn test_from_json_rejects_garbage() {
        assert!(matches!(
            PipelineConfig::from_json("{not json"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_overrides() {
        let config = PipelineConfig::default()
            .apply_overrides(lookup(&[
                (ENV_ITEMS, "Eve, Frank ,,Grace"),
                (ENV_CAPACITY, "1"),
                (ENV_ID_BASE, "5000"),
                (ENV_SUBMIT_DELAY, "0"),
                (ENV_PROCESS_DELAY, "0.25"),
            ]))
            .unwrap();

        assert_eq!(config.items, vec!["Eve", "Frank", "Grace"]);
        assert_eq!(config.channel.capacity, 1);
        assert_eq!(config.id_base, 5000);
        assert_eq!(config.submit_delay().unwrap(), None);
        assert_eq!(config.process_delay().unwrap(), Some(Duration::from_millis(250)));
    }

    #[test]
    fn test_override_rejects_bad_values() {
        let err = PipelineConfig::default()
            .apply_overrides(lookup(&[(ENV_CAPACITY, "ten")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == ENV_CAPACITY));

        let err = PipelineConfig::default()
            .apply_overrides(lookup(&[(ENV_SUBMIT_DELAY, "-1")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn test_negative_delay_is_rejected() {
        let config = PipelineConfig::default().with_delays(-0.5, 0.0);
        assert!(config.submit_delay().is_err());
        assert_eq!(config.process_delay().unwrap(), None);
    }

    #[test]
    fn test_without_delays() {
        let config = PipelineConfig::default().without_delays();
        assert_eq!(config.submit_delay().unwrap(), None);
        assert_eq!(config.process_delay().unwrap(), None);
    }
}
