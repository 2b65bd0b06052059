//! Progress events emitted at each lifecycle point of a pipeline run.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// An event emitted by a stage while it runs.
///
/// Events are a side channel for observability; they are handed to an
/// [`EventSink`](crate::events::EventSink) and never influence routing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineEvent {
    /// The event type (e.g., "submission.sent", "confirmation.logged").
    #[serde(rename = "type")]
    pub event_type: String,

    /// The stage that emitted the event.
    pub stage: String,

    /// When the event occurred (ISO 8601).
    pub timestamp: String,

    /// Time since the pipeline clock started, in milliseconds.
    pub elapsed_ms: u64,

    /// The event payload data.
    #[serde(default)]
    pub data: HashMap<String, serde_json::Value>,
}

impl PipelineEvent {
    /// Creates a new event.
    #[must_use]
    pub fn new(event_type: impl Into<String>, stage: impl Into<String>, elapsed_ms: u64) -> Self {
        Self {
            event_type: event_type.into(),
            stage: stage.into(),
            timestamp: crate::utils::iso_timestamp(),
            elapsed_ms,
            data: HashMap::new(),
        }
    }

    /// Adds a data field to the event.
    #[must_use]
    pub fn add_data(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.data.insert(key.into(), value);
        self
    }

    /// Returns a data field as a string, if present.
    #[must_use]
    pub fn data_str(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(serde_json::Value::as_str)
    }

    /// Returns a data field as an unsigned integer, if present.
    #[must_use]
    pub fn data_u64(&self, key: &str) -> Option<u64> {
        self.data.get(key).and_then(serde_json::Value::as_u64)
    }

    /// Creates a "submission.sent" event.
    #[must_use]
    pub fn submission_sent(stage: &str, name: &str, elapsed_ms: u64) -> Self {
        Self::new("submission.sent", stage, elapsed_ms).add_data("name", serde_json::json!(name))
    }

    /// Creates a "source.finished" event.
    #[must_use]
    pub fn source_finished(stage: &str, sent: usize, elapsed_ms: u64) -> Self {
        Self::new("source.finished", stage, elapsed_ms).add_data("sent", serde_json::json!(sent))
    }

    /// Creates a "processing.started" event.
    #[must_use]
    pub fn processing_started(stage: &str, name: &str, elapsed_ms: u64) -> Self {
        Self::new("processing.started", stage, elapsed_ms).add_data("name", serde_json::json!(name))
    }

    /// Creates a "processing.finished" event.
    #[must_use]
    pub fn processing_finished(
        stage: &str,
        name: &str,
        id: Option<u32>,
        duration_ms: f64,
        elapsed_ms: u64,
    ) -> Self {
        Self::new("processing.finished", stage, elapsed_ms)
            .add_data("name", serde_json::json!(name))
            .add_data("id", serde_json::json!(id))
            .add_data("duration_ms", serde_json::json!(duration_ms))
    }

    /// Creates a "confirmation.logged" event.
    #[must_use]
    pub fn confirmation_logged(stage: &str, name: &str, id: u32, elapsed_ms: u64) -> Self {
        Self::new("confirmation.logged", stage, elapsed_ms)
            .add_data("name", serde_json::json!(name))
            .add_data("id", serde_json::json!(id))
    }

    /// Creates a "stage.completed" event.
    #[must_use]
    pub fn stage_completed(stage: &str, processed: usize, requeued: usize, elapsed_ms: u64) -> Self {
        Self::new("stage.completed", stage, elapsed_ms)
            .add_data("processed", serde_json::json!(processed))
            .add_data("requeued", serde_json::json!(requeued))
    }

    /// Creates a "stage.failed" event.
    #[must_use]
    pub fn stage_failed(stage: &str, operation: &str, error: &str, elapsed_ms: u64) -> Self {
        Self::new("stage.failed", stage, elapsed_ms)
            .add_data("operation", serde_json::json!(operation))
            .add_data("error", serde_json::json!(error))
    }
}
