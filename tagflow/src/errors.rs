//! Error types for the tagflow pipeline.
//!
//! Channel faults, envelope construction faults, stage faults and pipeline
//! description faults each have their own type. [`TagflowError`] wraps them
//! for callers that only care that something went wrong.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

/// The main error type for tagflow operations.
#[derive(Debug, Error)]
pub enum TagflowError {
    /// A shared channel fault.
    #[error("{0}")]
    Channel(#[from] ChannelError),

    /// An envelope could not be built.
    #[error("{0}")]
    Envelope(#[from] EnvelopeError),

    /// The pipeline description is malformed.
    #[error("{0}")]
    Validation(#[from] PipelineValidationError),

    /// Configuration could not be loaded.
    #[error("{0}")]
    Config(#[from] ConfigError),
}

/// Faults raised by the shared channel.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelError {
    /// The channel could not be created.
    #[error("Channel creation failed: {reason}")]
    CreationFailed {
        /// Why the configuration was rejected.
        reason: String,
    },

    /// The channel was torn down.
    #[error("Channel closed")]
    Closed,

    /// The queue was full and the send was non-blocking.
    #[error("Channel capacity exceeded ({capacity} slots)")]
    CapacityExceeded {
        /// The configured capacity.
        capacity: usize,
    },

    /// Teardown was requested a second time.
    #[error("Channel already closed")]
    AlreadyClosed,

    /// The envelope is larger than the per-message bound.
    #[error("Message too large: {size} bytes exceeds limit of {max} bytes")]
    MessageTooLarge {
        /// Wire size of the rejected envelope.
        size: usize,
        /// Configured per-message bound.
        max: usize,
    },

    /// A send failed for a reason other than closure or capacity.
    #[error("Send failed: {reason}")]
    SendFailed {
        /// Failure detail.
        reason: String,
    },

    /// A receive failed for a reason other than closure.
    #[error("Receive failed: {reason}")]
    ReceiveFailed {
        /// Failure detail.
        reason: String,
    },
}

impl ChannelError {
    /// Creates a creation failure.
    #[must_use]
    pub fn creation_failed(reason: impl Into<String>) -> Self {
        Self::CreationFailed {
            reason: reason.into(),
        }
    }

    /// Creates a send failure.
    #[must_use]
    pub fn send_failed(reason: impl Into<String>) -> Self {
        Self::SendFailed {
            reason: reason.into(),
        }
    }

    /// Creates a receive failure.
    #[must_use]
    pub fn receive_failed(reason: impl Into<String>) -> Self {
        Self::ReceiveFailed {
            reason: reason.into(),
        }
    }

    /// Returns a stable identifier for the error variant.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::CreationFailed { .. } => "ChannelCreationFailed",
            Self::Closed => "ChannelClosed",
            Self::CapacityExceeded { .. } => "CapacityExceeded",
            Self::AlreadyClosed => "AlreadyClosed",
            Self::MessageTooLarge { .. } => "MessageTooLarge",
            Self::SendFailed { .. } => "SendFailed",
            Self::ReceiveFailed { .. } => "ReceiveFailed",
        }
    }

    /// Converts to a dictionary representation.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let mut map = HashMap::new();
        map.insert("type".to_string(), serde_json::json!(self.code()));
        map.insert("message".to_string(), serde_json::json!(self.to_string()));
        map
    }
}

/// Faults raised while constructing an envelope.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EnvelopeError {
    /// The name was empty.
    #[error("Envelope name must not be empty")]
    EmptyName,

    /// The name exceeds the bounded length.
    #[error("Envelope name is {len} bytes, limit is {max}")]
    NameTooLong {
        /// Actual length in bytes.
        len: usize,
        /// Maximum length in bytes.
        max: usize,
    },

    /// The identifier range is exhausted.
    #[error("Identifier overflow: base {base} + sequence {sequence}")]
    IdentifierOverflow {
        /// The configured base identifier.
        base: u32,
        /// The item's sequence number.
        sequence: usize,
    },

    /// A transform expected a different message kind.
    #[error("Expected a {expected} envelope, got {actual}")]
    UnexpectedKind {
        /// The kind the transform accepts.
        expected: String,
        /// The kind it was given.
        actual: String,
    },
}

/// The channel or stage operation during which a fault occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageOperation {
    /// Sending a new envelope.
    Send,
    /// Receiving an envelope.
    Receive,
    /// Putting back an envelope owned by another stage.
    Requeue,
    /// Applying the stage transform.
    Transform,
    /// Waiting out the per-item delay.
    Delay,
}

impl fmt::Display for StageOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Send => write!(f, "send"),
            Self::Receive => write!(f, "receive"),
            Self::Requeue => write!(f, "requeue"),
            Self::Transform => write!(f, "transform"),
            Self::Delay => write!(f, "delay"),
        }
    }
}

/// The underlying cause of a stage fault.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StageFault {
    /// The channel rejected an operation.
    #[error(transparent)]
    Channel(#[from] ChannelError),

    /// The transform could not build its output.
    #[error(transparent)]
    Envelope(#[from] EnvelopeError),

    /// A sibling stage faulted and the run was cancelled.
    #[error("cancelled: {reason}")]
    Cancelled {
        /// The reason recorded on the cancellation token.
        reason: String,
    },
}

/// A fatal fault in one stage.
///
/// Identifies which stage failed and during which operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Stage '{stage}' failed during {operation}: {fault}")]
pub struct StageError {
    /// The stage name.
    pub stage: String,
    /// The operation that failed.
    pub operation: StageOperation,
    /// The cause.
    #[source]
    pub fault: StageFault,
}

impl StageError {
    /// Creates a new stage error.
    #[must_use]
    pub fn new(stage: impl Into<String>, operation: StageOperation, fault: impl Into<StageFault>) -> Self {
        Self {
            stage: stage.into(),
            operation,
            fault: fault.into(),
        }
    }

    /// Creates a cancellation error.
    #[must_use]
    pub fn cancelled(stage: impl Into<String>, operation: StageOperation, reason: impl Into<String>) -> Self {
        Self::new(
            stage,
            operation,
            StageFault::Cancelled {
                reason: reason.into(),
            },
        )
    }

    /// Returns true if the stage stopped because the run was cancelled.
    #[must_use]
    pub fn is_cancellation(&self) -> bool {
        matches!(self.fault, StageFault::Cancelled { .. })
    }

    /// Converts to a dictionary representation.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let mut map = HashMap::new();
        map.insert("stage".to_string(), serde_json::json!(self.stage));
        map.insert("operation".to_string(), serde_json::json!(self.operation.to_string()));
        map.insert("message".to_string(), serde_json::json!(self.to_string()));
        if let StageFault::Channel(ref err) = self.fault {
            map.insert("type".to_string(), serde_json::json!(err.code()));
        }
        map
    }
}

/// Metadata about a validation error for better diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ContractErrorInfo {
    /// Error code (e.g., "PIPELINE-UNKNOWN-TAG").
    pub code: String,
    /// Short summary of the error.
    pub summary: String,
    /// Hint for fixing the error.
    pub fix_hint: Option<String>,
}

impl ContractErrorInfo {
    /// Creates a new contract error info.
    #[must_use]
    pub fn new(code: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            summary: summary.into(),
            fix_hint: None,
        }
    }

    /// Sets the fix hint.
    #[must_use]
    pub fn with_fix_hint(mut self, hint: impl Into<String>) -> Self {
        self.fix_hint = Some(hint.into());
        self
    }
}

/// Error raised when a pipeline description is rejected.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct PipelineValidationError {
    /// The error message.
    pub message: String,
    /// The stages involved in the error.
    pub stages: Vec<String>,
    /// Optional contract error info.
    pub error_info: Option<ContractErrorInfo>,
}

impl PipelineValidationError {
    /// Creates a new pipeline validation error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            stages: Vec::new(),
            error_info: None,
        }
    }

    /// Sets the stages involved.
    #[must_use]
    pub fn with_stages(mut self, stages: Vec<String>) -> Self {
        self.stages = stages;
        self
    }

    /// Sets the contract error info.
    #[must_use]
    pub fn with_error_info(mut self, info: ContractErrorInfo) -> Self {
        self.error_info = Some(info);
        self
    }

    /// Returns the error code, if any.
    #[must_use]
    pub fn code(&self) -> Option<&str> {
        self.error_info.as_ref().map(|info| info.code.as_str())
    }
}

/// Error raised when configuration cannot be loaded.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// An environment variable held an unparseable value.
    #[error("Invalid value for {key}: '{value}'")]
    InvalidValue {
        /// The variable name.
        key: String,
        /// The raw value.
        value: String,
    },

    /// A JSON document could not be parsed.
    #[error("Invalid configuration document: {0}")]
    Parse(String),
}

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> Self {
        Self::Parse(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_error_codes() {
        assert_eq!(ChannelError::Closed.code(), "ChannelClosed");
        assert_eq!(ChannelError::AlreadyClosed.code(), "AlreadyClosed");
        assert_eq!(ChannelError::send_failed("boom").code(), "SendFailed");
        assert_eq!(
            ChannelError::creation_failed("zero capacity").to_string(),
            "Channel creation failed: zero capacity"
        );
    }

    #[test]
    fn test_stage_error_names_stage_and_operation() {
        let err = StageError::new("database", StageOperation::Send, ChannelError::send_failed("injected"));

        let message = err.to_string();
        assert!(message.contains("database"));
        assert!(message.contains("send"));
        assert!(!err.is_cancellation());

        let dict = err.to_dict();
        assert_eq!(dict.get("type").unwrap(), "SendFailed");
        assert_eq!(dict.get("operation").unwrap(), "send");
    }

    #[test]
    fn test_cancelled_stage_error() {
        let err = StageError::cancelled("logger", StageOperation::Receive, "database faulted");
        assert!(err.is_cancellation());
        assert!(err.to_string().contains("database faulted"));
    }

    #[test]
    fn test_validation_error_code() {
        let err = PipelineValidationError::new("bad")
            .with_error_info(ContractErrorInfo::new("PIPELINE-EMPTY", "no stages"));
        assert_eq!(err.code(), Some("PIPELINE-EMPTY"));
        assert_eq!(PipelineValidationError::new("x").code(), None);
    }

    #[test]
    fn test_top_level_conversion() {
        let err: TagflowError = ChannelError::Closed.into();
        assert!(matches!(err, TagflowError::Channel(ChannelError::Closed)));
    }
}
