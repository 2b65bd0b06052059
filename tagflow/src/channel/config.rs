//! Construction parameters for the shared channel.

use crate::core::Envelope;
use crate::errors::ChannelError;
use serde::{Deserialize, Serialize};

/// What `send` does when the queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SendMode {
    /// Wait for a free slot (default).
    #[default]
    Blocking,
    /// Fail with `CapacityExceeded`.
    NonBlocking,
}

/// Configuration for a [`SharedChannel`](super::SharedChannel).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// Maximum number of queued envelopes.
    #[serde(default = "default_capacity")]
    pub capacity: usize,
    /// Maximum wire size of a single envelope.
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,
    /// Behavior of `send` on a full queue.
    #[serde(default)]
    pub send_mode: SendMode,
}

fn default_capacity() -> usize {
    10
}

fn default_max_message_size() -> usize {
    Envelope::MAX_WIRE_SIZE
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            max_message_size: default_max_message_size(),
            send_mode: SendMode::default(),
        }
    }
}

impl ChannelConfig {
    /// Creates a configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the capacity.
    #[must_use]
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Sets the per-message bound.
    #[must_use]
    pub fn with_max_message_size(mut self, size: usize) -> Self {
        self.max_message_size = size;
        self
    }

    /// Sets the send mode.
    #[must_use]
    pub fn with_send_mode(mut self, mode: SendMode) -> Self {
        self.send_mode = mode;
        self
    }

    /// Checks that a channel can be built from this configuration.
    pub fn validate(&self) -> Result<(), ChannelError> {
        if self.capacity == 0 {
            return Err(ChannelError::creation_failed("capacity must be positive"));
        }
        if self.max_message_size < Envelope::MIN_WIRE_SIZE {
            return Err(ChannelError::creation_failed(format!(
                "max message size {} is below the smallest envelope ({} bytes)",
                self.max_message_size,
                Envelope::MIN_WIRE_SIZE
            )));
        }
        Ok(())
    }
}
