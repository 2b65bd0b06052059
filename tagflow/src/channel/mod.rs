//! The shared channel every stage sends to and receives from.
//!
//! This module provides:
//! - [`SharedChannel`], a bounded tag-agnostic FIFO
//! - [`MessagePort`], the operations a stage may perform on it
//! - [`ChannelConfig`] and [`ChannelMetrics`]

mod config;
mod metrics;
mod port;
mod shared;

pub use config::{ChannelConfig, SendMode};
pub use metrics::{ChannelMetrics, ChannelMetricsSnapshot};
#[cfg(test)]
pub use port::MockMessagePort;
pub use port::MessagePort;
pub use shared::SharedChannel;
