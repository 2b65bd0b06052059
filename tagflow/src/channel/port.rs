//! The channel operations a stage is allowed to perform.

use crate::core::Envelope;
use crate::errors::ChannelError;
use async_trait::async_trait;

/// A stage's handle onto the shared channel.
///
/// [`SharedChannel`](super::SharedChannel) is the production implementation.
/// Stages only ever see this trait, which lets tests wrap the channel to
/// inject faults.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MessagePort: Send + Sync {
    /// Sends a new envelope, waiting for a free slot.
    async fn send(&self, envelope: Envelope) -> Result<(), ChannelError>;

    /// Sends an envelope produced from one this stage just consumed.
    ///
    /// Never waits for capacity.
    async fn forward(&self, envelope: Envelope) -> Result<(), ChannelError>;

    /// Receives the next envelope, waiting until one is available.
    async fn receive(&self) -> Result<Envelope, ChannelError>;

    /// Takes the next envelope if one is queued.
    fn try_receive(&self) -> Result<Option<Envelope>, ChannelError>;

    /// Puts back an envelope this stage received but does not own.
    async fn requeue(&self, envelope: Envelope) -> Result<(), ChannelError>;

    /// Returns a counter that grows with every envelope put on the channel.
    fn activity(&self) -> u64;

    /// Waits until [`activity`](Self::activity) exceeds `after`.
    async fn wait_for_activity(&self, after: u64) -> Result<(), ChannelError>;
}
