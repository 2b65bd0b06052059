//! Fault injection on top of a real channel port.

use crate::channel::MessagePort;
use crate::core::Envelope;
use crate::errors::{ChannelError, StageOperation};
use crate::pipeline::PortWrapper;
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Forwards to an inner port but fails one kind of operation once it has
/// succeeded `fail_after` times.
///
/// `Send` covers both `send` and `forward`; `Receive` covers `receive` and
/// `try_receive`. Every later call of that operation fails too. Other
/// operations are never affected.
pub struct FaultInjectingPort {
    inner: Arc<dyn MessagePort>,
    operation: StageOperation,
    fail_after: usize,
    calls: AtomicUsize,
}

impl FaultInjectingPort {
    /// Wraps `inner`.
    pub fn new(inner: Arc<dyn MessagePort>, operation: StageOperation, fail_after: usize) -> Self {
        Self {
            inner,
            operation,
            fail_after,
            calls: AtomicUsize::new(0),
        }
    }

    /// Returns a wrapper for [`StageDefinition::with_port_wrapper`](crate::pipeline::StageDefinition::with_port_wrapper).
    #[must_use]
    pub fn wrapper(operation: StageOperation, fail_after: usize) -> PortWrapper {
        Arc::new(move |inner: Arc<dyn MessagePort>| {
            Arc::new(Self::new(inner, operation, fail_after)) as Arc<dyn MessagePort>
        })
    }

    /// Returns how many times the targeted operation was attempted.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn check(&self, operation: StageOperation) -> Result<(), ChannelError> {
        if operation != self.operation {
            return Ok(());
        }
        let attempt = self.calls.fetch_add(1, Ordering::SeqCst);
        if attempt < self.fail_after {
            return Ok(());
        }
        Err(match operation {
            StageOperation::Receive => ChannelError::receive_failed("injected fault"),
            _ => ChannelError::send_failed("injected fault"),
        })
    }
}

#[async_trait]
impl MessagePort for FaultInjectingPort {
    async fn send(&self, envelope: Envelope) -> Result<(), ChannelError> {
        self.check(StageOperation::Send)?;
        self.inner.send(envelope).await
    }

    async fn forward(&self, envelope: Envelope) -> Result<(), ChannelError> {
        self.check(StageOperation::Send)?;
        self.inner.forward(envelope).await
    }

    async fn receive(&self) -> Result<Envelope, ChannelError> {
        self.check(StageOperation::Receive)?;
        self.inner.receive().await
    }

    fn try_receive(&self) -> Result<Option<Envelope>, ChannelError> {
        self.check(StageOperation::Receive)?;
        self.inner.try_receive()
    }

    async fn requeue(&self, envelope: Envelope) -> Result<(), ChannelError> {
        self.check(StageOperation::Requeue)?;
        self.inner.requeue(envelope).await
    }

    fn activity(&self) -> u64 {
        self.inner.activity()
    }

    async fn wait_for_activity(&self, after: u64) -> Result<(), ChannelError> {
        self.inner.wait_for_activity(after).await
    }
}

impl std::fmt::Debug for FaultInjectingPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FaultInjectingPort")
            .field("operation", &self.operation)
            .field("fail_after", &self.fail_after)
            .field("calls", &self.calls())
            .finish_non_exhaustive()
    }
}
