//! Per-stage execution context.

use crate::cancellation::CancellationToken;
use crate::core::PipelineEvent;
use crate::errors::{ChannelError, StageError, StageOperation};
use crate::events::{EventSink, NoOpEventSink};
use crate::utils::PipelineClock;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Everything a stage needs besides its channel port.
///
/// The clock is read-only and shared by copy; the event sink and the
/// cancellation token are shared with every other stage of the same run.
#[derive(Clone)]
pub struct StageContext {
    name: String,
    clock: PipelineClock,
    events: Arc<dyn EventSink>,
    cancel: Arc<CancellationToken>,
}

impl StageContext {
    /// Creates a new stage context.
    pub fn new(
        name: impl Into<String>,
        clock: PipelineClock,
        events: Arc<dyn EventSink>,
        cancel: Arc<CancellationToken>,
    ) -> Self {
        Self {
            name: name.into(),
            clock,
            events,
            cancel,
        }
    }

    /// Creates a context with a fresh clock, no event sink and its own token.
    pub fn detached(name: impl Into<String>) -> Self {
        Self::new(
            name,
            PipelineClock::start(),
            Arc::new(NoOpEventSink),
            Arc::new(CancellationToken::new()),
        )
    }

    /// Returns the stage name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the run clock.
    #[must_use]
    pub fn clock(&self) -> PipelineClock {
        self.clock
    }

    /// Returns the run's cancellation token.
    #[must_use]
    pub fn cancel_token(&self) -> &Arc<CancellationToken> {
        &self.cancel
    }

    /// Hands an event to the sink.
    pub fn emit(&self, event: PipelineEvent) {
        self.events.try_emit(event);
    }

    /// Runs a channel operation, giving up if the run is cancelled first.
    ///
    /// Channel faults are wrapped into a [`StageError`] naming this stage and
    /// `operation`.
    pub async fn guard<T, F>(&self, operation: StageOperation, fut: F) -> Result<T, StageError>
    where
        F: Future<Output = Result<T, ChannelError>>,
    {
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => Err(self.cancelled_error(operation)),
            result = fut => result.map_err(|err| StageError::new(self.name.as_str(), operation, err)),
        }
    }

    /// Sleeps for the per-item delay, giving up if the run is cancelled.
    pub async fn pause(&self, delay: Duration) -> Result<(), StageError> {
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => Err(self.cancelled_error(StageOperation::Delay)),
            () = tokio::time::sleep(delay) => Ok(()),
        }
    }

    fn cancelled_error(&self, operation: StageOperation) -> StageError {
        let reason = self
            .cancel
            .reason()
            .unwrap_or_else(|| "pipeline cancelled".to_string());
        StageError::cancelled(self.name.as_str(), operation, reason)
    }
}

impl std::fmt::Debug for StageContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageContext")
            .field("name", &self.name)
            .field("clock", &self.clock)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}
