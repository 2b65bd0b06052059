//! The head of the pipeline: emits the configured items and never receives.

use super::{StageContext, StageSummary};
use crate::channel::MessagePort;
use crate::core::{Envelope, PipelineEvent};
use crate::errors::{StageError, StageOperation};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Sends each item to the channel in order.
pub struct SourceStage {
    items: Vec<Envelope>,
    delay: Option<Duration>,
    port: Arc<dyn MessagePort>,
    ctx: StageContext,
}

impl SourceStage {
    /// Creates a source stage.
    pub fn new(
        items: Vec<Envelope>,
        delay: Option<Duration>,
        port: Arc<dyn MessagePort>,
        ctx: StageContext,
    ) -> Self {
        Self {
            items,
            delay,
            port,
            ctx,
        }
    }

    /// Returns the stage name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.ctx.name()
    }

    /// Sends every item, waiting `delay` before each one.
    pub async fn run(self) -> Result<StageSummary, StageError> {
        let Self {
            items,
            delay,
            port,
            ctx,
        } = self;
        let clock = ctx.clock();
        let mut summary = StageSummary::default();

        for envelope in items {
            let name = envelope.name().to_string();
            info!(
                stage = %ctx.name(),
                elapsed_s = clock.elapsed_secs(),
                "Sending {name}..."
            );
            if let Some(delay) = delay {
                ctx.pause(delay).await?;
            }

            ctx.guard(StageOperation::Send, port.send(envelope)).await?;
            summary.processed += 1;
            ctx.emit(PipelineEvent::submission_sent(ctx.name(), &name, clock.elapsed_ms()));
        }

        info!(
            stage = %ctx.name(),
            elapsed_s = clock.elapsed_secs(),
            sent = summary.processed,
            "All items submitted"
        );
        ctx.emit(PipelineEvent::source_finished(
            ctx.name(),
            summary.processed,
            clock.elapsed_ms(),
        ));
        Ok(summary)
    }
}

impl std::fmt::Debug for SourceStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceStage")
            .field("name", &self.ctx.name())
            .field("items", &self.items.len())
            .field("delay", &self.delay)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancellation::CancellationToken;
    use crate::channel::{ChannelConfig, MockMessagePort, SharedChannel};
    use crate::errors::ChannelError;
    use crate::events::CollectingEventSink;
    use crate::utils::PipelineClock;

    fn items(names: &[&str]) -> Vec<Envelope> {
        names.iter().map(|n| Envelope::submission(*n).unwrap()).collect()
    }

    #[tokio::test]
    async fn test_source_sends_in_order_and_reports() {
        let ch = Arc::new(SharedChannel::new(ChannelConfig::new()).unwrap());
        let sink = Arc::new(CollectingEventSink::new());
        let ctx = StageContext::new(
            "frontend",
            PipelineClock::start(),
            sink.clone(),
            Arc::new(CancellationToken::new()),
        );

        let stage = SourceStage::new(items(&["Alice", "Bob", "Charlie"]), None, ch.clone(), ctx);
        let summary = stage.run().await.unwrap();

        assert_eq!(summary.processed, 3);
        assert_eq!(ch.receive().await.unwrap().name(), "Alice");
        assert_eq!(ch.receive().await.unwrap().name(), "Bob");
        assert_eq!(ch.receive().await.unwrap().name(), "Charlie");

        let sent = sink.events_of_type("submission.sent");
        assert_eq!(sent.len(), 3);
        assert_eq!(sent[2].data_str("name"), Some("Charlie"));
        assert_eq!(sink.events_of_type("source.finished").len(), 1);
    }

    #[tokio::test]
    async fn test_source_send_fault_stops_stage() {
        let mut port = MockMessagePort::new();
        port.expect_send()
            .times(1)
            .returning(|_| Err(ChannelError::Closed));

        let stage = SourceStage::new(
            items(&["Alice", "Bob"]),
            None,
            Arc::new(port),
            StageContext::detached("frontend"),
        );
        let err = stage.run().await.unwrap_err();
        assert_eq!(err.stage, "frontend");
        assert_eq!(err.operation, StageOperation::Send);
    }
}
