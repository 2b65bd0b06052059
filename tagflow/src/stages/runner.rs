//! Generic consume-transform-emit stage driver.

use super::{StageContext, Transform, TransformContext};
use crate::channel::MessagePort;
use crate::core::{Envelope, MessageKind, PipelineEvent};
use crate::errors::{EnvelopeError, StageError, StageOperation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, trace};

/// Static parameters of a [`StageRunner`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunnerConfig {
    /// The only message kind this stage consumes.
    pub expected_tag: MessageKind,
    /// Matching envelopes to process before terminating.
    pub expected_total: usize,
    /// Fixed wait before each transform, modelling slow work.
    pub delay: Option<Duration>,
}

impl RunnerConfig {
    /// Creates a configuration without a delay.
    #[must_use]
    pub fn new(expected_tag: MessageKind, expected_total: usize) -> Self {
        Self {
            expected_tag,
            expected_total,
            delay: None,
        }
    }

    /// Sets the per-item delay.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

/// What a stage did before it terminated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageSummary {
    /// Envelopes this stage consumed (or emitted, for a source).
    pub processed: usize,
    /// Foreign envelopes this stage put back.
    pub requeued: usize,
}

/// Drives one consuming stage until it has processed `expected_total`
/// envelopes of its own kind.
///
/// Every stage sees every message. When the head of the queue belongs to
/// another stage, the runner drains whatever is queued at that moment,
/// keeps the first envelope of its own kind and requeues the rest unchanged
/// and in the order it took them. Requeued envelopes are never counted as
/// processed. If a pass finds nothing to keep, the runner waits for new
/// traffic instead of spinning.
pub struct StageRunner {
    config: RunnerConfig,
    transform: Arc<dyn Transform>,
    port: Arc<dyn MessagePort>,
    ctx: StageContext,
}

impl StageRunner {
    /// Creates a runner.
    pub fn new(
        config: RunnerConfig,
        transform: Arc<dyn Transform>,
        port: Arc<dyn MessagePort>,
        ctx: StageContext,
    ) -> Self {
        Self {
            config,
            transform,
            port,
            ctx,
        }
    }

    /// Returns the stage name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.ctx.name()
    }

    /// Runs the stage to its terminal count or its first fault.
    pub async fn run(self) -> Result<StageSummary, StageError> {
        let mut summary = StageSummary::default();
        debug!(
            stage = %self.ctx.name(),
            expected_tag = %self.config.expected_tag,
            expected_total = self.config.expected_total,
            "Stage runner started"
        );

        while summary.processed < self.config.expected_total {
            let head = self
                .ctx
                .guard(StageOperation::Receive, self.port.receive())
                .await?;

            let envelope = if head.kind() == self.config.expected_tag {
                head
            } else {
                match self.sweep(head, &mut summary).await? {
                    Some(envelope) => envelope,
                    None => continue,
                }
            };

            let output = self.process(envelope, summary.processed).await?;
            summary.processed += 1;

            if let Some(output) = output {
                self.ctx
                    .guard(StageOperation::Send, self.port.forward(output))
                    .await?;
            }
        }

        let clock = self.ctx.clock();
        debug!(
            stage = %self.ctx.name(),
            processed = summary.processed,
            requeued = summary.requeued,
            "Stage runner finished"
        );
        self.ctx.emit(PipelineEvent::stage_completed(
            self.ctx.name(),
            summary.processed,
            summary.requeued,
            clock.elapsed_ms(),
        ));
        Ok(summary)
    }

    /// Looks past a foreign head for an envelope this stage owns.
    async fn sweep(
        &self,
        head: Envelope,
        summary: &mut StageSummary,
    ) -> Result<Option<Envelope>, StageError> {
        let seen = self.port.activity();
        let mut held = vec![head];
        let mut own = None;

        while let Some(envelope) = self
            .port
            .try_receive()
            .map_err(|err| StageError::new(self.ctx.name(), StageOperation::Receive, err))?
        {
            if own.is_none() && envelope.kind() == self.config.expected_tag {
                own = Some(envelope);
            } else {
                held.push(envelope);
            }
        }

        trace!(
            stage = %self.ctx.name(),
            requeued = held.len(),
            found = own.is_some(),
            "Putting back envelopes after a pass"
        );
        let put_back = u64::try_from(held.len()).unwrap_or(u64::MAX);
        for envelope in held {
            self.ctx
                .guard(StageOperation::Requeue, self.port.requeue(envelope))
                .await?;
            summary.requeued += 1;
        }

        if own.is_none() {
            // Our own requeues do not count as new traffic.
            self.ctx
                .guard(
                    StageOperation::Receive,
                    self.port.wait_for_activity(seen + put_back),
                )
                .await?;
        }
        Ok(own)
    }

    async fn process(
        &self,
        envelope: Envelope,
        sequence: usize,
    ) -> Result<Option<Envelope>, StageError> {
        let emits = self.transform.emits();
        let name = envelope.name().to_string();
        let clock = self.ctx.clock();
        let started = Instant::now();

        if emits.is_some() {
            info!(
                stage = %self.ctx.name(),
                elapsed_s = clock.elapsed_secs(),
                "Start processing {name}..."
            );
            self.ctx.emit(PipelineEvent::processing_started(
                self.ctx.name(),
                &name,
                clock.elapsed_ms(),
            ));
        }

        if let Some(delay) = self.config.delay {
            self.ctx.pause(delay).await?;
        }

        let output = self
            .transform
            .apply(envelope, TransformContext { stage: &self.ctx, sequence })
            .await
            .and_then(|output| check_output_kind(emits, output))
            .map_err(|err| StageError::new(self.ctx.name(), StageOperation::Transform, err))?;

        if let Some(ref out) = output {
            let duration_ms = started.elapsed().as_secs_f64() * 1000.0;
            match out.id() {
                Some(id) => info!(
                    stage = %self.ctx.name(),
                    elapsed_s = clock.elapsed_secs(),
                    "Finished processing {name}. Assigned ID: {id}"
                ),
                None => info!(
                    stage = %self.ctx.name(),
                    elapsed_s = clock.elapsed_secs(),
                    "Finished processing {name}"
                ),
            }
            self.ctx.emit(PipelineEvent::processing_finished(
                self.ctx.name(),
                &name,
                out.id(),
                duration_ms,
                clock.elapsed_ms(),
            ));
        }

        Ok(output)
    }
}

impl std::fmt::Debug for StageRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageRunner")
            .field("name", &self.ctx.name())
            .field("config", &self.config)
            .field("transform", &self.transform)
            .finish_non_exhaustive()
    }
}

/// Rejects a transform output whose kind differs from the declared one.
///
/// A transform that declares a kind yields exactly one envelope per input;
/// downstream totals are derived from that.
fn check_output_kind(
    emits: Option<MessageKind>,
    output: Option<Envelope>,
) -> Result<Option<Envelope>, EnvelopeError> {
    match (emits, &output) {
        (Some(expected), None) => Err(EnvelopeError::UnexpectedKind {
            expected: expected.to_string(),
            actual: "nothing".to_string(),
        }),
        (Some(expected), Some(out)) if out.kind() != expected => Err(EnvelopeError::UnexpectedKind {
            expected: expected.to_string(),
            actual: out.kind().to_string(),
        }),
        (None, Some(out)) => Err(EnvelopeError::UnexpectedKind {
            expected: "no".to_string(),
            actual: out.kind().to_string(),
        }),
        _ => Ok(output),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{ChannelConfig, MockMessagePort, SharedChannel};
    use crate::errors::{ChannelError, StageFault};
    use crate::events::CollectingEventSink;
    use crate::stages::{AssignIdentifier, ConfirmationLedger, FnTransform, RecordConfirmation};
    use crate::cancellation::CancellationToken;
    use crate::utils::PipelineClock;
    use pretty_assertions::assert_eq;

    fn sub(name: &str) -> Envelope {
        Envelope::submission(name).unwrap()
    }

    fn conf(name: &str, id: u32) -> Envelope {
        Envelope::confirmation(name, id).unwrap()
    }

    fn channel() -> Arc<SharedChannel> {
        Arc::new(SharedChannel::new(ChannelConfig::new()).unwrap())
    }

    #[tokio::test]
    async fn test_processing_stage_assigns_sequential_ids() {
        let ch = channel();
        for name in ["Alice", "Bob", "Charlie"] {
            ch.send(sub(name)).await.unwrap();
        }

        let runner = StageRunner::new(
            RunnerConfig::new(MessageKind::Submission, 3),
            Arc::new(AssignIdentifier::default()),
            ch.clone(),
            StageContext::detached("database"),
        );
        let summary = runner.run().await.unwrap();
        assert_eq!(summary, StageSummary { processed: 3, requeued: 0 });

        let mut out = Vec::new();
        while let Ok(Some(env)) = tokio::time::timeout(Duration::from_millis(10), ch.receive())
            .await
            .map(Result::ok)
        {
            out.push(env);
        }
        assert_eq!(out, vec![conf("Alice", 1001), conf("Bob", 1002), conf("Charlie", 1003)]);
    }

    #[tokio::test]
    async fn test_foreign_envelopes_are_requeued_not_counted() {
        let ch = channel();
        // Out-of-order tags: confirmations interleaved ahead of submissions.
        ch.send(conf("Zed", 7)).await.unwrap();
        ch.send(sub("Alice")).await.unwrap();
        ch.send(conf("Yan", 8)).await.unwrap();
        ch.send(sub("Bob")).await.unwrap();

        let runner = StageRunner::new(
            RunnerConfig::new(MessageKind::Submission, 2),
            Arc::new(AssignIdentifier::new(1)),
            ch.clone(),
            StageContext::detached("database"),
        );
        let summary = runner.run().await.unwrap();

        // Each pass puts back everything except the one envelope it keeps.
        assert_eq!(summary, StageSummary { processed: 2, requeued: 6 });

        // Nothing was dropped and confirmations kept their relative order.
        let mut remaining = Vec::new();
        while let Some(env) = ch.try_receive().unwrap() {
            remaining.push(env);
        }
        assert_eq!(
            remaining,
            vec![conf("Zed", 7), conf("Yan", 8), conf("Alice", 1), conf("Bob", 2)]
        );
    }

    #[tokio::test]
    async fn test_fruitless_pass_waits_for_new_traffic() {
        let ch = channel();
        ch.send(sub("Alice")).await.unwrap();

        let ledger = ConfirmationLedger::new();
        let runner = StageRunner::new(
            RunnerConfig::new(MessageKind::Confirmation, 1),
            Arc::new(RecordConfirmation::new(ledger.clone())),
            ch.clone(),
            StageContext::detached("logger"),
        );
        let handle = tokio::spawn(runner.run());

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!handle.is_finished());
        // One pass, one requeue: the runner is parked, not spinning.
        assert_eq!(ch.metrics().snapshot().requeued, 1);

        ch.send(conf("Alice", 1001)).await.unwrap();
        let summary = tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap()
            .unwrap();

        assert_eq!(summary, StageSummary { processed: 1, requeued: 2 });
        assert_eq!(ledger.ids(), vec![1001]);
        assert_eq!(ch.try_receive().unwrap(), Some(sub("Alice")));
    }

    #[tokio::test]
    async fn test_two_consumers_do_not_livelock() {
        let ch = channel();
        // Each consumer's first look lands on the other's envelope.
        ch.send(sub("Bob")).await.unwrap();
        ch.send(conf("Alice", 1001)).await.unwrap();

        let ledger = ConfirmationLedger::new();
        let logger = StageRunner::new(
            RunnerConfig::new(MessageKind::Confirmation, 2),
            Arc::new(RecordConfirmation::new(ledger.clone())),
            ch.clone(),
            StageContext::detached("logger"),
        );
        let database = StageRunner::new(
            RunnerConfig::new(MessageKind::Submission, 1),
            Arc::new(AssignIdentifier::new(1002)),
            ch.clone(),
            StageContext::detached("database"),
        );

        let logger = tokio::spawn(logger.run());
        let database = tokio::spawn(database.run());
        let (logger, database) = tokio::time::timeout(Duration::from_secs(1), async {
            (logger.await, database.await)
        })
        .await
        .unwrap();

        assert_eq!(logger.unwrap().unwrap().processed, 2);
        assert_eq!(database.unwrap().unwrap().processed, 1);
        let mut ids = ledger.ids();
        ids.sort_unstable();
        assert_eq!(ids, vec![1001, 1002]);
        assert!(ch.is_empty());
    }

    #[tokio::test]
    async fn test_terminal_stage_emits_nothing() {
        let ch = channel();
        ch.send(conf("Alice", 1001)).await.unwrap();
        ch.send(conf("Bob", 1002)).await.unwrap();

        let ledger = ConfirmationLedger::new();
        let sink = Arc::new(CollectingEventSink::new());
        let ctx = StageContext::new(
            "logger",
            PipelineClock::start(),
            sink.clone(),
            Arc::new(CancellationToken::new()),
        );
        let runner = StageRunner::new(
            RunnerConfig::new(MessageKind::Confirmation, 2),
            Arc::new(RecordConfirmation::new(ledger.clone())),
            ch.clone(),
            ctx,
        );

        runner.run().await.unwrap();
        assert!(ch.is_empty());
        assert_eq!(ledger.ids(), vec![1001, 1002]);
        assert_eq!(sink.events_of_type("confirmation.logged").len(), 2);
        assert_eq!(sink.events_of_type("processing.started").len(), 0);
        assert_eq!(sink.events_of_type("stage.completed").len(), 1);
    }

    #[tokio::test]
    async fn test_receive_fault_is_fatal() {
        let mut port = MockMessagePort::new();
        port.expect_receive()
            .times(1)
            .returning(|| Err(ChannelError::receive_failed("injected")));
        port.expect_forward().never();

        let runner = StageRunner::new(
            RunnerConfig::new(MessageKind::Submission, 3),
            Arc::new(AssignIdentifier::default()),
            Arc::new(port),
            StageContext::detached("database"),
        );
        let err = runner.run().await.unwrap_err();

        assert_eq!(err.stage, "database");
        assert_eq!(err.operation, StageOperation::Receive);
        assert_eq!(err.fault, StageFault::Channel(ChannelError::receive_failed("injected")));
    }

    #[tokio::test]
    async fn test_send_fault_is_fatal_after_counting() {
        let mut port = MockMessagePort::new();
        port.expect_receive().times(1).returning(|| Ok(sub("Alice")));
        port.expect_forward()
            .times(1)
            .returning(|_| Err(ChannelError::send_failed("injected")));

        let runner = StageRunner::new(
            RunnerConfig::new(MessageKind::Submission, 3),
            Arc::new(AssignIdentifier::default()),
            Arc::new(port),
            StageContext::detached("database"),
        );
        let err = runner.run().await.unwrap_err();
        assert_eq!(err.operation, StageOperation::Send);
    }

    #[tokio::test]
    async fn test_wrong_output_kind_is_rejected() {
        let ch = channel();
        ch.send(sub("Alice")).await.unwrap();

        // Declares confirmations but passes the submission through.
        let transform = FnTransform::new(Some(MessageKind::Confirmation), |env: Envelope, _| Ok(Some(env)));
        let runner = StageRunner::new(
            RunnerConfig::new(MessageKind::Submission, 1),
            Arc::new(transform),
            ch.clone(),
            StageContext::detached("database"),
        );

        let err = runner.run().await.unwrap_err();
        assert_eq!(err.operation, StageOperation::Transform);
        assert!(ch.is_empty());
    }

    #[tokio::test]
    async fn test_emitting_transform_must_yield_output() {
        let ch = channel();
        ch.send(sub("Alice")).await.unwrap();

        let transform = FnTransform::new(Some(MessageKind::Confirmation), |_env: Envelope, _| Ok(None));
        let runner = StageRunner::new(
            RunnerConfig::new(MessageKind::Submission, 1),
            Arc::new(transform),
            ch.clone(),
            StageContext::detached("database"),
        );

        let err = runner.run().await.unwrap_err();
        assert_eq!(err.operation, StageOperation::Transform);
        assert!(err.to_string().contains("got nothing"));
    }

    #[tokio::test]
    async fn test_delay_applies_per_item() {
        let ch = channel();
        ch.send(sub("Alice")).await.unwrap();
        ch.send(sub("Bob")).await.unwrap();

        let runner = StageRunner::new(
            RunnerConfig::new(MessageKind::Submission, 2).with_delay(Duration::from_millis(20)),
            Arc::new(AssignIdentifier::default()),
            ch.clone(),
            StageContext::detached("database"),
        );

        let started = Instant::now();
        runner.run().await.unwrap();
        assert!(started.elapsed() >= Duration::from_millis(40));
    }

    #[tokio::test]
    async fn test_zero_expected_total_returns_immediately() {
        let mut port = MockMessagePort::new();
        port.expect_receive().never();

        let runner = StageRunner::new(
            RunnerConfig::new(MessageKind::Submission, 0),
            Arc::new(AssignIdentifier::default()),
            Arc::new(port),
            StageContext::detached("database"),
        );
        assert_eq!(runner.run().await.unwrap(), StageSummary::default());
    }
}
