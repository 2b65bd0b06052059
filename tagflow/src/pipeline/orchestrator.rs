//! Runs a [`PipelineSpec`]: one task per stage over one shared channel.

use super::{PipelineReport, PipelineSpec, StageOutcome, StageRole};
use crate::cancellation::CancellationToken;
use crate::channel::{MessagePort, SharedChannel};
use crate::core::PipelineEvent;
use crate::errors::{StageError, TagflowError};
use crate::stages::{RunnerConfig, SourceStage, StageContext, StageRunner, StageSummary};
use crate::utils::PipelineClock;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

type StageFuture = BoxFuture<'static, Result<StageSummary, StageError>>;

/// Spawns every stage, joins all of them and tears the channel down once.
///
/// A stage that faults or panics cancels the run so that stages waiting on
/// it stop instead of hanging. The channel is closed only after every task
/// has been joined.
#[derive(Debug, Clone, Copy, Default)]
pub struct Orchestrator {
    clock: Option<PipelineClock>,
}

impl Orchestrator {
    /// Creates an orchestrator that starts a fresh clock per run.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses `clock` as the time origin for every stage.
    #[must_use]
    pub fn with_clock(mut self, clock: PipelineClock) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Runs the pipeline to completion.
    ///
    /// Stage faults do not make this fail; they are reported per stage in
    /// the returned [`PipelineReport`].
    ///
    /// # Errors
    ///
    /// Returns [`TagflowError::Channel`] if the channel cannot be created,
    /// in which case no stage is spawned.
    pub async fn run(&self, spec: PipelineSpec) -> Result<PipelineReport, TagflowError> {
        let run_id = Uuid::new_v4();
        let span = info_span!("pipeline", pipeline = %spec.name(), run_id = %run_id);
        self.run_inner(run_id, spec).instrument(span).await
    }

    async fn run_inner(&self, run_id: Uuid, spec: PipelineSpec) -> Result<PipelineReport, TagflowError> {
        let started = Instant::now();
        let channel = match SharedChannel::new(spec.channel_config().clone()) {
            Ok(channel) => Arc::new(channel),
            Err(err) => {
                error!(error = %err, "Could not create channel, no stage started");
                return Err(err.into());
            }
        };

        let clock = self.clock.unwrap_or_else(PipelineClock::start);
        let cancel = Arc::new(CancellationToken::new());
        let item_count = spec.item_count();
        info!(
            stages = spec.stages().len(),
            items = item_count,
            capacity = channel.capacity(),
            "Pipeline starting"
        );

        let mut handles: Vec<(String, JoinHandle<StageOutcome>)> = Vec::with_capacity(spec.stages().len());
        for stage in spec.stages() {
            let base: Arc<dyn MessagePort> = channel.clone();
            let port = stage.wrap_port(base);
            let ctx = StageContext::new(stage.name(), clock, spec.events().clone(), cancel.clone());

            let work: StageFuture = match stage.role() {
                StageRole::Source { items } => {
                    SourceStage::new(items.clone(), stage.delay(), port, ctx.clone())
                        .run()
                        .boxed()
                }
                StageRole::Consumer {
                    consumes,
                    expected_total,
                    transform,
                } => {
                    // Settled by the builder for every consumer.
                    let mut config = RunnerConfig::new(*consumes, expected_total.unwrap_or_default());
                    if let Some(delay) = stage.delay() {
                        config = config.with_delay(delay);
                    }
                    StageRunner::new(config, transform.clone(), port, ctx.clone())
                        .run()
                        .boxed()
                }
            };

            let span = info_span!("stage", stage = %stage.name());
            let handle = tokio::spawn(supervise(ctx, work).instrument(span));
            handles.push((stage.name().to_string(), handle));
        }

        // Join every task, including those that outlive a faulted sibling.
        let mut outcomes = Vec::with_capacity(handles.len());
        for (name, handle) in handles {
            let outcome = match handle.await {
                Ok(outcome) => outcome,
                Err(err) => {
                    error!(stage = %name, error = %err, "Stage task aborted");
                    cancel.cancel(format!("stage '{name}' aborted"));
                    StageOutcome::panicked(name, err.to_string())
                }
            };
            outcomes.push(outcome);
        }

        let channel_closed = teardown(&channel);
        let report = PipelineReport {
            run_id,
            pipeline: spec.name().to_string(),
            outcomes,
            channel: channel.metrics().snapshot(),
            channel_closed,
            duration_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        };

        if report.is_success() {
            info!(
                duration_ms = report.duration_ms,
                requeued = report.channel.requeued,
                "Pipeline completed"
            );
        } else {
            warn!(
                exit_code = report.exit_code(),
                failed = ?report.failed_stages(),
                "Pipeline finished with faults"
            );
        }
        Ok(report)
    }
}

/// Runs one stage, turning its result or panic into an outcome.
///
/// A fault or panic cancels the run for every other stage.
async fn supervise(ctx: StageContext, work: StageFuture) -> StageOutcome {
    let result = AssertUnwindSafe(work).catch_unwind().await;
    let elapsed_ms = ctx.clock().elapsed_ms();

    match result {
        Ok(Ok(summary)) => {
            debug!(
                stage = %ctx.name(),
                processed = summary.processed,
                requeued = summary.requeued,
                "Stage completed"
            );
            StageOutcome::completed(ctx.name(), summary)
        }
        Ok(Err(err)) if err.is_cancellation() => {
            warn!(stage = %ctx.name(), operation = %err.operation, "Stage cancelled");
            StageOutcome::cancelled(&err)
        }
        Ok(Err(err)) => {
            error!(
                stage = %ctx.name(),
                operation = %err.operation,
                error = %err.fault,
                "Stage failed"
            );
            ctx.cancel_token()
                .cancel(format!("stage '{}' failed during {}", ctx.name(), err.operation));
            ctx.emit(PipelineEvent::stage_failed(
                ctx.name(),
                &err.operation.to_string(),
                &err.fault.to_string(),
                elapsed_ms,
            ));
            StageOutcome::failed(&err)
        }
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            error!(stage = %ctx.name(), panic = %message, "Stage panicked");
            ctx.cancel_token()
                .cancel(format!("stage '{}' panicked", ctx.name()));
            ctx.emit(PipelineEvent::stage_failed(ctx.name(), "panic", &message, elapsed_ms));
            StageOutcome::panicked(ctx.name(), message)
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Closes the channel. Returns true if this call closed it.
///
/// A second close is logged and ignored.
pub(crate) fn teardown(channel: &SharedChannel) -> bool {
    match channel.close() {
        Ok(()) => {
            debug!(len = channel.len(), "Channel closed");
            true
        }
        Err(err) => {
            warn!(error = %err, "Channel teardown ignored");
            false
        }
    }
}
