//! Per-stage outcomes and the run report returned by the orchestrator.

use crate::channel::ChannelMetricsSnapshot;
use crate::core::StageStatus;
use crate::errors::{StageError, StageOperation};
use crate::stages::StageSummary;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// How one stage ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageOutcome {
    /// The stage name.
    pub stage: String,
    /// Terminal status.
    pub status: StageStatus,
    /// Counts, when the stage completed.
    pub summary: Option<StageSummary>,
    /// The operation that was running when the stage stopped early.
    pub operation: Option<StageOperation>,
    /// The fault or panic message.
    pub error: Option<String>,
}

impl StageOutcome {
    /// A stage that reached its terminal count.
    #[must_use]
    pub fn completed(stage: impl Into<String>, summary: StageSummary) -> Self {
        Self {
            stage: stage.into(),
            status: StageStatus::Completed,
            summary: Some(summary),
            operation: None,
            error: None,
        }
    }

    /// A stage that hit a fault of its own.
    #[must_use]
    pub fn failed(err: &StageError) -> Self {
        Self {
            stage: err.stage.clone(),
            status: StageStatus::Failed,
            summary: None,
            operation: Some(err.operation),
            error: Some(err.fault.to_string()),
        }
    }

    /// A stage stopped because another stage faulted.
    #[must_use]
    pub fn cancelled(err: &StageError) -> Self {
        Self {
            status: StageStatus::Cancelled,
            ..Self::failed(err)
        }
    }

    /// A stage whose task panicked.
    #[must_use]
    pub fn panicked(stage: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            stage: stage.into(),
            status: StageStatus::Panicked,
            summary: None,
            operation: None,
            error: Some(message.into()),
        }
    }

    /// Classifies a stage result.
    #[must_use]
    pub fn from_result(stage: &str, result: &Result<StageSummary, StageError>) -> Self {
        match result {
            Ok(summary) => Self::completed(stage, *summary),
            Err(err) if err.is_cancellation() => Self::cancelled(err),
            Err(err) => Self::failed(err),
        }
    }
}

/// Result of one pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineReport {
    /// Unique id of this run.
    pub run_id: Uuid,
    /// The pipeline name.
    pub pipeline: String,
    /// One outcome per stage, in declaration order.
    pub outcomes: Vec<StageOutcome>,
    /// Channel counters at teardown.
    pub channel: ChannelMetricsSnapshot,
    /// Whether teardown closed the channel.
    pub channel_closed: bool,
    /// Wall time of the run in milliseconds.
    pub duration_ms: u64,
}

impl PipelineReport {
    /// Returns the worst stage exit code, or 0 for an empty report.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        self.outcomes
            .iter()
            .map(|o| o.status.exit_code())
            .max()
            .unwrap_or(0)
    }

    /// Returns true if every stage completed.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.outcomes.iter().all(|o| o.status.is_success())
    }

    /// Returns the outcome for a stage.
    #[must_use]
    pub fn outcome(&self, stage: &str) -> Option<&StageOutcome> {
        self.outcomes.iter().find(|o| o.stage == stage)
    }

    /// Returns the names of stages that faulted or panicked.
    #[must_use]
    pub fn failed_stages(&self) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.status, StageStatus::Failed | StageStatus::Panicked))
            .map(|o| o.stage.as_str())
            .collect()
    }

    /// Serializes the report to JSON.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ChannelError;
    use pretty_assertions::assert_eq;

    fn report(outcomes: Vec<StageOutcome>) -> PipelineReport {
        PipelineReport {
            run_id: Uuid::new_v4(),
            pipeline: "registration".to_string(),
            outcomes,
            channel: ChannelMetricsSnapshot::default(),
            channel_closed: true,
            duration_ms: 5,
        }
    }

    #[test]
    fn test_all_completed() {
        let r = report(vec![
            StageOutcome::completed("frontend", StageSummary { processed: 3, requeued: 0 }),
            StageOutcome::completed("logger", StageSummary { processed: 3, requeued: 2 }),
        ]);
        assert!(r.is_success());
        assert_eq!(r.exit_code(), 0);
        assert!(r.failed_stages().is_empty());
        assert_eq!(r.outcome("logger").unwrap().summary.unwrap().requeued, 2);
    }

    #[test]
    fn test_worst_status_wins() {
        let fault = StageError::new("database", StageOperation::Send, ChannelError::send_failed("x"));
        let cancel = StageError::cancelled("logger", StageOperation::Receive, "database failed");

        let r = report(vec![
            StageOutcome::from_result("frontend", &Ok(StageSummary::default())),
            StageOutcome::from_result("database", &Err(fault)),
            StageOutcome::from_result("logger", &Err(cancel)),
        ]);
        assert_eq!(r.exit_code(), 1);
        assert_eq!(r.failed_stages(), vec!["database"]);
        assert_eq!(r.outcome("logger").unwrap().status, StageStatus::Cancelled);
        assert_eq!(r.outcome("database").unwrap().operation, Some(StageOperation::Send));

        let r = report(vec![
            StageOutcome::completed("frontend", StageSummary::default()),
            StageOutcome::panicked("database", "boom"),
        ]);
        assert_eq!(r.exit_code(), 101);
        assert!(!r.is_success());
    }

    #[test]
    fn test_report_serializes() {
        let r = report(vec![StageOutcome::panicked("database", "boom")]);
        let json = r.to_json();
        assert_eq!(json["pipeline"], "registration");
        assert_eq!(json["outcomes"][0]["error"], "boom");
    }
}
