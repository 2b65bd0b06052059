//! Built-in transforms for the registration pipeline.

use super::{Transform, TransformContext};
use crate::core::{Envelope, MessageKind, PipelineEvent};
use crate::errors::EnvelopeError;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

/// Turns a submission into a confirmation with a sequential identifier.
///
/// The n-th submission this stage consumes (zero-based) gets `base + n`.
#[derive(Debug, Clone, Copy)]
pub struct AssignIdentifier {
    base: u32,
}

impl AssignIdentifier {
    /// Identifier given to the first item by default.
    pub const DEFAULT_BASE: u32 = 1001;

    /// Creates the transform with a base identifier.
    #[must_use]
    pub fn new(base: u32) -> Self {
        Self { base }
    }

    /// Returns the base identifier.
    #[must_use]
    pub fn base(&self) -> u32 {
        self.base
    }
}

impl Default for AssignIdentifier {
    fn default() -> Self {
        Self::new(Self::DEFAULT_BASE)
    }
}

#[async_trait]
impl Transform for AssignIdentifier {
    fn emits(&self) -> Option<MessageKind> {
        Some(MessageKind::Confirmation)
    }

    async fn apply(
        &self,
        envelope: Envelope,
        ctx: TransformContext<'_>,
    ) -> Result<Option<Envelope>, EnvelopeError> {
        let id = u32::try_from(ctx.sequence)
            .ok()
            .and_then(|seq| self.base.checked_add(seq))
            .ok_or(EnvelopeError::IdentifierOverflow {
                base: self.base,
                sequence: ctx.sequence,
            })?;
        envelope.confirm(id).map(Some)
    }
}

/// One confirmed item as seen by the terminal stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmationRecord {
    /// The assigned identifier.
    pub id: u32,
    /// The confirmed name.
    pub name: String,
    /// Milliseconds since the run started.
    pub elapsed_ms: u64,
}

/// Shared, append-only list of confirmations.
///
/// Cloning yields another handle onto the same list.
#[derive(Debug, Clone, Default)]
pub struct ConfirmationLedger {
    records: Arc<Mutex<Vec<ConfirmationRecord>>>,
}

impl ConfirmationLedger {
    /// Creates an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a record.
    pub fn push(&self, record: ConfirmationRecord) {
        self.records.lock().push(record);
    }

    /// Returns the records in logging order.
    #[must_use]
    pub fn records(&self) -> Vec<ConfirmationRecord> {
        self.records.lock().clone()
    }

    /// Returns the number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    /// Returns true if nothing was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    /// Returns the recorded identifiers in logging order.
    #[must_use]
    pub fn ids(&self) -> Vec<u32> {
        self.records.lock().iter().map(|r| r.id).collect()
    }
}

/// Terminal transform: records each confirmation and logs it.
#[derive(Debug, Clone, Default)]
pub struct RecordConfirmation {
    ledger: ConfirmationLedger,
}

impl RecordConfirmation {
    /// Creates the transform writing into `ledger`.
    #[must_use]
    pub fn new(ledger: ConfirmationLedger) -> Self {
        Self { ledger }
    }

    /// Returns the ledger handle.
    #[must_use]
    pub fn ledger(&self) -> &ConfirmationLedger {
        &self.ledger
    }
}

#[async_trait]
impl Transform for RecordConfirmation {
    fn emits(&self) -> Option<MessageKind> {
        None
    }

    async fn apply(
        &self,
        envelope: Envelope,
        ctx: TransformContext<'_>,
    ) -> Result<Option<Envelope>, EnvelopeError> {
        let kind = envelope.kind();
        let (name, id) = match envelope.into_parts() {
            (name, Some(id)) => (name, id),
            (_, None) => {
                return Err(EnvelopeError::UnexpectedKind {
                    expected: MessageKind::Confirmation.to_string(),
                    actual: kind.to_string(),
                })
            }
        };

        let clock = ctx.stage.clock();
        info!(
            stage = %ctx.stage.name(),
            elapsed_s = clock.elapsed_secs(),
            id,
            name = %name,
            "CONFIRMED - ID: {id}, Name: {name}"
        );
        ctx.stage.emit(PipelineEvent::confirmation_logged(
            ctx.stage.name(),
            &name,
            id,
            clock.elapsed_ms(),
        ));
        self.ledger.push(ConfirmationRecord {
            id,
            name,
            elapsed_ms: clock.elapsed_ms(),
        });
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stages::StageContext;

    #[tokio::test]
    async fn test_assign_identifier_uses_sequence() {
        let ctx = StageContext::detached("database");
        let transform = AssignIdentifier::default();

        let out = transform
            .apply(
                Envelope::submission("Charlie").unwrap(),
                TransformContext { stage: &ctx, sequence: 2 },
            )
            .await
            .unwrap()
            .unwrap();

        assert_eq!(out, Envelope::confirmation("Charlie", 1003).unwrap());
    }

    #[tokio::test]
    async fn test_assign_identifier_overflow() {
        let ctx = StageContext::detached("database");
        let transform = AssignIdentifier::new(u32::MAX);

        let err = transform
            .apply(
                Envelope::submission("Alice").unwrap(),
                TransformContext { stage: &ctx, sequence: 1 },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, EnvelopeError::IdentifierOverflow { .. }));
    }

    #[tokio::test]
    async fn test_record_confirmation_appends_to_ledger() {
        let ctx = StageContext::detached("logger");
        let ledger = ConfirmationLedger::new();
        let transform = RecordConfirmation::new(ledger.clone());
        assert_eq!(transform.emits(), None);

        let out = transform
            .apply(
                Envelope::confirmation("Alice", 1001).unwrap(),
                TransformContext { stage: &ctx, sequence: 0 },
            )
            .await
            .unwrap();

        assert!(out.is_none());
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger.records()[0].name, "Alice");
        assert_eq!(ledger.ids(), vec![1001]);
    }

    #[tokio::test]
    async fn test_record_confirmation_rejects_submission() {
        let ctx = StageContext::detached("logger");
        let transform = RecordConfirmation::default();

        let err = transform
            .apply(
                Envelope::submission("Bob").unwrap(),
                TransformContext { stage: &ctx, sequence: 0 },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, EnvelopeError::UnexpectedKind { .. }));
        assert!(transform.ledger().is_empty());
    }
}
