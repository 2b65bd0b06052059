//! Pipeline stages.
//!
//! A pipeline is a [`SourceStage`] followed by one or more [`StageRunner`]s.
//! Each runner consumes one message kind and hands every matching envelope
//! to its [`Transform`].

mod context;
mod runner;
mod source;
mod transforms;

pub use context::StageContext;
pub use runner::{RunnerConfig, StageRunner, StageSummary};
pub use source::SourceStage;
pub use transforms::{AssignIdentifier, ConfirmationLedger, ConfirmationRecord, RecordConfirmation};

use crate::core::{Envelope, MessageKind};
use crate::errors::EnvelopeError;
use async_trait::async_trait;
use std::fmt::Debug;

/// What a transform sees besides the envelope itself.
#[derive(Debug, Clone, Copy)]
pub struct TransformContext<'a> {
    /// The running stage.
    pub stage: &'a StageContext,
    /// Zero-based count of matching envelopes processed before this one.
    pub sequence: usize,
}

/// The work a stage performs on each envelope it owns.
#[async_trait]
pub trait Transform: Send + Sync + Debug {
    /// The kind of envelope this transform produces, or `None` for a
    /// terminal stage.
    fn emits(&self) -> Option<MessageKind>;

    /// Consumes an envelope and returns the one to send downstream, if any.
    async fn apply(
        &self,
        envelope: Envelope,
        ctx: TransformContext<'_>,
    ) -> Result<Option<Envelope>, EnvelopeError>;
}

/// A transform backed by a plain function of the envelope and its sequence
/// number.
pub struct FnTransform<F>
where
    F: Fn(Envelope, usize) -> Result<Option<Envelope>, EnvelopeError> + Send + Sync,
{
    emits: Option<MessageKind>,
    func: F,
}

impl<F> FnTransform<F>
where
    F: Fn(Envelope, usize) -> Result<Option<Envelope>, EnvelopeError> + Send + Sync,
{
    /// Creates a function-based transform.
    pub fn new(emits: Option<MessageKind>, func: F) -> Self {
        Self { emits, func }
    }
}

impl<F> Debug for FnTransform<F>
where
    F: Fn(Envelope, usize) -> Result<Option<Envelope>, EnvelopeError> + Send + Sync,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnTransform")
            .field("emits", &self.emits)
            .finish()
    }
}

#[async_trait]
impl<F> Transform for FnTransform<F>
where
    F: Fn(Envelope, usize) -> Result<Option<Envelope>, EnvelopeError> + Send + Sync,
{
    fn emits(&self) -> Option<MessageKind> {
        self.emits
    }

    async fn apply(
        &self,
        envelope: Envelope,
        ctx: TransformContext<'_>,
    ) -> Result<Option<Envelope>, EnvelopeError> {
        (self.func)(envelope, ctx.sequence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fn_transform() {
        let transform = FnTransform::new(Some(MessageKind::Confirmation), |env: Envelope, seq| {
            env.confirm(u32::try_from(seq).unwrap_or(0) + 1).map(Some)
        });
        assert_eq!(transform.emits(), Some(MessageKind::Confirmation));

        let ctx = StageContext::detached("test");
        let out = transform
            .apply(
                Envelope::submission("Alice").unwrap(),
                TransformContext { stage: &ctx, sequence: 4 },
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(out.id(), Some(5));
    }
}
