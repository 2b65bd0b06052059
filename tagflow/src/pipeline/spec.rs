//! Declarative description of a pipeline: channel parameters plus an
//! ordered list of stages and the tag transitions between them.

use crate::channel::{ChannelConfig, MessagePort};
use crate::core::{Envelope, MessageKind};
use crate::events::EventSink;
use crate::stages::Transform;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

/// Wraps the port a stage is given, e.g. to inject faults.
pub type PortWrapper = Arc<dyn Fn(Arc<dyn MessagePort>) -> Arc<dyn MessagePort> + Send + Sync>;

/// What a stage does in the pipeline.
#[derive(Clone)]
pub enum StageRole {
    /// Emits a fixed list of envelopes and never receives.
    Source {
        /// Envelopes to send, in order.
        items: Vec<Envelope>,
    },
    /// Consumes one message kind and hands it to a transform.
    Consumer {
        /// The kind this stage owns.
        consumes: MessageKind,
        /// Matching envelopes to process; settled by the builder.
        expected_total: Option<usize>,
        /// The per-envelope work.
        transform: Arc<dyn Transform>,
    },
}

/// One stage of a pipeline description.
#[derive(Clone)]
pub struct StageDefinition {
    name: String,
    role: StageRole,
    delay: Option<Duration>,
    port_wrapper: Option<PortWrapper>,
}

impl StageDefinition {
    /// Creates a source stage.
    pub fn source(name: impl Into<String>, items: Vec<Envelope>) -> Self {
        Self {
            name: name.into(),
            role: StageRole::Source { items },
            delay: None,
            port_wrapper: None,
        }
    }

    /// Creates a consuming stage.
    pub fn consumer(name: impl Into<String>, consumes: MessageKind, transform: Arc<dyn Transform>) -> Self {
        Self {
            name: name.into(),
            role: StageRole::Consumer {
                consumes,
                expected_total: None,
                transform,
            },
            delay: None,
            port_wrapper: None,
        }
    }

    /// Sets the fixed per-item delay.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Overrides how many envelopes a consumer processes. Ignored for sources.
    ///
    /// Without an override the builder derives the total from the envelopes
    /// of this stage's kind that can reach it.
    #[must_use]
    pub fn with_expected_total(mut self, total: usize) -> Self {
        self.set_expected_total(total);
        self
    }

    pub(crate) fn set_expected_total(&mut self, total: usize) {
        if let StageRole::Consumer {
            ref mut expected_total,
            ..
        } = self.role
        {
            *expected_total = Some(total);
        }
    }

    /// Returns how many envelopes a consumer processes, once known.
    #[must_use]
    pub fn expected_total(&self) -> Option<usize> {
        match &self.role {
            StageRole::Source { .. } => None,
            StageRole::Consumer { expected_total, .. } => *expected_total,
        }
    }

    /// Wraps the channel port this stage receives.
    #[must_use]
    pub fn with_port_wrapper(mut self, wrapper: PortWrapper) -> Self {
        self.port_wrapper = Some(wrapper);
        self
    }

    /// Returns the stage name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the stage role.
    #[must_use]
    pub fn role(&self) -> &StageRole {
        &self.role
    }

    /// Returns the per-item delay.
    #[must_use]
    pub fn delay(&self) -> Option<Duration> {
        self.delay
    }

    /// Returns true for a source stage.
    #[must_use]
    pub fn is_source(&self) -> bool {
        matches!(self.role, StageRole::Source { .. })
    }

    /// Returns the kind this stage consumes, if any.
    #[must_use]
    pub fn consumes(&self) -> Option<MessageKind> {
        match &self.role {
            StageRole::Source { .. } => None,
            StageRole::Consumer { consumes, .. } => Some(*consumes),
        }
    }

    /// Returns every kind this stage can put on the channel.
    #[must_use]
    pub fn emits(&self) -> BTreeSet<MessageKind> {
        match &self.role {
            StageRole::Source { items } => items.iter().map(Envelope::kind).collect(),
            StageRole::Consumer { transform, .. } => transform.emits().into_iter().collect(),
        }
    }

    /// Returns the port this stage should use on top of `base`.
    pub fn wrap_port(&self, base: Arc<dyn MessagePort>) -> Arc<dyn MessagePort> {
        match &self.port_wrapper {
            Some(wrapper) => wrapper(base),
            None => base,
        }
    }
}

impl std::fmt::Debug for StageDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut s = f.debug_struct("StageDefinition");
        s.field("name", &self.name);
        match &self.role {
            StageRole::Source { items } => s.field("items", &items.len()),
            StageRole::Consumer {
                consumes,
                expected_total,
                transform,
            } => s
                .field("consumes", consumes)
                .field("expected_total", expected_total)
                .field("transform", transform),
        };
        s.field("delay", &self.delay)
            .field("wrapped_port", &self.port_wrapper.is_some())
            .finish()
    }
}

/// A validated pipeline ready to hand to the orchestrator.
///
/// Built by [`PipelineBuilder`](super::PipelineBuilder).
#[derive(Clone)]
pub struct PipelineSpec {
    pub(crate) name: String,
    pub(crate) channel: ChannelConfig,
    pub(crate) stages: Vec<StageDefinition>,
    pub(crate) events: Arc<dyn EventSink>,
}

impl PipelineSpec {
    /// Returns the pipeline name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the channel configuration.
    #[must_use]
    pub fn channel_config(&self) -> &ChannelConfig {
        &self.channel
    }

    /// Returns the stages in declaration order.
    #[must_use]
    pub fn stages(&self) -> &[StageDefinition] {
        &self.stages
    }

    /// Returns the event sink shared by every stage.
    #[must_use]
    pub fn events(&self) -> &Arc<dyn EventSink> {
        &self.events
    }

    /// Returns the number of items the source emits.
    #[must_use]
    pub fn item_count(&self) -> usize {
        self.stages
            .iter()
            .map(|stage| match stage.role() {
                StageRole::Source { items } => items.len(),
                StageRole::Consumer { .. } => 0,
            })
            .sum()
    }
}

impl std::fmt::Debug for PipelineSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineSpec")
            .field("name", &self.name)
            .field("channel", &self.channel)
            .field("stages", &self.stages)
            .finish_non_exhaustive()
    }
}
