//! Pipeline builder with validation.

use super::{PipelineSpec, StageDefinition, StageRole};
use crate::channel::ChannelConfig;
use crate::config::PipelineConfig;
use crate::core::{Envelope, MessageKind};
use crate::errors::{ContractErrorInfo, EnvelopeError, PipelineValidationError, TagflowError};
use crate::events::{EventSink, NoOpEventSink};
use crate::stages::{AssignIdentifier, ConfirmationLedger, RecordConfirmation};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

/// Builder for creating validated pipelines.
#[derive(Clone)]
pub struct PipelineBuilder {
    name: String,
    channel: ChannelConfig,
    stages: Vec<StageDefinition>,
    events: Arc<dyn EventSink>,
}

impl PipelineBuilder {
    /// Creates a new pipeline builder.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            channel: ChannelConfig::default(),
            stages: Vec::new(),
            events: Arc::new(NoOpEventSink),
        }
    }

    /// Sets the shared channel configuration.
    #[must_use]
    pub fn channel(mut self, config: ChannelConfig) -> Self {
        self.channel = config;
        self
    }

    /// Sets the event sink handed to every stage.
    #[must_use]
    pub fn events(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.events = sink;
        self
    }

    /// Appends a stage. Order matters: the source comes first.
    #[must_use]
    pub fn stage(mut self, stage: StageDefinition) -> Self {
        self.stages.push(stage);
        self
    }

    /// Validates the description and builds a [`PipelineSpec`].
    ///
    /// # Errors
    ///
    /// Returns an error if the pipeline is empty, has no source at its head,
    /// repeats a stage name, has nothing to submit, its tags do not chain
    /// from the source to a terminal stage, or a consumer's expected total
    /// exceeds what can reach it.
    pub fn build(mut self) -> Result<PipelineSpec, PipelineValidationError> {
        self.validate()?;
        self.settle_totals()?;
        Ok(PipelineSpec {
            name: self.name,
            channel: self.channel,
            stages: self.stages,
            events: self.events,
        })
    }

    fn validate(&self) -> Result<(), PipelineValidationError> {
        let Some(head) = self.stages.first() else {
            return Err(PipelineValidationError::new("Pipeline has no stages").with_error_info(
                ContractErrorInfo::new("PIPELINE-EMPTY", "Cannot build an empty pipeline")
                    .with_fix_hint("Add a source stage and at least one consumer."),
            ));
        };

        if !head.is_source() {
            return Err(PipelineValidationError::new(format!(
                "First stage '{}' is not a source",
                head.name()
            ))
            .with_stages(vec![head.name().to_string()])
            .with_error_info(
                ContractErrorInfo::new("PIPELINE-SOURCE", "Pipeline must start with a source")
                    .with_fix_hint("Add the source stage before any consumer."),
            ));
        }

        let extra_sources: Vec<String> = self
            .stages
            .iter()
            .skip(1)
            .filter(|s| s.is_source())
            .map(|s| s.name().to_string())
            .collect();
        if !extra_sources.is_empty() {
            return Err(PipelineValidationError::new(format!(
                "Only one source is allowed, found extra: {}",
                extra_sources.join(", ")
            ))
            .with_stages(extra_sources)
            .with_error_info(
                ContractErrorInfo::new("PIPELINE-SOURCE", "Pipeline has more than one source")
                    .with_fix_hint("Merge the items into a single source stage."),
            ));
        }

        let mut seen = HashSet::new();
        for stage in &self.stages {
            if !seen.insert(stage.name()) {
                return Err(PipelineValidationError::new(format!(
                    "Stage '{}' is defined more than once",
                    stage.name()
                ))
                .with_stages(vec![stage.name().to_string()])
                .with_error_info(
                    ContractErrorInfo::new(
                        "PIPELINE-DUPLICATE-STAGE",
                        format!("Duplicate stage name '{}'", stage.name()),
                    )
                    .with_fix_hint("Give every stage a unique name."),
                ));
            }
        }

        if head.emits().is_empty() {
            return Err(PipelineValidationError::new(format!(
                "Source '{}' has no items to submit",
                head.name()
            ))
            .with_stages(vec![head.name().to_string()])
            .with_error_info(
                ContractErrorInfo::new("PIPELINE-NO-ITEMS", "Nothing to submit")
                    .with_fix_hint("Give the source at least one item."),
            ));
        }

        self.validate_tags()
    }

    /// Checks that tags chain: the last stage is terminal, each consumed tag
    /// is emitted upstream and only upstream, owned by exactly one consumer,
    /// and every emitted tag is consumed downstream.
    fn validate_tags(&self) -> Result<(), PipelineValidationError> {
        if let Some(last) = self.stages.last() {
            if let Some(tag) = last.emits().into_iter().next() {
                return Err(PipelineValidationError::new(format!(
                    "Last stage '{}' emits '{tag}' but must be terminal",
                    last.name()
                ))
                .with_stages(vec![last.name().to_string()])
                .with_error_info(
                    ContractErrorInfo::new("PIPELINE-OPEN-END", format!("'{tag}' is never consumed"))
                        .with_fix_hint("End the pipeline with a terminal stage that emits nothing."),
                ));
            }
        }

        let mut owners: HashMap<MessageKind, &str> = HashMap::new();
        let mut emitted: BTreeSet<MessageKind> = BTreeSet::new();

        for (index, stage) in self.stages.iter().enumerate() {
            if let Some(tag) = stage.consumes() {
                let feedback: Vec<String> = self.stages[index..]
                    .iter()
                    .filter(|s| s.emits().contains(&tag))
                    .map(|s| s.name().to_string())
                    .collect();
                if !feedback.is_empty() {
                    return Err(PipelineValidationError::new(format!(
                        "Stage '{}' consumes '{tag}' which is also emitted by {}",
                        stage.name(),
                        feedback.join(", ")
                    ))
                    .with_stages(feedback)
                    .with_error_info(
                        ContractErrorInfo::new(
                            "PIPELINE-TAG-CYCLE",
                            format!("'{tag}' flows back into its consumer"),
                        )
                        .with_fix_hint("A kind may only be emitted by stages before its consumer."),
                    ));
                }

                if !emitted.contains(&tag) {
                    return Err(PipelineValidationError::new(format!(
                        "Stage '{}' consumes '{tag}' but no earlier stage emits it",
                        stage.name()
                    ))
                    .with_stages(vec![stage.name().to_string()])
                    .with_error_info(
                        ContractErrorInfo::new(
                            "PIPELINE-UNKNOWN-TAG",
                            format!("No producer for '{tag}'"),
                        )
                        .with_fix_hint("Add the producing stage before its consumer."),
                    ));
                }
                if let Some(owner) = owners.insert(tag, stage.name()) {
                    return Err(PipelineValidationError::new(format!(
                        "Stages '{owner}' and '{}' both consume '{tag}'",
                        stage.name()
                    ))
                    .with_stages(vec![owner.to_string(), stage.name().to_string()])
                    .with_error_info(
                        ContractErrorInfo::new(
                            "PIPELINE-TAG-CONFLICT",
                            format!("'{tag}' has more than one consumer"),
                        )
                        .with_fix_hint("Each message kind must be owned by a single stage."),
                    ));
                }
            }
            emitted.extend(stage.emits());
        }

        // Every emitted tag needs an owner, which makes the last stage terminal.
        let orphans: Vec<MessageKind> = emitted
            .into_iter()
            .filter(|tag| !owners.contains_key(tag))
            .collect();
        if let Some(tag) = orphans.first() {
            let producers: Vec<String> = self
                .stages
                .iter()
                .filter(|s| s.emits().contains(tag))
                .map(|s| s.name().to_string())
                .collect();
            return Err(PipelineValidationError::new(format!(
                "Nothing consumes '{tag}' emitted by {}",
                producers.join(", ")
            ))
            .with_stages(producers)
            .with_error_info(
                ContractErrorInfo::new("PIPELINE-OPEN-END", format!("'{tag}' is never consumed"))
                    .with_fix_hint("End the pipeline with a terminal stage that consumes it."),
            ));
        }

        Ok(())
    }

    /// Fixes every consumer's expected total.
    ///
    /// Walks the stages in order, counting the envelopes of each kind that
    /// will be put on the channel: source items by kind, plus one output
    /// per envelope processed by a stage that emits. A consumer without an
    /// override takes the count for its kind; an override above that count
    /// could never be reached and is rejected.
    fn settle_totals(&mut self) -> Result<(), PipelineValidationError> {
        let mut reachable: HashMap<MessageKind, usize> = HashMap::new();

        for stage in &mut self.stages {
            let tag = match stage.role() {
                StageRole::Source { items } => {
                    for item in items {
                        *reachable.entry(item.kind()).or_default() += 1;
                    }
                    continue;
                }
                StageRole::Consumer { consumes, .. } => *consumes,
            };

            let available = reachable.get(&tag).copied().unwrap_or(0);
            let total = match stage.expected_total() {
                Some(total) if total > available => {
                    return Err(PipelineValidationError::new(format!(
                        "Stage '{}' expects {total} '{tag}' envelopes but at most {available} reach it",
                        stage.name()
                    ))
                    .with_stages(vec![stage.name().to_string()])
                    .with_error_info(
                        ContractErrorInfo::new(
                            "PIPELINE-EXPECTED-TOTAL",
                            format!("Expected total {total} exceeds {available}"),
                        )
                        .with_fix_hint("Lower the override or drop it to use the derived count."),
                    ));
                }
                Some(total) => total,
                None => available,
            };

            for kind in stage.emits() {
                *reachable.entry(kind).or_default() += total;
            }
            stage.set_expected_total(total);
        }
        Ok(())
    }
}

impl std::fmt::Debug for PipelineBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineBuilder")
            .field("name", &self.name)
            .field("channel", &self.channel)
            .field("stages", &self.stages)
            .finish_non_exhaustive()
    }
}

/// Builds submission envelopes for a list of names.
///
/// # Errors
///
/// Returns the first name that is empty or too long.
pub fn envelopes_from_names<I, S>(names: I) -> Result<Vec<Envelope>, EnvelopeError>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    names.into_iter().map(Envelope::submission).collect()
}

/// Builds the three-stage registration pipeline from a configuration.
///
/// Returns the [`PipelineSpec`] and the ledger the logger stage writes into.
///
/// # Errors
///
/// Returns an error for invalid names, delays or pipeline shape.
pub fn registration_pipeline(
    config: &PipelineConfig,
    events: Arc<dyn EventSink>,
) -> Result<(PipelineSpec, ConfirmationLedger), TagflowError> {
    let items = envelopes_from_names(config.items.iter().cloned())?;
    let ledger = ConfirmationLedger::new();

    let mut frontend = StageDefinition::source("frontend", items);
    if let Some(delay) = config.submit_delay()? {
        frontend = frontend.with_delay(delay);
    }

    let mut database = StageDefinition::consumer(
        "database",
        MessageKind::Submission,
        Arc::new(AssignIdentifier::new(config.id_base)),
    );
    if let Some(delay) = config.process_delay()? {
        database = database.with_delay(delay);
    }

    let mut logger = StageDefinition::consumer(
        "logger",
        MessageKind::Confirmation,
        Arc::new(RecordConfirmation::new(ledger.clone())),
    );
    if let Some(delay) = config.log_delay()? {
        logger = logger.with_delay(delay);
    }

    let spec = PipelineBuilder::new(&config.name)
        .channel(config.channel.clone())
        .events(events)
        .stage(frontend)
        .stage(database)
        .stage(logger)
        .build()?;
    Ok((spec, ledger))
}
