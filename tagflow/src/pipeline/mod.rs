//! Pipeline building and execution.
//!
//! This module provides:
//! - Pipeline specifications: a source plus tag-selective consumers
//! - A builder that validates how tags chain between stages
//! - The orchestrator that runs, joins and tears down a pipeline
//! - Run reports with per-stage outcomes

mod builder;
mod orchestrator;
mod report;
mod spec;


pub use builder::{envelopes_from_names, registration_pipeline, PipelineBuilder};
pub use orchestrator::Orchestrator;
pub use report::{PipelineReport, StageOutcome};
pub use spec::{PipelineSpec, PortWrapper, StageDefinition, StageRole};
