//! # Tagflow
//!
//! Staged pipelines over one shared bounded queue with tag-based selective
//! consumption.
//!
//! A pipeline is a source followed by consumer stages. Every stage sends to
//! and receives from the same channel; each consumer takes only envelopes
//! carrying its tag and puts everything else back for the stage it belongs
//! to. Tagflow provides:
//!
//! - **Typed envelopes**: a message kind tag plus a name and an optional id
//! - **Selective consumption**: foreign envelopes are put back in order
//! - **Bounded channel**: senders wait for a free slot, nothing is dropped
//! - **Fault propagation**: a failed stage cancels the run instead of hanging it
//! - **Event-driven observability**: progress events through an [`events::EventSink`]
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use tagflow::prelude::*;
//! use std::sync::Arc;
//!
//! let config = PipelineConfig::registration().without_delays();
//! let (spec, ledger) = registration_pipeline(&config, Arc::new(NoOpEventSink))?;
//!
//! let report = Orchestrator::new().run(spec).await?;
//! assert!(report.is_success());
//! assert_eq!(ledger.len(), 3);
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod cancellation;
pub mod channel;
pub mod config;
pub mod core;
pub mod errors;
pub mod events;
pub mod pipeline;
pub mod stages;
pub mod testing;
pub mod utils;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cancellation::CancellationToken;
    pub use crate::channel::{ChannelConfig, MessagePort, SendMode, SharedChannel};
    pub use crate::config::PipelineConfig;
    pub use crate::core::{Envelope, MessageKind, PipelineEvent, StageStatus};
    pub use crate::errors::{
        ChannelError, ConfigError, EnvelopeError, PipelineValidationError, StageError,
        StageOperation, TagflowError,
    };
    pub use crate::events::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::pipeline::{
        envelopes_from_names, registration_pipeline, Orchestrator, PipelineBuilder,
        PipelineReport, PipelineSpec, StageDefinition, StageOutcome,
    };
    pub use crate::stages::{
        AssignIdentifier, ConfirmationLedger, FnTransform, RecordConfirmation, StageContext,
        Transform, TransformContext,
    };
    pub use crate::utils::{iso_timestamp, PipelineClock};
}
