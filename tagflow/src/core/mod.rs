//! Core domain model types for tagflow.
//!
//! This module contains the fundamental types used throughout the crate:
//! - The message envelope and its kind tag
//! - Pipeline progress events
//! - Stage outcome status

mod envelope;
mod event;
mod status;

pub use envelope::{Envelope, MessageKind};
pub use event::PipelineEvent;
pub use status::StageStatus;
