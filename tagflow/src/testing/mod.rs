//! Testing utilities for tagflow pipelines.
//!
//! This module provides:
//! - A port wrapper that injects channel faults
//! - Name fixtures for building submissions

mod faults;
mod fixtures;

pub use faults::FaultInjectingPort;
pub use fixtures::{numbered_names, registration_names, submissions};
