//! Event sink system for observability.
//!
//! Stages report progress through an [`EventSink`]. Sinks are a side
//! channel: a failing or slow sink never changes how envelopes are routed.

mod sink;

pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};
