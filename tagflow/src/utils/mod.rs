//! Utility helpers for time handling.

mod clock;
pub mod timestamps;

pub use clock::PipelineClock;
pub use timestamps::iso_timestamp;
