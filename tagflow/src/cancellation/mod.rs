//! Run-wide cancellation used to unblock stages after a sibling faulted.

mod token;

pub use token::CancellationToken;
