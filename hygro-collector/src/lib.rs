pub mod config;
pub mod fetcher;
pub mod normalize;
pub mod scheduler;
pub mod signer;
pub mod sink;

use std::fmt;

pub use fetcher::{FetchError, Fetcher, RawPayload};
pub use normalize::normalize;
pub use scheduler::{RunSummary, ScheduleConfig, Scheduler, StopReason, TickReport};
pub use signer::{SignedRequestContext, sign};

/// Coarse classification of a failure, carried on every error log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Network or upstream hiccup; the next tick is the retry.
    Transient,
    /// The upstream answered outside its API contract.
    Protocol,
    Signing,
    Sink,
    Internal,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Transient => "transient",
            ErrorKind::Protocol => "protocol",
            ErrorKind::Signing => "signing",
            ErrorKind::Sink => "sink",
            ErrorKind::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
