//! Error classification and session recovery
//!
//! Pairwise decrypt runs as a small state machine:
//!
//! ```text
//! Attempt(n) ──ok──► Success
//!     │
//!    err ──classify──► unrecoverable ──► Fatal (error unchanged)
//!     │
//!  recoverable, n == max_retries ──► Fatal (last error)
//!     │
//!  recoverable, n < max_retries ──► clear session, sleep backoff(n), Attempt(n+1)
//! ```
//!
//! Each piece is a separate policy object so it can be swapped or tested on
//! its own.

mod backoff;
mod bypass;
mod classify;
mod engine;

pub use backoff::{BackoffPolicy, ExponentialBackoff, RetryDecision, RetryPolicy};
pub use bypass::{BypassRule, SyncBypass};
pub use classify::{
    Classification, ClassificationRule, ClassificationTable, ErrorClassifier, FailureKind,
};
pub use engine::SessionRecovery;
