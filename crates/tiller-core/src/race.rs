//! Deadline racing for async operations.
//!
//! Wraps a pending operation with a deadline and reports which side won as a
//! tagged result. The election protocol uses this to bound how long a probe
//! waits for a leader to answer.

use std::future::Future;
use std::time::Duration;

/// Outcome of racing an operation against a deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Raced<T> {
    /// The operation finished before the deadline.
    Completed(T),
    /// The deadline elapsed first.
    TimedOut,
}

impl<T> Raced<T> {
    /// True if the deadline won.
    pub fn is_timed_out(&self) -> bool {
        matches!(self, Raced::TimedOut)
    }

    /// The operation's result, if it finished in time.
    pub fn completed(self) -> Option<T> {
        match self {
            Raced::Completed(value) => Some(value),
            Raced::TimedOut => None,
        }
    }
}

/// Race `op` against `limit`.
///
/// If the deadline wins, `op` is dropped where it stood: the loser is
/// abandoned, not signalled. Anything `op` already did stays done, so
/// operations with remote effects must be safe to abandon mid-flight.
pub async fn deadline<F>(limit: Duration, op: F) -> Raced<F::Output>
where
    F: Future,
{
    match tokio::time::timeout(limit, op).await {
        Ok(value) => Raced::Completed(value),
        Err(_) => Raced::TimedOut,
    }
}
