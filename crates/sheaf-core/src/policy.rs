//! Batch commit policy.
//!
//! A batch is committed only when it is safe to move past it. Rejected
//! batches leave the cursor where it is so the next invocation retries the
//! same window.

use std::fmt;

use crate::pool::BatchOutcome;

/// Why a batch was held back.
#[derive(Debug, Clone, PartialEq)]
pub enum RejectReason {
    /// At least one fetch ended rate-limited.
    RateLimited { rate_limited: usize },
    /// Nothing succeeded and something failed.
    NoSuccesses { failed: usize },
    /// Too large a share of the batch failed.
    FailureRatio { ratio: f64, max: f64 },
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::RateLimited { rate_limited } => {
                write!(f, "rate limited ({} items)", rate_limited)
            }
            RejectReason::NoSuccesses { failed } => {
                write!(f, "no successes ({} failures)", failed)
            }
            RejectReason::FailureRatio { ratio, max } => {
                write!(f, "failure ratio {:.2} above {:.2}", ratio, max)
            }
        }
    }
}

/// Outcome of [`CommitPolicy::decide`].
#[derive(Debug, Clone, PartialEq)]
pub enum CommitDecision {
    Commit,
    Reject(RejectReason),
}

impl CommitDecision {
    pub fn is_commit(&self) -> bool {
        matches!(self, CommitDecision::Commit)
    }
}

/// Classifies a finished batch as committable or not.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CommitPolicy {
    pub max_failure_ratio: f64,
}

impl Default for CommitPolicy {
    fn default() -> Self {
        Self {
            max_failure_ratio: 0.8,
        }
    }
}

impl CommitPolicy {
    pub fn new(max_failure_ratio: f64) -> Self {
        Self { max_failure_ratio }
    }

    /// Rules, first match wins:
    ///
    /// 1. any rate-limit observed → reject
    /// 2. zero successes with at least one failure → reject
    /// 3. failure ratio strictly above the threshold → reject
    /// 4. otherwise commit
    pub fn decide(&self, outcome: &BatchOutcome, saw_rate_limit: bool) -> CommitDecision {
        if saw_rate_limit {
            return CommitDecision::Reject(RejectReason::RateLimited {
                rate_limited: outcome.rate_limited(),
            });
        }
        if outcome.succeeded() == 0 && outcome.failed() > 0 {
            return CommitDecision::Reject(RejectReason::NoSuccesses {
                failed: outcome.failed(),
            });
        }
        let ratio = outcome.failure_ratio();
        if ratio > self.max_failure_ratio {
            return CommitDecision::Reject(RejectReason::FailureRatio {
                ratio,
                max: self.max_failure_ratio,
            });
        }
        CommitDecision::Commit
    }
}
