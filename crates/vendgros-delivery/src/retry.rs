//! Retry schedule for failed delivery attempts.
//!
//! Failures back off through a fixed table; once the attempt budget is
//! spent the row becomes terminal. Manual retries draw from the same budget
//! as scheduled sweeps.

use chrono::{DateTime, Duration, Utc};

/// Maximum failed attempts before a delivery becomes terminal.
pub const MAX_ATTEMPTS: u32 = 5;

/// Error message recorded when the attempt budget is exhausted.
pub const MAX_RETRIES_MESSAGE: &str = "Max retries exceeded";

/// Backoff delays in seconds, indexed by the failure count just reached
/// (1-based). Failure counts past the table reuse the final value.
const BACKOFF_SCHEDULE_SECONDS: [i64; 5] = [60, 300, 900, 3600, 10800];

/// Outcome of a failed attempt: retry later or give up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Schedule another attempt.
    Retry {
        /// When the next attempt becomes due.
        next_attempt_at: DateTime<Utc>,
    },
    /// The attempt budget is exhausted.
    GiveUp,
}

/// Returns the backoff delay after the given failure count (1-based).
pub fn backoff_delay(failure_count: u32) -> Duration {
    let index = (failure_count.max(1) as usize - 1).min(BACKOFF_SCHEDULE_SECONDS.len() - 1);
    Duration::seconds(BACKOFF_SCHEDULE_SECONDS[index])
}

/// Decides what happens after a failed attempt.
///
/// `failure_count` is the attempt counter after the failure was recorded.
pub fn decide_retry(failure_count: u32, now: DateTime<Utc>) -> RetryDecision {
    if failure_count >= MAX_ATTEMPTS {
        RetryDecision::GiveUp
    } else {
        RetryDecision::Retry { next_attempt_at: now + backoff_delay(failure_count) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schedule_follows_table() {
        assert_eq!(backoff_delay(1), Duration::seconds(60));
        assert_eq!(backoff_delay(2), Duration::seconds(300));
        assert_eq!(backoff_delay(3), Duration::seconds(900));
        assert_eq!(backoff_delay(4), Duration::seconds(3600));
        assert_eq!(backoff_delay(5), Duration::seconds(10800));
    }

    #[test]
    fn delays_past_table_reuse_ceiling() {
        assert_eq!(backoff_delay(6), Duration::seconds(10800));
        assert_eq!(backoff_delay(100), Duration::seconds(10800));
    }

    #[test]
    fn first_failure_schedules_one_minute_out() {
        let now = Utc::now();
        let decision = decide_retry(1, now);
        assert_eq!(
            decision,
            RetryDecision::Retry { next_attempt_at: now + Duration::seconds(60) }
        );
    }

    #[test]
    fn budget_exhausted_at_five_failures() {
        let now = Utc::now();
        assert!(matches!(decide_retry(4, now), RetryDecision::Retry { .. }));
        assert_eq!(decide_retry(5, now), RetryDecision::GiveUp);
        assert_eq!(decide_retry(6, now), RetryDecision::GiveUp);
    }
}
