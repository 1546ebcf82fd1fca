// src/status/retry.rs

use chrono::{DateTime, Duration, Utc};

use crate::job::Job;

/// What a failed job does next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// No retrials left; the job stays FAILED.
    Exhausted,
    /// Parents are not all done; go back to WAITING.
    Wait,
    /// Retry right away.
    Ready,
    /// Retry once `until` has passed.
    Delay { until: DateTime<Utc> },
}

/// Decide the retrial of a FAILED job and update its counters.
///
/// The delay is computed from the incremented `fail_count`, so with
/// `"+10"` the second retrial waits `2 * 10 + 10` seconds.
pub fn plan_retry(job: &mut Job, parents_done: bool, now: DateTime<Utc>) -> RetryDecision {
    if !job.retrials_left() {
        return RetryDecision::Exhausted;
    }

    job.fail_count += 1;
    job.remote_id = None;

    if !parents_done {
        return RetryDecision::Wait;
    }

    let secs = job.delay_retry.delay_secs(job.fail_count);
    if secs == 0 {
        return RetryDecision::Ready;
    }
    let secs = i64::try_from(secs).unwrap_or(i64::MAX);
    let until = Duration::try_seconds(secs)
        .and_then(|d| now.checked_add_signed(d))
        .unwrap_or(DateTime::<Utc>::MAX_UTC);
    RetryDecision::Delay { until }
}
