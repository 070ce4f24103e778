// SPDX-License-Identifier: MIT
//! Retry-with-backoff for a single HTTP exchange (spec.md §4.3.4).

use std::time::Duration;

use crate::hub_client::is_retryable_status;

/// `min(backoff_max, backoff_initial * 2^(attempt-1))` with +-20% jitter.
/// `attempt` is 1-based (the delay *before* this attempt, so attempt 1
/// never sleeps).
pub fn backoff_delay(attempt: u32, initial: Duration, max: Duration, jitter_unit: f64) -> Duration {
    if attempt <= 1 {
        return Duration::ZERO;
    }
    let exp = attempt.saturating_sub(1).min(20);
    let base = initial.saturating_mul(1u32.checked_shl(exp).unwrap_or(u32::MAX));
    let base = base.min(max);

    // jitter_unit in [-1.0, 1.0] maps to +-20%; callers in production pass
    // a value drawn from a PRNG, tests pass fixed values for determinism.
    let factor = 1.0 + (jitter_unit.clamp(-1.0, 1.0) * 0.2);
    Duration::from_secs_f64((base.as_secs_f64() * factor).max(0.0))
}

/// Is `error` worth retrying? Mirrors the retryable/non-retryable split in
/// spec.md §4.3.4: connection reset, DNS failure, TLS handshake failure,
/// and the listed 4xx/5xx statuses are retryable; everything else is not.
pub fn is_retryable_reqwest_error(error: &reqwest::Error) -> bool {
    if error.is_timeout() || error.is_connect() {
        return true;
    }
    if let Some(status) = error.status() {
        return is_retryable_status(status.as_u16());
    }
    // No status means a transport-level failure (reset, DNS, TLS) rather
    // than a well-formed HTTP response; treat as retryable.
    !error.is_builder() && !error.is_redirect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_attempt_never_sleeps() {
        assert_eq!(backoff_delay(1, Duration::from_millis(500), Duration::from_secs(30), 0.0), Duration::ZERO);
    }

    #[test]
    fn doubles_each_attempt_before_capping() {
        let initial = Duration::from_millis(500);
        let max = Duration::from_secs(30);
        let d2 = backoff_delay(2, initial, max, 0.0);
        let d3 = backoff_delay(3, initial, max, 0.0);
        assert_eq!(d2, Duration::from_millis(500));
        assert_eq!(d3, Duration::from_secs(1));
    }

    #[test]
    fn caps_at_backoff_max() {
        let d = backoff_delay(20, Duration::from_millis(500), Duration::from_secs(30), 0.0);
        assert_eq!(d, Duration::from_secs(30));
    }

    #[test]
    fn jitter_is_bounded_to_twenty_percent() {
        let base = backoff_delay(3, Duration::from_millis(500), Duration::from_secs(30), 0.0);
        let high = backoff_delay(3, Duration::from_millis(500), Duration::from_secs(30), 1.0);
        let low = backoff_delay(3, Duration::from_millis(500), Duration::from_secs(30), -1.0);
        assert!(high > base);
        assert!(low < base);
        assert!(high.as_secs_f64() <= base.as_secs_f64() * 1.21);
        assert!(low.as_secs_f64() >= base.as_secs_f64() * 0.79);
    }

    #[test]
    fn retryable_statuses_match_spec_table() {
        for status in [408, 425, 429, 500, 502, 503, 504] {
            assert!(is_retryable_status(status), "{status} should be retryable");
        }
        for status in [400, 401, 403, 404, 410, 416] {
            assert!(!is_retryable_status(status), "{status} should not be retryable");
        }
    }
}
