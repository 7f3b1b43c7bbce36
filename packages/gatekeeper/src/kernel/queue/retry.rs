//! Centralized retryable-failure classification (spec §4.9). Every caller
//! that needs to decide "try again or give up" goes through this one
//! predicate — the teacher's `ErrorKind::should_retry` plays the same
//! role in `kernel/jobs/job.rs`.

use crate::kernel::calendar_client::CalendarError;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub retryable_status_codes: Vec<u16>,
    pub backoff_seconds: Vec<u64>,
    pub max_attempts: i32,
}

impl RetryPolicy {
    pub fn is_retryable(&self, error: &CalendarError) -> bool {
        if error.timeout {
            return true;
        }
        match error.status_code {
            Some(code) => self.retryable_status_codes.contains(&code),
            None => false,
        }
    }

    /// Backoff for the given retry count, clamping to the last configured
    /// entry once the count exceeds the table (spec §4.5: "clamp the index").
    pub fn backoff_for(&self, retry_count: i32) -> u64 {
        let idx = (retry_count.max(0) as usize).min(self.backoff_seconds.len().saturating_sub(1));
        self.backoff_seconds.get(idx).copied().unwrap_or(0)
    }

    pub fn attempts_exhausted(&self, retry_count: i32) -> bool {
        retry_count >= self.max_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> RetryPolicy {
        RetryPolicy {
            retryable_status_codes: vec![429, 500, 502, 503],
            backoff_seconds: vec![5, 10, 20],
            max_attempts: 3,
        }
    }

    #[test]
    fn retryable_status_codes_are_retryable() {
        let p = policy();
        assert!(p.is_retryable(&CalendarError::new(Some(503), "busy")));
        assert!(p.is_retryable(&CalendarError::new(Some(429), "rate limited")));
    }

    #[test]
    fn permanent_status_codes_are_not_retryable() {
        let p = policy();
        assert!(!p.is_retryable(&CalendarError::new(Some(404), "not found")));
        assert!(!p.is_retryable(&CalendarError::new(Some(400), "bad request")));
    }

    #[test]
    fn timeouts_are_always_retryable() {
        let p = policy();
        assert!(p.is_retryable(&CalendarError::timeout("deadline exceeded")));
    }

    #[test]
    fn backoff_clamps_past_the_configured_table() {
        let p = policy();
        assert_eq!(p.backoff_for(0), 5);
        assert_eq!(p.backoff_for(2), 20);
        assert_eq!(p.backoff_for(10), 20);
    }

    #[test]
    fn exhaustion_respects_max_attempts() {
        let p = policy();
        assert!(!p.attempts_exhausted(2));
        assert!(p.attempts_exhausted(3));
    }
}
