//! Exponential backoff shared by every queue's retry scheduling.

/// `min(cap_ms, base_ms * 2^(attempt - 1))`, `attempt` is 1-based.
pub fn exponential_backoff_ms(attempt: i32, base_ms: i64, cap_ms: i64) -> i64 {
    let attempt = attempt.max(1) as u32;
    let scaled = base_ms.saturating_mul(1i64 << attempt.min(32).saturating_sub(1));
    scaled.min(cap_ms)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doubles_until_the_cap() {
        assert_eq!(exponential_backoff_ms(1, 2_000, 32_000), 2_000);
        assert_eq!(exponential_backoff_ms(2, 2_000, 32_000), 4_000);
        assert_eq!(exponential_backoff_ms(3, 2_000, 32_000), 8_000);
        assert_eq!(exponential_backoff_ms(5, 2_000, 32_000), 32_000);
        assert_eq!(exponential_backoff_ms(10, 2_000, 32_000), 32_000);
    }

    #[test]
    fn attempt_zero_behaves_like_attempt_one() {
        assert_eq!(exponential_backoff_ms(0, 2_000, 32_000), 2_000);
    }
}
