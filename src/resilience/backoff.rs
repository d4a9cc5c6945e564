//! Exponential backoff.

use std::time::Duration;

/// Delay before retry number `attempt` (1-based): `base` doubled for every
/// attempt after the first, capped at `max`. Attempt 0 waits nothing.
pub fn backoff_delay(attempt: u32, base: Duration, max: Duration) -> Duration {
    if attempt == 0 {
        return Duration::ZERO;
    }
    let factor = 2u32.saturating_pow(attempt - 1);
    base.saturating_mul(factor).min(max)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doubles_then_caps() {
        let base = Duration::from_millis(10);
        let max = Duration::from_secs(1);
        assert_eq!(backoff_delay(0, base, max), Duration::ZERO);
        assert_eq!(backoff_delay(1, base, max), Duration::from_millis(10));
        assert_eq!(backoff_delay(2, base, max), Duration::from_millis(20));
        assert_eq!(backoff_delay(4, base, max), Duration::from_millis(80));
        assert_eq!(backoff_delay(8, base, max), max);
        assert_eq!(backoff_delay(u32::MAX, base, max), max);
    }
}
