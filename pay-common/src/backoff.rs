use std::cmp::min;
use std::time::Duration;

const INITIAL_WAIT_MS: u64 = 250;
const MAXIMUM_WAIT_MS: u64 = 32_000;
const EXP_BASE: u64 = 2;

/// Get an iterator of [`Duration`]s which can be passed into e.g.
/// [`tokio::time::sleep`] to observe time-based exponential backoff. Used by
/// the Gateway Adapter (§4.3) to retry transient HTTP failures before the
/// circuit breaker records a failure.
///
/// ```ignore
/// let mut backoff_durations = pay_common::backoff::get_backoff_iter();
/// for _ in 0..10 {
///     tokio::time::sleep(backoff_durations.next().unwrap()).await;
/// }
/// ```
pub fn get_backoff_iter() -> impl Iterator<Item = Duration> {
    (0u32..).map(|index| {
        let factor = EXP_BASE.saturating_pow(index);
        let wait_ms = INITIAL_WAIT_MS.saturating_mul(factor);
        let bounded_wait_ms = min(wait_ms, MAXIMUM_WAIT_MS);
        Duration::from_millis(bounded_wait_ms)
    })
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn no_integer_overflow() {
        let mut backoff_durations = get_backoff_iter();
        for _ in 0..200 {
            backoff_durations.next();
        }
    }

    #[test]
    fn bounded_by_maximum() {
        let mut backoff_durations = get_backoff_iter();
        for _ in 0..50 {
            assert!(backoff_durations.next().unwrap().as_millis() <= MAXIMUM_WAIT_MS as u128);
        }
    }
}
