//! The timeout convention shared across every blocking operation in the
//! gateway: `None` blocks indefinitely, `Some(d)` is a deadline. A
//! sub-millisecond remaining duration is rounded up to 1 ms to avoid
//! spurious zero-timeout busy spins.

use std::time::Duration;

pub type Timeout = Option<Duration>;

pub const MIN_TIMEOUT: Duration = Duration::from_millis(1);

pub fn clamp_min(d: Duration) -> Duration {
    if d < MIN_TIMEOUT {
        MIN_TIMEOUT
    } else {
        d
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamps_up() {
        assert_eq!(clamp_min(Duration::from_micros(1)), MIN_TIMEOUT);
        assert_eq!(clamp_min(Duration::from_secs(2)), Duration::from_secs(2));
    }
}
