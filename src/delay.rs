//! Settle delays on hosted targets.

use embedded_hal::delay::DelayNs;

/// [`DelayNs`] provider which blocks the current thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdDelay;

impl DelayNs for StdDelay {
    fn delay_ns(&mut self, ns: u32) {
        std::thread::sleep(std::time::Duration::from_nanos(ns as u64));
    }

    fn delay_ms(&mut self, ms: u32) {
        std::thread::sleep(std::time::Duration::from_millis(ms as u64));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sleeps_at_least_requested_time() {
        let start = std::time::Instant::now();
        StdDelay.delay_ms(5);
        assert!(start.elapsed() >= std::time::Duration::from_millis(5));
    }
}
