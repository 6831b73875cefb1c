//! Adaptive wait between data-ready polls.
//!
//! Single timeouts leave the timing alone. Once [`Backoff::MAX_TIMEOUTS`]
//! measurements in a row have timed out, every further timeout lengthens the
//! poll wait by [`Backoff::STEP_US`] and asks for a device reset. The wait
//! never shrinks on success; it only wraps back to the step value when it
//! reaches [`Backoff::MAX_WAIT_US`].

/// Poll wait and consecutive timeout bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Backoff {
    wait_us: u16,
    timeouts: u8,
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new()
    }
}

impl Backoff {
    /// Poll wait at startup.
    pub const INITIAL_WAIT_US: u16 = 1000;

    /// Poll wait increment per escalation, and the value the wait wraps to.
    pub const STEP_US: u16 = 250;

    /// Poll wait ceiling.
    pub const MAX_WAIT_US: u16 = 5000;

    /// Consecutive timeouts before escalating.
    pub const MAX_TIMEOUTS: u8 = 50;

    /// Create a new backoff at the initial wait.
    pub const fn new() -> Self {
        Self {
            wait_us: Self::INITIAL_WAIT_US,
            timeouts: 0,
        }
    }

    /// Current wait between two status polls, in microseconds.
    pub fn wait_us(&self) -> u16 {
        self.wait_us
    }

    /// Number of consecutive timed out measurements.
    pub fn timeouts(&self) -> u8 {
        self.timeouts
    }

    /// Record the outcome of a measurement. Returns `true` when the wait was
    /// escalated and the device should be reset.
    pub fn record(&mut self, timed_out: bool) -> bool {
        if !timed_out {
            self.timeouts = 0;
            return false;
        }

        self.timeouts = self.timeouts.saturating_add(1);
        if self.timeouts < Self::MAX_TIMEOUTS {
            return false;
        }

        self.wait_us += Self::STEP_US;
        if self.wait_us >= Self::MAX_WAIT_US {
            self.wait_us = Self::STEP_US;
        }

        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_at_initial_wait() {
        let backoff = Backoff::default();
        assert_eq!(backoff.wait_us(), 1000);
        assert_eq!(backoff.timeouts(), 0);
    }

    #[test]
    fn escalates_on_fiftieth_timeout() {
        let mut backoff = Backoff::new();

        for _ in 0..49 {
            assert!(!backoff.record(true));
            assert_eq!(backoff.wait_us(), 1000);
        }

        assert!(backoff.record(true));
        assert_eq!(backoff.wait_us(), 1250);
        assert_eq!(backoff.timeouts(), 50);
    }

    #[test]
    fn success_resets_timeout_count() {
        let mut backoff = Backoff::new();

        for _ in 0..49 {
            backoff.record(true);
        }
        assert!(!backoff.record(false));
        assert_eq!(backoff.timeouts(), 0);

        for _ in 0..49 {
            assert!(!backoff.record(true));
        }
        assert_eq!(backoff.wait_us(), 1000);
    }

    #[test]
    fn success_keeps_escalated_wait() {
        let mut backoff = Backoff::new();

        for _ in 0..50 {
            backoff.record(true);
        }
        backoff.record(false);

        assert_eq!(backoff.wait_us(), 1250);
        assert_eq!(backoff.timeouts(), 0);
    }

    #[test]
    fn keeps_escalating_past_threshold() {
        let mut backoff = Backoff::new();

        for _ in 0..52 {
            backoff.record(true);
        }

        assert_eq!(backoff.wait_us(), 1750);
    }

    #[test]
    fn wraps_at_ceiling() {
        let mut backoff = Backoff::new();

        // 50th timeout reaches 1250, the 64th reaches 4750
        for _ in 0..64 {
            backoff.record(true);
        }
        assert_eq!(backoff.wait_us(), 4750);

        assert!(backoff.record(true));
        assert_eq!(backoff.wait_us(), 250);

        assert!(backoff.record(true));
        assert_eq!(backoff.wait_us(), 500);
    }

    #[test]
    fn timeout_count_saturates() {
        let mut backoff = Backoff::new();

        for _ in 0..300 {
            backoff.record(true);
        }

        assert_eq!(backoff.timeouts(), u8::MAX);
        assert!(backoff.wait_us() <= Backoff::MAX_WAIT_US);
    }
}
