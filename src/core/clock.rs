//! Wall Clock and Clock Offsets
//!
//! Peers do not share a clock. Every timestamp on the wire is in the sender's
//! own clock, expressed as fractional seconds since the Unix epoch. The hub
//! keeps one [`ClockService`] per connection that measures
//! `hub_now - declared_time` whenever a message carries a timestamp.

use chrono::Utc;

/// Current wall-clock time in fractional seconds since the Unix epoch.
pub fn now_secs() -> f64 {
    Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

/// Elapsed time of something created at `start` in another clock.
///
/// `correction` maps the creator's clock onto the local one, so the local
/// equivalent of the creation instant is `start + correction`. Never negative.
#[inline]
pub fn catch_up_elapsed(start: f64, correction: f64, now: f64) -> f64 {
    (now - (start + correction)).max(0.0)
}

/// Per-connection clock offset tracker.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ClockService {
    offset: f64,
    samples: u64,
}

impl ClockService {
    /// Tracker with no measurement yet (offset 0).
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a message that declared `declared` and arrived at `arrived_at`.
    ///
    /// Returns the refreshed offset.
    pub fn observe(&mut self, declared: f64, arrived_at: f64) -> f64 {
        self.offset = arrived_at - declared;
        self.samples += 1;
        self.offset
    }

    /// Latest measured offset (receiver clock minus sender clock).
    #[inline]
    pub fn offset(&self) -> f64 {
        self.offset
    }

    /// Whether any timestamped message has been seen.
    pub fn is_measured(&self) -> bool {
        self.samples > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catch_up_elapsed() {
        // Created at T=100 with correction 5, observed at 112
        assert_eq!(catch_up_elapsed(100.0, 5.0, 112.0), 7.0);

        // Clock skew can make the corrected start lie in the future
        assert_eq!(catch_up_elapsed(100.0, 20.0, 112.0), 0.0);
    }

    #[test]
    fn test_clock_service_refresh() {
        let mut clock = ClockService::new();
        assert!(!clock.is_measured());
        assert_eq!(clock.offset(), 0.0);

        assert_eq!(clock.observe(1_000.0, 1_002.5), 2.5);
        assert_eq!(clock.observe(1_010.0, 1_009.0), -1.0);
        assert_eq!(clock.offset(), -1.0);
        assert!(clock.is_measured());
    }

    #[test]
    fn test_now_secs_advances() {
        let a = now_secs();
        let b = now_secs();
        assert!(a > 1_600_000_000.0);
        assert!(b >= a);
    }
}
