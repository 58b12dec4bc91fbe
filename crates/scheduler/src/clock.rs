use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Nanoseconds since the unix epoch.
pub fn now_ns() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before unix epoch")
        .as_nanos() as u64
}

/// Wall-clock slot arithmetic anchored at the genesis timestamp.
#[derive(Debug, Clone, Copy)]
pub struct SlotClock {
    genesis_ns: u64,
    slot_duration_ns: u64,
}

impl SlotClock {
    pub fn new(genesis_ns: u64, slot_duration: Duration) -> Self {
        Self {
            genesis_ns,
            slot_duration_ns: slot_duration.as_nanos() as u64,
        }
    }

    /// The slot containing `now_ns` and the time remaining in it.
    ///
    /// Before genesis the clock reports slot 0 with the full gap remaining.
    pub fn slot_at(&self, now_ns: u64) -> (u64, Duration) {
        if now_ns < self.genesis_ns {
            return (0, Duration::from_nanos(self.genesis_ns - now_ns));
        }
        let since = now_ns - self.genesis_ns;
        let slot = since / self.slot_duration_ns;
        let into = since % self.slot_duration_ns;
        (slot, Duration::from_nanos(self.slot_duration_ns - into))
    }

    /// Wall-clock start of `slot`, in nanoseconds since the unix epoch.
    pub fn slot_start_ns(&self, slot: u64) -> u64 {
        self.genesis_ns + slot * self.slot_duration_ns
    }

    /// Wall-clock end of `slot` (exclusive), the build deadline.
    pub fn slot_end_ns(&self, slot: u64) -> u64 {
        self.slot_start_ns(slot + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_boundaries() {
        let clock = SlotClock::new(1_000_000_000, Duration::from_millis(400));
        // exactly at genesis: slot 0, full slot remaining
        let (slot, remaining) = clock.slot_at(1_000_000_000);
        assert_eq!(slot, 0);
        assert_eq!(remaining, Duration::from_millis(400));

        // one nanosecond before slot 1
        let (slot, remaining) = clock.slot_at(1_399_999_999);
        assert_eq!(slot, 0);
        assert_eq!(remaining, Duration::from_nanos(1));

        let (slot, _) = clock.slot_at(1_400_000_000);
        assert_eq!(slot, 1);
    }

    #[test]
    fn start_and_end_are_consistent() {
        let clock = SlotClock::new(0, Duration::from_millis(400));
        assert_eq!(clock.slot_start_ns(3), 1_200_000_000);
        assert_eq!(clock.slot_end_ns(3), clock.slot_start_ns(4));
    }

    #[test]
    fn before_genesis_reports_slot_zero() {
        let clock = SlotClock::new(5_000, Duration::from_millis(400));
        let (slot, remaining) = clock.slot_at(1_000);
        assert_eq!(slot, 0);
        assert_eq!(remaining, Duration::from_nanos(4_000));
    }
}
