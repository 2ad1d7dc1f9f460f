use chrono::Duration;
use papertrade_core::Timestamp;
use papertrade_ports::Clock;
use parking_lot::RwLock;

/// Clock that only moves when told to
///
/// Used for deterministic tests of hourly valuation and retention.
pub struct ManualClock {
    current: RwLock<Timestamp>,
}

impl ManualClock {
    pub fn starting_at(start: Timestamp) -> Self {
        Self {
            current: RwLock::new(start),
        }
    }

    pub fn set(&self, time: Timestamp) {
        *self.current.write() = time;
    }

    pub fn advance(&self, by: Duration) {
        let mut current = self.current.write();
        *current += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        *self.current.read()
    }
}
