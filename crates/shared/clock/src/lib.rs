//! Paper-trading Clock Infrastructure
//!
//! - [`SystemClock`]: wall-clock time for production
//! - [`ManualClock`]: frozen time that tests move by hand
//!
//! ```ignore
//! use papertrade_clock::{Clock, ManualClock};
//! use chrono::Duration;
//!
//! let clock = ManualClock::starting_at(start);
//! clock.advance(Duration::hours(1));
//! ```

mod manual;
mod system;

pub use manual::ManualClock;
pub use system::SystemClock;

// Re-export the Clock trait for convenience
pub use papertrade_ports::Clock;
