//! Identifier minting and monotonic time
//!
//! Every id in a persisted record comes from one [`IdGenerator`] so
//! journal ordering follows mint order. Ids are
//! `<millis-hex>-<uuid-simple>`: the timestamp prefix makes
//! lexicographic order track time, the uuid tail makes collisions a
//! non-event.

use chrono::{DateTime, TimeZone, Utc};
use std::sync::atomic::{AtomicI64, Ordering};
use uuid::Uuid;

/// Monotonic wall-clock readings.
///
/// Raw wall clock regressions (NTP steps) are absorbed by never
/// handing out a reading earlier than the previous one.
#[derive(Debug, Default)]
pub struct MonotonicClock {
    last_micros: AtomicI64,
}

impl MonotonicClock {
    /// Create a new clock
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current time, never earlier than a previous reading
    pub fn now(&self) -> DateTime<Utc> {
        let raw = Utc::now().timestamp_micros();
        let mut prev = self.last_micros.load(Ordering::Relaxed);
        loop {
            let candidate = raw.max(prev + 1);
            match self.last_micros.compare_exchange_weak(
                prev,
                candidate,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => {
                    return Utc
                        .timestamp_micros(candidate)
                        .single()
                        .unwrap_or_else(Utc::now)
                }
                Err(observed) => prev = observed,
            }
        }
    }
}

/// Mints process-unique identifiers with a time-ordered prefix
#[derive(Debug, Default)]
pub struct IdGenerator {
    clock: MonotonicClock,
}

impl IdGenerator {
    /// Create a new generator
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mint one id
    pub fn mint(&self) -> String {
        let now = self.now();
        format!("{:012x}-{}", now.timestamp_millis(), Uuid::new_v4().simple())
    }

    /// Monotonic timestamp from the same clock the ids embed
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }
}
