//! Strictly increasing sequence number generation.

use std::time::{SystemTime, UNIX_EPOCH};

/// Generates strictly increasing sequence numbers for locally authored
/// properties.
///
/// Values are derived from the wall clock (milliseconds since the Unix
/// epoch) so that numbering survives process restarts in the common case;
/// within one process lifetime the output is strictly monotonic regardless
/// of clock resolution or call rate.
///
/// Assumption: wall-clock time does not move backward *across* restarts. If
/// it does, a restarted node may briefly generate sequence numbers below its
/// previous session's; [`SequenceClock::observe`] bounds the damage for any
/// value the node actually sees coming back from the network.
#[derive(Debug, Default)]
pub struct SequenceClock {
    last: u64,
}

impl SequenceClock {
    /// Create a new clock.
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the next sequence number: the current wall-clock time if
    /// strictly greater than the last returned value, otherwise `last + 1`.
    pub fn next(&mut self) -> u64 {
        self.next_at(wall_clock_millis())
    }

    /// Raise the clock's floor so every future [`SequenceClock::next`] value
    /// strictly exceeds `seen`.
    ///
    /// Called with sequence numbers observed on the wire before publishing a
    /// corrective update, so the correction outbids the observed entry even
    /// when the peer's clock ran ahead of ours.
    pub fn observe(&mut self, seen: u64) {
        if seen > self.last {
            self.last = seen;
        }
    }

    fn next_at(&mut self, now: u64) -> u64 {
        if now > self.last {
            self.last = now;
        } else {
            self.last += 1;
        }
        self.last
    }
}

fn wall_clock_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or(0)
}
