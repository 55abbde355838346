//! # Hybrid Logical Clock
//!
//! A timestamp is `(physical nanoseconds, logical counter)`, ordered
//! lexicographically. The clock never goes backwards: when wall time
//! stalls or regresses, the logical counter carries the ordering.
//!
//! `now()` stamps local events; `update(received)` folds in a remote
//! timestamp so that the returned value strictly dominates both the
//! remote one and everything issued locally before it.

use parking_lot::Mutex;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Hybrid logical timestamp. `Ord` is lexicographic on
/// `(physical, logical)`, which is exactly the visibility order MVCC
/// needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Timestamp {
    pub physical: i64,
    pub logical: u32,
}

impl Timestamp {
    pub const ZERO: Timestamp = Timestamp {
        physical: 0,
        logical: 0,
    };

    pub fn new(physical: i64, logical: u32) -> Self {
        Self { physical, logical }
    }

    pub fn is_zero(&self) -> bool {
        *self == Self::ZERO
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.physical, self.logical)
    }
}

pub struct Hlc {
    state: Mutex<Timestamp>,
}

impl Hlc {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(Timestamp::new(wall_nanos(), 0)),
        }
    }

    /// Current timestamp, strictly greater than every previous `now()`.
    pub fn now(&self) -> Timestamp {
        let mut state = self.state.lock();
        let wall = wall_nanos();
        if wall > state.physical {
            state.physical = wall;
            state.logical = 0;
        } else {
            state.logical += 1;
        }
        *state
    }

    /// Folds in a timestamp received from another node. The result
    /// strictly dominates both `received` and all prior local timestamps.
    pub fn update(&self, received: Timestamp) -> Timestamp {
        let mut state = self.state.lock();
        let wall = wall_nanos();
        if wall > state.physical && wall > received.physical {
            state.physical = wall;
            state.logical = 0;
        } else if state.physical > received.physical {
            state.logical += 1;
        } else if received.physical > state.physical {
            state.physical = received.physical;
            state.logical = received.logical + 1;
        } else {
            state.logical = state.logical.max(received.logical) + 1;
        }
        *state
    }
}

impl Default for Hlc {
    fn default() -> Self {
        Self::new()
    }
}

fn wall_nanos() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn now_is_strictly_monotonic() {
        let clock = Hlc::new();
        let mut last = clock.now();
        for _ in 0..10_000 {
            let next = clock.now();
            assert!(next > last, "{} !> {}", next, last);
            last = next;
        }
    }

    #[test]
    fn update_dominates_a_future_remote_timestamp() {
        let clock = Hlc::new();
        let remote = Timestamp::new(wall_nanos() + 1_000_000_000, 5);
        let result = clock.update(remote);
        assert!(result > remote);
        assert_eq!(result.physical, remote.physical);
        assert_eq!(result.logical, remote.logical + 1);
    }

    #[test]
    fn update_dominates_a_stale_remote_timestamp() {
        let clock = Hlc::new();
        let local = clock.now();
        let remote = Timestamp::new(1, 0);
        let result = clock.update(remote);
        assert!(result > remote);
        assert!(result > local);
    }

    #[test]
    fn repeated_update_with_the_same_timestamp_keeps_advancing() {
        let clock = Hlc::new();
        let remote = Timestamp::new(wall_nanos() + 1_000_000_000, 0);
        let first = clock.update(remote);
        let second = clock.update(remote);
        assert!(first > remote);
        assert!(second > first);
    }

    #[test]
    fn timestamps_order_lexicographically() {
        assert!(Timestamp::new(1, 5) < Timestamp::new(2, 0));
        assert!(Timestamp::new(2, 0) < Timestamp::new(2, 1));
        assert_eq!(Timestamp::new(3, 3), Timestamp::new(3, 3));
    }

    #[test]
    fn now_after_update_stays_above_the_remote_clock() {
        let clock = Hlc::new();
        let remote = Timestamp::new(wall_nanos() + 1_000_000_000, 9);
        clock.update(remote);
        assert!(clock.now() > remote);
    }
}
