//! Backing store for the SBI Timer extension: programs the platform's
//! per-HART timer comparator and tracks whether a compare value is
//! currently armed, so `sbi_set_timer` can be called redundantly
//! without double-programming hardware that dislikes it.

use core::sync::atomic::{AtomicU64, Ordering};

use crate::platform;

const TIMER_DISARMED: u64 = u64::MAX;

pub struct TimerCell {
    armed_at: AtomicU64,
}

impl TimerCell {
    pub const fn new() -> Self {
        TimerCell { armed_at: AtomicU64::new(TIMER_DISARMED) }
    }

    /// Arms (or disarms, with `None`) this HART's timer. Mirrors the
    /// Timer extension's single `sbi_timer_event_start` operation.
    pub fn set(&self, hartindex: usize, stime_value: Option<u64>) {
        match stime_value {
            Some(v) => {
                self.armed_at.store(v, Ordering::Release);
                platform::current().timer_set(hartindex, Some(v));
            }
            None => {
                self.armed_at.store(TIMER_DISARMED, Ordering::Release);
                platform::current().timer_set(hartindex, None);
            }
        }
    }

    pub fn is_armed(&self) -> bool {
        self.armed_at.load(Ordering::Acquire) != TIMER_DISARMED
    }
}

impl Default for TimerCell {
    fn default() -> Self {
        Self::new()
    }
}

pub fn now() -> u64 {
    platform::current().time_now()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disarmed_by_default() {
        let t = TimerCell::new();
        assert!(!t.is_armed());
    }

    #[test]
    fn set_then_clear() {
        let t = TimerCell::new();
        t.set(0, Some(1234));
        assert!(t.is_armed());
        t.set(0, None);
        assert!(!t.is_armed());
    }
}
