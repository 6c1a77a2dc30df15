//! Minimum spacing between outbound provider calls.
//!
//! Callers reserve the next free slot under the lock and sleep outside it,
//! so concurrent workers queue up one interval apart instead of bursting.

use std::sync::Mutex;
use std::time::{Duration, Instant};

#[derive(Debug)]
pub struct RateLimiter {
    min_interval: Duration,
    next_slot: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            next_slot: Mutex::new(None),
        }
    }

    pub fn unlimited() -> Self {
        Self::new(Duration::ZERO)
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Block until this caller's slot arrives. Returns how long it waited.
    pub fn acquire(&self) -> Duration {
        if self.min_interval.is_zero() {
            return Duration::ZERO;
        }
        let now = Instant::now();
        let slot = {
            let mut next = self.next_slot.lock().unwrap_or_else(|e| e.into_inner());
            let slot = match *next {
                Some(t) if t > now => t,
                _ => now,
            };
            *next = Some(slot + self.min_interval);
            slot
        };
        let wait = slot.saturating_duration_since(now);
        if !wait.is_zero() {
            std::thread::sleep(wait);
        }
        wait
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn unlimited_never_waits() {
        let rl = RateLimiter::unlimited();
        for _ in 0..5 {
            assert_eq!(rl.acquire(), Duration::ZERO);
        }
    }

    #[test]
    fn consecutive_calls_are_spaced() {
        let rl = RateLimiter::new(Duration::from_millis(20));
        let start = Instant::now();
        rl.acquire();
        rl.acquire();
        rl.acquire();
        assert!(start.elapsed() >= Duration::from_millis(40));
    }

    #[test]
    fn concurrent_callers_share_the_schedule() {
        let rl = Arc::new(RateLimiter::new(Duration::from_millis(15)));
        let start = Instant::now();
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let rl = Arc::clone(&rl);
                std::thread::spawn(move || rl.acquire())
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert!(start.elapsed() >= Duration::from_millis(45));
    }
}
