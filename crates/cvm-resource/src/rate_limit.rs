//! Fixed-window rate limiting per `(address, method)`, keyed on the
//! caller's tier-derived cap.

use cvm_core::Address;
use parking_lot::Mutex;
use std::collections::HashMap;

const WINDOW_SECS: i64 = 60;

struct Window {
    window_start_secs: i64,
    count: u32,
}

/// Stateful limiter; one instance is shared across a node's RPC surface.
/// `now_secs` is supplied by the caller rather than read from the clock
/// directly, keeping the limiter deterministic and testable.
pub struct RateLimiter {
    windows: Mutex<HashMap<(Address, String), Window>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self { windows: Mutex::new(HashMap::new()) }
    }

    /// Returns `true` if the call is allowed (and records it); `false` if
    /// the caller is over its per-minute cap for this method.
    pub fn check_and_record(&self, address: Address, method: &str, cap_per_min: u32, now_secs: i64) -> bool {
        let mut windows = self.windows.lock();
        let key = (address, method.to_string());
        let window = windows.entry(key).or_insert(Window { window_start_secs: now_secs, count: 0 });

        if now_secs - window.window_start_secs >= WINDOW_SECS {
            window.window_start_secs = now_secs;
            window.count = 0;
        }

        if window.count >= cap_per_min {
            return false;
        }
        window.count += 1;
        true
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allows_up_to_cap_then_refuses() {
        let limiter = RateLimiter::new();
        let addr = Address([1u8; 20]);
        for _ in 0..5 {
            assert!(limiter.check_and_record(addr, "call", 5, 0));
        }
        assert!(!limiter.check_and_record(addr, "call", 5, 0));
    }

    #[test]
    fn resets_after_window_elapses() {
        let limiter = RateLimiter::new();
        let addr = Address([2u8; 20]);
        for _ in 0..3 {
            limiter.check_and_record(addr, "call", 3, 0);
        }
        assert!(!limiter.check_and_record(addr, "call", 3, 10));
        assert!(limiter.check_and_record(addr, "call", 3, 61));
    }
}
