//! Sliding-window rate limiter for lookup admission control
//!
//! Tracks, per identity, the timestamps of admitted calls within a trailing
//! window. Each admission check lazily discards timestamps that have fallen
//! out of the window; there is no background cleanup task.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Default number of requests admitted per identity within one window
pub const DEFAULT_MAX_REQUESTS: usize = 10;

/// Default window length in seconds
pub const DEFAULT_WINDOW_SECS: u64 = 60;

/// Per-identity sliding-window admission control
///
/// Identities are independent: the shared map is locked only long enough to
/// obtain a per-identity handle, and a per-identity mutex serialises
/// admission checks for that identity. Denied calls are not recorded, so a
/// rejected burst does not consume window capacity.
#[derive(Debug)]
pub struct RateLimiter {
    /// Maximum admitted calls per identity within one window
    max_requests: usize,
    /// Trailing window length
    window: Duration,
    /// Admitted-call timestamps per identity, oldest first
    windows: Mutex<HashMap<String, Arc<Mutex<VecDeque<Instant>>>>>,
}

impl RateLimiter {
    /// Creates a rate limiter admitting at most `max_requests` calls per
    /// identity in any trailing interval of length `window`.
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// The configured per-window admission limit
    pub fn max_requests(&self) -> usize {
        self.max_requests
    }

    /// The configured window length
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Checks whether a call from `identity` is admitted right now
    ///
    /// Admission records the call towards future windows; denial records
    /// nothing. The first call from a previously unseen identity always
    /// admits.
    pub fn admit(&self, identity: &str) -> bool {
        self.admit_at(identity, Instant::now())
    }

    /// Admission check against an explicit clock reading
    ///
    /// `now` must not move backwards between calls for the same identity;
    /// callers outside tests should go through [`admit`](Self::admit).
    fn admit_at(&self, identity: &str, now: Instant) -> bool {
        let handle = self.identity_handle(identity);
        let mut timestamps = handle.lock().unwrap_or_else(|e| e.into_inner());

        // Lazy cleanup: drop everything at or beyond window age.
        while let Some(front) = timestamps.front() {
            match now.checked_duration_since(*front) {
                Some(age) if age >= self.window => {
                    timestamps.pop_front();
                }
                _ => break,
            }
        }

        if timestamps.len() >= self.max_requests {
            return false;
        }

        timestamps.push_back(now);
        true
    }

    /// Returns the timestamp sequence for an identity, creating it lazily
    fn identity_handle(&self, identity: &str) -> Arc<Mutex<VecDeque<Instant>>> {
        let mut map = self.windows.lock().unwrap_or_else(|e| e.into_inner());
        match map.get(identity) {
            Some(handle) => Arc::clone(handle),
            None => {
                let handle = Arc::new(Mutex::new(VecDeque::new()));
                map.insert(identity.to_string(), Arc::clone(&handle));
                handle
            }
        }
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(
            DEFAULT_MAX_REQUESTS,
            Duration::from_secs(DEFAULT_WINDOW_SECS),
        )
    }
}
