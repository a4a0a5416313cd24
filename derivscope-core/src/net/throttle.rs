//! Process-wide request spacing.
//!
//! Every outbound request goes through one shared `Throttle` so that no two
//! requests from this process fire closer together than the configured
//! interval, regardless of which data source issued them.

use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Minimum-interval gate shared by all fetches in the process.
///
/// `acquire` holds the lock across the wait, so concurrent callers are
/// serialized through a single check-and-update critical section.
#[derive(Debug)]
pub struct Throttle {
    min_interval: Duration,
    last_acquired: Mutex<Option<Instant>>,
}

impl Throttle {
    /// Create a throttle with the given minimum spacing between requests.
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_acquired: Mutex::new(None),
        }
    }

    /// Default spacing for unauthenticated public APIs: 500ms.
    pub fn default_spacing() -> Self {
        Self::new(Duration::from_millis(500))
    }

    /// Block until at least `min_interval` has elapsed since the previous
    /// successful `acquire` returned, then record the current instant as the
    /// new baseline.
    pub fn acquire(&self) {
        let mut last = self.last_acquired.lock().unwrap();
        if let Some(prev) = *last {
            let elapsed = prev.elapsed();
            if elapsed < self.min_interval {
                std::thread::sleep(self.min_interval - elapsed);
            }
        }
        *last = Some(Instant::now());
    }

    /// The configured spacing.
    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }
}
