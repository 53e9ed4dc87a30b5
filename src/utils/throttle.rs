use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::{Instant, sleep_until};

/// Spaces requests at least `interval` apart, across all callers sharing it.
///
/// Waiters queue on the inner lock, so concurrent fetches are released one at a
/// time in arrival order.
pub struct RequestThrottle {
    interval: Duration,
    next_slot: Mutex<Option<Instant>>,
}

impl RequestThrottle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            next_slot: Mutex::new(None),
        }
    }

    /// Wait until the next request slot is free and claim it.
    pub async fn wait(&self) {
        let mut next_slot = self.next_slot.lock().await;

        if let Some(slot) = *next_slot {
            if slot > Instant::now() {
                sleep_until(slot).await;
            }
        }

        *next_slot = Some(Instant::now() + self.interval);
    }
}
