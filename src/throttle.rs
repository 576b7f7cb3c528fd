//! Per-source minimum-interval gate for outbound requests.
//!
//! Every marketplace client owns one [`Throttle`] and calls
//! [`Throttle::acquire`] before each upstream request. Because the last-sent
//! instant lives behind an async mutex that is held across the wait, any
//! number of concurrent fan-out workers hitting the same source serialize
//! through this gate: the total request rate to one upstream stays bounded
//! by the interval no matter how wide the worker pool is.

use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::trace;

/// Minimum-interval gate. One instance per source client.
#[derive(Debug)]
pub struct Throttle {
    min_interval: Duration,
    last_request: Mutex<Option<Instant>>,
}

impl Throttle {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_request: Mutex::new(None),
        }
    }

    /// Wait until at least the configured interval has elapsed since the
    /// previous request through this gate, then record the new send time.
    ///
    /// Never fails; the only side effect is sleeping the caller.
    pub async fn acquire(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(prev) = *last {
            let elapsed = prev.elapsed();
            if elapsed < self.min_interval {
                let wait = self.min_interval - elapsed;
                trace!(?wait, "throttling request");
                tokio::time::sleep(wait).await;
            }
        }
        *last = Some(Instant::now());
    }
}
