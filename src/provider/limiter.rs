use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::{Mutex, Semaphore, SemaphorePermit};
use tokio::time::Instant;

const WINDOW: Duration = Duration::from_secs(60);

/// Process-wide gate on calls to the external model API: a fair FIFO
/// semaphore bounds in-flight calls, and a sliding 60s window bounds calls
/// per minute. Passed by reference into every component that issues calls,
/// so tests can substitute a permissive instance.
pub struct RateLimiter {
    permits: Semaphore,
    per_minute: Option<u32>,
    window: Mutex<VecDeque<Instant>>,
}

/// Held for the duration of one external call. Dropping it frees the
/// in-flight slot; the per-minute slot is consumed at acquisition.
pub struct CallPermit<'a> {
    _permit: SemaphorePermit<'a>,
}

impl RateLimiter {
    pub fn new(max_in_flight: usize, per_minute: Option<u32>) -> Self {
        Self {
            permits: Semaphore::new(max_in_flight.max(1)),
            per_minute: per_minute.filter(|&n| n > 0),
            window: Mutex::new(VecDeque::new()),
        }
    }

    /// A limiter that never waits, for tests.
    pub fn unlimited() -> Self {
        Self::new(Semaphore::MAX_PERMITS, None)
    }

    pub async fn acquire(&self) -> CallPermit<'_> {
        let permit = self
            .permits
            .acquire()
            .await
            .expect("limiter semaphore is never closed");

        if let Some(limit) = self.per_minute {
            self.wait_for_minute_slot(limit).await;
        }

        CallPermit { _permit: permit }
    }

    async fn wait_for_minute_slot(&self, limit: u32) {
        loop {
            let now = Instant::now();
            let oldest = {
                let mut window = self.window.lock().await;
                while window
                    .front()
                    .is_some_and(|t| now.duration_since(*t) >= WINDOW)
                {
                    window.pop_front();
                }
                if (window.len() as u32) < limit {
                    window.push_back(now);
                    return;
                }
                window.front().copied()
            };

            let Some(oldest) = oldest else { return };
            let wait = WINDOW.saturating_sub(now.duration_since(oldest));
            tracing::debug!(wait_ms = wait.as_millis() as u64, "per-minute window full");
            tokio::time::sleep(wait).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn bounds_concurrent_calls() {
        let limiter = Arc::new(RateLimiter::new(2, None));
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let limiter = Arc::clone(&limiter);
            let in_flight = Arc::clone(&in_flight);
            let peak = Arc::clone(&peak);
            handles.push(tokio::spawn(async move {
                let _permit = limiter.acquire().await;
                let current = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(current, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test(start_paused = true)]
    async fn per_minute_window_delays_excess_calls() {
        let limiter = RateLimiter::new(10, Some(2));
        let started = tokio::time::Instant::now();

        let _a = limiter.acquire().await;
        let _b = limiter.acquire().await;
        assert!(started.elapsed() < Duration::from_secs(1));

        // Third call must wait for the window to slide.
        let _c = limiter.acquire().await;
        assert!(started.elapsed() >= WINDOW);
    }

    #[tokio::test]
    async fn unlimited_never_blocks() {
        let limiter = RateLimiter::unlimited();
        for _ in 0..64 {
            drop(limiter.acquire().await);
        }
    }
}
