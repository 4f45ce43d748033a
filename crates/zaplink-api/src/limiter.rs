// ── Shared request rate limiter ──
//
// The Zaptec cloud enforces a fair-use policy of a bounded number of
// requests per rolling window. Every outgoing request in the process
// funnels through one `RateLimiter` instance, injected by handle so
// tests can drive it with a paused clock.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::trace;

/// Rolling-window request budget shared by all pollers and commands.
///
/// `reserve_slot()` suspends the caller until the window has capacity,
/// then consumes one unit. Grants are strictly FIFO: a waiter sleeps
/// while holding the internal lock, so later callers queue on the
/// (fair) mutex in arrival order and cannot overtake. The limiter never
/// fails and imposes no timeout of its own.
#[derive(Debug)]
pub struct RateLimiter {
    max_requests: usize,
    window: Duration,
    grants: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    /// Create a limiter allowing `max_requests` per rolling `window`.
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            max_requests: max_requests.max(1),
            window,
            grants: Mutex::new(VecDeque::new()),
        }
    }

    /// Limiter configured for the vendor's published fair-use ceiling
    /// (10 requests per second, bursting).
    pub fn vendor_default() -> Self {
        Self::new(10, Duration::from_secs(1))
    }

    /// Wait for budget, then consume one slot.
    pub async fn reserve_slot(&self) {
        let mut grants = self.grants.lock().await;
        loop {
            let now = Instant::now();
            while grants
                .front()
                .is_some_and(|t| now.duration_since(*t) >= self.window)
            {
                grants.pop_front();
            }
            if grants.len() < self.max_requests {
                grants.push_back(now);
                return;
            }
            // Window is full: sleep until the oldest grant rolls out.
            // The lock stays held so queued callers keep their order.
            if let Some(&oldest) = grants.front() {
                trace!("rate limiter saturated, waiting for a slot");
                tokio::time::sleep_until(oldest + self.window).await;
            }
        }
    }

    /// The configured ceiling (requests per window).
    pub fn max_requests(&self) -> usize {
        self.max_requests
    }

    /// The configured rolling window.
    pub fn window(&self) -> Duration {
        self.window
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn grants_up_to_ceiling_without_waiting() {
        let limiter = RateLimiter::new(3, Duration::from_secs(1));
        let start = Instant::now();
        for _ in 0..3 {
            limiter.reserve_slot().await;
        }
        assert_eq!(Instant::now(), start, "first burst must not wait");
    }

    #[tokio::test(start_paused = true)]
    async fn fourth_caller_waits_for_window() {
        let limiter = RateLimiter::new(3, Duration::from_secs(1));
        let start = Instant::now();
        for _ in 0..4 {
            limiter.reserve_slot().await;
        }
        assert!(
            Instant::now().duration_since(start) >= Duration::from_secs(1),
            "fourth grant must wait out the window"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn never_exceeds_ceiling_in_any_window() {
        let limiter = Arc::new(RateLimiter::new(5, Duration::from_secs(1)));
        let granted = Arc::new(Mutex::new(Vec::<Instant>::new()));

        let tasks: Vec<_> = (0..20)
            .map(|_| {
                let limiter = Arc::clone(&limiter);
                let granted = Arc::clone(&granted);
                tokio::spawn(async move {
                    limiter.reserve_slot().await;
                    granted.lock().await.push(Instant::now());
                })
            })
            .collect();
        for t in tasks {
            t.await.unwrap();
        }

        let times = granted.lock().await;
        assert_eq!(times.len(), 20);
        for t in times.iter() {
            let in_window = times
                .iter()
                .filter(|u| **u >= *t && u.duration_since(*t) < Duration::from_secs(1))
                .count();
            assert!(in_window <= 5, "window starting at {t:?} holds {in_window} grants");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn waiters_are_granted_in_fifo_order() {
        let limiter = Arc::new(RateLimiter::new(1, Duration::from_secs(1)));
        let order = Arc::new(Mutex::new(Vec::new()));
        let spawned = Arc::new(AtomicUsize::new(0));

        limiter.reserve_slot().await; // saturate the window

        let mut tasks = Vec::new();
        for i in 0..5 {
            let limiter = Arc::clone(&limiter);
            let order = Arc::clone(&order);
            let spawned = Arc::clone(&spawned);
            tasks.push(tokio::spawn(async move {
                spawned.fetch_add(1, Ordering::SeqCst);
                limiter.reserve_slot().await;
                order.lock().await.push(i);
            }));
            // Let each task reach the lock queue before spawning the next,
            // so arrival order is deterministic.
            tokio::task::yield_now().await;
        }
        for t in tasks {
            t.await.unwrap();
        }

        assert_eq!(*order.lock().await, vec![0, 1, 2, 3, 4]);
    }
}
