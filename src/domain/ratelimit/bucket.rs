//! Token bucket with reservation-based waiting

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tokio::time::Instant;

use super::AdmissionContext;

#[derive(Debug)]
struct BucketState {
    /// May go negative: each pending reservation is owed one token.
    tokens: f64,
    last_refill: Instant,
}

impl BucketState {
    fn refill(&mut self, now: Instant, rate: f64, burst: f64) {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * rate).min(burst);
        self.last_refill = now;
    }
}

/// A token bucket refilled continuously at `rate` tokens per second, holding
/// at most `burst` tokens. It starts full.
///
/// Waiters reserve a token up front and sleep until it is due, so a bucket
/// serves callers in the order they arrived.
#[derive(Debug)]
pub struct TokenBucket {
    rate: f64,
    burst: f64,
    state: Mutex<BucketState>,
}

impl TokenBucket {
    pub fn new(rate: u32, burst: u32) -> Self {
        Self {
            rate: f64::from(rate),
            burst: f64::from(burst),
            state: Mutex::new(BucketState {
                tokens: f64::from(burst),
                last_refill: Instant::now(),
            }),
        }
    }

    /// Bucket whose burst equals its per-second rate.
    pub fn per_second(rate: u32) -> Self {
        Self::new(rate, rate)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BucketState> {
        // State is a plain number pair; a panic elsewhere cannot corrupt it.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Tokens available right now. Negative while reservations are pending.
    pub fn available(&self) -> f64 {
        let mut state = self.lock();
        state.refill(Instant::now(), self.rate, self.burst);
        state.tokens
    }

    /// Take a token only if one is available immediately.
    pub fn try_acquire(&self) -> bool {
        let mut state = self.lock();
        state.refill(Instant::now(), self.rate, self.burst);
        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Reserve one token, returning when it becomes usable.
    ///
    /// Nothing is reserved and `None` is returned when the token cannot be
    /// due by `deadline`, or ever.
    fn reserve(&self, deadline: Option<Instant>) -> Option<Instant> {
        if self.burst < 1.0 {
            return None;
        }

        let now = Instant::now();
        let mut state = self.lock();
        state.refill(now, self.rate, self.burst);

        let remaining = state.tokens - 1.0;
        let ready_at = if remaining >= 0.0 {
            now
        } else if self.rate > 0.0 {
            now + Duration::from_secs_f64(-remaining / self.rate)
        } else {
            return None;
        };

        if deadline.is_some_and(|deadline| ready_at > deadline) {
            return None;
        }

        state.tokens = remaining;
        Some(ready_at)
    }

    /// Hand back a reservation that was never used.
    fn release(&self) {
        let mut state = self.lock();
        state.refill(Instant::now(), self.rate, self.burst);
        state.tokens = (state.tokens + 1.0).min(self.burst);
    }

    /// Wait for one token, bounded by `ctx`.
    ///
    /// Returns `false` without waiting when the token cannot be due before
    /// the deadline. A bucket that can never admit (zero rate once drained,
    /// or zero burst) blocks until `ctx` ends and then returns `false`.
    pub async fn wait(&self, ctx: &AdmissionContext) -> bool {
        if ctx.is_done() {
            return false;
        }

        let Some(ready_at) = self.reserve(ctx.deadline()) else {
            if self.can_ever_admit() {
                return false;
            }
            ctx.done().await;
            return false;
        };

        if ready_at <= Instant::now() {
            return true;
        }

        // Returned to the bucket on cancellation or when this future is dropped.
        let reservation = Reservation::new(self);
        tokio::select! {
            biased;
            _ = ctx.cancellation().cancelled() => false,
            _ = tokio::time::sleep_until(ready_at) => {
                reservation.keep();
                true
            }
        }
    }

    fn can_ever_admit(&self) -> bool {
        self.burst >= 1.0 && self.rate > 0.0
    }
}

/// A pending token owed by the bucket, released unless kept.
struct Reservation<'a> {
    bucket: &'a TokenBucket,
    kept: bool,
}

impl<'a> Reservation<'a> {
    fn new(bucket: &'a TokenBucket) -> Self {
        Self { bucket, kept: false }
    }

    fn keep(mut self) {
        self.kept = true;
    }
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        if !self.kept {
            self.bucket.release();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tokio_util::sync::CancellationToken;

    fn ctx_with_timeout(ms: u64) -> AdmissionContext {
        AdmissionContext::default().with_timeout(Duration::from_millis(ms))
    }

    #[tokio::test(start_paused = true)]
    async fn test_bucket_starts_full() {
        let bucket = TokenBucket::per_second(3);
        let ctx = ctx_with_timeout(1);

        for _ in 0..3 {
            assert!(bucket.wait(&ctx).await);
        }
        assert!(!bucket.wait(&ctx).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_waits_for_refill_within_deadline() {
        let bucket = TokenBucket::per_second(2);
        assert!(bucket.try_acquire());
        assert!(bucket.try_acquire());

        let start = Instant::now();
        assert!(bucket.wait(&ctx_with_timeout(600)).await);
        assert!(start.elapsed() >= Duration::from_millis(500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_short_deadline_refuses_without_reserving() {
        let bucket = TokenBucket::per_second(1);
        assert!(bucket.try_acquire());

        let start = Instant::now();
        assert!(!bucket.wait(&ctx_with_timeout(100)).await);
        assert_eq!(start.elapsed(), Duration::ZERO);

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(bucket.try_acquire());
    }

    #[tokio::test(start_paused = true)]
    async fn test_refill_is_capped_at_burst() {
        let bucket = TokenBucket::per_second(2);
        tokio::time::advance(Duration::from_secs(10)).await;

        assert_eq!(bucket.available(), 2.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_rate_blocks_until_deadline() {
        let bucket = TokenBucket::per_second(0);
        let start = Instant::now();

        assert!(!bucket.wait(&ctx_with_timeout(250)).await);
        assert!(start.elapsed() >= Duration::from_millis(250));
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_rate_with_burst_drains_then_blocks() {
        let bucket = TokenBucket::new(0, 1);
        assert!(bucket.wait(&ctx_with_timeout(10)).await);
        assert!(!bucket.wait(&ctx_with_timeout(10)).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_while_waiting_releases_reservation() {
        let bucket = Arc::new(TokenBucket::per_second(1));
        assert!(bucket.try_acquire());

        let cancel = CancellationToken::new();
        let ctx = AdmissionContext::new(cancel.clone()).with_timeout(Duration::from_secs(5));
        let waiter = {
            let bucket = Arc::clone(&bucket);
            tokio::spawn(async move { bucket.wait(&ctx).await })
        };

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(bucket.available() < 0.0);
        cancel.cancel();

        assert!(!waiter.await.unwrap());
        assert!(bucket.available() >= 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_waiters_served_in_arrival_order() {
        let bucket = Arc::new(TokenBucket::per_second(10));
        for _ in 0..10 {
            assert!(bucket.try_acquire());
        }

        let order = Arc::new(Mutex::new(Vec::new()));
        let mut handles = Vec::new();
        for i in 0..3 {
            let bucket = Arc::clone(&bucket);
            let order = Arc::clone(&order);
            handles.push(tokio::spawn(async move {
                let ctx = AdmissionContext::default().with_timeout(Duration::from_secs(1));
                if bucket.wait(&ctx).await {
                    order.lock().unwrap().push(i);
                }
            }));
            // Let each waiter reserve before the next one starts.
            tokio::task::yield_now().await;
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn test_done_context_is_refused() {
        let bucket = TokenBucket::per_second(5);
        let ctx = AdmissionContext::default();
        ctx.cancel();

        assert!(!bucket.wait(&ctx).await);
        assert_eq!(bucket.available(), 5.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_waiter_returns_its_token() {
        let bucket = TokenBucket::per_second(1);
        assert!(bucket.try_acquire());

        let ctx = ctx_with_timeout(5_000);
        let waited = tokio::time::timeout(Duration::from_millis(100), bucket.wait(&ctx)).await;
        assert!(waited.is_err());
        assert!(bucket.available() > 0.0);

        tokio::time::advance(Duration::from_millis(950)).await;
        assert!(bucket.try_acquire());
    }
}
