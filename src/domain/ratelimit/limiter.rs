//! Per-user + global admission control

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use lru::LruCache;

use super::{AdmissionContext, TokenBucket};

/// Rate limiter settings. Rates are tokens per second and double as burst.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimiterOpts {
    pub per_user_limit: u32,
    pub global_limit: u32,
    /// Most users tracked at once; `None` tracks every user ever seen.
    pub max_tracked_users: Option<NonZeroUsize>,
}

impl Default for RateLimiterOpts {
    fn default() -> Self {
        Self {
            per_user_limit: 1,
            global_limit: 5,
            max_tracked_users: NonZeroUsize::new(10_000),
        }
    }
}

/// Counters exposed for diagnostics and tests
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RateLimiterStats {
    pub tracked_users: usize,
    pub buckets_created: u64,
    pub admitted: u64,
    pub denied_per_user: u64,
    pub denied_global: u64,
}

/// A tracked user's bucket with its recency stamps.
///
/// `last_used` is bumped under the shared lock on every hit; `promoted_at`
/// records the stamp the entry had when it last moved to the front of the
/// LRU order, and only changes under the exclusive lock.
struct Tracked {
    bucket: Arc<TokenBucket>,
    last_used: AtomicU64,
    promoted_at: u64,
}

/// Admission controller enforcing a per-user ceiling and a global ceiling.
///
/// Per-user buckets are created on first use and kept in an LRU map; a user
/// evicted from it starts over with a full bucket when seen again. Hits for
/// known users take only the shared lock. Their recency is settled lazily
/// when a new user needs room: an LRU victim used since its last promotion
/// gets a second chance instead of being evicted.
pub struct RateLimiter {
    per_user_limit: u32,
    per_user: RwLock<LruCache<String, Tracked>>,
    clock: AtomicU64,
    global: TokenBucket,
    buckets_created: AtomicU64,
    admitted: AtomicU64,
    denied_per_user: AtomicU64,
    denied_global: AtomicU64,
}

impl RateLimiter {
    pub fn new(opts: RateLimiterOpts) -> Self {
        let per_user = match opts.max_tracked_users {
            Some(capacity) => LruCache::new(capacity),
            None => LruCache::unbounded(),
        };

        Self {
            per_user_limit: opts.per_user_limit,
            per_user: RwLock::new(per_user),
            clock: AtomicU64::new(0),
            global: TokenBucket::per_second(opts.global_limit),
            buckets_created: AtomicU64::new(0),
            admitted: AtomicU64::new(0),
            denied_per_user: AtomicU64::new(0),
            denied_global: AtomicU64::new(0),
        }
    }

    /// Wait for a per-user token and then a global token, both bounded by
    /// `ctx`.
    ///
    /// Returns `false` when either wait ends without a token; the global
    /// bucket is not touched if the per-user wait fails. A reservation still
    /// pending when `ctx` ends or the future is dropped goes back to its
    /// bucket, but a token already granted is never returned, even when the
    /// global wait or the caller's work later fails.
    pub async fn allow(&self, ctx: &AdmissionContext, user: &str) -> bool {
        let bucket = self.get_or_init_bucket(user);
        if !bucket.wait(ctx).await {
            self.denied_per_user.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(user, "cancelled while waiting for per user rate limit quota");
            return false;
        }

        if !self.global.wait(ctx).await {
            self.denied_global.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(user, "cancelled while waiting for global rate limit quota");
            return false;
        }

        self.admitted.fetch_add(1, Ordering::Relaxed);
        true
    }

    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn get_or_init_bucket(&self, user: &str) -> Arc<TokenBucket> {
        if let Some(bucket) = self.try_get_bucket(user) {
            return bucket;
        }

        let mut buckets = self.per_user.write().unwrap_or_else(PoisonError::into_inner);
        // Re-check: another caller may have created it between the locks.
        if let Some(tracked) = buckets.peek(user) {
            tracked.last_used.store(self.tick(), Ordering::Relaxed);
            return Arc::clone(&tracked.bucket);
        }

        Self::make_room(&mut buckets);

        let bucket = Arc::new(TokenBucket::per_second(self.per_user_limit));
        self.buckets_created.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(user, "created per user rate limit bucket");

        let now = self.tick();
        buckets.push(
            user.to_string(),
            Tracked {
                bucket: Arc::clone(&bucket),
                last_used: AtomicU64::new(now),
                promoted_at: now,
            },
        );
        bucket
    }

    /// Evict one entry when the map is full, promoting LRU candidates that
    /// were used since their last promotion.
    fn make_room(buckets: &mut LruCache<String, Tracked>) {
        while buckets.len() >= buckets.cap().get() {
            let Some((user, tracked)) = buckets.peek_lru() else {
                return;
            };
            let last_used = tracked.last_used.load(Ordering::Relaxed);
            if last_used > tracked.promoted_at {
                let user = user.clone();
                if let Some(tracked) = buckets.peek_mut(&user) {
                    tracked.promoted_at = last_used;
                }
                buckets.promote(&user);
                continue;
            }

            // A waiter may still hold the evicted bucket, so this user can
            // briefly have two live buckets; the new one starts full.
            if let Some((evicted, _)) = buckets.pop_lru() {
                tracing::debug!(user = %evicted, "evicted least recently used rate limit bucket");
            }
        }
    }

    fn try_get_bucket(&self, user: &str) -> Option<Arc<TokenBucket>> {
        let buckets = self.per_user.read().unwrap_or_else(PoisonError::into_inner);
        let tracked = buckets.peek(user)?;
        tracked.last_used.store(self.tick(), Ordering::Relaxed);
        Some(Arc::clone(&tracked.bucket))
    }

    pub fn stats(&self) -> RateLimiterStats {
        let tracked_users = self
            .per_user
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len();

        RateLimiterStats {
            tracked_users,
            buckets_created: self.buckets_created.load(Ordering::Relaxed),
            admitted: self.admitted.load(Ordering::Relaxed),
            denied_per_user: self.denied_per_user.load(Ordering::Relaxed),
            denied_global: self.denied_global.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    fn limiter(per_user_limit: u32, global_limit: u32) -> RateLimiter {
        RateLimiter::new(RateLimiterOpts {
            per_user_limit,
            global_limit,
            ..Default::default()
        })
    }

    fn short_ctx() -> AdmissionContext {
        AdmissionContext::default().with_timeout(Duration::from_millis(10))
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_then_deny_within_window() {
        let limiter = limiter(3, 100);

        for _ in 0..3 {
            assert!(limiter.allow(&short_ctx(), "olef").await);
        }
        assert!(!limiter.allow(&short_ctx(), "olef").await);

        let stats = limiter.stats();
        assert_eq!(stats.admitted, 3);
        assert_eq!(stats.denied_per_user, 1);
        assert_eq!(stats.denied_global, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_extra_call_admitted_after_one_interval() {
        let limiter = limiter(2, 100);
        assert!(limiter.allow(&short_ctx(), "olef").await);
        assert!(limiter.allow(&short_ctx(), "olef").await);

        let start = tokio::time::Instant::now();
        let ctx = AdmissionContext::default().with_timeout(Duration::from_secs(1));
        assert!(limiter.allow(&ctx, "olef").await);
        assert!(start.elapsed() >= Duration::from_millis(500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_users_have_independent_buckets() {
        let limiter = limiter(1, 100);

        assert!(limiter.allow(&short_ctx(), "alice").await);
        assert!(limiter.allow(&short_ctx(), "bob").await);
        assert!(!limiter.allow(&short_ctx(), "alice").await);
        assert!(!limiter.allow(&short_ctx(), "bob").await);
        assert_eq!(limiter.stats().tracked_users, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_global_ceiling_across_users() {
        let limiter = limiter(2, 2);
        let mut admitted = 0;
        for user in ["alice", "bob", "alice", "bob"] {
            if limiter.allow(&short_ctx(), user).await {
                admitted += 1;
            }
        }

        assert_eq!(admitted, 2);
        assert_eq!(limiter.stats().denied_global, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_per_user_token_kept_when_global_denies() {
        let limiter = limiter(1, 1);
        assert!(limiter.allow(&short_ctx(), "alice").await);
        // bob's own token is spent even though the global bucket refuses.
        assert!(!limiter.allow(&short_ctx(), "bob").await);

        tokio::time::advance(Duration::from_millis(500)).await;
        assert!(!limiter.allow(&short_ctx(), "bob").await);
        assert_eq!(limiter.stats().denied_per_user, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_rate_never_admits() {
        let limiter = limiter(0, 5);
        let start = tokio::time::Instant::now();

        assert!(!limiter.allow(&short_ctx(), "olef").await);
        assert!(start.elapsed() >= Duration::from_millis(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_context_denies() {
        let limiter = limiter(1, 1);
        let ctx = AdmissionContext::new(CancellationToken::new());
        ctx.cancel();

        assert!(!limiter.allow(&ctx, "olef").await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_identity_shares_one_bucket() {
        let limiter = limiter(1, 100);

        assert!(limiter.allow(&short_ctx(), "").await);
        assert!(!limiter.allow(&short_ctx(), "").await);
        assert_eq!(limiter.stats().buckets_created, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_evicted_user_gets_fresh_bucket() {
        let limiter = RateLimiter::new(RateLimiterOpts {
            per_user_limit: 1,
            global_limit: 100,
            max_tracked_users: NonZeroUsize::new(1),
        });

        assert!(limiter.allow(&short_ctx(), "alice").await);
        assert!(limiter.allow(&short_ctx(), "bob").await);
        // alice was evicted by bob, so her history is gone.
        assert!(limiter.allow(&short_ctx(), "alice").await);

        let stats = limiter.stats();
        assert_eq!(stats.tracked_users, 1);
        assert_eq!(stats.buckets_created, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_recently_used_user_survives_eviction() {
        let limiter = RateLimiter::new(RateLimiterOpts {
            per_user_limit: 1,
            global_limit: 100,
            max_tracked_users: NonZeroUsize::new(2),
        });

        assert!(limiter.allow(&short_ctx(), "alice").await);
        assert!(limiter.allow(&short_ctx(), "bob").await);
        // Touch alice so bob becomes least recently used.
        assert!(!limiter.allow(&short_ctx(), "alice").await);
        assert!(limiter.allow(&short_ctx(), "carol").await);

        assert!(!limiter.allow(&short_ctx(), "alice").await);
        assert_eq!(limiter.stats().buckets_created, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_eviction_prefers_the_least_recently_used() {
        let limiter = RateLimiter::new(RateLimiterOpts {
            per_user_limit: 1,
            global_limit: 100,
            max_tracked_users: NonZeroUsize::new(3),
        });

        for user in ["alice", "bob", "carol"] {
            assert!(limiter.allow(&short_ctx(), user).await);
        }
        // Touch alice then bob, leaving carol as the least recent.
        assert!(!limiter.allow(&short_ctx(), "alice").await);
        assert!(!limiter.allow(&short_ctx(), "bob").await);
        assert!(limiter.allow(&short_ctx(), "dave").await);

        // carol got a fresh bucket; alice and bob kept their spent ones.
        assert!(limiter.allow(&short_ctx(), "carol").await);
        assert_eq!(limiter.stats().buckets_created, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_admission_returns_user_token() {
        let limiter = limiter(1, 100);
        assert!(limiter.allow(&short_ctx(), "olef").await);

        let ctx = AdmissionContext::default().with_timeout(Duration::from_secs(5));
        let waited = tokio::time::timeout(Duration::from_millis(100), limiter.allow(&ctx, "olef")).await;
        assert!(waited.is_err());

        tokio::time::advance(Duration::from_millis(950)).await;
        assert!(limiter.allow(&short_ctx(), "olef").await);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_first_access_creates_one_bucket() {
        let limiter = Arc::new(limiter(1000, 1000));
        let barrier = Arc::new(tokio::sync::Barrier::new(32));

        let handles: Vec<_> = (0..32)
            .map(|_| {
                let limiter = Arc::clone(&limiter);
                let barrier = Arc::clone(&barrier);
                tokio::spawn(async move {
                    barrier.wait().await;
                    let ctx = AdmissionContext::default().with_timeout(Duration::from_secs(1));
                    limiter.allow(&ctx, "newcomer").await
                })
            })
            .collect();

        for handle in handles {
            assert!(handle.await.unwrap());
        }
        assert_eq!(limiter.stats().buckets_created, 1);
    }
}
