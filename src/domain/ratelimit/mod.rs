//! Token-bucket admission control
//!
//! [`RateLimiter::allow`] waits on the caller's own bucket and then on one
//! bucket shared by everybody. Both waits are bounded by the caller's
//! [`AdmissionContext`].

pub mod bucket;
pub mod context;
pub mod limiter;

pub use bucket::TokenBucket;
pub use context::AdmissionContext;
pub use limiter::{RateLimiter, RateLimiterOpts, RateLimiterStats};
