//! Plan quotas and request throttling for Desk.
//!
//! This crate decides whether a store may create another resource under its
//! subscription plan, keeps the per-store usage counters consistent, and
//! bounds request rates per client identity.
//!
//! # Quotas
//!
//! [`QuotaGuard`] answers "can this store create another X?" by comparing
//! the store's [`StoreUsage`] counters against the limits of its
//! [`PlanTier`]. The check itself is side-effect free; after the resource
//! has been persisted, [`QuotaGuard::increment_usage`] commits the counter
//! with an atomic increment and re-checks the limit, so two concurrent
//! creations near the boundary cannot silently over-admit.
//!
//! # Throttling
//!
//! [`RateLimiter`] consumes one point per request from a per-identity
//! bucket. The bucket lives in the shared Redis cache when reachable and
//! falls back to an in-process bucket when it is not; the switch is logged
//! and one-directional until [`RateLimiter::restore_primary`] is called.

#![warn(missing_docs)]

mod guard;
mod limiter;
mod plan;
mod rate_limit;
mod usage;

pub use self::guard::*;
pub use self::limiter::*;
pub use self::plan::*;
pub use self::rate_limit::*;
pub use self::usage::*;

#[cfg(feature = "redis")]
mod redis;
#[cfg(feature = "redis")]
pub use self::redis::*;
