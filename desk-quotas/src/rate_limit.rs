use std::fmt;
use std::net::IpAddr;
use std::time::{Duration, Instant};

use desk_common::StoreId;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A monotonic expiration marker for rate limits.
///
/// `RetryAfter` marks the instant at which a block expires. It can convert
/// into the remaining time until expiration, which callers surface as a
/// retry-after signal.
#[derive(Clone, Copy, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct RetryAfter {
    when: Instant,
}

impl RetryAfter {
    /// Creates a retry after instance.
    #[inline]
    pub fn from_secs(seconds: u64) -> Self {
        let when = Instant::now() + Duration::from_secs(seconds);
        Self { when }
    }

    /// Returns the remaining duration until the block expires.
    #[inline]
    pub fn remaining(self) -> Option<Duration> {
        let now = Instant::now();
        if now >= self.when {
            None
        } else {
            Some(self.when - now)
        }
    }

    /// Returns the remaining seconds until the block expires.
    ///
    /// This is a shortcut to `retry_after.remaining().as_secs()` with one
    /// exception: if the block has expired, this function returns `0`.
    #[inline]
    pub fn remaining_seconds(self) -> u64 {
        match self.remaining() {
            // Compensate for the missing subsec part by adding 1s
            Some(duration) if duration.subsec_nanos() == 0 => duration.as_secs(),
            Some(duration) => duration.as_secs() + 1,
            None => 0,
        }
    }

    /// Returns whether this block has expired.
    #[inline]
    pub fn expired(self) -> bool {
        self.remaining().is_none()
    }
}

impl fmt::Debug for RetryAfter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.remaining_seconds() {
            0 => write!(f, "RetryAfter(expired)"),
            remaining => write!(f, "RetryAfter({remaining}s)"),
        }
    }
}

/// The client identity a throttle bucket applies to.
///
/// Buckets are partitioned by identity, so there is no contention between
/// different clients.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum RateLimitScope {
    /// A client network address.
    Ip(IpAddr),
    /// An authenticated store account.
    Store(StoreId),
}

impl RateLimitScope {
    /// Returns the canonical name of this scope.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Ip(_) => "ip",
            Self::Store(_) => "store",
        }
    }

    /// Returns the cache key of this identity's bucket.
    ///
    /// The identity is wrapped in a hash tag so all of its keys land on the
    /// same slot of a Redis cluster.
    pub fn key(&self) -> String {
        format!("throttle:{{{self}}}")
    }
}

impl fmt::Display for RateLimitScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ip(addr) => write!(f, "ip:{addr}"),
            Self::Store(id) => write!(f, "store:{id}"),
        }
    }
}

/// An error indicating the client exhausted its request budget.
///
/// Carries the remaining block duration. This error is always surfaced to
/// the request's caller as a "too many requests" response and never retried
/// internally.
#[derive(Clone, Copy, Debug, Error)]
#[error("rate limited for the next {} seconds", .retry_after.remaining_seconds())]
pub struct RateLimitExceeded {
    /// When the block expires.
    pub retry_after: RetryAfter,
}

fn default_points() -> u32 {
    60
}

fn default_duration() -> u64 {
    60
}

fn default_block_duration() -> u64 {
    300
}

/// Parameters of the per-identity request bucket.
///
/// Shared by the distributed and the local backend, so enforcement is
/// consistent regardless of which one is active. Immutable for the lifetime
/// of the process.
#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimiterConfig {
    /// Requests permitted per window.
    pub points: u32,
    /// Window length in seconds.
    pub duration: u64,
    /// How long an exhausted identity stays blocked, in seconds.
    pub block_duration: u64,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            points: default_points(),
            duration: default_duration(),
            block_duration: default_block_duration(),
        }
    }
}
