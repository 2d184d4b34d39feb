use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use desk_common::time::UnixTimestamp;
use desk_log::LogError;
use thiserror::Error;

use crate::rate_limit::{RateLimitExceeded, RateLimitScope, RateLimiterConfig, RetryAfter};

/// An error returned by a [`ThrottleBackend`].
///
/// Backend failures are never surfaced to request callers; the supervisor
/// reacts by switching to the local backend.
#[derive(Debug, Error)]
pub enum ThrottleError {
    /// The backend could not be reached.
    #[error("throttle backend unreachable")]
    Unreachable(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// The backend did not answer within its deadline.
    #[error("throttle backend timed out")]
    Timeout,
}

/// The decision of a throttle backend for a single request.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ThrottleDecision {
    /// The request is admitted.
    Allowed {
        /// Points left in the current window.
        remaining: u32,
    },
    /// The request is rejected.
    Blocked {
        /// Seconds until the identity's block expires.
        retry_after_secs: u64,
    },
}

/// A backend holding per-identity request buckets.
///
/// Both implementations enforce the same bucket parameters, fixed at
/// construction. State is local to each backend; it is not migrated when
/// the supervisor switches between them.
#[async_trait]
pub trait ThrottleBackend: Send + Sync {
    /// Consumes one point from the identity's bucket.
    async fn try_consume(
        &self,
        scope: &RateLimitScope,
        now: UnixTimestamp,
    ) -> Result<ThrottleDecision, ThrottleError>;
}

/// State of a single identity's bucket.
#[derive(Clone, Copy, Debug)]
struct BucketState {
    /// Start of the current window, unix seconds.
    window_start: u64,
    /// Points consumed in the current window.
    consumed: u32,
    /// Unix second at which the block expires, if exhausted.
    blocked_until: Option<u64>,
}

impl BucketState {
    fn new(now: u64) -> Self {
        Self {
            window_start: now,
            consumed: 0,
            blocked_until: None,
        }
    }

    fn consume(&mut self, config: &RateLimiterConfig, now: u64) -> ThrottleDecision {
        if let Some(until) = self.blocked_until {
            if now < until {
                return ThrottleDecision::Blocked {
                    retry_after_secs: until - now,
                };
            }
            // Block elapsed, start over with a full bucket.
            *self = Self::new(now);
        } else if now >= self.window_start.saturating_add(config.duration) {
            *self = Self::new(now);
        }

        self.consumed += 1;
        if self.consumed > config.points {
            self.blocked_until = Some(now.saturating_add(config.block_duration));
            ThrottleDecision::Blocked {
                retry_after_secs: config.block_duration,
            }
        } else {
            ThrottleDecision::Allowed {
                remaining: config.points - self.consumed,
            }
        }
    }

    /// Returns `true` once neither the window nor a block keeps this entry
    /// relevant.
    fn is_idle(&self, config: &RateLimiterConfig, now: u64) -> bool {
        let idle_after = match self.blocked_until {
            Some(until) => until,
            None => self.window_start.saturating_add(config.duration),
        };
        now >= idle_after
    }
}

/// A process-local throttle backend.
///
/// Serves as the fallback while the shared cache is unreachable. Buckets
/// are keyed by identity and vacuumed on a fixed interval so a long
/// fallback period does not accumulate stale entries.
#[derive(Debug)]
pub struct LocalThrottle {
    config: RateLimiterConfig,
    buckets: Mutex<hashbrown::HashMap<String, BucketState>>,
    /// Unix second of the next vacuum run.
    next_vacuum: AtomicU64,
}

impl LocalThrottle {
    /// Creates a new local throttle with the given bucket parameters.
    pub fn new(config: RateLimiterConfig) -> Self {
        Self {
            config,
            buckets: Mutex::new(hashbrown::HashMap::new()),
            next_vacuum: AtomicU64::new(0),
        }
    }

    fn vacuum_interval(&self) -> u64 {
        self.config.duration.max(self.config.block_duration)
    }

    fn try_vacuum(&self, buckets: &mut hashbrown::HashMap<String, BucketState>, now: u64) {
        let next = self.next_vacuum.load(Ordering::Relaxed);
        if now < next {
            return;
        }

        let deadline = now.saturating_add(self.vacuum_interval());
        if self
            .next_vacuum
            .compare_exchange(next, deadline, Ordering::Relaxed, Ordering::Relaxed)
            .is_err()
        {
            return;
        }

        buckets.retain(|_, state| !state.is_idle(&self.config, now));
    }
}

#[async_trait]
impl ThrottleBackend for LocalThrottle {
    async fn try_consume(
        &self,
        scope: &RateLimitScope,
        now: UnixTimestamp,
    ) -> Result<ThrottleDecision, ThrottleError> {
        let now = now.as_secs();
        let mut buckets = self.buckets.lock().unwrap();
        self.try_vacuum(&mut buckets, now);

        let state = buckets
            .entry(scope.to_string())
            .or_insert_with(|| BucketState::new(now));

        Ok(state.consume(&self.config, now))
    }
}

/// A request throttle with a shared primary backend and a local fallback.
///
/// Requests consume from the primary (distributed) backend while it is
/// reachable. On a connection error or timeout the limiter switches to the
/// fallback and stays there; it does not probe the primary on subsequent
/// calls. An external recovery signal switches back via
/// [`restore_primary`](Self::restore_primary).
///
/// Bucket state is not migrated on a switch: an identity's consumed points
/// implicitly reset when the active backend changes. Both backends share
/// the same bucket parameters, so enforcement semantics stay identical.
#[derive(Debug)]
pub struct RateLimiter<P, F> {
    primary: Option<P>,
    fallback: F,
    degraded: AtomicBool,
}

impl<P, F> RateLimiter<P, F>
where
    P: ThrottleBackend,
    F: ThrottleBackend,
{
    /// Creates a rate limiter from explicit backends.
    ///
    /// With no primary, all requests consume from the fallback.
    pub fn new(primary: Option<P>, fallback: F) -> Self {
        Self {
            primary,
            fallback,
            degraded: AtomicBool::new(false),
        }
    }

    /// Consumes one point for the given client identity.
    ///
    /// Returns an error only when the identity has exhausted its budget;
    /// backend failures degrade to the fallback instead of failing the
    /// request.
    pub async fn consume(&self, scope: &RateLimitScope) -> Result<(), RateLimitExceeded> {
        let now = UnixTimestamp::now();

        if let Some(primary) = self.active_primary() {
            match primary.try_consume(scope, now).await {
                Ok(decision) => return admit(decision),
                Err(error) => {
                    self.degraded.store(true, Ordering::Relaxed);
                    desk_log::error!(
                        "throttle primary backend failed, switching to local buckets: {}",
                        LogError(&error)
                    );
                }
            }
        }

        match self.fallback.try_consume(scope, now).await {
            Ok(decision) => admit(decision),
            Err(error) => {
                // The local fallback performs no I/O; an error here is a bug.
                desk_log::error!("throttle fallback failed: {}", LogError(&error));
                Ok(())
            }
        }
    }

    /// Returns `true` while requests are served by the fallback backend.
    pub fn is_degraded(&self) -> bool {
        self.primary.is_none() || self.degraded.load(Ordering::Relaxed)
    }

    /// Switches back to the primary backend.
    ///
    /// Wire this to the cache client's reconnect notification. A no-op if
    /// the limiter is not degraded.
    pub fn restore_primary(&self) {
        if self.primary.is_some() && self.degraded.swap(false, Ordering::Relaxed) {
            desk_log::info!("throttle primary backend restored");
        }
    }

    fn active_primary(&self) -> Option<&P> {
        if self.degraded.load(Ordering::Relaxed) {
            return None;
        }
        self.primary.as_ref()
    }
}

impl<F> RateLimiter<LocalThrottle, F>
where
    F: ThrottleBackend,
{
    /// Creates a rate limiter that only uses the given local backend.
    pub fn local_only(fallback: F) -> Self {
        Self::new(None, fallback)
    }
}

fn admit(decision: ThrottleDecision) -> Result<(), RateLimitExceeded> {
    match decision {
        ThrottleDecision::Allowed { .. } => Ok(()),
        ThrottleDecision::Blocked { retry_after_secs } => Err(RateLimitExceeded {
            retry_after: RetryAfter::from_secs(retry_after_secs),
        }),
    }
}
