use desk_common::time::UnixTimestamp;
use desk_redis::redis::Script;
use desk_redis::{AsyncRedisPool, RedisError};

use crate::limiter::{LocalThrottle, RateLimiter, ThrottleBackend, ThrottleDecision, ThrottleError};
use crate::rate_limit::{RateLimitScope, RateLimiterConfig};

fn load_throttle_script() -> Script {
    Script::new(include_str!("throttle.lua"))
}

/// A throttle backend on the shared Redis cache.
///
/// The bucket state lives in Redis, so all processes serving the same
/// deployment enforce one budget per identity. Consuming a point is a
/// single script invocation; key expiry implements both the window and the
/// block duration, and idle identities disappear with their keys.
///
/// Requires the `redis` feature.
pub struct RedisThrottle {
    pool: AsyncRedisPool,
    config: RateLimiterConfig,
    script: Script,
}

impl RedisThrottle {
    /// Creates a new Redis throttle with the given bucket parameters.
    pub fn new(pool: AsyncRedisPool, config: RateLimiterConfig) -> Self {
        Self {
            pool,
            config,
            script: load_throttle_script(),
        }
    }

    async fn invoke(&self, scope: &RateLimitScope) -> Result<ThrottleDecision, RedisError> {
        let mut connection = self.pool.get_connection().await?;

        let mut invocation = self.script.prepare_invoke();
        invocation
            .key(scope.key())
            .arg(self.config.points)
            .arg(self.config.duration)
            .arg(self.config.block_duration);

        let (blocked, value): (i64, i64) = invocation
            .invoke_async(&mut connection)
            .await
            .map_err(RedisError::Redis)?;

        Ok(if blocked == 1 {
            ThrottleDecision::Blocked {
                retry_after_secs: value.max(0) as u64,
            }
        } else {
            ThrottleDecision::Allowed {
                remaining: value.max(0) as u32,
            }
        })
    }
}

#[async_trait::async_trait]
impl ThrottleBackend for RedisThrottle {
    async fn try_consume(
        &self,
        scope: &RateLimitScope,
        _now: UnixTimestamp,
    ) -> Result<ThrottleDecision, ThrottleError> {
        match tokio::time::timeout(self.pool.operation_timeout(), self.invoke(scope)).await {
            Ok(Ok(decision)) => Ok(decision),
            Ok(Err(error)) => Err(ThrottleError::Unreachable(Box::new(error))),
            // A timeout is treated like a connection failure upstream.
            Err(_) => Err(ThrottleError::Timeout),
        }
    }
}

impl RateLimiter<RedisThrottle, LocalThrottle> {
    /// Creates the production limiter: Redis primary with a local fallback.
    ///
    /// Both backends enforce the same `config`.
    pub fn with_redis(pool: AsyncRedisPool, config: RateLimiterConfig) -> Self {
        Self::new(
            Some(RedisThrottle::new(pool, config.clone())),
            LocalThrottle::new(config),
        )
    }
}
