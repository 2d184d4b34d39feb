use std::fmt::{self, Debug, Formatter};
use std::time::Duration;

use deadpool::Runtime;
use deadpool::managed::{BuildError, PoolError};
use deadpool_redis::cluster::{
    Config as ClusterConfig, Connection as ClusterConnection, Pool as ClusterPool,
};
use deadpool_redis::redis::{Cmd, Pipeline, RedisFuture, Value};
use deadpool_redis::{
    Config as SingleConfig, ConfigError, Connection as SingleConnection, Pool as SinglePool,
};
use thiserror::Error;

use crate::config::{RedisConfig, RedisConfigOptions};
use crate::redis;

/// An error type that represents various failure modes when interacting with Redis.
#[derive(Debug, Error)]
pub enum RedisError {
    /// An error that occurs during communication with Redis.
    #[error("failed to communicate with redis: {0}")]
    Redis(#[source] redis::RedisError),

    /// An error that occurs when interacting with the Redis connection pool.
    #[error("failed to interact with the redis pool: {0}")]
    Pool(#[source] PoolError<redis::RedisError>),

    /// An error that occurs when creating a Redis connection pool.
    #[error("failed to create redis pool: {0}")]
    CreatePool(#[from] BuildError),

    /// An error that occurs when configuring Redis.
    #[error("failed to configure redis: {0}")]
    ConfigError(#[from] ConfigError),

    /// A command did not complete within the configured operation timeout.
    #[error("redis command timed out")]
    Timeout,
}

/// Statistics about the connection pool state.
#[derive(Debug)]
pub struct RedisPoolStats {
    /// The number of connections currently being managed by the pool.
    pub connections: u32,
    /// The number of idle connections.
    pub idle_connections: u32,
}

/// A connection pool that can manage either a single Redis instance or a Redis cluster.
#[derive(Clone)]
pub struct AsyncRedisPool {
    inner: PoolInner,
    options: RedisConfigOptions,
}

#[derive(Clone)]
enum PoolInner {
    Cluster(ClusterPool),
    Single(SinglePool),
}

impl AsyncRedisPool {
    /// Creates a new connection pool from a [`RedisConfig`].
    pub fn from_config(config: &RedisConfig) -> Result<Self, RedisError> {
        match config {
            RedisConfig::Cluster {
                cluster_nodes,
                options,
            } => Self::cluster(cluster_nodes.iter().map(String::as_str), options),
            RedisConfig::Single(server) => Self::single(server, &Default::default()),
            RedisConfig::SingleWithOpts { server, options } => Self::single(server, options),
        }
    }

    /// Creates a new connection pool for a Redis cluster.
    pub fn cluster<'a>(
        servers: impl IntoIterator<Item = &'a str>,
        opts: &RedisConfigOptions,
    ) -> Result<Self, RedisError> {
        let servers = servers
            .into_iter()
            .map(|s| s.to_owned())
            .collect::<Vec<_>>();

        let pool = ClusterConfig::from_urls(servers)
            .builder()?
            .max_size(opts.max_connections as usize)
            .create_timeout(Some(Duration::from_secs(opts.connection_timeout)))
            .wait_timeout(Some(Duration::from_secs(opts.connection_timeout)))
            .runtime(Runtime::Tokio1)
            .build()?;

        Ok(Self {
            inner: PoolInner::Cluster(pool),
            options: opts.clone(),
        })
    }

    /// Creates a new connection pool for a single Redis instance.
    pub fn single(server: &str, opts: &RedisConfigOptions) -> Result<Self, RedisError> {
        let pool = SingleConfig::from_url(server)
            .builder()?
            .max_size(opts.max_connections as usize)
            .create_timeout(Some(Duration::from_secs(opts.connection_timeout)))
            .wait_timeout(Some(Duration::from_secs(opts.connection_timeout)))
            .runtime(Runtime::Tokio1)
            .build()?;

        Ok(Self {
            inner: PoolInner::Single(pool),
            options: opts.clone(),
        })
    }

    /// Acquires a connection from the pool.
    ///
    /// Returns a new [`AsyncRedisConnection`] that can be used to execute
    /// Redis commands. The connection is automatically returned to the pool
    /// when dropped.
    pub async fn get_connection(&self) -> Result<AsyncRedisConnection, RedisError> {
        let connection = match &self.inner {
            PoolInner::Cluster(pool) => {
                AsyncRedisConnection::Cluster(pool.get().await.map_err(RedisError::Pool)?)
            }
            PoolInner::Single(pool) => {
                AsyncRedisConnection::Single(pool.get().await.map_err(RedisError::Pool)?)
            }
        };

        Ok(connection)
    }

    /// Returns the deadline for individual commands on this pool.
    pub fn operation_timeout(&self) -> Duration {
        Duration::from_secs(self.options.operation_timeout)
    }

    /// Returns statistics about the current state of the connection pool.
    pub fn stats(&self) -> RedisPoolStats {
        let status = match &self.inner {
            PoolInner::Cluster(pool) => pool.status(),
            PoolInner::Single(pool) => pool.status(),
        };

        RedisPoolStats {
            idle_connections: status.available as u32,
            connections: status.size as u32,
        }
    }
}

impl fmt::Debug for AsyncRedisPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.inner {
            PoolInner::Cluster(_) => write!(f, "AsyncRedisPool::Cluster"),
            PoolInner::Single(_) => write!(f, "AsyncRedisPool::Single"),
        }
    }
}

/// A connection to either a single Redis instance or a Redis cluster.
pub enum AsyncRedisConnection {
    /// A connection to a Redis cluster.
    Cluster(ClusterConnection),
    /// A connection to a single Redis instance.
    Single(SingleConnection),
}

impl Debug for AsyncRedisConnection {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Cluster(_) => "Cluster",
            Self::Single(_) => "Single",
        };
        f.debug_tuple(name).finish()
    }
}

impl redis::aio::ConnectionLike for AsyncRedisConnection {
    fn req_packed_command<'a>(&'a mut self, cmd: &'a Cmd) -> RedisFuture<'a, Value> {
        match self {
            Self::Cluster(conn) => conn.req_packed_command(cmd),
            Self::Single(conn) => conn.req_packed_command(cmd),
        }
    }

    fn req_packed_commands<'a>(
        &'a mut self,
        cmd: &'a Pipeline,
        offset: usize,
        count: usize,
    ) -> RedisFuture<'a, Vec<Value>> {
        match self {
            Self::Cluster(conn) => conn.req_packed_commands(cmd, offset, count),
            Self::Single(conn) => conn.req_packed_commands(cmd, offset, count),
        }
    }

    fn get_db(&self) -> i64 {
        match self {
            Self::Cluster(conn) => conn.get_db(),
            Self::Single(conn) => conn.get_db(),
        }
    }
}
