//! Abstraction over the shared Redis cache.
//!
//! Desk uses Redis as the distributed backend for usage buckets and request
//! throttling. This crate wraps connection pooling for both single-instance
//! and cluster deployments behind one interface.

#![warn(missing_docs)]

mod config;
mod pool;

pub use self::config::*;
pub use self::pool::*;

pub use deadpool_redis::redis;
