//! Logging facade for Desk.
//!
//! # Setup
//!
//! To enable logging, invoke the [`init`] function with a [`LogConfig`]. The
//! configuration implements `serde` traits, so it can be obtained from
//! configuration files.
//!
//! ```
//! let config = desk_log::LogConfig::default();
//! desk_log::init(&config);
//! ```
//!
//! # Logging
//!
//! Use the five logging macros re-exported by this crate: [`error!`],
//! [`warn!`], [`info!`], [`debug!`] and [`trace!`].
//!
//! ## Conventions
//!
//! Log messages should start lowercase and end without punctuation. Prefer
//! short and precise log messages over verbose text. Choose the log level
//! according to these rules:
//!
//! - [`error!`] for bugs and invalid behavior.
//! - [`warn!`] for undesirable behavior.
//! - [`info!`] for messages relevant to the average operator.
//! - [`debug!`] for messages usually relevant to debugging.
//! - [`trace!`] for full auxiliary information.
//!
//! ## Logging Error Types
//!
//! To log errors with all their causes, use the [`LogError`] wrapper:
//!
//! ```
//! use desk_log::LogError;
//!
//! if let Err(error) = std::env::var("FOO") {
//!     desk_log::error!("env failed: {}", LogError(&error));
//! }
//! ```
//!
//! # Testing
//!
//! For unit testing, there is a separate initialization macro
//! [`init_test!`] that should be called at the beginning of the test. It
//! routes logs to the output captured by the test runner.
//!
//! ```
//! #[test]
//! fn test_something() {
//!     desk_log::init_test!();
//! }
//! # fn main() {}
//! ```

#![warn(missing_docs)]

mod setup;
pub use setup::*;

mod utils;
pub use utils::*;


// Expose the minimal tracing facade.
#[doc(inline)]
pub use tracing::{debug, error, info, trace, warn};
