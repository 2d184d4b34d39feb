//! Scheduled maintenance tasks for Desk.
//!
//! The tasks in this crate run outside of the request path. They are
//! invoked by an external periodic trigger (or manually by an
//! administrator) through [`Maintenance::run`] and each invocation runs to
//! completion:
//!
//! - [`UsageReset`] zeroes monthly ticket counters whose reset date has
//!   passed and schedules the next reset.
//! - [`LimitCheck`] collects notices for stores that reached a plan limit.
//! - [`RetentionArchiver`] archives tickets that fell out of their store's
//!   retention window.
//!
//! All tasks isolate failures per store: one failing store is reported in
//! the aggregate outcome and never aborts the rest of the batch.

#![warn(missing_docs)]

mod archive;
mod check;
mod reset;
mod trigger;

pub use self::archive::*;
pub use self::check::*;
pub use self::reset::*;
pub use self::trigger::*;

#[cfg(test)]
mod testutils;
