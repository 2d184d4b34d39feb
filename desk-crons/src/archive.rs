use async_trait::async_trait;
use chrono::{DateTime, Utc};
use desk_common::StoreId;
use desk_common::time::months_before;
use desk_log::LogError;
use desk_quotas::{UsageStore, UsageStoreError};
use serde::Serialize;
use thiserror::Error;

use crate::reset::StoreFailure;

/// An error returned by a [`TicketArchive`].
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// The backing store could not be reached.
    #[error("ticket archive unavailable")]
    Unavailable(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// The backing store did not answer within its deadline.
    #[error("ticket archive timed out")]
    Timeout,
}

/// Write access to a store's historical tickets.
///
/// Implemented by the persistence engine. The archived status is terminal
/// and distinct from a manual close, so retention-archived tickets remain
/// recognizable. The transition is one-way: tickets already archived must
/// not be touched again, and nothing in this crate revives them.
#[async_trait]
pub trait TicketArchive: Send + Sync {
    /// Archives every ticket of the store last modified before `cutoff`
    /// that is not already archived.
    ///
    /// Returns the number of tickets transitioned by this call.
    async fn archive_tickets_before(
        &self,
        store_id: StoreId,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, ArchiveError>;
}

/// The aggregate result of an archival run.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct ArchiveOutcome {
    /// Total number of tickets transitioned into the archived status.
    pub archived: u64,
    /// Per-store failures.
    pub failures: Vec<StoreFailure>,
}

/// Archives tickets that fell out of their store's retention window.
///
/// The cutoff is derived per store from the plan's `history_months` at the
/// time of the run and never persisted.
#[derive(Clone, Debug)]
pub struct RetentionArchiver<S, T> {
    usage: S,
    tickets: T,
}

impl<S, T> RetentionArchiver<S, T>
where
    S: UsageStore,
    T: TicketArchive,
{
    /// Creates a new archiver on top of the usage and ticket store handles.
    pub fn new(usage: S, tickets: T) -> Self {
        Self { usage, tickets }
    }

    /// Archives expired tickets for every store.
    ///
    /// Stores on plans with unlimited history are skipped. Stores are
    /// processed independently; failures land in the outcome instead of
    /// aborting the batch.
    pub async fn archive_expired(
        &self,
        now: DateTime<Utc>,
    ) -> Result<ArchiveOutcome, UsageStoreError> {
        let rows = self.usage.scan().await?;

        let mut outcome = ArchiveOutcome::default();
        for row in rows {
            let limits = match row.plan_tier.limits() {
                Ok(limits) => limits,
                Err(error) => {
                    desk_log::warn!(
                        "skipping archival for store {}: {}",
                        row.store_id,
                        LogError(&error)
                    );
                    outcome.failures.push(StoreFailure::new(row.store_id, &error));
                    continue;
                }
            };

            let Some(months) = limits.history_months else {
                continue;
            };

            let Some(cutoff) = months_before(now, months) else {
                outcome.failures.push(StoreFailure {
                    store_id: row.store_id,
                    error: "retention cutoff not representable".to_owned(),
                });
                continue;
            };

            match self.tickets.archive_tickets_before(row.store_id, cutoff).await {
                Ok(0) => {}
                Ok(count) => {
                    desk_log::debug!(
                        "archived {count} expired tickets for store {}",
                        row.store_id
                    );
                    outcome.archived += count;
                }
                Err(error) => {
                    desk_log::warn!(
                        "failed to archive tickets for store {}: {}",
                        row.store_id,
                        LogError(&error)
                    );
                    outcome.failures.push(StoreFailure::new(row.store_id, &error));
                }
            }
        }

        Ok(outcome)
    }
}
