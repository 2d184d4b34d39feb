use chrono::{DateTime, Utc};
use desk_common::StoreId;
use desk_common::time::next_month_start;
use desk_log::LogError;
use desk_quotas::{UsageStore, UsageStoreError};
use serde::Serialize;

/// A failure affecting a single store during a batch task.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct StoreFailure {
    /// The affected store.
    pub store_id: StoreId,
    /// The rendered error chain.
    pub error: String,
}

impl StoreFailure {
    pub(crate) fn new(store_id: StoreId, error: &dyn std::error::Error) -> Self {
        Self {
            store_id,
            error: LogError(error).to_string(),
        }
    }
}

/// The aggregate result of a counter reset run.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct ResetOutcome {
    /// Stores whose monthly ticket counter was reset.
    pub reset: u64,
    /// Stores skipped because a concurrent run already advanced them.
    pub already_reset: u64,
    /// Per-store failures.
    pub failures: Vec<StoreFailure>,
}

/// Resets monthly ticket counters of stores whose reset date has passed.
///
/// Both the selection and the counter update are conditional on the stored
/// reset date, so re-running within the same cycle is a no-op: a store that
/// was just reset carries a reset date in the future and is not selected
/// again.
#[derive(Clone, Debug)]
pub struct UsageReset<S> {
    usage: S,
}

impl<S: UsageStore> UsageReset<S> {
    /// Creates a new reset task on top of a usage store handle.
    pub fn new(usage: S) -> Self {
        Self { usage }
    }

    /// Resets all stores due at `now`.
    ///
    /// Each store's counter is zeroed and its reset date advanced to the
    /// first instant of the month following `now`. Stores are processed
    /// independently; failures land in the outcome instead of aborting the
    /// batch.
    pub async fn reset_due_stores(
        &self,
        now: DateTime<Utc>,
    ) -> Result<ResetOutcome, UsageStoreError> {
        let due = self.usage.due_for_reset(now).await?;
        let next_reset = next_month_start(now);

        let mut outcome = ResetOutcome::default();
        for row in due {
            match self
                .usage
                .reset_monthly_tickets(row.store_id, now, next_reset)
                .await
            {
                Ok(true) => {
                    desk_log::debug!("reset monthly ticket counter for store {}", row.store_id);
                    outcome.reset += 1;
                }
                Ok(false) => outcome.already_reset += 1,
                Err(error) => {
                    desk_log::warn!(
                        "failed to reset counter for store {}: {}",
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

#[cfg(test)]
mod tests {
    use desk_quotas::ResourceKind;
    use similar_asserts::assert_eq;

    use super::*;
    use crate::testutils::{MemoryUsageStore, datetime, usage_row};

    #[tokio::test]
    async fn test_resets_due_stores_only() {
        let store = MemoryUsageStore::default();
        let now = datetime("2024-07-03T09:30:00Z");

        let mut due = usage_row(1, desk_quotas::PlanTier::Team);
        due.monthly_ticket_count = 37;
        due.ticket_count_reset_at = datetime("2024-07-01T00:00:00Z");
        store.insert(due);

        let mut not_due = usage_row(2, desk_quotas::PlanTier::Team);
        not_due.monthly_ticket_count = 12;
        not_due.ticket_count_reset_at = datetime("2024-08-01T00:00:00Z");
        store.insert(not_due);

        let outcome = UsageReset::new(store.clone())
            .reset_due_stores(now)
            .await
            .unwrap();

        assert_eq!(outcome.reset, 1);
        assert!(outcome.failures.is_empty());

        let row = store.get(1);
        assert_eq!(row.monthly_ticket_count, 0);
        assert_eq!(row.ticket_count_reset_at, datetime("2024-08-01T00:00:00Z"));
        assert_eq!(row.count(ResourceKind::Ticket), 0);

        // The store that was not due is untouched.
        assert_eq!(store.get(2).monthly_ticket_count, 12);
    }

    #[tokio::test]
    async fn test_rerun_is_a_noop() {
        let store = MemoryUsageStore::default();
        let now = datetime("2024-07-03T09:30:00Z");

        let mut row = usage_row(1, desk_quotas::PlanTier::Free);
        row.monthly_ticket_count = 5;
        row.ticket_count_reset_at = datetime("2024-07-01T00:00:00Z");
        store.insert(row);

        let reset = UsageReset::new(store.clone());

        let first = reset.reset_due_stores(now).await.unwrap();
        assert_eq!(first.reset, 1);

        // The new reset date lies in the future, so nothing is selected.
        let second = reset.reset_due_stores(now).await.unwrap();
        assert_eq!(second.reset, 0);
        assert_eq!(second.already_reset, 0);
    }

    #[tokio::test]
    async fn test_failures_do_not_abort_the_batch() {
        let store = MemoryUsageStore::default();
        let now = datetime("2024-07-03T09:30:00Z");

        for id in [1, 2, 3] {
            let mut row = usage_row(id, desk_quotas::PlanTier::Team);
            row.monthly_ticket_count = 10;
            row.ticket_count_reset_at = datetime("2024-07-01T00:00:00Z");
            store.insert(row);
        }
        store.fail_reset_for(2);

        let outcome = UsageReset::new(store.clone())
            .reset_due_stores(now)
            .await
            .unwrap();

        assert_eq!(outcome.reset, 2);
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].store_id, StoreId::new(2));

        assert_eq!(store.get(1).monthly_ticket_count, 0);
        assert_eq!(store.get(2).monthly_ticket_count, 10);
        assert_eq!(store.get(3).monthly_ticket_count, 0);
    }
}
