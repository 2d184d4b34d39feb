use desk_common::StoreId;
use desk_log::LogError;
use desk_quotas::{QuotaCheck, ResourceKind, UsageStore, UsageStoreError};
use serde::Serialize;

use crate::reset::StoreFailure;

/// A store counter at or over its plan limit.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct LimitNotice {
    /// The affected store.
    pub store_id: StoreId,
    /// The resource kind at its limit.
    pub kind: ResourceKind,
    /// The current counter value.
    pub current: u64,
    /// The plan limit in effect.
    pub limit: u64,
    /// The user-facing notice, same template as quota denials.
    pub message: String,
}

/// The aggregate result of a limit check run.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct CheckOutcome {
    /// One notice per store and resource kind at its limit.
    pub notices: Vec<LimitNotice>,
    /// Per-store failures.
    pub failures: Vec<StoreFailure>,
}

/// Scans all stores for counters that reached their plan limit.
///
/// The notices are handed to the notification system by the caller; this
/// task only collects and logs them.
#[derive(Clone, Debug)]
pub struct LimitCheck<S> {
    usage: S,
}

impl<S: UsageStore> LimitCheck<S> {
    /// Creates a new limit check on top of a usage store handle.
    pub fn new(usage: S) -> Self {
        Self { usage }
    }

    /// Checks every store's counters against its current plan limits.
    pub async fn check_all(&self) -> Result<CheckOutcome, UsageStoreError> {
        let rows = self.usage.scan().await?;

        let mut outcome = CheckOutcome::default();
        for row in rows {
            let limits = match row.plan_tier.limits() {
                Ok(limits) => limits,
                Err(error) => {
                    desk_log::warn!(
                        "skipping limit check for store {}: {}",
                        row.store_id,
                        LogError(&error)
                    );
                    outcome.failures.push(StoreFailure::new(row.store_id, &error));
                    continue;
                }
            };

            for kind in ResourceKind::ALL {
                let check =
                    QuotaCheck::new(kind, row.plan_tier, row.count(kind), limits.limit_for(kind));

                let Some(limit) = check.limit else {
                    continue;
                };

                if check.allowed {
                    continue;
                }

                desk_log::warn!(
                    "store {} reached its limit of {limit} {}",
                    row.store_id,
                    kind.plural()
                );
                outcome.notices.push(LimitNotice {
                    store_id: row.store_id,
                    kind,
                    current: check.current,
                    limit,
                    message: check.message,
                });
            }
        }

        Ok(outcome)
    }
}
