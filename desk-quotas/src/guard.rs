use desk_common::StoreId;
use serde::Serialize;
use thiserror::Error;

use crate::plan::{PlanTier, UnknownPlanError};
use crate::usage::{ResourceKind, UsageStore, UsageStoreError};

/// An error returned by [`QuotaGuard`] operations.
#[derive(Debug, Error)]
pub enum QuotaError {
    /// The store's persisted plan tier is not in the catalog.
    #[error(transparent)]
    UnknownPlan(#[from] UnknownPlanError),

    /// No usage row exists for the store.
    ///
    /// Usage rows are seeded when a store is provisioned, so a missing row
    /// indicates a provisioning bug upstream. Not retryable.
    #[error("no usage row for store {0}")]
    StoreNotFound(StoreId),

    /// A concurrent creation raced the counter past the limit.
    ///
    /// The increment has been refunded. The caller must undo or invalidate
    /// the resource it just persisted and report the quota as exceeded.
    #[error("concurrent creations exceeded the limit of {limit} {}", .kind.plural())]
    ConcurrentLimitExceeded {
        /// The resource kind whose limit was hit.
        kind: ResourceKind,
        /// The plan limit in effect.
        limit: u64,
    },

    /// The usage backend failed; the operation may be retried.
    #[error("usage backend error")]
    Backend(#[from] UsageStoreError),
}

/// The result of a quota check.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct QuotaCheck {
    /// Whether the store may create another resource of this kind.
    pub allowed: bool,
    /// The resource kind that was checked.
    pub kind: ResourceKind,
    /// The current counter value.
    pub current: u64,
    /// The plan limit in effect. `None` is unbounded.
    pub limit: Option<u64>,
    /// Human readable notice naming the kind, current count and limit.
    ///
    /// Callers display this verbatim to the store owner.
    pub message: String,
}

impl QuotaCheck {
    /// Creates a quota check result from a counter value and its limit.
    pub fn new(kind: ResourceKind, tier: PlanTier, current: u64, limit: Option<u64>) -> Self {
        let (allowed, message) = match limit {
            None => (
                true,
                format!("{} are not limited on the {tier} plan", kind.plural()),
            ),
            Some(limit) if current < limit => (
                true,
                format!("{current} of {limit} {} used on the {tier} plan", kind.plural()),
            ),
            Some(limit) => (
                false,
                format!(
                    "limit reached: {current} of {limit} {} used on the {tier} plan",
                    kind.plural()
                ),
            ),
        };

        Self {
            allowed,
            kind,
            current,
            limit,
            message,
        }
    }
}

/// Enforces plan quotas on resource creation.
///
/// The guard is split into a side-effect free check and a commit:
///
/// 1. [`can_create`](Self::can_create) before attempting to persist the
///    resource. This is advisory; it reads the counter without locking it.
/// 2. [`increment_usage`](Self::increment_usage) after the resource has
///    been durably created. The increment is atomic on the store side and
///    re-checked afterwards, which turns the race between two creations
///    near the limit boundary into a recoverable
///    [`QuotaError::ConcurrentLimitExceeded`] instead of a silent
///    over-admission.
#[derive(Clone, Debug)]
pub struct QuotaGuard<S> {
    usage: S,
}

impl<S: UsageStore> QuotaGuard<S> {
    /// Creates a new quota guard on top of a usage store handle.
    pub fn new(usage: S) -> Self {
        Self { usage }
    }

    /// Checks whether the store may create another resource of `kind`.
    ///
    /// Never mutates state. The limit is looked up live against the store's
    /// current plan tier, so plan changes take effect immediately.
    pub async fn can_create(
        &self,
        store_id: StoreId,
        kind: ResourceKind,
    ) -> Result<QuotaCheck, QuotaError> {
        let usage = self
            .usage
            .get_usage(store_id)
            .await?
            .ok_or(QuotaError::StoreNotFound(store_id))?;

        let limits = usage.plan_tier.limits()?;

        Ok(QuotaCheck::new(
            kind,
            usage.plan_tier,
            usage.count(kind),
            limits.limit_for(kind),
        ))
    }

    /// Commits the counter for a successfully created resource.
    ///
    /// Must be called only after the resource exists durably. Returns the
    /// new counter value. If the atomic increment pushed the counter past
    /// the limit, the increment is refunded and
    /// [`QuotaError::ConcurrentLimitExceeded`] is returned, keeping the
    /// stored counter at most at the limit.
    pub async fn increment_usage(
        &self,
        store_id: StoreId,
        kind: ResourceKind,
    ) -> Result<u64, QuotaError> {
        let usage = self
            .usage
            .get_usage(store_id)
            .await?
            .ok_or(QuotaError::StoreNotFound(store_id))?;

        let limits = usage.plan_tier.limits()?;
        let limit = limits.limit_for(kind);

        let new_count = self.usage.increment(store_id, kind).await?;

        if let Some(limit) = limit
            && new_count > limit
        {
            self.usage.decrement(store_id, kind).await?;
            return Err(QuotaError::ConcurrentLimitExceeded { kind, limit });
        }

        Ok(new_count)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use similar_asserts::assert_eq;

    use super::*;
    use crate::usage::StoreUsage;

    #[derive(Clone, Default)]
    struct MemoryUsageStore {
        rows: Arc<Mutex<HashMap<StoreId, StoreUsage>>>,
    }

    impl MemoryUsageStore {
        fn insert(&self, usage: StoreUsage) {
            self.rows.lock().unwrap().insert(usage.store_id, usage);
        }

        fn set_tier(&self, store_id: StoreId, tier: PlanTier) {
            let mut rows = self.rows.lock().unwrap();
            rows.get_mut(&store_id).unwrap().plan_tier = tier;
        }

        fn count(&self, store_id: StoreId, kind: ResourceKind) -> u64 {
            self.rows.lock().unwrap()[&store_id].count(kind)
        }
    }

    #[async_trait]
    impl UsageStore for MemoryUsageStore {
        async fn get_usage(
            &self,
            store_id: StoreId,
        ) -> Result<Option<StoreUsage>, UsageStoreError> {
            Ok(self.rows.lock().unwrap().get(&store_id).cloned())
        }

        async fn increment(
            &self,
            store_id: StoreId,
            kind: ResourceKind,
        ) -> Result<u64, UsageStoreError> {
            let mut rows = self.rows.lock().unwrap();
            let row = rows.get_mut(&store_id).unwrap();
            let count = match kind {
                ResourceKind::Ticket => &mut row.monthly_ticket_count,
                ResourceKind::TicketType => &mut row.ticket_type_count,
                ResourceKind::CustomStatus => &mut row.custom_status_count,
                ResourceKind::Admin => &mut row.admin_count,
            };
            *count += 1;
            Ok(*count)
        }

        async fn decrement(
            &self,
            store_id: StoreId,
            kind: ResourceKind,
        ) -> Result<u64, UsageStoreError> {
            let mut rows = self.rows.lock().unwrap();
            let row = rows.get_mut(&store_id).unwrap();
            let count = match kind {
                ResourceKind::Ticket => &mut row.monthly_ticket_count,
                ResourceKind::TicketType => &mut row.ticket_type_count,
                ResourceKind::CustomStatus => &mut row.custom_status_count,
                ResourceKind::Admin => &mut row.admin_count,
            };
            *count = count.saturating_sub(1);
            Ok(*count)
        }

        async fn due_for_reset(
            &self,
            now: DateTime<Utc>,
        ) -> Result<Vec<StoreUsage>, UsageStoreError> {
            let rows = self.rows.lock().unwrap();
            Ok(rows
                .values()
                .filter(|row| row.ticket_count_reset_at <= now)
                .cloned()
                .collect())
        }

        async fn reset_monthly_tickets(
            &self,
            store_id: StoreId,
            due_at: DateTime<Utc>,
            next_reset_at: DateTime<Utc>,
        ) -> Result<bool, UsageStoreError> {
            let mut rows = self.rows.lock().unwrap();
            let row = rows.get_mut(&store_id).unwrap();
            if row.ticket_count_reset_at > due_at {
                return Ok(false);
            }
            row.monthly_ticket_count = 0;
            row.ticket_count_reset_at = next_reset_at;
            Ok(true)
        }

        async fn scan(&self) -> Result<Vec<StoreUsage>, UsageStoreError> {
            Ok(self.rows.lock().unwrap().values().cloned().collect())
        }
    }

    fn usage_row(store_id: StoreId, tier: PlanTier) -> StoreUsage {
        StoreUsage {
            store_id,
            plan_tier: tier,
            monthly_ticket_count: 0,
            ticket_count_reset_at: "2024-08-01T00:00:00Z".parse().unwrap(),
            ticket_type_count: 0,
            custom_status_count: 0,
            admin_count: 0,
        }
    }

    #[tokio::test]
    async fn test_allows_until_limit() {
        let store = MemoryUsageStore::default();
        let id = StoreId::new(1);
        store.insert(usage_row(id, PlanTier::Free));
        let guard = QuotaGuard::new(store);

        // Free allows 2 ticket types.
        for _ in 0..2 {
            let check = guard.can_create(id, ResourceKind::TicketType).await.unwrap();
            assert!(check.allowed);
            guard.increment_usage(id, ResourceKind::TicketType).await.unwrap();
        }

        let check = guard.can_create(id, ResourceKind::TicketType).await.unwrap();
        assert!(!check.allowed);
        assert_eq!(check.current, 2);
        assert_eq!(check.limit, Some(2));
        assert_eq!(
            check.message,
            "limit reached: 2 of 2 ticket types used on the free plan"
        );
    }

    #[tokio::test]
    async fn test_unbounded_limit_always_allows() {
        let store = MemoryUsageStore::default();
        let id = StoreId::new(2);
        let mut row = usage_row(id, PlanTier::Enterprise);
        row.monthly_ticket_count = 1_000_000;
        store.insert(row);
        let guard = QuotaGuard::new(store);

        let check = guard.can_create(id, ResourceKind::Ticket).await.unwrap();
        assert!(check.allowed);
        assert_eq!(check.limit, None);
    }

    #[tokio::test]
    async fn test_missing_store() {
        let guard = QuotaGuard::new(MemoryUsageStore::default());

        let result = guard.can_create(StoreId::new(9), ResourceKind::Ticket).await;
        assert!(matches!(result, Err(QuotaError::StoreNotFound(id)) if id == StoreId::new(9)));
    }

    #[tokio::test]
    async fn test_unknown_plan_is_surfaced() {
        let store = MemoryUsageStore::default();
        let id = StoreId::new(3);
        store.insert(usage_row(id, PlanTier::Unknown));
        let guard = QuotaGuard::new(store);

        let result = guard.can_create(id, ResourceKind::Admin).await;
        assert!(matches!(result, Err(QuotaError::UnknownPlan(_))));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_concurrent_increments_never_overcount() {
        let store = MemoryUsageStore::default();
        let id = StoreId::new(4);
        store.insert(usage_row(id, PlanTier::Free));
        let guard = Arc::new(QuotaGuard::new(store.clone()));

        // Free allows 1 admin; fire 1 + 5 concurrent commits.
        let mut handles = Vec::new();
        for _ in 0..6 {
            let guard = Arc::clone(&guard);
            handles.push(tokio::spawn(async move {
                guard.increment_usage(id, ResourceKind::Admin).await
            }));
        }

        let mut successes = 0;
        let mut conflicts = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => successes += 1,
                Err(QuotaError::ConcurrentLimitExceeded { kind, limit }) => {
                    assert_eq!(kind, ResourceKind::Admin);
                    assert_eq!(limit, 1);
                    conflicts += 1;
                }
                Err(other) => panic!("unexpected error: {other}"),
            }
        }

        assert_eq!(successes, 1);
        assert_eq!(conflicts, 5);
        // The refunds keep the stored counter at the limit.
        assert_eq!(store.count(id, ResourceKind::Admin), 1);
    }

    #[tokio::test]
    async fn test_plan_upgrade_lifts_limit_without_migration() {
        let store = MemoryUsageStore::default();
        let id = StoreId::new(5);
        let mut row = usage_row(id, PlanTier::Team);
        row.ticket_type_count = 5;
        store.insert(row);
        let guard = QuotaGuard::new(store.clone());

        let check = guard.can_create(id, ResourceKind::TicketType).await.unwrap();
        assert_eq!((check.allowed, check.current, check.limit), (false, 5, Some(5)));

        store.set_tier(id, PlanTier::Business);

        let check = guard.can_create(id, ResourceKind::TicketType).await.unwrap();
        assert_eq!((check.allowed, check.current, check.limit), (true, 5, Some(20)));
    }
}
