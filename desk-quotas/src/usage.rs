use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use desk_common::StoreId;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::plan::PlanTier;

/// A kind of resource counted against plan limits.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    /// A support ticket, counted per calendar month.
    Ticket,
    /// A ticket type, counted while it exists.
    TicketType,
    /// A custom ticket status, counted while it exists.
    CustomStatus,
    /// An admin user, counted while it exists.
    Admin,
}

impl ResourceKind {
    /// All resource kinds, in catalog order.
    pub const ALL: [Self; 4] = [Self::Ticket, Self::TicketType, Self::CustomStatus, Self::Admin];

    /// Returns the canonical name of this kind.
    pub fn name(self) -> &'static str {
        match self {
            Self::Ticket => "ticket",
            Self::TicketType => "ticket_type",
            Self::CustomStatus => "custom_status",
            Self::Admin => "admin",
        }
    }

    /// Human readable plural used in quota messages.
    pub fn plural(self) -> &'static str {
        match self {
            Self::Ticket => "tickets",
            Self::TicketType => "ticket types",
            Self::CustomStatus => "custom statuses",
            Self::Admin => "admin users",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The persisted usage counters of a single store.
///
/// One row exists per store, created when the store is provisioned. The
/// monthly ticket counter is incremented by [`QuotaGuard`](crate::QuotaGuard)
/// and zeroed by the usage reset task; the remaining counters track
/// currently existing resources.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct StoreUsage {
    /// The store this row belongs to.
    pub store_id: StoreId,
    /// The store's current plan tier.
    ///
    /// Limits are always looked up live against this field, so a plan
    /// change takes effect without any counter migration.
    pub plan_tier: PlanTier,
    /// Tickets created since the last monthly reset.
    pub monthly_ticket_count: u64,
    /// The next scheduled reset of the monthly ticket counter.
    pub ticket_count_reset_at: DateTime<Utc>,
    /// Currently existing ticket types.
    pub ticket_type_count: u64,
    /// Currently existing custom statuses.
    pub custom_status_count: u64,
    /// Currently existing admin users.
    pub admin_count: u64,
}

impl StoreUsage {
    /// Returns the current counter value for the given resource kind.
    pub fn count(&self, kind: ResourceKind) -> u64 {
        match kind {
            ResourceKind::Ticket => self.monthly_ticket_count,
            ResourceKind::TicketType => self.ticket_type_count,
            ResourceKind::CustomStatus => self.custom_status_count,
            ResourceKind::Admin => self.admin_count,
        }
    }
}

/// An error returned by a [`UsageStore`].
///
/// Both variants are transient; callers may retry the operation. A failure
/// is never silently treated as an allow or deny decision.
#[derive(Debug, Error)]
pub enum UsageStoreError {
    /// The backing store could not be reached.
    #[error("usage store unavailable")]
    Unavailable(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// The backing store did not answer within its deadline.
    #[error("usage store timed out")]
    Timeout,
}

/// Persistence contract for per-store usage counters.
///
/// Implemented by the persistence engine. All counter mutations must be
/// atomic on the store side; a read-modify-write cycle at the caller loses
/// updates under concurrent creations and violates the contract.
#[async_trait]
pub trait UsageStore: Send + Sync {
    /// Fetches the usage row of a store.
    ///
    /// Returns `None` if no row exists for the store.
    async fn get_usage(&self, store_id: StoreId) -> Result<Option<StoreUsage>, UsageStoreError>;

    /// Atomically increments the counter for `kind` and returns the new
    /// value.
    async fn increment(
        &self,
        store_id: StoreId,
        kind: ResourceKind,
    ) -> Result<u64, UsageStoreError>;

    /// Atomically decrements the counter for `kind`, saturating at zero,
    /// and returns the new value.
    ///
    /// Used to refund an increment when the resource creation it accounted
    /// for is rolled back.
    async fn decrement(
        &self,
        store_id: StoreId,
        kind: ResourceKind,
    ) -> Result<u64, UsageStoreError>;

    /// Returns all usage rows whose ticket counter reset is due at `now`.
    async fn due_for_reset(&self, now: DateTime<Utc>)
    -> Result<Vec<StoreUsage>, UsageStoreError>;

    /// Zeroes the monthly ticket counter and advances the reset date to
    /// `next_reset_at`, but only if the stored reset date is still due at
    /// `due_at`.
    ///
    /// The condition must be evaluated atomically with the update. Returns
    /// whether the reset was applied; `false` means another run already
    /// advanced the reset date.
    async fn reset_monthly_tickets(
        &self,
        store_id: StoreId,
        due_at: DateTime<Utc>,
        next_reset_at: DateTime<Utc>,
    ) -> Result<bool, UsageStoreError>;

    /// Returns all usage rows, for batch maintenance scans.
    async fn scan(&self) -> Result<Vec<StoreUsage>, UsageStoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_kind_names() {
        for kind in ResourceKind::ALL {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{}\"", kind.name()));
        }
    }

    #[test]
    fn test_usage_row_roundtrip() {
        let usage = StoreUsage {
            store_id: StoreId::new(17),
            plan_tier: PlanTier::Team,
            monthly_ticket_count: 3,
            ticket_count_reset_at: "2024-07-01T00:00:00Z".parse().unwrap(),
            ticket_type_count: 2,
            custom_status_count: 0,
            admin_count: 1,
        };

        let json = serde_json::to_string(&usage).unwrap();
        let back: StoreUsage = serde_json::from_str(&json).unwrap();
        assert_eq!(usage, back);

        assert_eq!(usage.count(ResourceKind::Ticket), 3);
        assert_eq!(usage.count(ResourceKind::Admin), 1);
    }
}
