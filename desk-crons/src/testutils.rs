//! In-memory store fakes shared by the task tests.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use desk_common::StoreId;
use desk_quotas::{PlanTier, ResourceKind, StoreUsage, UsageStore, UsageStoreError};

use crate::archive::{ArchiveError, TicketArchive};

pub(crate) fn datetime(s: &str) -> DateTime<Utc> {
    s.parse().unwrap()
}

pub(crate) fn usage_row(store_id: u64, tier: PlanTier) -> StoreUsage {
    StoreUsage {
        store_id: StoreId::new(store_id),
        plan_tier: tier,
        monthly_ticket_count: 0,
        ticket_count_reset_at: datetime("2100-01-01T00:00:00Z"),
        ticket_type_count: 0,
        custom_status_count: 0,
        admin_count: 0,
    }
}

#[derive(Clone, Default)]
pub(crate) struct MemoryUsageStore {
    rows: Arc<Mutex<HashMap<StoreId, StoreUsage>>>,
    fail_resets: Arc<Mutex<HashSet<StoreId>>>,
}

impl MemoryUsageStore {
    pub(crate) fn insert(&self, usage: StoreUsage) {
        self.rows.lock().unwrap().insert(usage.store_id, usage);
    }

    pub(crate) fn get(&self, store_id: u64) -> StoreUsage {
        self.rows.lock().unwrap()[&StoreId::new(store_id)].clone()
    }

    /// Makes counter resets fail for the given store.
    pub(crate) fn fail_reset_for(&self, store_id: u64) {
        self.fail_resets
            .lock()
            .unwrap()
            .insert(StoreId::new(store_id));
    }
}

#[async_trait]
impl UsageStore for MemoryUsageStore {
    async fn get_usage(&self, store_id: StoreId) -> Result<Option<StoreUsage>, UsageStoreError> {
        Ok(self.rows.lock().unwrap().get(&store_id).cloned())
    }

    async fn increment(
        &self,
        store_id: StoreId,
        kind: ResourceKind,
    ) -> Result<u64, UsageStoreError> {
        let mut rows = self.rows.lock().unwrap();
        let row = rows.get_mut(&store_id).unwrap();
        let count = counter(row, kind);
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
        let count = counter(row, kind);
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
        if self.fail_resets.lock().unwrap().contains(&store_id) {
            return Err(UsageStoreError::Timeout);
        }

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
        let rows = self.rows.lock().unwrap();
        let mut all: Vec<_> = rows.values().cloned().collect();
        all.sort_by_key(|row| row.store_id);
        Ok(all)
    }
}

fn counter(row: &mut StoreUsage, kind: ResourceKind) -> &mut u64 {
    match kind {
        ResourceKind::Ticket => &mut row.monthly_ticket_count,
        ResourceKind::TicketType => &mut row.ticket_type_count,
        ResourceKind::CustomStatus => &mut row.custom_status_count,
        ResourceKind::Admin => &mut row.admin_count,
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum TicketStatus {
    Open,
    Closed,
    Archived,
}

#[derive(Clone, Copy, Debug)]
pub(crate) struct Ticket {
    modified_at: DateTime<Utc>,
    status: TicketStatus,
}

#[derive(Clone, Default)]
pub(crate) struct MemoryTicketArchive {
    tickets: Arc<Mutex<HashMap<StoreId, Vec<Ticket>>>>,
    fail_stores: Arc<Mutex<HashSet<StoreId>>>,
}

impl MemoryTicketArchive {
    pub(crate) fn add(&self, store_id: u64, modified_at: DateTime<Utc>, status: TicketStatus) {
        self.tickets
            .lock()
            .unwrap()
            .entry(StoreId::new(store_id))
            .or_default()
            .push(Ticket {
                modified_at,
                status,
            });
    }

    pub(crate) fn statuses(&self, store_id: u64) -> Vec<TicketStatus> {
        self.tickets
            .lock()
            .unwrap()
            .get(&StoreId::new(store_id))
            .map(|tickets| tickets.iter().map(|ticket| ticket.status).collect())
            .unwrap_or_default()
    }

    /// Makes archival fail for the given store.
    pub(crate) fn fail_for(&self, store_id: u64) {
        self.fail_stores
            .lock()
            .unwrap()
            .insert(StoreId::new(store_id));
    }
}

#[async_trait]
impl TicketArchive for MemoryTicketArchive {
    async fn archive_tickets_before(
        &self,
        store_id: StoreId,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, ArchiveError> {
        if self.fail_stores.lock().unwrap().contains(&store_id) {
            return Err(ArchiveError::Timeout);
        }

        let mut tickets = self.tickets.lock().unwrap();
        let mut count = 0;
        for ticket in tickets.entry(store_id).or_default() {
            if ticket.modified_at < cutoff && ticket.status != TicketStatus::Archived {
                ticket.status = TicketStatus::Archived;
                count += 1;
            }
        }

        Ok(count)
    }
}
