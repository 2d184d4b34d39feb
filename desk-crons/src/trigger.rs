use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use desk_quotas::{UsageStore, UsageStoreError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::archive::{ArchiveOutcome, RetentionArchiver, TicketArchive};
use crate::check::{CheckOutcome, LimitCheck};
use crate::reset::{ResetOutcome, UsageReset};

/// Raised when a task name is not in the closed set of maintenance tasks.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Error)]
#[error("unknown maintenance task")]
pub struct ParseMaintenanceTaskError;

/// A maintenance task that can be triggered externally.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum MaintenanceTask {
    /// Reset due monthly ticket counters.
    ResetTicketCounts,
    /// Collect notices for stores at a plan limit.
    CheckLimits,
    /// Archive tickets outside their retention window.
    ArchiveOldResources,
    /// Run all of the above, in the order listed.
    RunAll,
}

impl MaintenanceTask {
    /// Returns the canonical name of this task.
    pub fn name(self) -> &'static str {
        match self {
            Self::ResetTicketCounts => "reset-ticket-counts",
            Self::CheckLimits => "check-limits",
            Self::ArchiveOldResources => "archive-old-resources",
            Self::RunAll => "run-all",
        }
    }
}

impl fmt::Display for MaintenanceTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for MaintenanceTask {
    type Err = ParseMaintenanceTaskError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "reset-ticket-counts" => Ok(Self::ResetTicketCounts),
            "check-limits" => Ok(Self::CheckLimits),
            "archive-old-resources" => Ok(Self::ArchiveOldResources),
            "run-all" => Ok(Self::RunAll),
            _ => Err(ParseMaintenanceTaskError),
        }
    }
}

/// The role of an authenticated caller.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// May trigger maintenance tasks.
    Admin,
    /// A regular support agent.
    Agent,
}

/// An authenticated caller of the administrative trigger.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Principal {
    /// Account name, used for audit logging.
    pub name: String,
    /// The caller's role.
    pub role: Role,
}

/// An error returned by [`Maintenance::run`].
#[derive(Debug, Error)]
pub enum TriggerError {
    /// No authenticated caller was supplied.
    #[error("authentication required")]
    Unauthenticated,

    /// The caller is not an administrator.
    #[error("administrator role required")]
    Forbidden,

    /// Scanning the usage store failed before any per-store work started.
    #[error("usage backend error")]
    Backend(#[from] UsageStoreError),
}

/// The result of a triggered maintenance run.
///
/// Only the outcomes of the tasks that actually ran are present.
#[derive(Debug, Serialize)]
pub struct TaskReport {
    /// The task that was triggered.
    pub task: MaintenanceTask,
    /// Outcome of the counter reset, if it ran.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reset: Option<ResetOutcome>,
    /// Outcome of the limit check, if it ran.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub check: Option<CheckOutcome>,
    /// Outcome of the archival, if it ran.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub archive: Option<ArchiveOutcome>,
}

impl TaskReport {
    fn new(task: MaintenanceTask) -> Self {
        Self {
            task,
            reset: None,
            check: None,
            archive: None,
        }
    }
}

/// The single entry point for administrative maintenance.
///
/// Bundles all maintenance tasks behind one dispatcher so the external
/// trigger (a cron-like invoker or an administrator) only needs a task name
/// and an authenticated caller.
#[derive(Clone, Debug)]
pub struct Maintenance<S, T> {
    reset: UsageReset<S>,
    check: LimitCheck<S>,
    archive: RetentionArchiver<S, T>,
}

impl<S, T> Maintenance<S, T>
where
    S: UsageStore + Clone,
    T: TicketArchive,
{
    /// Creates the maintenance dispatcher on top of the store handles.
    pub fn new(usage: S, tickets: T) -> Self {
        Self {
            reset: UsageReset::new(usage.clone()),
            check: LimitCheck::new(usage.clone()),
            archive: RetentionArchiver::new(usage, tickets),
        }
    }

    /// Runs the given task on behalf of `caller`.
    ///
    /// Unauthenticated and non-administrative callers are rejected before
    /// any work starts.
    pub async fn run(
        &self,
        task: MaintenanceTask,
        caller: Option<&Principal>,
        now: DateTime<Utc>,
    ) -> Result<TaskReport, TriggerError> {
        let principal = caller.ok_or(TriggerError::Unauthenticated)?;
        if principal.role != Role::Admin {
            desk_log::warn!(
                "rejected maintenance task {task} for non-admin caller {}",
                principal.name
            );
            return Err(TriggerError::Forbidden);
        }

        desk_log::info!("maintenance task {task} triggered by {}", principal.name);

        let mut report = TaskReport::new(task);
        match task {
            MaintenanceTask::ResetTicketCounts => {
                report.reset = Some(self.reset.reset_due_stores(now).await?);
            }
            MaintenanceTask::CheckLimits => {
                report.check = Some(self.check.check_all().await?);
            }
            MaintenanceTask::ArchiveOldResources => {
                report.archive = Some(self.archive.archive_expired(now).await?);
            }
            MaintenanceTask::RunAll => {
                report.reset = Some(self.reset.reset_due_stores(now).await?);
                report.check = Some(self.check.check_all().await?);
                report.archive = Some(self.archive.archive_expired(now).await?);
            }
        }

        Ok(report)
    }
}
