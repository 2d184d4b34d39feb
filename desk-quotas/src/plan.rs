use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::usage::ResourceKind;

/// Raised by [`PlanTier::limits`] if the tier is not in the catalog.
///
/// This happens when a store's persisted tier was written by a newer version
/// of the catalog. The calling operation fails; quota decisions are never
/// guessed for unrecognized plans.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Error)]
#[error("plan tier is not in the catalog")]
pub struct UnknownPlanError;

/// A named subscription level.
///
/// The set of tiers is closed; persisted values outside of it deserialize as
/// [`PlanTier::Unknown`].
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanTier {
    /// The default tier for newly provisioned stores.
    Free,
    /// Small teams, bounded history.
    Team,
    /// Large limits on every resource kind.
    Business,
    /// Effectively unbounded tickets and history.
    Enterprise,
    /// Any other plan tier not known by this version of the catalog.
    #[serde(other)]
    Unknown,
}

impl PlanTier {
    /// Returns the canonical name of this tier.
    ///
    /// This name is used in user-facing quota messages and matches the
    /// serialization of the tier.
    pub fn name(self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Team => "team",
            Self::Business => "business",
            Self::Enterprise => "enterprise",
            Self::Unknown => "unknown",
        }
    }

    /// Returns the limits of this tier.
    ///
    /// Every recognized tier has a value for every limit field; `None`
    /// explicitly marks a limit as unbounded.
    pub fn limits(self) -> Result<PlanLimits, UnknownPlanError> {
        match self {
            Self::Free => Ok(PlanLimits {
                max_tickets_per_month: Some(50),
                max_ticket_types: Some(2),
                max_custom_statuses: Some(3),
                max_admins: Some(1),
                history_months: Some(3),
            }),
            Self::Team => Ok(PlanLimits {
                max_tickets_per_month: Some(500),
                max_ticket_types: Some(5),
                max_custom_statuses: Some(10),
                max_admins: Some(5),
                history_months: Some(12),
            }),
            Self::Business => Ok(PlanLimits {
                max_tickets_per_month: Some(5000),
                max_ticket_types: Some(20),
                max_custom_statuses: Some(25),
                max_admins: Some(20),
                history_months: Some(24),
            }),
            Self::Enterprise => Ok(PlanLimits {
                max_tickets_per_month: None,
                max_ticket_types: None,
                max_custom_statuses: None,
                max_admins: None,
                history_months: None,
            }),
            Self::Unknown => Err(UnknownPlanError),
        }
    }

    /// Returns the features enabled on this tier.
    pub fn features(self) -> &'static [Feature] {
        match self {
            Self::Free => &[],
            Self::Team => &[Feature::EmailTemplates],
            Self::Business | Self::Enterprise => &[
                Feature::EmailTemplates,
                Feature::CustomStatuses,
                Feature::ApiAccess,
            ],
            Self::Unknown => &[],
        }
    }

    /// Returns `true` if the feature is enabled on this tier.
    ///
    /// Unrecognized features are always disabled rather than an error, so a
    /// flag introduced by a newer catalog simply stays off here.
    pub fn has_feature(self, feature: Feature) -> bool {
        match feature {
            Feature::Unknown => false,
            known => self.features().contains(&known),
        }
    }
}

impl fmt::Display for PlanTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for PlanTier {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "free" => Self::Free,
            "team" => Self::Team,
            "business" => Self::Business,
            "enterprise" => Self::Enterprise,
            _ => Self::Unknown,
        })
    }
}

/// The resource limits of a plan tier.
///
/// `None` is the explicit unbounded sentinel; there is no implicit
/// unlimited.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PlanLimits {
    /// Tickets that may be created per calendar month.
    pub max_tickets_per_month: Option<u64>,
    /// Concurrently existing ticket types.
    pub max_ticket_types: Option<u64>,
    /// Concurrently existing custom ticket statuses.
    pub max_custom_statuses: Option<u64>,
    /// Concurrently existing admin users.
    pub max_admins: Option<u64>,
    /// Months of ticket history kept before archival. `None` keeps history
    /// forever.
    pub history_months: Option<u32>,
}

impl PlanLimits {
    /// Returns the limit applying to the given resource kind.
    pub fn limit_for(&self, kind: ResourceKind) -> Option<u64> {
        match kind {
            ResourceKind::Ticket => self.max_tickets_per_month,
            ResourceKind::TicketType => self.max_ticket_types,
            ResourceKind::CustomStatus => self.max_custom_statuses,
            ResourceKind::Admin => self.max_admins,
        }
    }
}

/// A feature flag gated by the plan tier.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Feature {
    /// Customizable notification email templates.
    EmailTemplates,
    /// User-defined ticket statuses.
    CustomStatuses,
    /// Access to the public HTTP API.
    ApiAccess,
    /// Any feature name not known by this version of the catalog.
    #[serde(other)]
    Unknown,
}
