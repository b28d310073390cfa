use std::str::FromStr;

use dmarq_core::{AppError, Role};
use serde::{Deserialize, Serialize};

/// Permissions enforced by application policy checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    /// Allows reading aggregate report pages.
    ReportsView,
    /// Allows exporting report rows without pagination.
    ReportsExport,
    /// Allows reading trend, health, and threat analytics.
    AnalyticsView,
    /// Allows managing monitored domains and groups.
    DomainsManage,
    /// Allows managing user accounts and grants.
    UsersManage,
    /// Allows managing alert rules.
    AlertsManage,
}

impl Permission {
    /// Returns a stable storage value for this permission.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ReportsView => "reports.view",
            Self::ReportsExport => "reports.export",
            Self::AnalyticsView => "analytics.view",
            Self::DomainsManage => "domains.manage",
            Self::UsersManage => "users.manage",
            Self::AlertsManage => "alerts.manage",
        }
    }

    /// Returns all known permissions.
    #[must_use]
    pub fn all() -> &'static [Self] {
        const ALL: &[Permission] = &[
            Permission::ReportsView,
            Permission::ReportsExport,
            Permission::AnalyticsView,
            Permission::DomainsManage,
            Permission::UsersManage,
            Permission::AlertsManage,
        ];

        ALL
    }
}

impl FromStr for Permission {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "reports.view" => Ok(Self::ReportsView),
            "reports.export" => Ok(Self::ReportsExport),
            "analytics.view" => Ok(Self::AnalyticsView),
            "domains.manage" => Ok(Self::DomainsManage),
            "users.manage" => Ok(Self::UsersManage),
            "alerts.manage" => Ok(Self::AlertsManage),
            _ => Err(AppError::Validation(format!(
                "unknown permission value '{value}'"
            ))),
        }
    }
}

/// Returns the fixed permission set for a role.
///
/// The table is process-wide and read-only; app-admin holds every permission.
#[must_use]
pub fn permissions_for(role: Role) -> &'static [Permission] {
    match role {
        Role::AppAdmin => Permission::all(),
        Role::DomainAdmin => &[
            Permission::ReportsView,
            Permission::ReportsExport,
            Permission::AnalyticsView,
            Permission::DomainsManage,
            Permission::AlertsManage,
        ],
        Role::GroupAdmin => &[
            Permission::ReportsView,
            Permission::ReportsExport,
            Permission::AnalyticsView,
            Permission::AlertsManage,
        ],
        Role::Viewer => &[Permission::ReportsView, Permission::AnalyticsView],
    }
}
