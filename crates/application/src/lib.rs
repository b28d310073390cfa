//! Application services and ports for the report query engine.

#![forbid(unsafe_code)]

mod access_policy;
mod alert_service;
mod analytics_service;
mod report_query;
mod report_service;
mod saved_filter_service;
mod user_service;

pub use access_policy::{
    AccessGrantRepository, AccessPolicy, AccessScope, AccessibleDomain,
};
pub use alert_service::{AlertEvaluation, AlertRuleRepository, AlertService};
pub use analytics_service::{
    AnalyticsRepository, AnalyticsService, DateRange, DomainHealth, DomainVolumeStat,
    HealthLevel, ThreatSource, ThreatSourceRow, TrendPoint, VolumeTotals,
};
pub use report_query::{
    AggregatePredicate, DomainConstraint, QueryPlan, ReportSelection, RowPredicate, SortDirection,
    SortField, compile,
};
pub use report_service::{
    ReportPage, ReportQueryExecutor, ReportRow, ReportService,
};
pub use saved_filter_service::{SavedFilterRepository, SavedFilterService};
pub use user_service::{PasswordHasher, UserAccount, UserRepository, UserService};
