//! Infrastructure adapters for application ports.

#![forbid(unsafe_code)]

mod argon2_password_hasher;
mod in_memory_access_grant_repository;
mod in_memory_saved_filter_repository;
mod postgres_access_grant_repository;
mod postgres_alert_rule_repository;
mod postgres_analytics_repository;
mod postgres_report_repository;
mod postgres_saved_filter_repository;
mod postgres_user_repository;

pub use argon2_password_hasher::Argon2PasswordHasher;
pub use in_memory_access_grant_repository::InMemoryAccessGrantRepository;
pub use in_memory_saved_filter_repository::InMemorySavedFilterRepository;
pub use postgres_access_grant_repository::PostgresAccessGrantRepository;
pub use postgres_alert_rule_repository::PostgresAlertRuleRepository;
pub use postgres_analytics_repository::PostgresAnalyticsRepository;
pub use postgres_report_repository::PostgresReportRepository;
pub use postgres_saved_filter_repository::PostgresSavedFilterRepository;
pub use postgres_user_repository::PostgresUserRepository;
