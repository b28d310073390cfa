mod analytics;
mod auth;
mod filters;
mod reports;

pub use analytics::{DomainHealthResponse, ThreatSourceResponse, TrendPointResponse};
pub use auth::{LoginRequest, PrincipalResponse};
pub use filters::{SaveFilterRequest, SavedFilterResponse};
pub use reports::{PaginationMeta, ReportPageResponse, ReportRowResponse};
