use dmarq_application::{AnalyticsService, ReportService, SavedFilterService, UserService};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub report_service: ReportService,
    pub analytics_service: AnalyticsService,
    pub saved_filter_service: SavedFilterService,
    pub user_service: UserService,
    pub frontend_url: String,
}
