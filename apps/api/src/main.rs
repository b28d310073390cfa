//! Dmarq API composition root.

#![forbid(unsafe_code)]

mod auth;
mod dto;
mod error;
mod handlers;
mod middleware;
mod state;

use std::env;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::sync::Arc;

use axum::Router;
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderValue, Method};
use axum::middleware::{from_fn, from_fn_with_state};
use axum::routing::{get, post};
use dmarq_application::{
    AccessPolicy, AnalyticsService, ReportService, SavedFilterService, UserService,
};
use dmarq_core::AppError;
use dmarq_infrastructure::{
    Argon2PasswordHasher, PostgresAccessGrantRepository, PostgresAnalyticsRepository,
    PostgresReportRepository, PostgresSavedFilterRepository, PostgresUserRepository,
};
use sqlx::postgres::PgPoolOptions;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tower_sessions::cookie::SameSite;
use tower_sessions::cookie::time::Duration;
use tower_sessions::{Expiry, SessionManagerLayer};
use tower_sessions_sqlx_store::PostgresStore;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    init_tracing();

    let migrate_only = env::args().nth(1).as_deref() == Some("migrate");

    let database_url = required_env("DATABASE_URL")?;
    let frontend_url =
        env::var("FRONTEND_URL").unwrap_or_else(|_| "http://localhost:3000".to_owned());
    let api_host = env::var("API_HOST").unwrap_or_else(|_| "127.0.0.1".to_owned());
    let api_port = env::var("API_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(3001);
    let cookie_secure = env::var("SESSION_COOKIE_SECURE")
        .unwrap_or_else(|_| "false".to_owned())
        .eq_ignore_ascii_case("true");

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&database_url)
        .await
        .map_err(|error| AppError::Internal(format!("failed to connect to database: {error}")))?;

    sqlx::migrate!("../../crates/infrastructure/migrations")
        .run(&pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to run migrations: {error}")))?;

    if migrate_only {
        info!("database migrations applied successfully");
        return Ok(());
    }

    let session_store = PostgresStore::new(pool.clone())
        .with_table_name("tower_sessions")
        .map_err(|error| {
            AppError::Validation(format!("invalid session table name configuration: {error}"))
        })?;
    session_store.migrate().await.map_err(|error| {
        AppError::Internal(format!("failed to initialize session store: {error}"))
    })?;

    let session_layer = SessionManagerLayer::new(session_store)
        .with_secure(cookie_secure)
        .with_same_site(SameSite::Lax)
        .with_http_only(true)
        .with_expiry(Expiry::OnInactivity(Duration::minutes(30)));

    let access_policy = AccessPolicy::new(Arc::new(PostgresAccessGrantRepository::new(
        pool.clone(),
    )));
    let report_service = ReportService::new(
        access_policy.clone(),
        Arc::new(PostgresReportRepository::new(pool.clone())),
    );
    let analytics_service = AnalyticsService::new(
        access_policy.clone(),
        Arc::new(PostgresAnalyticsRepository::new(pool.clone())),
    );
    let saved_filter_service = SavedFilterService::new(
        access_policy,
        Arc::new(PostgresSavedFilterRepository::new(pool.clone())),
    );
    let user_service = UserService::new(
        Arc::new(PostgresUserRepository::new(pool.clone())),
        Arc::new(Argon2PasswordHasher::new()),
    );

    bootstrap_admin_account(&user_service).await?;

    let app_state = AppState {
        report_service,
        analytics_service,
        saved_filter_service,
        user_service,
        frontend_url: frontend_url.clone(),
    };

    let protected_routes = Router::new()
        .route("/auth/me", get(auth::me_handler))
        .route(
            "/api/reports/query",
            post(handlers::reports::query_reports_handler),
        )
        .route(
            "/api/reports/export",
            post(handlers::reports::export_reports_handler),
        )
        .route("/api/analytics/trend", get(handlers::analytics::trend_handler))
        .route(
            "/api/analytics/health",
            get(handlers::analytics::domain_health_handler),
        )
        .route(
            "/api/analytics/threats",
            get(handlers::analytics::top_threats_handler),
        )
        .route(
            "/api/filters",
            get(handlers::filters::list_filters_handler)
                .post(handlers::filters::save_filter_handler),
        )
        .route(
            "/api/filters/{filter_id}",
            axum::routing::delete(handlers::filters::delete_filter_handler),
        )
        .route_layer(from_fn(middleware::require_auth));

    let cors_layer = CorsLayer::new()
        .allow_origin(
            HeaderValue::from_str(&frontend_url)
                .map_err(|error| AppError::Internal(format!("invalid FRONTEND_URL: {error}")))?,
        )
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE]);

    let app = Router::new()
        .route("/health", get(handlers::health::health_handler))
        .route("/auth/login", post(auth::login_handler))
        .route("/auth/logout", post(auth::logout_handler))
        .merge(protected_routes)
        .route_layer(from_fn_with_state(
            app_state.clone(),
            middleware::require_same_origin_for_mutations,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer)
        .layer(session_layer)
        .with_state(app_state);

    let host = IpAddr::from_str(&api_host)
        .map_err(|error| AppError::Internal(format!("invalid API_HOST '{api_host}': {error}")))?;
    let address = SocketAddr::from((host, api_port));

    let listener = tokio::net::TcpListener::bind(address)
        .await
        .map_err(|error| AppError::Internal(format!("failed to bind listener: {error}")))?;

    info!(%address, "dmarq-api listening");

    axum::serve(listener, app)
        .await
        .map_err(|error| AppError::Internal(format!("api server error: {error}")))
}

/// Creates the initial app-admin account when the bootstrap env vars are set.
async fn bootstrap_admin_account(user_service: &UserService) -> Result<(), AppError> {
    let (Ok(email), Ok(password)) = (
        env::var("DMARQ_ADMIN_EMAIL"),
        env::var("DMARQ_ADMIN_PASSWORD"),
    ) else {
        return Ok(());
    };

    if password.len() < 12 {
        return Err(AppError::Validation(
            "DMARQ_ADMIN_PASSWORD must be at least 12 characters".to_owned(),
        ));
    }

    let subject = uuid::Uuid::new_v4().to_string();
    let created = user_service
        .bootstrap_admin(subject.as_str(), email.as_str(), "Administrator", &password)
        .await?;

    if created {
        info!(email = %email, "bootstrap admin account created");
    }

    Ok(())
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}

fn required_env(name: &str) -> Result<String, AppError> {
    env::var(name).map_err(|_| AppError::Validation(format!("{name} is required")))
}
