//! Dmarq alert evaluation worker.
//!
//! Polls enabled alert rules on an interval and evaluates each one as its
//! owner through the scoped analytics engine. Breaches are logged; delivering
//! notifications is a separate collaborator.

#![forbid(unsafe_code)]

use std::env;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dmarq_application::{
    AccessPolicy, AlertService, AnalyticsService, UserService,
};
use dmarq_core::{AppError, AppResult};
use dmarq_infrastructure::{
    Argon2PasswordHasher, PostgresAccessGrantRepository, PostgresAlertRuleRepository,
    PostgresAnalyticsRepository, PostgresUserRepository,
};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone)]
struct WorkerConfig {
    database_url: String,
    poll_interval_seconds: u64,
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = WorkerConfig::load()?;
    let pool = connect_pool(config.database_url.as_str()).await?;
    let alert_service = build_alert_service(pool);

    info!(
        poll_interval_seconds = config.poll_interval_seconds,
        "dmarq-worker started"
    );

    loop {
        match alert_service.evaluate_enabled_rules(Utc::now()).await {
            Ok(evaluations) => {
                let breached = evaluations.iter().filter(|e| e.breached).count();
                info!(
                    evaluated = evaluations.len(),
                    breached, "alert rules evaluated"
                );

                for evaluation in evaluations.iter().filter(|e| e.breached) {
                    warn!(
                        rule = %evaluation.rule.name().as_str(),
                        owner = %evaluation.rule.owner_subject().as_str(),
                        metric = %evaluation.rule.metric().as_str(),
                        value = evaluation.value.unwrap_or_default(),
                        threshold = evaluation.rule.threshold(),
                        "alert rule breached"
                    );
                }
            }
            Err(error) => {
                warn!(error = %error, "alert evaluation pass failed");
            }
        }

        tokio::time::sleep(Duration::from_secs(config.poll_interval_seconds)).await;
    }
}

async fn connect_pool(database_url: &str) -> AppResult<PgPool> {
    PgPoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await
        .map_err(|error| AppError::Internal(format!("failed to connect to database: {error}")))
}

fn build_alert_service(pool: PgPool) -> AlertService {
    let access_policy = AccessPolicy::new(Arc::new(PostgresAccessGrantRepository::new(
        pool.clone(),
    )));
    let analytics_service = AnalyticsService::new(
        access_policy,
        Arc::new(PostgresAnalyticsRepository::new(pool.clone())),
    );
    let user_service = UserService::new(
        Arc::new(PostgresUserRepository::new(pool.clone())),
        Arc::new(Argon2PasswordHasher::new()),
    );

    AlertService::new(
        Arc::new(PostgresAlertRuleRepository::new(pool)),
        user_service,
        analytics_service,
    )
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}

fn required_env(name: &str) -> AppResult<String> {
    env::var(name).map_err(|_| AppError::Validation(format!("{name} is required")))
}

fn parse_env_u64(name: &str, default: u64) -> AppResult<u64> {
    match env::var(name) {
        Ok(value) => value.parse::<u64>().map_err(|error| {
            AppError::Validation(format!("invalid {name} value '{value}': {error}"))
        }),
        Err(_) => Ok(default),
    }
}

impl WorkerConfig {
    fn load() -> AppResult<Self> {
        let database_url = required_env("DATABASE_URL")?;
        let poll_interval_seconds = parse_env_u64("WORKER_POLL_INTERVAL_SECONDS", 300)?;

        if poll_interval_seconds == 0 {
            return Err(AppError::Validation(
                "WORKER_POLL_INTERVAL_SECONDS must be greater than zero".to_owned(),
            ));
        }

        Ok(Self {
            database_url,
            poll_interval_seconds,
        })
    }
}
