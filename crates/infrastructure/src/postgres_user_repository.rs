use std::str::FromStr;

use async_trait::async_trait;
use dmarq_application::{UserAccount, UserRepository};
use dmarq_core::{AppError, AppResult, Role};
use sqlx::{FromRow, PgPool};

/// PostgreSQL-backed repository for account lookups.
#[derive(Clone)]
pub struct PostgresUserRepository {
    pool: PgPool,
}

impl PostgresUserRepository {
    /// Creates a repository with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct UserRow {
    subject: String,
    display_name: String,
    email: String,
    password_hash: String,
    role: String,
}

fn account_from_row(row: UserRow) -> AppResult<UserAccount> {
    let role = Role::from_str(row.role.as_str()).map_err(|error| {
        AppError::Internal(format!(
            "failed to decode role for subject '{}': {error}",
            row.subject
        ))
    })?;

    Ok(UserAccount {
        subject: row.subject,
        display_name: row.display_name,
        email: row.email,
        password_hash: row.password_hash,
        role,
    })
}

#[async_trait]
impl UserRepository for PostgresUserRepository {
    async fn find_by_email(&self, email: &str) -> AppResult<Option<UserAccount>> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT subject, display_name, email, password_hash, role
            FROM users
            WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to load user by email: {error}")))?;

        row.map(account_from_row).transpose()
    }

    async fn find_by_subject(&self, subject: &str) -> AppResult<Option<UserAccount>> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT subject, display_name, email, password_hash, role
            FROM users
            WHERE subject = $1
            "#,
        )
        .bind(subject)
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!("failed to load user by subject: {error}"))
        })?;

        row.map(account_from_row).transpose()
    }

    async fn insert(&self, account: UserAccount) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO users (subject, display_name, email, password_hash, role)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(account.subject)
        .bind(account.display_name)
        .bind(account.email)
        .bind(account.password_hash)
        .bind(account.role.as_str())
        .execute(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to insert user: {error}")))?;

        Ok(())
    }
}
