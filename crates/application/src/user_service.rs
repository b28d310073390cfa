use std::sync::Arc;

use async_trait::async_trait;
use dmarq_core::{AppError, AppResult, Principal, Role};

/// Stored account data backing a principal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserAccount {
    /// Stable subject identifier.
    pub subject: String,
    /// Display name.
    pub display_name: String,
    /// Login email, unique per account.
    pub email: String,
    /// Argon2id password hash.
    pub password_hash: String,
    /// Assigned role.
    pub role: Role,
}

impl UserAccount {
    /// Builds the principal this account signs in as.
    #[must_use]
    pub fn principal(&self) -> Principal {
        Principal::new(
            self.subject.as_str(),
            self.display_name.as_str(),
            Some(self.email.clone()),
            self.role,
        )
    }
}

/// Repository port for account lookups.
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Finds an account by login email.
    async fn find_by_email(&self, email: &str) -> AppResult<Option<UserAccount>>;

    /// Finds an account by subject identifier.
    async fn find_by_subject(&self, subject: &str) -> AppResult<Option<UserAccount>>;

    /// Inserts a new account.
    async fn insert(&self, account: UserAccount) -> AppResult<()>;
}

/// Password hashing port.
pub trait PasswordHasher: Send + Sync {
    /// Hashes a plaintext password for storage.
    fn hash_password(&self, password: &str) -> AppResult<String>;

    /// Verifies a plaintext password against a stored hash.
    fn verify_password(&self, password: &str, hash: &str) -> AppResult<bool>;
}

/// Application service for login and principal resolution.
#[derive(Clone)]
pub struct UserService {
    repository: Arc<dyn UserRepository>,
    password_hasher: Arc<dyn PasswordHasher>,
}

impl UserService {
    /// Creates a service from a repository and hasher implementation.
    #[must_use]
    pub fn new(
        repository: Arc<dyn UserRepository>,
        password_hasher: Arc<dyn PasswordHasher>,
    ) -> Self {
        Self {
            repository,
            password_hasher,
        }
    }

    /// Authenticates a login attempt and returns the signed-in principal.
    ///
    /// Unknown emails and wrong passwords produce the same error, so the
    /// response never reveals which accounts exist.
    pub async fn login(&self, email: &str, password: &str) -> AppResult<Principal> {
        let account = self
            .repository
            .find_by_email(email.trim().to_ascii_lowercase().as_str())
            .await?
            .ok_or_else(invalid_credentials)?;

        if !self
            .password_hasher
            .verify_password(password, account.password_hash.as_str())?
        {
            return Err(invalid_credentials());
        }

        Ok(account.principal())
    }

    /// Resolves a principal for a stored subject, if the account still exists.
    ///
    /// Role and grants are re-read at resolution time; used by background
    /// evaluation, which has no session.
    pub async fn principal_for_subject(&self, subject: &str) -> AppResult<Option<Principal>> {
        Ok(self
            .repository
            .find_by_subject(subject)
            .await?
            .map(|account| account.principal()))
    }

    /// Creates an app-admin account unless the email is already registered.
    ///
    /// Used by the composition root to bootstrap a fresh installation.
    pub async fn bootstrap_admin(
        &self,
        subject: &str,
        email: &str,
        display_name: &str,
        password: &str,
    ) -> AppResult<bool> {
        let email = email.trim().to_ascii_lowercase();
        if self.repository.find_by_email(email.as_str()).await?.is_some() {
            return Ok(false);
        }

        let password_hash = self.password_hasher.hash_password(password)?;
        self.repository
            .insert(UserAccount {
                subject: subject.to_owned(),
                display_name: display_name.to_owned(),
                email,
                password_hash,
                role: Role::AppAdmin,
            })
            .await?;

        Ok(true)
    }
}

fn invalid_credentials() -> AppError {
    AppError::Unauthorized("invalid email or password".to_owned())
}
