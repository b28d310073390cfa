use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::AppError;

/// Roles a signed-in user can hold.
///
/// The set is fixed; role-to-permission mapping lives in the domain crate and
/// is a static, process-wide table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Unrestricted administrator with every permission and every domain.
    AppAdmin,
    /// Administrator of explicitly granted domains.
    DomainAdmin,
    /// Administrator of explicitly granted domain groups.
    GroupAdmin,
    /// Read-only access to granted domains.
    Viewer,
}

impl Role {
    /// Returns a stable storage value for this role.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AppAdmin => "app_admin",
            Self::DomainAdmin => "domain_admin",
            Self::GroupAdmin => "group_admin",
            Self::Viewer => "viewer",
        }
    }
}

impl FromStr for Role {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "app_admin" => Ok(Self::AppAdmin),
            "domain_admin" => Ok(Self::DomainAdmin),
            "group_admin" => Ok(Self::GroupAdmin),
            "viewer" => Ok(Self::Viewer),
            _ => Err(AppError::Validation(format!("unknown role value '{value}'"))),
        }
    }
}

/// Signed-in user identity persisted in the authenticated session.
///
/// Engine calls always take a principal explicitly; there is no ambient
/// "current user" state anywhere below the HTTP layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    subject: String,
    display_name: String,
    email: Option<String>,
    role: Role,
}

impl Principal {
    /// Creates a principal from account data resolved at login.
    #[must_use]
    pub fn new(
        subject: impl Into<String>,
        display_name: impl Into<String>,
        email: Option<String>,
        role: Role,
    ) -> Self {
        Self {
            subject: subject.into(),
            display_name: display_name.into(),
            email,
            role,
        }
    }

    /// Returns the stable subject identifier.
    #[must_use]
    pub fn subject(&self) -> &str {
        self.subject.as_str()
    }

    /// Returns the display name for the current user.
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.display_name.as_str()
    }

    /// Returns the email, if the account has one.
    #[must_use]
    pub fn email(&self) -> Option<&str> {
        self.email.as_deref()
    }

    /// Returns the role resolved at login.
    #[must_use]
    pub fn role(&self) -> Role {
        self.role
    }
}
