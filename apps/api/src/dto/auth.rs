use dmarq_core::Principal;
use serde::{Deserialize, Serialize};

/// Incoming login payload.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// API representation of the signed-in principal.
#[derive(Debug, Serialize)]
pub struct PrincipalResponse {
    pub subject: String,
    pub display_name: String,
    pub email: Option<String>,
    pub role: String,
}

impl From<Principal> for PrincipalResponse {
    fn from(value: Principal) -> Self {
        Self {
            subject: value.subject().to_owned(),
            display_name: value.display_name().to_owned(),
            email: value.email().map(str::to_owned),
            role: value.role().as_str().to_owned(),
        }
    }
}
