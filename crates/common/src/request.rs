//! The inbound registration request.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Input to one registration attempt.
///
/// Immutable once received. The password is accepted for the identity system
/// but never serialized back out, so it cannot leak into transformation
/// models or logs.
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationRequest {
    pub brand_name: String,
    #[serde(default)]
    pub post_code: String,
    #[serde(default)]
    pub rewards_opt_in: bool,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
    pub email: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    #[serde(default, skip_serializing)]
    pub password: Option<String>,
}

impl RegistrationRequest {
    /// Builds a request with the mandatory fields; everything else defaults.
    pub fn new(brand_name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            brand_name: brand_name.into(),
            post_code: String::new(),
            rewards_opt_in: false,
            timestamp: Utc::now(),
            email: email.into(),
            first_name: String::new(),
            last_name: String::new(),
            title: None,
            phone_number: None,
            password: None,
        }
    }
}

impl std::fmt::Debug for RegistrationRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistrationRequest")
            .field("brand_name", &self.brand_name)
            .field("post_code", &self.post_code)
            .field("rewards_opt_in", &self.rewards_opt_in)
            .field("timestamp", &self.timestamp)
            .field("email", &self.email)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .finish_non_exhaustive()
    }
}
