//! Terminal registration result and its response body.

use common::{CookieBundle, PLACEHOLDER};
use serde::Serialize;

pub const SUCCESS_STATUS: &str = "SUCCESS";
pub const FAILED_STATUS: &str = "FAILED";
pub const SUCCESS_MESSAGE: &str = "Registration successful";
pub const ACCOUNT_ALREADY_EXISTS: &str = "account already exists";
pub const INTERNAL_ERROR_MESSAGE: &str = "Internal server error";

/// Status code used for every failed registration.
pub const AUTHENTICATION_ERROR_CODE: u16 = 401;

/// The saga's terminal result.
///
/// Serializes to the response body; `status_code` travels separately as the
/// HTTP status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SagaOutcome {
    #[serde(skip)]
    pub status_code: u16,
    pub message: String,
    #[serde(rename = "accountStatus")]
    pub account_status: String,
    /// Identity-system id, or [`PLACEHOLDER`] when there is none.
    #[serde(rename = "oldCustomerID")]
    pub old_customer_id: String,
    /// CRM id.
    #[serde(rename = "newCustomerID", skip_serializing_if = "Option::is_none")]
    pub new_customer_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cookies: Option<CookieBundle>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

impl SagaOutcome {
    /// A completed registration.
    pub fn success(
        new_customer_id: impl Into<String>,
        old_customer_id: &str,
        cookies: CookieBundle,
        location: Option<String>,
    ) -> Self {
        Self {
            status_code: 200,
            message: SUCCESS_MESSAGE.to_string(),
            account_status: SUCCESS_STATUS.to_string(),
            old_customer_id: placeholder_if_empty(old_customer_id),
            new_customer_id: Some(new_customer_id.into()),
            cookies: Some(cookies),
            location: location.filter(|l| !l.is_empty()),
        }
    }

    /// An already-registered user when the identity system is not in play.
    pub fn already_registered(existing_customer_id: impl Into<String>) -> Self {
        Self {
            status_code: 200,
            message: ACCOUNT_ALREADY_EXISTS.to_string(),
            account_status: SUCCESS_STATUS.to_string(),
            old_customer_id: PLACEHOLDER.to_string(),
            new_customer_id: Some(existing_customer_id.into()),
            cookies: Some(CookieBundle::placeholder()),
            location: None,
        }
    }

    /// A failed registration carrying an outward message.
    pub fn authentication_error(message: impl Into<String>) -> Self {
        Self {
            status_code: AUTHENTICATION_ERROR_CODE,
            message: message.into(),
            account_status: FAILED_STATUS.to_string(),
            old_customer_id: PLACEHOLDER.to_string(),
            new_customer_id: None,
            cookies: None,
            location: None,
        }
    }

    /// A failed registration with the generic internal-error message.
    pub fn internal_error() -> Self {
        Self::authentication_error(INTERNAL_ERROR_MESSAGE)
    }

    pub fn is_success(&self) -> bool {
        self.status_code == 200
    }
}

fn placeholder_if_empty(value: &str) -> String {
    if value.is_empty() {
        PLACEHOLDER.to_string()
    } else {
        value.to_string()
    }
}
