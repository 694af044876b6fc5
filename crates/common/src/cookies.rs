//! Identity-system session cookies handed back to the caller.

use serde::{Deserialize, Serialize};

/// Value used for every cookie field when the identity system does not take
/// part in registration, and for absent customer ids in responses.
pub const PLACEHOLDER: &str = "-";

/// Session cookies issued by the identity system on user creation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CookieBundle {
    /// Session token; also used as the bearer for follow-up identity calls.
    #[serde(default)]
    pub user_token: String,
    #[serde(default)]
    pub lat_cookie: String,
    #[serde(default)]
    pub lt_cookie: String,
}

impl CookieBundle {
    /// A bundle with every field set to [`PLACEHOLDER`].
    pub fn placeholder() -> Self {
        Self {
            user_token: PLACEHOLDER.to_string(),
            lat_cookie: PLACEHOLDER.to_string(),
            lt_cookie: PLACEHOLDER.to_string(),
        }
    }

    /// Returns true if every field holds the placeholder value.
    pub fn is_placeholder(&self) -> bool {
        [&self.user_token, &self.lat_cookie, &self.lt_cookie]
            .iter()
            .all(|v| v.as_str() == PLACEHOLDER)
    }
}
