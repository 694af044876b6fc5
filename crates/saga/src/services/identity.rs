//! Identity ("single profile") port: user lifecycle, addresses and memberships.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use common::{CookieBundle, RegistrationRequest};
use serde_json::{Value, json};

use crate::error::SagaError;

/// Parameters for an identity-system create-user call.
#[derive(Debug, Clone, Copy)]
pub struct NewIdentityUser<'a> {
    pub request: &'a RegistrationRequest,
    pub is_third_party: bool,
    pub brand: &'a str,
    /// Classification name as reported by the CRM ("New", "Guest", "Manual").
    pub user_type: &'a str,
    /// CRM last name; empty unless the user is a manual registration.
    pub last_name: &'a str,
    /// CRM salutation; empty unless the user is a manual registration.
    pub title: &'a str,
}

/// Result of a successful identity-system user creation.
#[derive(Debug, Clone)]
pub struct CreatedIdentityUser {
    /// Identity-system id ("old customer id").
    pub profile_id: String,
    pub session_token: String,
    /// The response's cookie section, undecoded; see [`Self::cookie_bundle`].
    pub cookies: Value,
    /// Location value surfaced in the registration response.
    pub location: Option<String>,
    /// The raw create-user response.
    pub raw: Value,
}

impl CreatedIdentityUser {
    /// Decodes the session cookies. An absent section yields empty cookies.
    ///
    /// The user already exists remotely when this runs, so a decode failure
    /// must be handled where it can still be compensated.
    pub fn cookie_bundle(&self) -> Result<CookieBundle, SagaError> {
        if self.cookies.is_null() {
            return Ok(CookieBundle::default());
        }
        serde_json::from_value(self.cookies.clone())
            .map_err(|e| SagaError::malformed("create-user", format!("cookies: {e}")))
    }
}

/// Trait for identity-system operations.
#[async_trait]
pub trait IdentityService: Send + Sync {
    /// Creates the user. `Err(SagaError::Identity(description))` on rejection.
    async fn create_user(&self, user: NewIdentityUser<'_>)
    -> Result<CreatedIdentityUser, SagaError>;

    /// Fetches the full profile of the user owning `session_token`.
    async fn get_profile(&self, session_token: &str, brand: &str) -> Result<Value, SagaError>;

    /// Deletes a user; used as the saga's compensating action.
    async fn delete_user(
        &self,
        profile_id: &str,
        session_token: &str,
        brand: &str,
    ) -> Result<(), SagaError>;

    /// Attaches a provisioning address to the user.
    async fn create_address(
        &self,
        profile_id: &str,
        session_token: &str,
        brand: &str,
        post_code: &str,
    ) -> Result<(), SagaError>;

    /// Enrols the user in the brand's membership programme.
    async fn create_membership(
        &self,
        profile_id: &str,
        session_token: &str,
        brand: &str,
        rewards_opt_in: bool,
    ) -> Result<(), SagaError>;
}

#[derive(Debug, Default)]
struct InMemoryIdentityState {
    users: HashMap<String, String>,
    next_id: u32,
    create_calls: usize,
    get_profile_calls: usize,
    deleted: Vec<(String, String)>,
    addresses: Vec<(String, String)>,
    memberships: Vec<(String, bool)>,
    user_types: Vec<String>,
    location: Option<String>,
    create_failure: Option<String>,
    fail_on_get_profile: bool,
    panic_on_get_profile: bool,
    fail_on_delete: bool,
    malformed_cookies: bool,
}

/// In-memory identity system for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryIdentityService {
    state: Arc<RwLock<InMemoryIdentityState>>,
}

impl InMemoryIdentityService {
    /// Creates a new in-memory identity system.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes create-user fail with the given error description.
    pub fn set_create_failure(&self, description: impl Into<String>) {
        self.state.write().unwrap().create_failure = Some(description.into());
    }

    pub fn set_fail_on_get_profile(&self, fail: bool) {
        self.state.write().unwrap().fail_on_get_profile = fail;
    }

    /// Makes get-profile panic instead of answering.
    pub fn set_panic_on_get_profile(&self, panic: bool) {
        self.state.write().unwrap().panic_on_get_profile = panic;
    }

    pub fn set_fail_on_delete(&self, fail: bool) {
        self.state.write().unwrap().fail_on_delete = fail;
    }

    /// Makes create-user succeed with a cookie section that cannot be decoded.
    pub fn set_malformed_cookies(&self, malformed: bool) {
        self.state.write().unwrap().malformed_cookies = malformed;
    }

    /// Location value returned by subsequent create-user calls.
    pub fn set_location(&self, location: impl Into<String>) {
        self.state.write().unwrap().location = Some(location.into());
    }

    pub fn create_count(&self) -> usize {
        self.state.read().unwrap().create_calls
    }

    /// Number of calls of any kind received.
    pub fn total_calls(&self) -> usize {
        let state = self.state.read().unwrap();
        state.create_calls
            + state.get_profile_calls
            + state.deleted.len()
            + state.addresses.len()
            + state.memberships.len()
    }

    /// Returns the number of users that still exist.
    pub fn user_count(&self) -> usize {
        self.state.read().unwrap().users.len()
    }

    /// `(profile_id, session_token)` pairs received by delete-user, in order.
    pub fn deleted_users(&self) -> Vec<(String, String)> {
        self.state.read().unwrap().deleted.clone()
    }

    /// `(profile_id, post_code)` pairs received by create-address.
    pub fn addresses(&self) -> Vec<(String, String)> {
        self.state.read().unwrap().addresses.clone()
    }

    /// `(profile_id, rewards_opt_in)` pairs received by create-membership.
    pub fn memberships(&self) -> Vec<(String, bool)> {
        self.state.read().unwrap().memberships.clone()
    }

    /// User types passed to create-user, in order.
    pub fn user_types(&self) -> Vec<String> {
        self.state.read().unwrap().user_types.clone()
    }
}

#[async_trait]
impl IdentityService for InMemoryIdentityService {
    async fn create_user(
        &self,
        user: NewIdentityUser<'_>,
    ) -> Result<CreatedIdentityUser, SagaError> {
        let mut state = self.state.write().unwrap();
        state.create_calls += 1;
        state.user_types.push(user.user_type.to_string());

        if let Some(description) = state.create_failure.clone() {
            return Err(SagaError::Identity(description));
        }

        state.next_id += 1;
        let profile_id = format!("SP-{:04}", state.next_id);
        let session_token = format!("TOKEN-{:04}", state.next_id);
        state
            .users
            .insert(profile_id.clone(), session_token.clone());

        let cookies = if state.malformed_cookies {
            json!({ "userToken": 42 })
        } else {
            let bundle = CookieBundle {
                user_token: session_token.clone(),
                lat_cookie: format!("LAT-{:04}", state.next_id),
                lt_cookie: format!("LT-{:04}", state.next_id),
            };
            json!(bundle)
        };
        let raw = json!({
            "status": "SUCCESS",
            "data": { "profileId": profile_id, "email": user.request.email },
            "cookies": cookies,
            "location": state.location,
        });

        Ok(CreatedIdentityUser {
            profile_id,
            session_token,
            cookies,
            location: state.location.clone(),
            raw,
        })
    }

    async fn get_profile(&self, session_token: &str, brand: &str) -> Result<Value, SagaError> {
        let panic = self.state.read().unwrap().panic_on_get_profile;
        if panic {
            panic!("identity get-profile exploded");
        }

        let mut state = self.state.write().unwrap();
        state.get_profile_calls += 1;

        if state.fail_on_get_profile {
            return Err(SagaError::Identity("Profile unavailable".to_string()));
        }

        let profile_id = state
            .users
            .iter()
            .find(|(_, token)| token.as_str() == session_token)
            .map(|(id, _)| id.clone())
            .ok_or_else(|| SagaError::Identity("Unknown session".to_string()))?;

        Ok(json!({ "profileId": profile_id, "brand": brand }))
    }

    async fn delete_user(
        &self,
        profile_id: &str,
        session_token: &str,
        _brand: &str,
    ) -> Result<(), SagaError> {
        let mut state = self.state.write().unwrap();
        state
            .deleted
            .push((profile_id.to_string(), session_token.to_string()));

        if state.fail_on_delete {
            return Err(SagaError::Identity("Delete rejected".to_string()));
        }

        state.users.remove(profile_id);
        Ok(())
    }

    async fn create_address(
        &self,
        profile_id: &str,
        _session_token: &str,
        _brand: &str,
        post_code: &str,
    ) -> Result<(), SagaError> {
        let mut state = self.state.write().unwrap();
        state
            .addresses
            .push((profile_id.to_string(), post_code.to_string()));
        Ok(())
    }

    async fn create_membership(
        &self,
        profile_id: &str,
        _session_token: &str,
        _brand: &str,
        rewards_opt_in: bool,
    ) -> Result<(), SagaError> {
        let mut state = self.state.write().unwrap();
        state
            .memberships
            .push((profile_id.to_string(), rewards_opt_in));
        Ok(())
    }
}
