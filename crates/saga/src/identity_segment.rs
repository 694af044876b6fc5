//! Identity-system sub-workflow: create the user, fetch the profile, undo on failure.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use common::{CookieBundle, RegistrationRequest};
use futures_util::FutureExt;
use serde_json::Value;

use crate::background::BackgroundTasks;
use crate::classification::UserClassification;
use crate::error::SagaError;
use crate::outcome::INTERNAL_ERROR_MESSAGE;
use crate::policy::RegistrationPolicy;
use crate::services::identity::{CreatedIdentityUser, IdentityService, NewIdentityUser};

/// What the compensating delete-user call needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RollbackTarget {
    pub profile_id: String,
    pub session_token: String,
    pub brand: String,
}

/// Outcome of the identity segment.
#[derive(Debug, Clone)]
pub struct IdentitySegmentResult {
    pub session_token: String,
    /// Identity-system id; empty when the identity system did not take part.
    pub old_customer_id: String,
    pub cookies: CookieBundle,
    /// True once a non-guest user has been created in the identity system.
    pub rollback_required: bool,
    pub is_success: bool,
    /// Outward failure message; empty on success.
    pub message: String,
    /// Profile details from get-profile, fed into the transformation model.
    pub profile: Value,
    pub location: Option<String>,
}

impl IdentitySegmentResult {
    /// Success without identity participation: placeholder cookies, nothing to undo.
    fn not_required() -> Self {
        Self {
            session_token: String::new(),
            old_customer_id: String::new(),
            cookies: CookieBundle::placeholder(),
            rollback_required: false,
            is_success: true,
            message: String::new(),
            profile: Value::Object(Default::default()),
            location: None,
        }
    }

    /// Failure before anything was created.
    fn rejected(message: String) -> Self {
        Self {
            session_token: String::new(),
            old_customer_id: String::new(),
            cookies: CookieBundle::default(),
            rollback_required: false,
            is_success: false,
            message,
            profile: Value::Null,
            location: None,
        }
    }

    fn after_create(created: &CreatedIdentityUser, rollback_required: bool) -> Self {
        Self {
            session_token: created.session_token.clone(),
            old_customer_id: created.profile_id.clone(),
            cookies: CookieBundle::default(),
            rollback_required,
            is_success: false,
            message: INTERNAL_ERROR_MESSAGE.to_string(),
            profile: Value::Null,
            location: created.location.clone(),
        }
    }

    fn succeeded(mut self, cookies: CookieBundle, profile: Value) -> Self {
        self.is_success = true;
        self.message.clear();
        self.cookies = cookies;
        self.profile = profile;
        self
    }

    /// The delete-user target, if this result obliges the caller to compensate.
    pub fn rollback_target(&self, brand: &str) -> Option<RollbackTarget> {
        (self.rollback_required && !self.old_customer_id.is_empty()).then(|| RollbackTarget {
            profile_id: self.old_customer_id.clone(),
            session_token: self.session_token.clone(),
            brand: brand.to_string(),
        })
    }
}

/// Issues the compensating delete-user call without waiting for it.
pub(crate) fn dispatch_delete<I>(identity: &Arc<I>, tasks: &BackgroundTasks, target: RollbackTarget)
where
    I: IdentityService + 'static,
{
    metrics::counter!("registration_compensations_total").increment(1);
    tracing::info!(profile_id = %target.profile_id, "rolling back identity user");

    let identity = Arc::clone(identity);
    tasks.spawn("delete_user", async move {
        identity
            .delete_user(&target.profile_id, &target.session_token, &target.brand)
            .await
    });
}

/// Runs the identity-system part of a registration.
pub struct IdentitySegment<I> {
    identity: Arc<I>,
    policy: Arc<RegistrationPolicy>,
    tasks: BackgroundTasks,
}

impl<I> IdentitySegment<I>
where
    I: IdentityService + 'static,
{
    pub fn new(identity: Arc<I>, policy: Arc<RegistrationPolicy>, tasks: BackgroundTasks) -> Self {
        Self {
            identity,
            policy,
            tasks,
        }
    }

    /// Creates the identity user and loads its profile.
    ///
    /// Never returns with a created, non-guest user left behind on failure:
    /// exactly one delete-user call is dispatched in that case.
    #[tracing::instrument(skip_all, fields(user_type = classification.user_type()))]
    pub async fn run(
        &self,
        request: &RegistrationRequest,
        is_third_party: bool,
        classification: &UserClassification,
    ) -> IdentitySegmentResult {
        if !self.policy.identity_required {
            return IdentitySegmentResult::not_required();
        }

        let brand = request.brand_name.as_str();
        let (last_name, title) = classification.manual_details();
        let new_user = NewIdentityUser {
            request,
            is_third_party,
            brand,
            user_type: classification.user_type(),
            last_name,
            title,
        };

        let created = match self.identity.create_user(new_user).await {
            Ok(created) => created,
            Err(e) => {
                tracing::info!(error = %e, "registration failed at identity create-user");
                let message = match e {
                    SagaError::Identity(description) => description,
                    _ => INTERNAL_ERROR_MESSAGE.to_string(),
                };
                return IdentitySegmentResult::rejected(message);
            }
        };

        let rollback_required = classification.requires_rollback();
        let base = IdentitySegmentResult::after_create(&created, rollback_required);

        let provisioned = AssertUnwindSafe(self.provision(request, &created, base.clone()))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(SagaError::from_panic(panic)));

        match provisioned {
            Ok(result) => result,
            Err(e) => {
                tracing::error!(error = %e, "identity segment fault");
                if let Some(target) = base.rollback_target(brand) {
                    dispatch_delete(&self.identity, &self.tasks, target);
                }
                base
            }
        }
    }

    /// Steps after a successful create: decode cookies, fetch the profile, provision an address.
    async fn provision(
        &self,
        request: &RegistrationRequest,
        created: &CreatedIdentityUser,
        base: IdentitySegmentResult,
    ) -> Result<IdentitySegmentResult, SagaError> {
        let brand = request.brand_name.as_str();
        if created.profile_id.is_empty() {
            return Err(SagaError::malformed("create-user", "missing profile id"));
        }
        if created.session_token.is_empty() {
            return Err(SagaError::malformed("create-user", "missing session token"));
        }
        let cookies = created.cookie_bundle()?;

        let profile = match self
            .identity
            .get_profile(&created.session_token, brand)
            .await
        {
            Ok(profile) => profile,
            Err(e) => match base.rollback_target(brand) {
                Some(target) => {
                    tracing::info!(error = %e, "registration failed at identity get-profile");
                    dispatch_delete(&self.identity, &self.tasks, target);
                    return Ok(base);
                }
                None => {
                    tracing::warn!(error = %e, "get-profile failed for guest user, continuing");
                    Value::Object(Default::default())
                }
            },
        };

        if self.policy.provisions_address(brand) {
            let identity = Arc::clone(&self.identity);
            let profile_id = created.profile_id.clone();
            let session_token = created.session_token.clone();
            let brand = brand.to_string();
            let post_code = request.post_code.clone();
            self.tasks.spawn("create_address", async move {
                identity
                    .create_address(&profile_id, &session_token, &brand, &post_code)
                    .await
            });
        }

        Ok(base.succeeded(cookies, profile))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::identity::InMemoryIdentityService;

    fn segment(
        identity: &InMemoryIdentityService,
        policy: RegistrationPolicy,
    ) -> (IdentitySegment<InMemoryIdentityService>, BackgroundTasks) {
        let tasks = BackgroundTasks::new();
        let segment = IdentitySegment::new(
            Arc::new(identity.clone()),
            Arc::new(policy),
            tasks.clone(),
        );
        (segment, tasks)
    }

    #[tokio::test]
    async fn test_policy_disabled_makes_no_calls() {
        let identity = InMemoryIdentityService::new();
        let (segment, _) = segment(&identity, RegistrationPolicy::default().with_identity_required(false));
        let request = RegistrationRequest::new("asda", "a@example.com");

        let result = segment.run(&request, false, &UserClassification::New).await;

        assert!(result.is_success);
        assert!(!result.rollback_required);
        assert!(result.cookies.is_placeholder());
        assert!(result.old_customer_id.is_empty());
        assert_eq!(identity.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_success_returns_ids_and_profile() {
        let identity = InMemoryIdentityService::new();
        identity.set_location("/profiles/SP-0001");
        let (segment, tasks) = segment(&identity, RegistrationPolicy::default());
        let request = RegistrationRequest::new("asda", "a@example.com");

        let result = segment.run(&request, false, &UserClassification::New).await;
        tasks.wait_idle().await;

        assert!(result.is_success);
        assert!(result.rollback_required);
        assert_eq!(result.old_customer_id, "SP-0001");
        assert_eq!(result.session_token, "TOKEN-0001");
        assert_eq!(result.profile["profileId"], "SP-0001");
        assert_eq!(result.cookies.lat_cookie, "LAT-0001");
        assert_eq!(result.location.as_deref(), Some("/profiles/SP-0001"));
        assert!(identity.addresses().is_empty());
        assert!(identity.deleted_users().is_empty());
    }

    #[tokio::test]
    async fn test_create_failure_surfaces_description_without_rollback() {
        let identity = InMemoryIdentityService::new();
        identity.set_create_failure("Password too weak");
        let (segment, tasks) = segment(&identity, RegistrationPolicy::default());
        let request = RegistrationRequest::new("asda", "a@example.com");

        let result = segment.run(&request, false, &UserClassification::New).await;
        tasks.wait_idle().await;

        assert!(!result.is_success);
        assert!(!result.rollback_required);
        assert_eq!(result.message, "Password too weak");
        assert!(identity.deleted_users().is_empty());
    }

    #[tokio::test]
    async fn test_get_profile_failure_rolls_back_once() {
        let identity = InMemoryIdentityService::new();
        identity.set_fail_on_get_profile(true);
        let (segment, tasks) = segment(&identity, RegistrationPolicy::default());
        let request = RegistrationRequest::new("asda", "a@example.com");

        let result = segment.run(&request, false, &UserClassification::New).await;
        tasks.wait_idle().await;

        assert!(!result.is_success);
        assert_eq!(result.message, INTERNAL_ERROR_MESSAGE);
        assert_eq!(
            identity.deleted_users(),
            vec![("SP-0001".to_string(), "TOKEN-0001".to_string())]
        );
    }

    #[tokio::test]
    async fn test_guest_get_profile_failure_continues_without_rollback() {
        let identity = InMemoryIdentityService::new();
        identity.set_fail_on_get_profile(true);
        let (segment, tasks) = segment(&identity, RegistrationPolicy::default());
        let request = RegistrationRequest::new("asda", "a@example.com");

        let result = segment.run(&request, false, &UserClassification::Guest).await;
        tasks.wait_idle().await;

        assert!(result.is_success);
        assert!(!result.rollback_required);
        assert!(identity.deleted_users().is_empty());
    }

    #[tokio::test]
    async fn test_panic_in_get_profile_is_contained_and_rolled_back() {
        let identity = InMemoryIdentityService::new();
        identity.set_panic_on_get_profile(true);
        let (segment, tasks) = segment(&identity, RegistrationPolicy::default());
        let request = RegistrationRequest::new("asda", "a@example.com");

        let result = segment.run(&request, false, &UserClassification::New).await;
        tasks.wait_idle().await;

        assert!(!result.is_success);
        assert_eq!(result.message, INTERNAL_ERROR_MESSAGE);
        assert_eq!(identity.deleted_users().len(), 1);
    }

    #[tokio::test]
    async fn test_undecodable_cookies_roll_back_created_user() {
        let identity = InMemoryIdentityService::new();
        identity.set_malformed_cookies(true);
        let (segment, tasks) = segment(&identity, RegistrationPolicy::default());
        let request = RegistrationRequest::new("asda", "a@example.com");

        let result = segment.run(&request, false, &UserClassification::New).await;
        tasks.wait_idle().await;

        assert!(!result.is_success);
        assert_eq!(result.message, INTERNAL_ERROR_MESSAGE);
        assert_eq!(
            identity.deleted_users(),
            vec![("SP-0001".to_string(), "TOKEN-0001".to_string())]
        );
    }

    #[tokio::test]
    async fn test_undecodable_cookies_for_guest_fail_without_rollback() {
        let identity = InMemoryIdentityService::new();
        identity.set_malformed_cookies(true);
        let (segment, tasks) = segment(&identity, RegistrationPolicy::default());
        let request = RegistrationRequest::new("asda", "a@example.com");

        let result = segment.run(&request, false, &UserClassification::Guest).await;
        tasks.wait_idle().await;

        assert!(!result.is_success);
        assert_eq!(result.message, INTERNAL_ERROR_MESSAGE);
        assert!(identity.deleted_users().is_empty());
    }

    #[tokio::test]
    async fn test_address_provisioned_for_configured_brand() {
        let identity = InMemoryIdentityService::new();
        let (segment, tasks) = segment(&identity, RegistrationPolicy::default());
        let mut request = RegistrationRequest::new("gi", "a@example.com");
        request.post_code = "LS1 1AA".to_string();

        let result = segment.run(&request, false, &UserClassification::New).await;
        tasks.wait_idle().await;

        assert!(result.is_success);
        assert_eq!(
            identity.addresses(),
            vec![("SP-0001".to_string(), "LS1 1AA".to_string())]
        );
    }

    #[tokio::test]
    async fn test_manual_details_and_user_type_reach_identity() {
        let identity = InMemoryIdentityService::new();
        let (segment, _) = segment(&identity, RegistrationPolicy::default());
        let request = RegistrationRequest::new("asda", "a@example.com");
        let manual = UserClassification::Manual {
            last_name: "Jones".to_string(),
            title: "Dr".to_string(),
        };

        segment.run(&request, false, &manual).await;
        assert_eq!(identity.user_types(), vec!["Manual".to_string()]);
    }

    #[test]
    fn test_rollback_target_requires_flag_and_id() {
        let mut result = IdentitySegmentResult::not_required();
        assert!(result.rollback_target("asda").is_none());

        result.rollback_required = true;
        assert!(result.rollback_target("asda").is_none());

        result.old_customer_id = "SP-9".to_string();
        result.session_token = "T".to_string();
        assert_eq!(
            result.rollback_target("asda"),
            Some(RollbackTarget {
                profile_id: "SP-9".to_string(),
                session_token: "T".to_string(),
                brand: "asda".to_string(),
            })
        );
    }
}
