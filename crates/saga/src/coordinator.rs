//! Registration saga: orchestrates the CRM and identity systems with compensation.

use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, PoisonError};

use common::{RegistrationRequest, RequestId};
use futures_util::FutureExt;

use crate::background::BackgroundTasks;
use crate::classification::UserClassification;
use crate::error::SagaError;
use crate::identity_segment::{IdentitySegment, RollbackTarget, dispatch_delete};
use crate::model::{CrmPath, transformation_model};
use crate::outcome::{ACCOUNT_ALREADY_EXISTS, INTERNAL_ERROR_MESSAGE, SagaOutcome};
use crate::policy::RegistrationPolicy;
use crate::services::crm::{CrmService, SearchResult};
use crate::services::identity::IdentityService;
use crate::services::transformation::Transformer;
use crate::state::RegistrationStage;

#[derive(Debug, Default)]
struct ProgressState {
    stage: RegistrationStage,
    rollback: Option<RollbackTarget>,
}

/// Per-request progress shared between the saga body and its safety net.
///
/// Lives outside the body's future so it survives a caught panic.
#[derive(Debug, Default)]
struct SagaProgress {
    inner: Mutex<ProgressState>,
}

impl SagaProgress {
    fn lock(&self) -> std::sync::MutexGuard<'_, ProgressState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn enter(&self, stage: RegistrationStage) {
        tracing::debug!(%stage, "registration stage");
        self.lock().stage = stage;
    }

    fn stage(&self) -> RegistrationStage {
        self.lock().stage
    }

    fn arm(&self, target: RollbackTarget) {
        self.lock().rollback = Some(target);
    }

    /// Takes the pending rollback, so it can be issued at most once.
    fn disarm(&self) -> Option<RollbackTarget> {
        self.lock().rollback.take()
    }
}

/// Orchestrates customer registration across the CRM and identity systems.
///
/// Steps run strictly in order: CRM search, classification, identity segment,
/// transformation, CRM create or update. Once a non-guest identity user
/// exists, every failure afterwards dispatches exactly one delete-user call.
pub struct RegistrationSaga<C, I, T>
where
    C: CrmService,
    I: IdentityService,
    T: Transformer,
{
    crm: C,
    identity: Arc<I>,
    transformer: T,
    policy: Arc<RegistrationPolicy>,
    segment: IdentitySegment<I>,
    tasks: BackgroundTasks,
}

impl<C, I, T> RegistrationSaga<C, I, T>
where
    C: CrmService,
    I: IdentityService + 'static,
    T: Transformer,
{
    /// Creates a new registration saga.
    pub fn new(crm: C, identity: I, transformer: T, policy: RegistrationPolicy) -> Self {
        let identity = Arc::new(identity);
        let policy = Arc::new(policy);
        let tasks = BackgroundTasks::new();
        let segment = IdentitySegment::new(Arc::clone(&identity), Arc::clone(&policy), tasks.clone());
        Self {
            crm,
            identity,
            transformer,
            policy,
            segment,
            tasks,
        }
    }

    pub fn policy(&self) -> &RegistrationPolicy {
        &self.policy
    }

    /// Handle on the fire-and-forget calls this saga dispatches.
    pub fn background_tasks(&self) -> &BackgroundTasks {
        &self.tasks
    }

    /// Registers a customer.
    ///
    /// Never fails: every exit, including caught panics, is a [`SagaOutcome`].
    #[tracing::instrument(
        skip_all,
        fields(request_id = %RequestId::new(), brand = %request.brand_name)
    )]
    pub async fn register(&self, request: &RegistrationRequest, crm_auth_token: &str) -> SagaOutcome {
        metrics::counter!("registration_attempts_total").increment(1);
        let started = std::time::Instant::now();
        tracing::info!("registration started");

        let progress = SagaProgress::default();
        let result = AssertUnwindSafe(self.run(request, crm_auth_token, &progress))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(SagaError::from_panic(panic)));

        let outcome = match result {
            Ok(outcome) => outcome,
            Err(e) => {
                let stage = progress.stage();
                tracing::error!(error = %e, %stage, "registration fault");
                if let Some(target) = progress.disarm() {
                    dispatch_delete(&self.identity, &self.tasks, target);
                }
                self.fail(&progress, INTERNAL_ERROR_MESSAGE)
            }
        };

        metrics::histogram!("registration_duration_seconds")
            .record(started.elapsed().as_secs_f64());
        outcome
    }

    async fn run(
        &self,
        request: &RegistrationRequest,
        crm_auth_token: &str,
        progress: &SagaProgress,
    ) -> Result<SagaOutcome, SagaError> {
        let brand = request.brand_name.as_str();
        let is_third_party = self.policy.is_third_party(brand);

        // 1. Search
        progress.enter(RegistrationStage::Search);
        let search = match self.crm.search_profile(request, crm_auth_token).await {
            Ok(search) => search,
            Err(e) => {
                tracing::warn!(error = %e, "registration failed at CRM search");
                return Ok(self.fail(progress, INTERNAL_ERROR_MESSAGE));
            }
        };

        // 2. Classify
        progress.enter(RegistrationStage::Classify);
        let classification = UserClassification::from_search(&search);
        if classification.is_registered() {
            return self.already_registered(&search, progress);
        }

        // 3. Identity segment
        progress.enter(RegistrationStage::IdentitySegment);
        let segment = self.segment.run(request, is_third_party, &classification).await;
        if !segment.is_success {
            return Ok(self.fail(progress, segment.message));
        }
        if let Some(target) = segment.rollback_target(brand) {
            progress.arm(target);
        }

        // 4. Transform
        progress.enter(RegistrationStage::Transform);
        let path = CrmPath::for_search(&search);
        let model = transformation_model(path, &search, request, &segment.profile, &self.policy)?;
        let payload = match self.transformer.transform(path.template(&self.policy), &model) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!(error = %e, path = path.as_str(), "transformation failed, rolling back");
                self.compensate(progress);
                return Ok(self.fail(progress, INTERNAL_ERROR_MESSAGE));
            }
        };

        // 5. CRM create or update
        let mutation = match path {
            CrmPath::Create => {
                progress.enter(RegistrationStage::CrmCreate);
                self.crm.create_profile(payload, crm_auth_token).await
            }
            CrmPath::Update => {
                progress.enter(RegistrationStage::CrmUpdate);
                self.crm.update_profile(payload, crm_auth_token).await
            }
        };
        let crm_result = match mutation {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!(error = %e, path = path.as_str(), "CRM mutation failed, rolling back");
                self.compensate(progress);
                return Ok(self.fail(progress, INTERNAL_ERROR_MESSAGE));
            }
        };

        progress.disarm();
        progress.enter(RegistrationStage::Completed);

        if self.policy.identity_required && !segment.old_customer_id.is_empty() {
            let identity = Arc::clone(&self.identity);
            let profile_id = segment.old_customer_id.clone();
            let session_token = segment.session_token.clone();
            let brand = brand.to_string();
            let opt_in = request.rewards_opt_in;
            self.tasks.spawn("create_membership", async move {
                identity
                    .create_membership(&profile_id, &session_token, &brand, opt_in)
                    .await
            });
        }

        metrics::counter!("registration_completed_total", "path" => path.as_str()).increment(1);
        tracing::info!(
            customer_id = %crm_result.customer_id,
            path = path.as_str(),
            "registration completed"
        );

        Ok(SagaOutcome::success(
            crm_result.customer_id,
            &segment.old_customer_id,
            segment.cookies,
            segment.location,
        ))
    }

    /// The already-registered exit, whose shape depends on identity participation.
    fn already_registered(
        &self,
        search: &SearchResult,
        progress: &SagaProgress,
    ) -> Result<SagaOutcome, SagaError> {
        tracing::info!("account already exists");
        if self.policy.identity_required {
            return Ok(self.fail(progress, ACCOUNT_ALREADY_EXISTS));
        }

        let existing_id = search
            .first_record()
            .and_then(|record| record.person_contact_id.clone())
            .ok_or_else(|| {
                SagaError::malformed("search-profile", "registered record has no PersonContactId")
            })?;

        metrics::counter!("registration_completed_total", "path" => "existing").increment(1);
        Ok(SagaOutcome::already_registered(existing_id))
    }

    fn compensate(&self, progress: &SagaProgress) {
        if let Some(target) = progress.disarm() {
            dispatch_delete(&self.identity, &self.tasks, target);
        }
    }

    fn fail(&self, progress: &SagaProgress, message: impl Into<String>) -> SagaOutcome {
        let stage = progress.stage();
        metrics::counter!("registration_failed_total", "stage" => stage.as_str()).increment(1);
        SagaOutcome::authentication_error(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outcome::AUTHENTICATION_ERROR_CODE;
    use crate::services::{InMemoryCrmService, InMemoryIdentityService, InMemoryTransformer};
    use serde_json::json;

    type TestSaga = RegistrationSaga<InMemoryCrmService, InMemoryIdentityService, InMemoryTransformer>;

    fn setup(
        crm: InMemoryCrmService,
        policy: RegistrationPolicy,
    ) -> (TestSaga, InMemoryCrmService, InMemoryIdentityService, InMemoryTransformer) {
        let identity = InMemoryIdentityService::new();
        let transformer = InMemoryTransformer::new();
        let saga = RegistrationSaga::new(crm.clone(), identity.clone(), transformer.clone(), policy);
        (saga, crm, identity, transformer)
    }

    fn request() -> RegistrationRequest {
        RegistrationRequest::new("asda", "a@example.com")
    }

    #[tokio::test]
    async fn test_happy_path_create() {
        let (saga, crm, identity, transformer) =
            setup(InMemoryCrmService::new(), RegistrationPolicy::default());
        crm.set_customer_id("CUST123");

        let outcome = saga.register(&request(), "crm-token").await;
        saga.background_tasks().wait_idle().await;

        assert_eq!(outcome.status_code, 200);
        assert_eq!(outcome.new_customer_id.as_deref(), Some("CUST123"));
        assert_eq!(outcome.old_customer_id, "SP-0001");
        assert_eq!(transformer.calls()[0].0, "crm_create_user.json");
        assert_eq!(crm.created_profiles().len(), 1);
        assert_eq!(identity.memberships(), vec![("SP-0001".to_string(), false)]);
        assert!(identity.deleted_users().is_empty());
    }

    #[tokio::test]
    async fn test_search_failure_makes_no_identity_calls() {
        let (saga, crm, identity, _) =
            setup(InMemoryCrmService::new(), RegistrationPolicy::default());
        crm.set_fail_on_search(true);

        let outcome = saga.register(&request(), "crm-token").await;

        assert_eq!(outcome.status_code, AUTHENTICATION_ERROR_CODE);
        assert_eq!(outcome.message, INTERNAL_ERROR_MESSAGE);
        assert_eq!(identity.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_registered_without_contact_id_is_internal_error() {
        let (saga, _, identity, _) = setup(
            InMemoryCrmService::new().with_status("Registered"),
            RegistrationPolicy::default().with_identity_required(false),
        );

        let outcome = saga.register(&request(), "crm-token").await;

        assert_eq!(outcome.message, INTERNAL_ERROR_MESSAGE);
        assert_eq!(identity.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_panic_during_crm_mutation_rolls_back_once() {
        let (saga, crm, identity, _) =
            setup(InMemoryCrmService::new(), RegistrationPolicy::default());
        crm.set_panic_on_mutation(true);

        let outcome = saga.register(&request(), "crm-token").await;
        saga.background_tasks().wait_idle().await;

        assert_eq!(outcome, SagaOutcome::internal_error());
        assert_eq!(
            identity.deleted_users(),
            vec![("SP-0001".to_string(), "TOKEN-0001".to_string())]
        );
        assert!(identity.memberships().is_empty());
    }

    #[tokio::test]
    async fn test_update_path_uses_update_template() {
        let (saga, crm, _, transformer) = setup(
            InMemoryCrmService::new().with_record(json!({
                "AccountRegistrationStatus__c": "Guest",
                "PersonContactId": "003A"
            })),
            RegistrationPolicy::default(),
        );

        let outcome = saga.register(&request(), "crm-token").await;

        assert!(outcome.is_success());
        assert_eq!(transformer.calls()[0].0, "crm_update_user.json");
        assert!(transformer.calls()[0].1["content"].get("isTargetState").is_none());
        assert_eq!(crm.updated_profiles().len(), 1);
    }

    #[test]
    fn test_progress_disarm_is_single_shot() {
        let progress = SagaProgress::default();
        progress.arm(RollbackTarget {
            profile_id: "SP-1".to_string(),
            session_token: "T".to_string(),
            brand: "asda".to_string(),
        });

        assert!(progress.disarm().is_some());
        assert!(progress.disarm().is_none());
    }
}
