//! CRM port: profile search, create and update.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use common::RegistrationRequest;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::error::SagaError;

/// One contact record returned by a CRM profile search.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct CrmRecord {
    #[serde(rename = "AccountRegistrationStatus__c", default)]
    pub registration_status: Option<String>,
    #[serde(rename = "LastName", default)]
    pub last_name: Option<String>,
    #[serde(rename = "Salutation", default)]
    pub salutation: Option<String>,
    #[serde(rename = "PersonContactId", default)]
    pub person_contact_id: Option<String>,
}

/// Result of a successful CRM profile search.
#[derive(Debug, Clone)]
pub struct SearchResult {
    /// `totalSize` as reported by the CRM, if present.
    pub total_size: Option<u64>,
    pub records: Vec<CrmRecord>,
    /// The raw `data` payload, fed verbatim into the transformation model.
    pub data: Value,
}

impl SearchResult {
    /// Parses the `data` section of a search response.
    ///
    /// `totalSize` is accepted as a number or a numeric string.
    pub fn from_data(data: Value) -> Result<Self, SagaError> {
        let total_size = match data.get("totalSize") {
            Some(Value::Number(n)) => n.as_u64(),
            Some(Value::String(s)) => s.trim().parse().ok(),
            _ => None,
        };

        let records = match data.get("records") {
            None | Some(Value::Null) => Vec::new(),
            Some(records) => serde_json::from_value(records.clone())
                .map_err(|e| SagaError::malformed("search-profile", e.to_string()))?,
        };

        Ok(Self {
            total_size,
            records,
            data,
        })
    }

    /// True when the CRM explicitly reported zero matching records.
    pub fn has_no_records(&self) -> bool {
        self.total_size == Some(0)
    }

    /// The first matching record, which drives classification.
    pub fn first_record(&self) -> Option<&CrmRecord> {
        self.records.first()
    }
}

/// Result of a successful CRM create or update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrmMutationResult {
    /// The CRM customer id ("new customer id").
    pub customer_id: String,
}

/// Trait for CRM profile operations.
#[async_trait]
pub trait CrmService: Send + Sync {
    /// Looks the registering user up by identity.
    async fn search_profile(
        &self,
        request: &RegistrationRequest,
        auth_token: &str,
    ) -> Result<SearchResult, SagaError>;

    /// Creates a profile from a transformed payload.
    async fn create_profile(
        &self,
        payload: Value,
        auth_token: &str,
    ) -> Result<CrmMutationResult, SagaError>;

    /// Updates an existing profile from a transformed payload.
    async fn update_profile(
        &self,
        payload: Value,
        auth_token: &str,
    ) -> Result<CrmMutationResult, SagaError>;
}

#[derive(Debug, Default)]
struct InMemoryCrmState {
    records: Vec<Value>,
    created: Vec<Value>,
    updated: Vec<Value>,
    search_calls: usize,
    next_id: u32,
    customer_id: Option<String>,
    fail_on_search: bool,
    fail_on_create: bool,
    fail_on_update: bool,
    panic_on_mutation: bool,
}

/// In-memory CRM for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCrmService {
    state: Arc<RwLock<InMemoryCrmState>>,
}

impl InMemoryCrmService {
    /// Creates a CRM with no matching records.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a raw record returned by every subsequent search.
    pub fn with_record(self, record: Value) -> Self {
        self.state.write().unwrap().records.push(record);
        self
    }

    /// Adds a record carrying only a registration status.
    pub fn with_status(self, status: &str) -> Self {
        self.with_record(json!({ "AccountRegistrationStatus__c": status }))
    }

    /// Fixes the customer id returned by create and update.
    pub fn set_customer_id(&self, id: impl Into<String>) {
        self.state.write().unwrap().customer_id = Some(id.into());
    }

    pub fn set_fail_on_search(&self, fail: bool) {
        self.state.write().unwrap().fail_on_search = fail;
    }

    pub fn set_fail_on_create(&self, fail: bool) {
        self.state.write().unwrap().fail_on_create = fail;
    }

    pub fn set_fail_on_update(&self, fail: bool) {
        self.state.write().unwrap().fail_on_update = fail;
    }

    /// Makes create and update panic instead of answering.
    pub fn set_panic_on_mutation(&self, panic: bool) {
        self.state.write().unwrap().panic_on_mutation = panic;
    }

    pub fn search_count(&self) -> usize {
        self.state.read().unwrap().search_calls
    }

    /// Payloads received by successful create calls.
    pub fn created_profiles(&self) -> Vec<Value> {
        self.state.read().unwrap().created.clone()
    }

    /// Payloads received by successful update calls.
    pub fn updated_profiles(&self) -> Vec<Value> {
        self.state.read().unwrap().updated.clone()
    }

    fn mutate(&self, payload: Value, update: bool) -> Result<CrmMutationResult, SagaError> {
        let panic = self.state.read().unwrap().panic_on_mutation;
        if panic {
            panic!("CRM mutation exploded");
        }

        let mut state = self.state.write().unwrap();
        if update && state.fail_on_update {
            return Err(SagaError::Crm("Update rejected".to_string()));
        }
        if !update && state.fail_on_create {
            return Err(SagaError::Crm("Create rejected".to_string()));
        }

        state.next_id += 1;
        let customer_id = state
            .customer_id
            .clone()
            .unwrap_or_else(|| format!("CUST-{:04}", state.next_id));
        if update {
            state.updated.push(payload);
        } else {
            state.created.push(payload);
        }

        Ok(CrmMutationResult { customer_id })
    }
}

#[async_trait]
impl CrmService for InMemoryCrmService {
    async fn search_profile(
        &self,
        _request: &RegistrationRequest,
        _auth_token: &str,
    ) -> Result<SearchResult, SagaError> {
        let mut state = self.state.write().unwrap();
        state.search_calls += 1;

        if state.fail_on_search {
            return Err(SagaError::Crm("Search unavailable".to_string()));
        }

        SearchResult::from_data(json!({
            "totalSize": state.records.len(),
            "done": true,
            "records": state.records,
        }))
    }

    async fn create_profile(
        &self,
        payload: Value,
        _auth_token: &str,
    ) -> Result<CrmMutationResult, SagaError> {
        self.mutate(payload, false)
    }

    async fn update_profile(
        &self,
        payload: Value,
        _auth_token: &str,
    ) -> Result<CrmMutationResult, SagaError> {
        self.mutate(payload, true)
    }
}
