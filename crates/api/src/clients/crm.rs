//! reqwest-backed CRM client.

use async_trait::async_trait;
use common::RegistrationRequest;
use reqwest::{Client, RequestBuilder};
use saga::{CrmMutationResult, CrmService, SagaError, SearchResult};
use serde_json::{Value, json};

use super::Envelope;

/// CRM profile API over HTTP.
#[derive(Debug, Clone)]
pub struct HttpCrmClient {
    client: Client,
    base_url: String,
}

impl HttpCrmClient {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn send(&self, request: RequestBuilder, auth_token: &str) -> Result<Envelope, SagaError> {
        let response = request
            .bearer_auth(auth_token)
            .send()
            .await
            .map_err(|e| SagaError::Crm(e.to_string()))?;
        let envelope = Envelope::read(response).await?;
        if !envelope.is_success() {
            return Err(SagaError::Crm(envelope.failure_description()));
        }
        Ok(envelope)
    }

    fn mutation_result(
        envelope: &Envelope,
        operation: &'static str,
    ) -> Result<CrmMutationResult, SagaError> {
        envelope
            .body
            .get("newCustomerID")
            .or_else(|| envelope.data().get("newCustomerID"))
            .and_then(Value::as_str)
            .map(|id| CrmMutationResult {
                customer_id: id.to_string(),
            })
            .ok_or_else(|| SagaError::MalformedResponse {
                operation,
                reason: "missing newCustomerID".to_string(),
            })
    }
}

#[async_trait]
impl CrmService for HttpCrmClient {
    #[tracing::instrument(skip_all, fields(brand = %request.brand_name))]
    async fn search_profile(
        &self,
        request: &RegistrationRequest,
        auth_token: &str,
    ) -> Result<SearchResult, SagaError> {
        let body = json!({
            "email": request.email,
            "brandName": request.brand_name,
        });
        let envelope = self
            .send(
                self.client.post(self.url("/profiles/search")).json(&body),
                auth_token,
            )
            .await?;
        SearchResult::from_data(envelope.data().clone())
    }

    #[tracing::instrument(skip_all)]
    async fn create_profile(
        &self,
        payload: Value,
        auth_token: &str,
    ) -> Result<CrmMutationResult, SagaError> {
        let envelope = self
            .send(self.client.post(self.url("/profiles")).json(&payload), auth_token)
            .await?;
        Self::mutation_result(&envelope, "create-profile")
    }

    #[tracing::instrument(skip_all)]
    async fn update_profile(
        &self,
        payload: Value,
        auth_token: &str,
    ) -> Result<CrmMutationResult, SagaError> {
        let envelope = self
            .send(self.client.patch(self.url("/profiles")).json(&payload), auth_token)
            .await?;
        Self::mutation_result(&envelope, "update-profile")
    }
}
