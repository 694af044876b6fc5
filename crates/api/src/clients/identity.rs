//! reqwest-backed identity-system client.

use async_trait::async_trait;
use common::PLACEHOLDER;
use reqwest::header::LOCATION;
use reqwest::{Client, RequestBuilder};
use saga::{CreatedIdentityUser, IdentityService, NewIdentityUser, SagaError};
use serde_json::{Value, json};

use super::Envelope;

const BRAND_HEADER: &str = "x-brand";

/// Identity ("single profile") API over HTTP.
#[derive(Debug, Clone)]
pub struct HttpIdentityClient {
    client: Client,
    base_url: String,
}

impl HttpIdentityClient {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn send(&self, request: RequestBuilder, brand: &str) -> Result<Envelope, SagaError> {
        let response = request
            .header(BRAND_HEADER, brand)
            .send()
            .await
            .map_err(|e| SagaError::Http(e.to_string()))?;
        let location = response
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(String::from);

        let mut envelope = Envelope::read(response).await?;
        if !envelope.is_success() {
            return Err(SagaError::Identity(envelope.failure_description()));
        }
        // A Location header stands in for a missing body field.
        if let (Some(location), Value::Object(body)) = (location, &mut envelope.body) {
            body.entry("location").or_insert(Value::String(location));
        }
        Ok(envelope)
    }
}

fn string_at<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value.get(key).and_then(Value::as_str).filter(|s| !s.is_empty())
}

#[async_trait]
impl IdentityService for HttpIdentityClient {
    #[tracing::instrument(skip_all, fields(brand = user.brand, user_type = user.user_type))]
    async fn create_user(
        &self,
        user: NewIdentityUser<'_>,
    ) -> Result<CreatedIdentityUser, SagaError> {
        let request = user.request;
        let last_name = if user.last_name.is_empty() {
            request.last_name.as_str()
        } else {
            user.last_name
        };
        let title = if user.title.is_empty() {
            request.title.as_deref()
        } else {
            Some(user.title)
        };
        let body = json!({
            "email": request.email,
            "password": request.password,
            "firstName": request.first_name,
            "lastName": last_name,
            "title": title,
            "phoneNumber": request.phone_number,
            "postCode": request.post_code,
            "userType": user.user_type,
            "isThirdParty": user.is_third_party,
        });

        let envelope = self
            .send(self.client.post(self.url("/users")).json(&body), user.brand)
            .await?;
        let data = envelope.data();

        // The user exists from here on: anything undecodable is left to the
        // saga, which can still compensate.
        let cookies = envelope.body.get("cookies").cloned().unwrap_or(Value::Null);
        let session_token = string_at(data, "sessionToken")
            .or_else(|| string_at(&cookies, "userToken"))
            .unwrap_or_default()
            .to_string();
        let profile_id = string_at(data, "profileId").unwrap_or_default().to_string();
        let location = string_at(&envelope.body, "location")
            .filter(|l| *l != PLACEHOLDER)
            .map(String::from);

        Ok(CreatedIdentityUser {
            profile_id,
            session_token,
            cookies,
            location,
            raw: envelope.body,
        })
    }

    #[tracing::instrument(skip(self, session_token))]
    async fn get_profile(&self, session_token: &str, brand: &str) -> Result<Value, SagaError> {
        let envelope = self
            .send(
                self.client.get(self.url("/profile")).bearer_auth(session_token),
                brand,
            )
            .await?;
        Ok(envelope.data().clone())
    }

    #[tracing::instrument(skip(self, session_token))]
    async fn delete_user(
        &self,
        profile_id: &str,
        session_token: &str,
        brand: &str,
    ) -> Result<(), SagaError> {
        self.send(
            self.client
                .delete(self.url(&format!("/users/{profile_id}")))
                .bearer_auth(session_token),
            brand,
        )
        .await
        .map(|_| ())
    }

    #[tracing::instrument(skip(self, session_token, post_code))]
    async fn create_address(
        &self,
        profile_id: &str,
        session_token: &str,
        brand: &str,
        post_code: &str,
    ) -> Result<(), SagaError> {
        self.send(
            self.client
                .post(self.url(&format!("/users/{profile_id}/addresses")))
                .bearer_auth(session_token)
                .json(&json!({ "postCode": post_code })),
            brand,
        )
        .await
        .map(|_| ())
    }

    #[tracing::instrument(skip(self, session_token))]
    async fn create_membership(
        &self,
        profile_id: &str,
        session_token: &str,
        brand: &str,
        rewards_opt_in: bool,
    ) -> Result<(), SagaError> {
        self.send(
            self.client
                .post(self.url(&format!("/users/{profile_id}/memberships")))
                .bearer_auth(session_token)
                .json(&json!({ "rewardsOptIn": rewards_opt_in })),
            brand,
        )
        .await
        .map(|_| ())
    }
}
