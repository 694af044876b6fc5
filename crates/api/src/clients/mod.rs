//! Remote adapters for the saga's ports: reqwest clients for the CRM and
//! identity system, and a file-backed template transformer.

pub mod crm;
pub mod identity;
pub mod templates;

use reqwest::Response;
use saga::SagaError;
use serde_json::Value;

pub use crm::HttpCrmClient;
pub use identity::HttpIdentityClient;
pub use templates::TemplateTransformer;

/// `status` value marking a successful envelope.
pub const SUCCESS_STATUS: &str = "SUCCESS";

/// Builds the shared outbound HTTP client.
pub fn http_client(timeout: std::time::Duration) -> Result<reqwest::Client, SagaError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| SagaError::Http(e.to_string()))
}

/// A decoded `{status, data, ...}` response envelope.
#[derive(Debug, Clone)]
pub struct Envelope {
    pub http_status: u16,
    pub body: Value,
}

impl Envelope {
    /// Reads a response body as JSON. An empty body decodes to `null`.
    pub async fn read(response: Response) -> Result<Self, SagaError> {
        let http_status = response.status().as_u16();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| SagaError::Http(e.to_string()))?;
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)?
        };
        Ok(Self { http_status, body })
    }

    /// True for a 2xx response whose `status` is SUCCESS.
    ///
    /// A 2xx response without any body counts as success.
    pub fn is_success(&self) -> bool {
        if !(200..300).contains(&self.http_status) {
            return false;
        }
        match self.body.get("status") {
            Some(status) => status.as_str() == Some(SUCCESS_STATUS),
            None => true,
        }
    }

    pub fn data(&self) -> &Value {
        self.body.get("data").unwrap_or(&Value::Null)
    }

    /// Best-effort description of a failed envelope.
    pub fn failure_description(&self) -> String {
        let data = self.data();
        ["errorDescription", "message"]
            .iter()
            .find_map(|key| data.get(key).or_else(|| self.body.get(key)))
            .and_then(Value::as_str)
            .map(String::from)
            .unwrap_or_else(|| format!("request failed with status {}", self.http_status))
    }
}
