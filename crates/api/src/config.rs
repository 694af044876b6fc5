//! Application configuration loaded from environment variables.

use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use saga::RegistrationPolicy;

/// Server and integration configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST` / `PORT` / `RUST_LOG` — bind address, listen port, tracing filter
/// - `IDENTITY_REQUIRED` — whether the identity system takes part (default: `true`)
/// - `CRM_BASE_URL` / `CRM_API_TOKEN` / `CRM_API_VERSION` — CRM endpoint and credentials
/// - `IDENTITY_BASE_URL` — identity system endpoint
/// - `TEMPLATE_ROOT` — directory holding the CRM transformation templates
/// - `ADDRESS_PROVISIONING_BRANDS` / `THIRD_PARTY_BRANDS` — comma-separated brand lists
/// - `HTTP_TIMEOUT_SECS` — outbound HTTP client timeout
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub identity_required: bool,
    pub crm_base_url: String,
    pub crm_api_token: String,
    pub crm_api_version: String,
    pub identity_base_url: String,
    pub template_root: PathBuf,
    pub address_provisioning_brands: HashSet<String>,
    pub third_party_brands: HashSet<String>,
    pub http_timeout: Duration,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let string = |key: &str, default: String| lookup(key).unwrap_or(default);

        Self {
            host: string("HOST", defaults.host),
            port: lookup("PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
            log_level: string("RUST_LOG", defaults.log_level),
            identity_required: lookup("IDENTITY_REQUIRED")
                .and_then(|v| parse_bool(&v))
                .unwrap_or(defaults.identity_required),
            crm_base_url: string("CRM_BASE_URL", defaults.crm_base_url),
            crm_api_token: string("CRM_API_TOKEN", defaults.crm_api_token),
            crm_api_version: string("CRM_API_VERSION", defaults.crm_api_version),
            identity_base_url: string("IDENTITY_BASE_URL", defaults.identity_base_url),
            template_root: lookup("TEMPLATE_ROOT")
                .map(PathBuf::from)
                .unwrap_or(defaults.template_root),
            address_provisioning_brands: lookup("ADDRESS_PROVISIONING_BRANDS")
                .map(|v| parse_list(&v))
                .unwrap_or(defaults.address_provisioning_brands),
            third_party_brands: lookup("THIRD_PARTY_BRANDS")
                .map(|v| parse_list(&v))
                .unwrap_or(defaults.third_party_brands),
            http_timeout: lookup("HTTP_TIMEOUT_SECS")
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.http_timeout),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// The saga policy this deployment runs with.
    pub fn policy(&self) -> RegistrationPolicy {
        RegistrationPolicy {
            identity_required: self.identity_required,
            crm_api_version: self.crm_api_version.clone(),
            address_provisioning_brands: self.address_provisioning_brands.clone(),
            third_party_brands: self.third_party_brands.clone(),
            ..RegistrationPolicy::default()
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let policy = RegistrationPolicy::default();
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            identity_required: policy.identity_required,
            crm_base_url: "http://localhost:8081".to_string(),
            crm_api_token: String::new(),
            crm_api_version: policy.crm_api_version,
            identity_base_url: "http://localhost:8082".to_string(),
            template_root: PathBuf::from("templates"),
            address_provisioning_brands: policy.address_provisioning_brands,
            third_party_brands: policy.third_party_brands,
            http_timeout: Duration::from_secs(30),
        }
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn parse_list(value: &str) -> HashSet<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}
