//! Input model handed to the transformation port.

use common::RegistrationRequest;
use serde_json::{Map, Value, json};

use crate::error::SagaError;
use crate::policy::RegistrationPolicy;
use crate::services::SearchResult;

/// Which CRM mutation the model is built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrmPath {
    Create,
    Update,
}

impl CrmPath {
    /// Zero search records means the user is new to the CRM.
    pub fn for_search(search: &SearchResult) -> Self {
        if search.has_no_records() {
            CrmPath::Create
        } else {
            CrmPath::Update
        }
    }

    pub fn template<'a>(&self, policy: &'a RegistrationPolicy) -> &'a str {
        match self {
            CrmPath::Create => &policy.create_template,
            CrmPath::Update => &policy.update_template,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CrmPath::Create => "create",
            CrmPath::Update => "update",
        }
    }
}

/// Builds `{"content": {...}}` from everything the CRM templates reference.
///
/// Only the create path carries `isTargetState`.
pub fn transformation_model(
    path: CrmPath,
    search: &SearchResult,
    request: &RegistrationRequest,
    profile: &Value,
    policy: &RegistrationPolicy,
) -> Result<Value, SagaError> {
    let profile = if profile.is_object() {
        profile.clone()
    } else {
        Value::Object(Map::new())
    };

    let mut content = Map::new();
    content.insert("crm_search_profile".to_string(), search.data.clone());
    content.insert("currentTime".to_string(), serde_json::to_value(request.timestamp)?);
    content.insert("req_payload".to_string(), serde_json::to_value(request)?);
    content.insert("sp_get_profile".to_string(), profile);
    content.insert("version".to_string(), json!(policy.crm_api_version));
    if path == CrmPath::Create {
        content.insert("isTargetState".to_string(), json!(!policy.identity_required));
    }

    Ok(json!({ "content": content }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_search() -> SearchResult {
        SearchResult::from_data(json!({ "totalSize": 0, "records": [] })).unwrap()
    }

    #[test]
    fn test_create_model_carries_policy_flag() {
        let policy = RegistrationPolicy::default();
        let request = RegistrationRequest::new("asda", "a@example.com");
        let model = transformation_model(
            CrmPath::Create,
            &empty_search(),
            &request,
            &json!({ "profileId": "SP-1" }),
            &policy,
        )
        .unwrap();

        let content = &model["content"];
        assert_eq!(content["isTargetState"], false);
        assert_eq!(content["version"], "v58.0");
        assert_eq!(content["sp_get_profile"]["profileId"], "SP-1");
        assert_eq!(content["req_payload"]["email"], "a@example.com");
        assert_eq!(content["crm_search_profile"]["totalSize"], 0);
        assert!(content["currentTime"].is_string());
    }

    #[test]
    fn test_update_model_omits_policy_flag() {
        let policy = RegistrationPolicy::default();
        let request = RegistrationRequest::new("asda", "a@example.com");
        let model =
            transformation_model(CrmPath::Update, &empty_search(), &request, &Value::Null, &policy)
                .unwrap();

        assert!(model["content"].get("isTargetState").is_none());
        assert_eq!(model["content"]["sp_get_profile"], json!({}));
    }

    #[test]
    fn test_path_selection() {
        let found = SearchResult::from_data(json!({ "totalSize": 2, "records": [] })).unwrap();
        assert_eq!(CrmPath::for_search(&empty_search()), CrmPath::Create);
        assert_eq!(CrmPath::for_search(&found), CrmPath::Update);
    }
}
