//! Deployment policy threaded into the saga at construction time.

use std::collections::HashSet;

/// Template used to build a CRM create-profile payload.
pub const CREATE_USER_TEMPLATE: &str = "crm_create_user.json";

/// Template used to build a CRM update-profile payload.
pub const UPDATE_USER_TEMPLATE: &str = "crm_update_user.json";

/// Registration behaviour that differs between deployments.
#[derive(Debug, Clone)]
pub struct RegistrationPolicy {
    /// Whether the identity system takes part in registration ("target state" off).
    pub identity_required: bool,
    /// CRM API version string placed in the transformation model.
    pub crm_api_version: String,
    /// Brands whose new users get a provisioning address in the identity system.
    pub address_provisioning_brands: HashSet<String>,
    /// Brands registered on behalf of a third party.
    pub third_party_brands: HashSet<String>,
    pub create_template: String,
    pub update_template: String,
}

impl RegistrationPolicy {
    /// Returns true if the brand needs a create-address call after user creation.
    pub fn provisions_address(&self, brand: &str) -> bool {
        self.address_provisioning_brands.contains(brand)
    }

    /// Returns true if the brand registers users on behalf of a third party.
    pub fn is_third_party(&self, brand: &str) -> bool {
        self.third_party_brands.contains(brand)
    }

    /// Same policy with identity participation switched on or off.
    pub fn with_identity_required(mut self, required: bool) -> Self {
        self.identity_required = required;
        self
    }

    /// Same policy with the given brands receiving address provisioning.
    pub fn with_address_brands<I, B>(mut self, brands: I) -> Self
    where
        I: IntoIterator<Item = B>,
        B: Into<String>,
    {
        self.address_provisioning_brands = brands.into_iter().map(Into::into).collect();
        self
    }
}

impl Default for RegistrationPolicy {
    fn default() -> Self {
        Self {
            identity_required: true,
            crm_api_version: "v58.0".to_string(),
            address_provisioning_brands: HashSet::from(["gi".to_string()]),
            third_party_brands: HashSet::new(),
            create_template: CREATE_USER_TEMPLATE.to_string(),
            update_template: UPDATE_USER_TEMPLATE.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy_requires_identity() {
        let policy = RegistrationPolicy::default();
        assert!(policy.identity_required);
        assert!(policy.provisions_address("gi"));
        assert!(!policy.provisions_address("asda"));
        assert!(!policy.is_third_party("gi"));
    }

    #[test]
    fn test_address_brands_are_replaced_not_merged() {
        let policy = RegistrationPolicy::default().with_address_brands(["george"]);
        assert!(policy.provisions_address("george"));
        assert!(!policy.provisions_address("gi"));
    }
}
