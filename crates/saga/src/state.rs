//! Registration progress marker.

use serde::{Deserialize, Serialize};

/// The stage a registration reached.
///
/// Stages advance strictly in order; any of them can be the terminal one:
/// ```text
/// Search ──► Classify ──► IdentitySegment ──► Transform ──┬──► CrmCreate ──┬──► Completed
///                                                         └──► CrmUpdate ──┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum RegistrationStage {
    /// Looking the user up in the CRM.
    #[default]
    Search,

    /// Deriving the user classification from the search result.
    Classify,

    /// Creating and fetching the identity-system user.
    IdentitySegment,

    /// Building the CRM payload from the transformation template.
    Transform,

    /// Creating a new CRM profile.
    CrmCreate,

    /// Updating an existing CRM profile.
    CrmUpdate,

    /// The registration finished successfully (terminal).
    Completed,
}

impl RegistrationStage {
    /// Returns the stage name as used in logs and metric labels.
    pub fn as_str(&self) -> &'static str {
        match self {
            RegistrationStage::Search => "search",
            RegistrationStage::Classify => "classify",
            RegistrationStage::IdentitySegment => "identity_segment",
            RegistrationStage::Transform => "transform",
            RegistrationStage::CrmCreate => "crm_create",
            RegistrationStage::CrmUpdate => "crm_update",
            RegistrationStage::Completed => "completed",
        }
    }
}

impl std::fmt::Display for RegistrationStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
