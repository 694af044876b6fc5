//! User classification derived from the CRM search.

use crate::services::SearchResult;

/// How the CRM currently knows the registering user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserClassification {
    /// No usable CRM record.
    New,
    /// Checked out as a guest before; guest identities are never rolled back.
    Guest,
    /// Created manually (e.g. by customer service) with name details already set.
    Manual { last_name: String, title: String },
    /// Already fully registered; the saga stops here.
    Registered,
}

impl UserClassification {
    /// Classifies from the first record's registration status.
    ///
    /// Unknown or missing statuses classify as [`UserClassification::New`].
    pub fn from_search(search: &SearchResult) -> Self {
        let Some(record) = search.first_record() else {
            return UserClassification::New;
        };

        match record.registration_status.as_deref() {
            Some("Registered") => UserClassification::Registered,
            Some("Guest") => UserClassification::Guest,
            Some("Manual") => UserClassification::Manual {
                last_name: record.last_name.clone().unwrap_or_default(),
                title: record.salutation.clone().unwrap_or_default(),
            },
            _ => UserClassification::New,
        }
    }

    /// Name sent to the identity system as the user type.
    pub fn user_type(&self) -> &'static str {
        match self {
            UserClassification::New => "New",
            UserClassification::Guest => "Guest",
            UserClassification::Manual { .. } => "Manual",
            UserClassification::Registered => "Registered",
        }
    }

    /// `(last_name, title)` for manual users, empty strings otherwise.
    pub fn manual_details(&self) -> (&str, &str) {
        match self {
            UserClassification::Manual { last_name, title } => (last_name, title),
            _ => ("", ""),
        }
    }

    pub fn is_registered(&self) -> bool {
        matches!(self, UserClassification::Registered)
    }

    /// Whether an identity user created for this classification must be
    /// deleted when the registration fails.
    pub fn requires_rollback(&self) -> bool {
        !matches!(self, UserClassification::Guest)
    }
}

impl std::fmt::Display for UserClassification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.user_type())
    }
}
