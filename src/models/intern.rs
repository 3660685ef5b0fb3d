use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::DbId;

/// A person who can be assigned to projects and owns tasks.
///
/// An intern works on at most one in-progress project at a time. Interns whose
/// only assignments are to completed projects are available again.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Intern {
    pub id: DbId,
    pub name: String,
    pub email: String,
    pub joined_date: NaiveDate,
    pub profile: Option<InternProfile>,
    pub created_at: DateTime<Utc>,
}

/// Optional self-description shown on an intern's profile.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct InternProfile {
    pub bio: Option<String>,
    pub linkedin: Option<String>,
}

impl InternProfile {
    fn from_parts(bio: Option<String>, linkedin: Option<String>) -> Option<Self> {
        if bio.is_none() && linkedin.is_none() {
            None
        } else {
            Some(Self { bio, linkedin })
        }
    }
}

/// Input for registering a new intern.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateInternInput {
    pub name: String,
    pub email: String,
    pub joined_date: NaiveDate,
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(default)]
    pub linkedin: Option<String>,
}

impl CreateInternInput {
    /// Profile to store for this intern, `None` when neither field was given.
    pub fn profile(&self) -> Option<InternProfile> {
        InternProfile::from_parts(self.bio.clone(), self.linkedin.clone())
    }
}

impl Intern {
    pub(crate) fn with_profile_parts(
        mut self,
        bio: Option<String>,
        linkedin: Option<String>,
    ) -> Self {
        self.profile = InternProfile::from_parts(bio, linkedin);
        self
    }
}
