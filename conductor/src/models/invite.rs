use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An invitation to take a role in a project (notebook).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleInvite {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_rev", default, skip_serializing_if = "Option::is_none")]
    pub revision: Option<String>,
    pub project_id: String,
    pub role: String,
    pub created_at: DateTime<Utc>,
}

impl RoleInvite {
    pub fn new(project_id: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            revision: None,
            project_id: project_id.into(),
            role: role.into(),
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_invite() {
        let invite = RoleInvite::new("nb-1", "team");
        assert_eq!(invite.project_id, "nb-1");
        assert_eq!(invite.role, "team");
        assert!(invite.revision.is_none());
        assert!(uuid::Uuid::parse_str(&invite.id).is_ok());
    }

    #[test]
    fn test_invite_ids_are_unique() {
        assert_ne!(RoleInvite::new("p", "r").id, RoleInvite::new("p", "r").id);
    }
}
