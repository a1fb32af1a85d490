use std::collections::BTreeMap;

use conductor_common::roles::{from_flat_roles, to_flat_roles, ProjectRoles};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// A conductor user.
///
/// `project_roles` and `other_roles` are the source of truth; the flat
/// `roles` list is rebuilt from them after every mutation and is what the
/// database's access-control layer reads. All three change only through the
/// role methods below.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct User {
    /// Stable identifier (username, or lowercased email).
    #[serde(rename = "_id")]
    pub id: String,
    /// Revision from the store; required on every update.
    #[serde(rename = "_rev", skip_serializing_if = "Option::is_none")]
    pub revision: Option<String>,
    /// Same value as `id`; kept as a plain field for database-side lookups.
    pub user_id: String,
    /// Display name.
    pub name: String,
    /// Lowercase email addresses.
    emails: Vec<String>,
    project_roles: ProjectRoles,
    other_roles: Vec<String>,
    roles: Vec<String>,
    /// Raw profile payload per identity provider.
    pub profiles: BTreeMap<String, Value>,
}

#[derive(Deserialize)]
struct StoredUser {
    #[serde(rename = "_id")]
    id: String,
    #[serde(rename = "_rev", default)]
    revision: Option<String>,
    #[serde(default)]
    name: String,
    #[serde(default)]
    emails: Vec<String>,
    #[serde(default)]
    project_roles: ProjectRoles,
    #[serde(default)]
    other_roles: Vec<String>,
    #[serde(default)]
    roles: Vec<String>,
    #[serde(default)]
    profiles: BTreeMap<String, Value>,
}

impl<'de> Deserialize<'de> for User {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let stored = StoredUser::deserialize(deserializer)?;

        // Older records only carry the flat list.
        let (project_roles, other_roles) = if stored.project_roles.is_empty()
            && stored.other_roles.is_empty()
            && !stored.roles.is_empty()
        {
            from_flat_roles(&stored.roles)
        } else {
            (stored.project_roles, stored.other_roles)
        };

        let mut user = User {
            user_id: stored.id.clone(),
            id: stored.id,
            revision: stored.revision,
            name: stored.name,
            emails: Vec::new(),
            project_roles,
            other_roles,
            roles: Vec::new(),
            profiles: stored.profiles,
        };
        user.project_roles.retain(|_, roles| !roles.is_empty());
        user.add_emails(stored.emails);
        user.sync_roles();
        Ok(user)
    }
}

impl User {
    /// A fresh, unsaved user with no roles or profiles.
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            user_id: id.clone(),
            id,
            revision: None,
            name: String::new(),
            emails: Vec::new(),
            project_roles: ProjectRoles::new(),
            other_roles: Vec::new(),
            roles: Vec::new(),
            profiles: BTreeMap::new(),
        }
    }

    /// Flat role list derived from the structured roles.
    pub fn roles(&self) -> &[String] {
        &self.roles
    }

    pub fn emails(&self) -> &[String] {
        &self.emails
    }

    /// Roles per project; projects with no roles are absent.
    pub fn project_roles(&self) -> &ProjectRoles {
        &self.project_roles
    }

    pub fn other_roles(&self) -> &[String] {
        &self.other_roles
    }

    pub fn has_email(&self, email: &str) -> bool {
        let email = email.trim().to_lowercase();
        self.emails.iter().any(|e| *e == email)
    }

    /// Roles held in a project; empty when the user has none there.
    pub fn project_roles_for(&self, project_id: &str) -> &[String] {
        self.project_roles
            .get(project_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn has_project_role(&self, project_id: &str, role: &str) -> bool {
        self.project_roles_for(project_id).iter().any(|r| r == role)
    }

    pub fn has_other_role(&self, role: &str) -> bool {
        self.other_roles.iter().any(|r| r == role)
    }

    /// Grant a role within a project. No-op if already held.
    pub fn add_project_role(&mut self, project_id: &str, role: &str) {
        let roles = self.project_roles.entry(project_id.to_string()).or_default();
        if !roles.iter().any(|r| r == role) {
            roles.push(role.to_string());
        }
        self.sync_roles();
    }

    /// Revoke a role within a project. No-op if not held.
    ///
    /// A project left with no roles is dropped.
    pub fn remove_project_role(&mut self, project_id: &str, role: &str) {
        if let Some(roles) = self.project_roles.get_mut(project_id) {
            roles.retain(|r| r != role);
            if roles.is_empty() {
                self.project_roles.remove(project_id);
            }
        }
        self.sync_roles();
    }

    /// Grant a global role. No-op if already held.
    pub fn add_other_role(&mut self, role: &str) {
        if !self.has_other_role(role) {
            self.other_roles.push(role.to_string());
        }
        self.sync_roles();
    }

    /// Revoke a global role. No-op if not held.
    pub fn remove_other_role(&mut self, role: &str) {
        self.other_roles.retain(|r| r != role);
        self.sync_roles();
    }

    /// Add email addresses, lowercased and without duplicates.
    pub fn add_emails<I, S>(&mut self, emails: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for email in emails {
            let email = email.as_ref().trim().to_lowercase();
            if !email.is_empty() && !self.emails.contains(&email) {
                self.emails.push(email);
            }
        }
    }

    /// Merge what an identity provider reported at login.
    ///
    /// The display name is only taken when none is set yet.
    pub fn record_login(
        &mut self,
        provider: &str,
        profile: Value,
        display_name: Option<&str>,
        emails: &[String],
    ) {
        if self.name.is_empty() {
            if let Some(name) = display_name {
                self.name = name.to_string();
            }
        }
        self.add_emails(emails);
        self.profiles.insert(provider.to_string(), profile);
    }

    fn sync_roles(&mut self) {
        self.roles = to_flat_roles(&self.project_roles, &self.other_roles);
    }
}
