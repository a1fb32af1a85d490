//! Flat role encoding.
//!
//! The database's access-control layer only understands a flat list of role
//! strings. A project-scoped role is written as `"<project_id>||<role>"`; a
//! string without the separator is a global ("other") role. Decoding splits
//! on the first separator only, so a role name may itself contain `||` but a
//! project id may not.

use std::collections::BTreeMap;

/// Separator between project id and role name in a flat role string.
pub const ROLE_SEPARATOR: &str = "||";

/// Roles held per project, keyed by project id.
pub type ProjectRoles = BTreeMap<String, Vec<String>>;

/// A single decoded flat role.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Role {
    /// A role held within one project.
    Project { project_id: String, role: String },
    /// A role not tied to any project.
    Other { role: String },
}

impl Role {
    /// Decode one flat role string.
    pub fn parse(flat: &str) -> Self {
        match flat.split_once(ROLE_SEPARATOR) {
            Some((project_id, role)) => Role::Project {
                project_id: project_id.to_string(),
                role: role.to_string(),
            },
            None => Role::Other {
                role: flat.to_string(),
            },
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Project { project_id, role } => {
                write!(f, "{}{}{}", project_id, ROLE_SEPARATOR, role)
            }
            Role::Other { role } => write!(f, "{}", role),
        }
    }
}

/// Encode a project-scoped role.
pub fn encode_project_role(project_id: &str, role: &str) -> String {
    format!("{}{}{}", project_id, ROLE_SEPARATOR, role)
}

/// Build the flat role list from structured roles.
///
/// Project roles come first in project id order, followed by the other
/// roles in their stored order.
pub fn to_flat_roles(project_roles: &ProjectRoles, other_roles: &[String]) -> Vec<String> {
    let mut roles = Vec::new();
    for (project_id, project) in project_roles {
        for role in project {
            roles.push(encode_project_role(project_id, role));
        }
    }
    roles.extend(other_roles.iter().cloned());
    roles
}

/// Rebuild structured roles from a flat role list.
///
/// Duplicate entries collapse; first-seen order is kept.
pub fn from_flat_roles(roles: &[String]) -> (ProjectRoles, Vec<String>) {
    let mut project_roles = ProjectRoles::new();
    let mut other_roles: Vec<String> = Vec::new();

    for flat in roles {
        match Role::parse(flat) {
            Role::Project { project_id, role } => {
                let project = project_roles.entry(project_id).or_default();
                if !project.contains(&role) {
                    project.push(role);
                }
            }
            Role::Other { role } => {
                if !other_roles.contains(&role) {
                    other_roles.push(role);
                }
            }
        }
    }

    (project_roles, other_roles)
}
