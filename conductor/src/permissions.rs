//! Permission checks over a user's roles.

use crate::models::User;

/// Project role granting `modify`.
pub const PROJECT_ADMIN_ROLE: &str = "admin";

/// Default global role marking a cluster administrator.
pub const DEFAULT_CLUSTER_ADMIN_ROLE: &str = "cluster-admin";

/// What a user wants to do with a project.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Read,
    Modify,
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Action::Read => write!(f, "read"),
            Action::Modify => write!(f, "modify"),
        }
    }
}

/// Permission rules, parameterised by the cluster-admin role name.
#[derive(Debug, Clone)]
pub struct PermissionPolicy {
    cluster_admin_role: String,
}

impl Default for PermissionPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_CLUSTER_ADMIN_ROLE)
    }
}

impl PermissionPolicy {
    pub fn new(cluster_admin_role: impl Into<String>) -> Self {
        Self {
            cluster_admin_role: cluster_admin_role.into(),
        }
    }

    pub fn cluster_admin_role(&self) -> &str {
        &self.cluster_admin_role
    }

    /// Whether the user holds the cluster-admin marker.
    pub fn is_cluster_admin(&self, user: &User) -> bool {
        user.has_other_role(&self.cluster_admin_role)
    }

    /// Whether the user may perform `action` on a project.
    ///
    /// Cluster admins may do anything. Otherwise any project role allows
    /// `read`, and the project `admin` role allows `modify`.
    pub fn has_permission(&self, user: &User, project_id: &str, action: Action) -> bool {
        if self.is_cluster_admin(user) {
            return true;
        }
        match action {
            Action::Read => !user.project_roles_for(project_id).is_empty(),
            Action::Modify => user.has_project_role(project_id, PROJECT_ADMIN_ROLE),
        }
    }

    /// Only cluster admins create notebooks.
    pub fn can_create_projects(&self, user: &User) -> bool {
        self.is_cluster_admin(user)
    }
}
