//! Role invites: pending grants of a project role.

use std::sync::Arc;

use crate::models::{RoleInvite, User};
use crate::store::{Document, DocumentStore, StoreError};

#[derive(Clone)]
pub struct InviteStore {
    store: Arc<dyn DocumentStore>,
}

impl InviteStore {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Persist an invite, updating its revision.
    pub async fn save(&self, invite: &mut RoleInvite) -> Result<(), StoreError> {
        let rev = self.store.put(Document::from_serializable(&*invite)?).await?;
        invite.revision = Some(rev);
        tracing::debug!(invite_id = %invite.id, project_id = %invite.project_id, "Saved invite");
        Ok(())
    }

    pub async fn get(&self, id: &str) -> Result<Option<RoleInvite>, StoreError> {
        match self.store.get(id).await {
            Ok(doc) => Ok(Some(doc.deserialize()?)),
            Err(StoreError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Delete an invite at the revision it was read at.
    pub async fn delete(&self, invite: &RoleInvite) -> Result<(), StoreError> {
        let rev = invite
            .revision
            .as_deref()
            .ok_or_else(|| StoreError::NotFound(invite.id.clone()))?;
        self.store.remove(&invite.id, rev).await
    }

    /// Invites for a project, oldest first.
    pub async fn for_project(&self, project_id: &str) -> Result<Vec<RoleInvite>, StoreError> {
        let docs = self.store.find_by_field("project_id", project_id).await?;
        let mut invites = docs
            .iter()
            .map(Document::deserialize)
            .collect::<Result<Vec<RoleInvite>, _>>()?;
        invites.retain(|invite| invite.project_id == project_id);
        invites.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(invites)
    }
}

/// Grant the invited role. The caller saves the user.
pub fn accept(invite: &RoleInvite, user: &mut User) {
    user.add_project_role(&invite.project_id, &invite.role);
    tracing::info!(
        invite_id = %invite.id,
        user_id = %user.id,
        project_id = %invite.project_id,
        role = %invite.role,
        "Accepted invite"
    );
}
