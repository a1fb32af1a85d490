//! User Record Store.
//!
//! Users live in a [`DocumentStore`] keyed by their id. Writes are
//! optimistic: a save carries the revision the user was read at, and a
//! stale save is retried once against the freshly stored revision.

pub mod local;

use std::sync::Arc;

use crate::auth::{create_token, create_token_for, SigningKey, TokenError};
use crate::models::User;
use crate::permissions::{Action, PermissionPolicy};
use crate::store::{Document, DocumentStore, StoreError};

pub use local::{add_local_password, has_local_password, verify_local_password};

#[derive(Debug, thiserror::Error)]
pub enum UserError {
    #[error("at least one of username and email is required")]
    Validation,
    #[error("user with {field} '{value}' already exists")]
    Duplicate { field: &'static str, value: String },
    #[error("more than one user has email '{email}'")]
    MultipleMatch { email: String },
    #[error("conflict saving user '{id}' after retry")]
    UpdateConflict { id: String },
    #[error("unknown user '{0}'")]
    UnknownUser(String),
    #[error("user '{user}' may not {action} project '{project_id}'")]
    PermissionDenied {
        user: String,
        project_id: String,
        action: Action,
    },
    #[error("invalid password: {0}")]
    Password(String),
    #[error(transparent)]
    Token(#[from] TokenError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Field of the user document holding its email addresses.
const EMAILS_FIELD: &str = "emails";

#[derive(Clone)]
pub struct UserStore {
    store: Arc<dyn DocumentStore>,
}

impl UserStore {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Look a user up by id. A missing user is `Ok(None)`.
    pub async fn find_by_id(&self, id: &str) -> Result<Option<User>, UserError> {
        match self.store.get(id).await {
            Ok(doc) => Ok(Some(doc.deserialize()?)),
            Err(StoreError::NotFound(_)) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Look a user up by email, ignoring case.
    ///
    /// More than one match means the uniqueness invariant is already broken
    /// and is reported as [`UserError::MultipleMatch`].
    pub async fn find_by_email(&self, email: &str) -> Result<Option<User>, UserError> {
        let email = email.trim().to_lowercase();
        let docs = self.store.find_by_field(EMAILS_FIELD, &email).await?;
        let mut users = docs
            .iter()
            .map(Document::deserialize::<User>)
            .collect::<Result<Vec<_>, _>>()?;
        users.retain(|user| user.has_email(&email));

        match users.len() {
            0 => Ok(None),
            1 => Ok(users.pop()),
            n => {
                tracing::warn!(email = %email, matches = n, "Email matches several users");
                Err(UserError::MultipleMatch { email })
            }
        }
    }

    /// Resolve an identifier that may be a username or an email.
    pub async fn find_by_email_or_username(&self, identifier: &str) -> Result<Option<User>, UserError> {
        if let Some(user) = self.find_by_id(identifier).await? {
            return Ok(Some(user));
        }
        self.find_by_email(identifier).await
    }

    /// Build a new, unsaved user.
    ///
    /// The id is the username, or the lowercased email when no username is
    /// given. Uniqueness is checked against stored users only; two creates
    /// racing on the same email can both succeed.
    pub async fn create(&self, email: &str, username: &str) -> Result<User, UserError> {
        let email = email.trim();
        let username = username.trim();
        if email.is_empty() && username.is_empty() {
            return Err(UserError::Validation);
        }

        if !email.is_empty() && self.find_by_email(email).await?.is_some() {
            return Err(UserError::Duplicate {
                field: "email",
                value: email.to_string(),
            });
        }

        let id = if username.is_empty() {
            let id = email.to_lowercase();
            if self.find_by_id(&id).await?.is_some() {
                return Err(UserError::Duplicate {
                    field: "email",
                    value: email.to_string(),
                });
            }
            id
        } else {
            if self.find_by_id(username).await?.is_some() {
                return Err(UserError::Duplicate {
                    field: "username",
                    value: username.to_string(),
                });
            }
            username.to_string()
        };

        let mut user = User::new(id);
        if !email.is_empty() {
            user.add_emails([email]);
        }
        tracing::info!(user_id = %user.id, "Created user");
        Ok(user)
    }

    /// Persist a user, updating its revision.
    ///
    /// On a conflict the stored revision is re-read and the write retried
    /// once; a second conflict is [`UserError::UpdateConflict`].
    pub async fn save(&self, user: &mut User) -> Result<(), UserError> {
        match self.store.put(Document::from_serializable(&*user)?).await {
            Ok(rev) => {
                user.revision = Some(rev);
                return Ok(());
            }
            Err(StoreError::Conflict(_)) => {
                tracing::warn!(user_id = %user.id, "Conflict saving user, retrying with current revision");
            }
            Err(e) => return Err(e.into()),
        }

        user.revision = match self.store.get(&user.id).await {
            Ok(current) => current.rev,
            Err(StoreError::NotFound(_)) => None,
            Err(e) => return Err(e.into()),
        };

        match self.store.put(Document::from_serializable(&*user)?).await {
            Ok(rev) => {
                user.revision = Some(rev);
                Ok(())
            }
            Err(StoreError::Conflict(_)) => Err(UserError::UpdateConflict { id: user.id.clone() }),
            Err(e) => Err(e.into()),
        }
    }

    /// Grant or revoke a project role on behalf of `actor`.
    ///
    /// `actor` needs `modify` on the project. Returns the saved target user.
    pub async fn set_project_role(
        &self,
        actor: &User,
        identifier: &str,
        project_id: &str,
        role: &str,
        grant: bool,
        policy: &PermissionPolicy,
    ) -> Result<User, UserError> {
        if !policy.has_permission(actor, project_id, Action::Modify) {
            return Err(UserError::PermissionDenied {
                user: actor.id.clone(),
                project_id: project_id.to_string(),
                action: Action::Modify,
            });
        }

        let mut user = self
            .find_by_email_or_username(identifier)
            .await?
            .ok_or_else(|| UserError::UnknownUser(identifier.to_string()))?;

        if grant {
            user.add_project_role(project_id, role);
        } else {
            user.remove_project_role(project_id, role);
        }
        self.save(&mut user).await?;

        tracing::info!(
            actor = %actor.id,
            user_id = %user.id,
            project_id,
            role,
            grant,
            "Updated project role"
        );
        Ok(user)
    }

    /// Issue a token for a stored user. An unknown id gets a token with no roles.
    pub async fn token_for(&self, user_id: &str, key: &SigningKey) -> Result<String, UserError> {
        let token = match self.find_by_id(user_id).await? {
            Some(user) => create_token(&user, key)?,
            None => {
                tracing::debug!(user_id, "Issuing token for unknown user");
                create_token_for(user_id, &[], "", key)?
            }
        };
        Ok(token)
    }

    /// Check a local username/password pair.
    ///
    /// `username` may also be an email. Any mismatch yields `None`.
    pub async fn validate_local_user(
        &self,
        username: &str,
        password: &str,
    ) -> Result<Option<User>, UserError> {
        let user = match self.find_by_email_or_username(username).await? {
            Some(user) => user,
            None => return Ok(None),
        };
        if verify_local_password(&user, password) {
            Ok(Some(user))
        } else {
            tracing::debug!(user_id = %user.id, "Local password rejected");
            Ok(None)
        }
    }

    /// Make sure an administrator account exists and holds the
    /// cluster-admin role, optionally with a local password.
    pub async fn ensure_admin(
        &self,
        username: &str,
        password: Option<&str>,
        policy: &PermissionPolicy,
    ) -> Result<User, UserError> {
        let (mut user, mut changed) = match self.find_by_id(username).await? {
            Some(user) => (user, false),
            None => (self.create("", username).await?, true),
        };

        if !policy.is_cluster_admin(&user) {
            user.add_other_role(policy.cluster_admin_role());
            changed = true;
        }
        if let Some(password) = password {
            if !verify_local_password(&user, password) {
                add_local_password(&mut user, password)?;
                changed = true;
            }
        }

        if changed {
            self.save(&mut user).await?;
            tracing::info!(user_id = %user.id, "Admin user ready");
        }
        Ok(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, MockDocumentStore};
    use crate::test_util;
    use claim::{assert_none, assert_ok, assert_some};
    use serde_json::json;

    fn user_doc(id: &str, rev: &str, emails: &[&str]) -> Document {
        Document {
            id: id.to_string(),
            rev: Some(rev.to_string()),
            body: json!({ "user_id": id, "name": "", "emails": emails }),
        }
    }

    #[tokio::test]
    async fn test_create_requires_identity() {
        let users = test_util::memory_user_store();
        let err = users.create("", "").await.unwrap_err();
        assert!(matches!(err, UserError::Validation));
        assert_eq!(err.to_string(), "at least one of username and email is required");
    }

    #[tokio::test]
    async fn test_create_with_email_only() {
        let users = test_util::memory_user_store();
        let user = users.create("Bob@Example.com", "").await.unwrap();
        assert_eq!(user.id, "bob@example.com");
        assert_eq!(user.emails(), &["bob@example.com".to_string()]);
        assert!(user.roles().is_empty());
        assert!(user.profiles.is_empty());
        assert_none!(&user.revision);

        // Not persisted until saved.
        assert_none!(users.find_by_id("bob@example.com").await.unwrap());
    }

    #[tokio::test]
    async fn test_create_with_username_and_email() {
        let users = test_util::memory_user_store();
        let user = users.create("bob@example.com", "bobalooba").await.unwrap();
        assert_eq!(user.id, "bobalooba");
        assert_eq!(user.emails(), &["bob@example.com".to_string()]);
    }

    #[tokio::test]
    async fn test_create_rejects_duplicate_email_ignoring_case() {
        let users = test_util::memory_user_store();
        let mut user = users.create("bob@example.com", "").await.unwrap();
        users.save(&mut user).await.unwrap();

        let err = users.create("BOB@Example.com", "").await.unwrap_err();
        assert_eq!(err.to_string(), "user with email 'BOB@Example.com' already exists");

        let err = users.create("Bob@example.com", "someone-else").await.unwrap_err();
        assert!(matches!(err, UserError::Duplicate { field: "email", .. }));
    }

    #[tokio::test]
    async fn test_create_rejects_duplicate_username() {
        let users = test_util::memory_user_store();
        let mut user = users.create("", "bobalooba").await.unwrap();
        users.save(&mut user).await.unwrap();

        let err = users.create("new@example.com", "bobalooba").await.unwrap_err();
        assert_eq!(err.to_string(), "user with username 'bobalooba' already exists");
    }

    #[tokio::test]
    async fn test_find_by_email_is_case_insensitive() {
        let users = test_util::memory_user_store();
        let mut user = users.create("bob@example.com", "bob").await.unwrap();
        users.save(&mut user).await.unwrap();

        let found = assert_some!(users.find_by_email("BOB@EXAMPLE.COM").await.unwrap());
        assert_eq!(found.id, "bob");
        assert_none!(users.find_by_email("alice@example.com").await.unwrap());
    }

    #[tokio::test]
    async fn test_find_by_email_multiple_matches_is_an_error() {
        let mut store = MockDocumentStore::new();
        store.expect_find_by_field().times(1).returning(|_, _| {
            Ok(vec![
                user_doc("a", "1-a", &["dup@example.com"]),
                user_doc("b", "1-b", &["dup@example.com"]),
            ])
        });

        let users = UserStore::new(Arc::new(store));
        let err = users.find_by_email("dup@example.com").await.unwrap_err();
        assert!(matches!(err, UserError::MultipleMatch { ref email } if email == "dup@example.com"));
    }

    #[tokio::test]
    async fn test_find_by_id_surfaces_store_failures() {
        let mut store = MockDocumentStore::new();
        store
            .expect_get()
            .returning(|_| Err(StoreError::Database("disk on fire".to_string())));

        let users = UserStore::new(Arc::new(store));
        assert!(matches!(
            users.find_by_id("bob").await,
            Err(UserError::Store(StoreError::Database(_)))
        ));
    }

    #[tokio::test]
    async fn test_save_assigns_revisions() {
        let users = test_util::memory_user_store();
        let mut user = users.create("", "bob").await.unwrap();
        users.save(&mut user).await.unwrap();
        let first = assert_some!(user.revision.clone());

        user.add_project_role("p", "admin");
        users.save(&mut user).await.unwrap();
        let second = assert_some!(user.revision.clone());
        assert_ne!(first, second);

        let stored = assert_some!(users.find_by_id("bob").await.unwrap());
        assert_eq!(stored, user);
    }

    #[tokio::test]
    async fn test_save_retries_once_with_fetched_revision() {
        let mut store = MockDocumentStore::new();
        store.expect_put().times(2).returning(|doc| {
            if doc.rev.as_deref() == Some("2-current") {
                Ok("3-new".to_string())
            } else {
                Err(StoreError::Conflict(doc.id))
            }
        });
        store
            .expect_get()
            .times(1)
            .returning(|id| Ok(user_doc(id, "2-current", &[])));

        let users = UserStore::new(Arc::new(store));
        let mut user = User::new("bob");
        user.revision = Some("1-stale".to_string());
        user.add_other_role("cluster-admin");

        assert_ok!(users.save(&mut user).await);
        assert_eq!(user.revision.as_deref(), Some("3-new"));
        assert!(user.has_other_role("cluster-admin"));
    }

    #[tokio::test]
    async fn test_save_fails_after_second_conflict() {
        let mut store = MockDocumentStore::new();
        store
            .expect_put()
            .times(2)
            .returning(|doc| Err(StoreError::Conflict(doc.id)));
        store
            .expect_get()
            .times(1)
            .returning(|id| Ok(user_doc(id, "2-current", &[])));

        let users = UserStore::new(Arc::new(store));
        let mut user = User::new("bob");
        user.revision = Some("1-stale".to_string());

        let err = users.save(&mut user).await.unwrap_err();
        assert!(matches!(err, UserError::UpdateConflict { ref id } if id == "bob"));
    }

    #[tokio::test]
    async fn test_save_does_not_retry_other_failures() {
        let mut store = MockDocumentStore::new();
        store
            .expect_put()
            .times(1)
            .returning(|_| Err(StoreError::Database("read-only".to_string())));
        store.expect_get().times(0);

        let users = UserStore::new(Arc::new(store));
        let mut user = User::new("bob");
        assert!(matches!(users.save(&mut user).await, Err(UserError::Store(_))));
    }

    #[tokio::test]
    async fn test_set_project_role_requires_modify() {
        let users = test_util::memory_user_store();
        let policy = PermissionPolicy::default();
        let mut target = users.create("bob@example.com", "bob").await.unwrap();
        users.save(&mut target).await.unwrap();

        let mut actor = User::new("carol");
        actor.add_project_role("nb", "team");

        let err = users
            .set_project_role(&actor, "bob", "nb", "team", true, &policy)
            .await
            .unwrap_err();
        assert!(matches!(err, UserError::PermissionDenied { .. }));

        actor.add_project_role("nb", "admin");
        let updated = users
            .set_project_role(&actor, "bob@example.com", "nb", "team", true, &policy)
            .await
            .unwrap();
        assert!(updated.has_project_role("nb", "team"));

        let revoked = users
            .set_project_role(&actor, "bob", "nb", "team", false, &policy)
            .await
            .unwrap();
        assert!(revoked.project_roles_for("nb").is_empty());
    }

    #[tokio::test]
    async fn test_set_project_role_unknown_target() {
        let users = test_util::memory_user_store();
        let mut admin = User::new("root");
        admin.add_other_role("cluster-admin");

        let err = users
            .set_project_role(&admin, "ghost", "nb", "team", true, &PermissionPolicy::default())
            .await
            .unwrap_err();
        assert!(matches!(err, UserError::UnknownUser(ref id) if id == "ghost"));
    }

    #[tokio::test]
    async fn test_token_for_known_and_unknown_users() {
        let users = test_util::memory_user_store();
        let key = test_util::test_signing_key();
        let mut user = users.create("", "bob").await.unwrap();
        user.add_project_role("nb", "admin");
        users.save(&mut user).await.unwrap();

        let token = users.token_for("bob", &key).await.unwrap();
        let props = crate::auth::verify_token(&token, &key).unwrap();
        assert_eq!(props.roles, vec!["nb||admin".to_string()]);

        let token = users.token_for("nobody", &key).await.unwrap();
        let props = crate::auth::verify_token(&token, &key).unwrap();
        assert_eq!(props.username, "nobody");
        assert!(props.roles.is_empty());
    }

    #[tokio::test]
    async fn test_ensure_admin_is_idempotent() {
        let users = test_util::memory_user_store();
        let policy = PermissionPolicy::default();

        let admin = users.ensure_admin("admin", None, &policy).await.unwrap();
        assert!(policy.is_cluster_admin(&admin));
        let rev = assert_some!(admin.revision.clone());

        let again = users.ensure_admin("admin", None, &policy).await.unwrap();
        assert_eq!(again.revision.as_deref(), Some(rev.as_str()));
        assert_eq!(again.other_roles(), &["cluster-admin".to_string()]);
    }

    #[tokio::test]
    async fn test_ensure_admin_promotes_existing_user() {
        let users = test_util::memory_user_store();
        let mut user = users.create("", "ops").await.unwrap();
        users.save(&mut user).await.unwrap();

        let policy = PermissionPolicy::new("super");
        let admin = users.ensure_admin("ops", Some("hunter2"), &policy).await.unwrap();
        assert!(admin.has_other_role("super"));

        assert_some!(users.validate_local_user("ops", "hunter2").await.unwrap());
        assert_none!(users.validate_local_user("ops", "wrong").await.unwrap());
        assert_none!(users.validate_local_user("nobody", "hunter2").await.unwrap());
    }

    #[tokio::test]
    async fn test_mixed_case_stored_email_is_found_and_blocks_create() {
        let store = Arc::new(MemoryStore::new());
        store
            .put(Document {
                id: "bob".to_string(),
                rev: None,
                body: json!({ "emails": ["Bob@Example.com"] }),
            })
            .await
            .unwrap();
        let users = UserStore::new(store);

        let found = assert_some!(users.find_by_email("bob@example.com").await.unwrap());
        assert_eq!(found.id, "bob");
        assert_eq!(found.emails(), &["bob@example.com".to_string()]);

        let err = users.create("bob@example.com", "").await.unwrap_err();
        assert_eq!(err.to_string(), "user with email 'bob@example.com' already exists");
    }

    #[tokio::test]
    async fn test_token_and_stored_roles_follow_role_changes() {
        let users = test_util::memory_user_store();
        let key = test_util::test_signing_key();
        let policy = PermissionPolicy::default();

        let mut user = users.create("", "bob").await.unwrap();
        user.add_other_role(policy.cluster_admin_role());
        users.save(&mut user).await.unwrap();
        assert!(policy.has_permission(&user, "nb", Action::Modify));

        let props = crate::auth::verify_token(&users.token_for("bob", &key).await.unwrap(), &key).unwrap();
        assert_eq!(props.roles, vec!["cluster-admin".to_string()]);

        user.remove_other_role(policy.cluster_admin_role());
        user.add_project_role("nb", "team");
        users.save(&mut user).await.unwrap();

        let stored = assert_some!(users.find_by_id("bob").await.unwrap());
        assert_eq!(stored.roles(), &["nb||team".to_string()]);
        assert!(!policy.has_permission(&stored, "nb", Action::Modify));
        let props = crate::auth::verify_token(&users.token_for("bob", &key).await.unwrap(), &key).unwrap();
        assert_eq!(props.roles, stored.roles());
    }
}
