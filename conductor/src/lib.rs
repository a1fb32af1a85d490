pub mod config;
pub mod auth;
pub mod store;
pub mod models;
pub mod users;
pub mod invites;
pub mod permissions;
pub mod logging;
pub mod test_util;

pub use config::{Config, SigningConfig};
pub use auth::{create_token, signing_key, verify_token, KeyLoadError, SigningKey, TokenError, TokenProps};
pub use store::{Document, DocumentStore, MemoryStore, SqliteStore, StoreError};
pub use models::{RoleInvite, User};
pub use users::{UserError, UserStore};
pub use invites::InviteStore;
pub use permissions::{Action, PermissionPolicy};

/// Logical database holding user records.
pub const USERS_DB: &str = "users";
/// Logical database holding role invites.
pub const INVITES_DB: &str = "invites";
