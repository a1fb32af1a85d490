//! Conductor Common Types
//!
//! Wire-level types shared by the Conductor server and the client
//! applications that consume its tokens and role data.

pub mod roles;
pub mod token;

pub use roles::{from_flat_roles, to_flat_roles, ProjectRoles, Role, ROLE_SEPARATOR};
pub use token::{PublicKeyInfo, TokenClaims, ROLES_CLAIM};
