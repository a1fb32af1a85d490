//! Bearer token payload shared with client applications.

use serde::{Deserialize, Serialize};

/// Claim carrying the flat role list, as read by the database's JWT handler.
pub const ROLES_CLAIM: &str = "_couchdb.roles";

/// Token payload.
///
/// Field order is the serialized claim order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Flat role list (see [`crate::roles`]).
    #[serde(rename = "_couchdb.roles", default)]
    pub roles: Vec<String>,
    /// Display name of the user.
    #[serde(default)]
    pub name: String,
    /// User id.
    pub sub: String,
    /// Issued-at, seconds since the Unix epoch.
    pub iat: i64,
    /// Issuing instance name.
    pub iss: String,
}

/// Public half of a signing key, handed to clients so they can verify
/// tokens offline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicKeyInfo {
    /// JWS algorithm, e.g. "RS256".
    pub alg: String,
    /// Key id carried in token headers.
    pub kid: String,
    /// Instance name used as the token issuer.
    pub instance_name: String,
    /// PEM-encoded public key.
    pub public_key: String,
}
