use chrono::{DateTime, Duration, Utc};
use conductor_common::TokenClaims;
use jsonwebtoken::{decode, encode, Header};

use super::keys::SigningKey;
use crate::models::User;

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("Token creation failed: {0}")]
    Creation(String),
    #[error("Invalid token: {0}")]
    Invalid(String),
}

/// Properties read from a verified token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenProps {
    pub username: String,
    pub roles: Vec<String>,
    pub name: String,
    pub instance_name: String,
    /// Seconds since the Unix epoch.
    pub issued_at: i64,
    pub key_id: Option<String>,
}

impl TokenProps {
    pub fn issued_at_time(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.issued_at, 0)
    }

    /// Whether the token was issued more than `max_age` ago.
    ///
    /// Tokens carry no expiry; callers that want one apply it here.
    pub fn is_older_than(&self, max_age: Duration) -> bool {
        Utc::now().timestamp().saturating_sub(self.issued_at) > max_age.num_seconds()
    }
}

/// Issue a token carrying the user's id, flat roles and display name.
pub fn create_token(user: &User, key: &SigningKey) -> Result<String, TokenError> {
    create_token_for(&user.id, user.roles(), &user.name, key)
}

/// Issue a token for an explicit username and role list.
pub fn create_token_for(
    username: &str,
    roles: &[String],
    name: &str,
    key: &SigningKey,
) -> Result<String, TokenError> {
    let claims = TokenClaims {
        roles: roles.to_vec(),
        name: name.to_string(),
        sub: username.to_string(),
        iat: Utc::now().timestamp(),
        iss: key.instance_name().to_string(),
    };

    let header = Header {
        typ: None,
        alg: key.algorithm(),
        kid: Some(key.key_id().to_string()),
        ..Default::default()
    };

    encode(&header, &claims, key.encoding_key()).map_err(|e| TokenError::Creation(e.to_string()))
}

/// Check a token's signature and algorithm and return its properties.
///
/// No expiry is enforced; see [`TokenProps::is_older_than`].
pub fn verify_token(token: &str, key: &SigningKey) -> Result<TokenProps, TokenError> {
    let token_data = decode::<TokenClaims>(token, key.decoding_key(), &key.validation())
        .map_err(|e| {
            tracing::debug!("Token verification failed: {}", e);
            TokenError::Invalid(e.to_string())
        })?;

    Ok(TokenProps {
        username: token_data.claims.sub,
        roles: token_data.claims.roles,
        name: token_data.claims.name,
        instance_name: token_data.claims.iss,
        issued_at: token_data.claims.iat,
        key_id: token_data.header.kid,
    })
}
