//! Local username/password profiles.
//!
//! The password hash lives in the user's `local` profile as
//! `{"password": <hex>, "salt": <hex>}`.

use pbkdf2::pbkdf2_hmac;
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use super::UserError;
use crate::models::User;

/// Profile key for local credentials.
pub const LOCAL_PROVIDER: &str = "local";

const ROUNDS: u32 = 100_000;
const HASH_LEN: usize = 64;
const SALT_LEN: usize = 16;

#[derive(Debug, Serialize, Deserialize)]
struct LocalProfile {
    password: String,
    salt: String,
}

fn hash_password(password: &str, salt: &[u8]) -> Vec<u8> {
    let mut hash = vec![0u8; HASH_LEN];
    pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, ROUNDS, &mut hash);
    hash
}

fn local_profile(user: &User) -> Option<LocalProfile> {
    let value = user.profiles.get(LOCAL_PROVIDER)?;
    serde_json::from_value(value.clone()).ok()
}

/// Set or replace the user's local password.
pub fn add_local_password(user: &mut User, password: &str) -> Result<(), UserError> {
    if password.is_empty() {
        return Err(UserError::Password("password must not be empty".to_string()));
    }

    let salt: [u8; SALT_LEN] = rand::random();
    let profile = LocalProfile {
        password: hex::encode(hash_password(password, &salt)),
        salt: hex::encode(salt),
    };
    let value = serde_json::to_value(&profile)
        .map_err(|e| UserError::Password(e.to_string()))?;
    user.profiles.insert(LOCAL_PROVIDER.to_string(), value);
    Ok(())
}

pub fn has_local_password(user: &User) -> bool {
    local_profile(user).is_some()
}

/// Whether `password` matches the stored local password.
///
/// Users without a (well-formed) local profile never match.
pub fn verify_local_password(user: &User, password: &str) -> bool {
    let Some(profile) = local_profile(user) else {
        return false;
    };
    let (Ok(expected), Ok(salt)) = (hex::decode(&profile.password), hex::decode(&profile.salt)) else {
        return false;
    };

    let actual = hash_password(password, &salt);
    actual.len() == expected.len()
        && actual
            .iter()
            .zip(expected.iter())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
}
