//! Fixtures shared by unit and integration tests.

use std::path::Path;
use std::sync::Arc;

use crate::auth::SigningKey;
use crate::config::SigningConfig;
use crate::models::User;
use crate::store::MemoryStore;
use crate::users::UserStore;

pub const TEST_KEY_ID: &str = "test_key";
pub const TEST_INSTANCE_NAME: &str = "test";

pub const RSA_PRIVATE_KEY: &str = include_str!("../../tests/fixtures/rsa_private.pem");
pub const RSA_PUBLIC_KEY: &str = include_str!("../../tests/fixtures/rsa_public.pem");
pub const RSA_OTHER_PRIVATE_KEY: &str = include_str!("../../tests/fixtures/rsa_other_private.pem");
pub const RSA_OTHER_PUBLIC_KEY: &str = include_str!("../../tests/fixtures/rsa_other_public.pem");
pub const EC_PRIVATE_KEY: &str = include_str!("../../tests/fixtures/ec_private.pem");
pub const EC_PUBLIC_KEY: &str = include_str!("../../tests/fixtures/ec_public.pem");

fn signing_key(algorithm: &str, private_pem: &str, public_pem: &str) -> SigningKey {
    SigningKey::from_pem(algorithm, TEST_KEY_ID, TEST_INSTANCE_NAME, private_pem, public_pem)
        .expect("test key fixture should load")
}

/// RS256 key built from the fixture pair.
pub fn test_signing_key() -> SigningKey {
    signing_key("RS256", RSA_PRIVATE_KEY, RSA_PUBLIC_KEY)
}

/// A second RS256 key, unrelated to [`test_signing_key`].
pub fn other_signing_key() -> SigningKey {
    signing_key("RS256", RSA_OTHER_PRIVATE_KEY, RSA_OTHER_PUBLIC_KEY)
}

/// ES256 (P-256) key.
pub fn ec_signing_key() -> SigningKey {
    signing_key("ES256", EC_PRIVATE_KEY, EC_PUBLIC_KEY)
}

/// Write a key pair into `dir` and return an RS256 config pointing at it.
pub fn write_key_files(dir: &Path, private_pem: &str, public_pem: &str) -> SigningConfig {
    let private_path = dir.join("private_key.pem");
    let public_path = dir.join("public_key.pem");
    std::fs::write(&private_path, private_pem).expect("write private key");
    std::fs::write(&public_path, public_pem).expect("write public key");

    SigningConfig {
        algorithm: "RS256".to_string(),
        instance_name: TEST_INSTANCE_NAME.to_string(),
        key_id: TEST_KEY_ID.to_string(),
        private_key_file: private_path.display().to_string(),
        public_key_file: public_path.display().to_string(),
    }
}

/// User store over a fresh in-memory backend.
pub fn memory_user_store() -> UserStore {
    UserStore::new(Arc::new(MemoryStore::new()))
}

/// Unsaved user holding the given project and global roles.
pub fn user_with_roles(id: &str, project_roles: &[(&str, &str)], other_roles: &[&str]) -> User {
    let mut user = User::new(id);
    for (project, role) in project_roles {
        user.add_project_role(project, role);
    }
    for role in other_roles {
        user.add_other_role(role);
    }
    user
}
