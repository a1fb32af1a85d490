//! Configuration for the conductor.

use config::{Config as ConfigLoader, ConfigError, Environment, File};
use serde::Deserialize;

/// Main configuration structure.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub signing: SigningConfig,
    #[serde(default)]
    pub roles: RolesConfig,
    #[serde(default)]
    pub admin: AdminConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite file holding the users and invites databases.
    #[serde(default = "default_database_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Token signing key configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SigningConfig {
    /// JWS algorithm name, e.g. "RS256" or "ES256".
    #[serde(default = "default_algorithm")]
    pub algorithm: String,
    /// Instance name, used as the token issuer.
    #[serde(default = "default_instance_name")]
    pub instance_name: String,
    /// Key id placed in token headers.
    #[serde(default = "default_key_id")]
    pub key_id: String,
    /// PKCS#8 PEM private key.
    #[serde(default = "default_private_key_file")]
    pub private_key_file: String,
    /// SPKI PEM public key.
    #[serde(default = "default_public_key_file")]
    pub public_key_file: String,
}

impl Default for SigningConfig {
    fn default() -> Self {
        Self {
            algorithm: default_algorithm(),
            instance_name: default_instance_name(),
            key_id: default_key_id(),
            private_key_file: default_private_key_file(),
            public_key_file: default_public_key_file(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RolesConfig {
    /// Global role marking a cluster administrator.
    #[serde(default = "default_cluster_admin_role")]
    pub cluster_admin_role: String,
}

impl Default for RolesConfig {
    fn default() -> Self {
        Self {
            cluster_admin_role: default_cluster_admin_role(),
        }
    }
}

/// Administrator account created at startup if missing.
#[derive(Debug, Clone, Deserialize)]
pub struct AdminConfig {
    #[serde(default = "default_admin_username")]
    pub username: String,
    /// Local password for the admin account. No local login when unset.
    #[serde(default)]
    pub password: Option<String>,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            username: default_admin_username(),
            password: None,
        }
    }
}

// Default values
fn default_database_path() -> String {
    "data/conductor.db".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_algorithm() -> String {
    "RS256".to_string()
}
fn default_instance_name() -> String {
    "test".to_string()
}
fn default_key_id() -> String {
    "test_key".to_string()
}
fn default_private_key_file() -> String {
    "private_key.pem".to_string()
}
fn default_public_key_file() -> String {
    "public_key.pem".to_string()
}
fn default_cluster_admin_role() -> String {
    "cluster-admin".to_string()
}
fn default_admin_username() -> String {
    "admin".to_string()
}

impl Config {
    /// Load configuration from file and environment variables.
    ///
    /// Configuration sources (in order of precedence):
    /// 1. Environment variables (CONDUCTOR__SECTION__KEY format)
    /// 2. conductor.toml file (if present)
    /// 3. Built-in defaults
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(ConfigLoader::builder().add_source(File::with_name("conductor").required(false)))
    }

    fn load_from(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
    ) -> Result<Self, ConfigError> {
        let config = builder
            .add_source(
                Environment::with_prefix("CONDUCTOR")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}
