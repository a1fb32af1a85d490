use std::str::FromStr;
use std::sync::Arc;

use conductor_common::PublicKeyInfo;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use tokio::sync::OnceCell;

use crate::config::SigningConfig;

#[derive(Debug, thiserror::Error)]
pub enum KeyLoadError {
    #[error("Failed to read key file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Unsupported signing algorithm: {0}")]
    UnsupportedAlgorithm(String),
    #[error("Invalid key in {path}: {reason}")]
    InvalidKey { path: String, reason: String },
}

#[derive(Debug, Clone, Copy)]
enum KeyFamily {
    Rsa,
    Ec,
    Ed,
}

impl KeyFamily {
    fn of(alg: Algorithm) -> Option<Self> {
        match alg {
            Algorithm::RS256
            | Algorithm::RS384
            | Algorithm::RS512
            | Algorithm::PS256
            | Algorithm::PS384
            | Algorithm::PS512 => Some(KeyFamily::Rsa),
            Algorithm::ES256 | Algorithm::ES384 => Some(KeyFamily::Ec),
            Algorithm::EdDSA => Some(KeyFamily::Ed),
            // HMAC (symmetric) algorithms are not accepted.
            _ => None,
        }
    }

    fn encoding_key(self, pem: &[u8]) -> jsonwebtoken::errors::Result<EncodingKey> {
        match self {
            KeyFamily::Rsa => EncodingKey::from_rsa_pem(pem),
            KeyFamily::Ec => EncodingKey::from_ec_pem(pem),
            KeyFamily::Ed => EncodingKey::from_ed_pem(pem),
        }
    }

    fn decoding_key(self, pem: &[u8]) -> jsonwebtoken::errors::Result<DecodingKey> {
        match self {
            KeyFamily::Rsa => DecodingKey::from_rsa_pem(pem),
            KeyFamily::Ec => DecodingKey::from_ec_pem(pem),
            KeyFamily::Ed => DecodingKey::from_ed_pem(pem),
        }
    }
}

/// Asymmetric key pair used to sign and verify client tokens.
pub struct SigningKey {
    alg: Algorithm,
    /// Algorithm as configured; its JWS name.
    alg_name: String,
    kid: String,
    instance_name: String,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    public_key_pem: String,
}

impl std::fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningKey")
            .field("alg", &self.alg)
            .field("kid", &self.kid)
            .field("instance_name", &self.instance_name)
            .finish_non_exhaustive()
    }
}

impl SigningKey {
    /// Build a key from PEM text: PKCS#8 private key and SPKI public key.
    pub fn from_pem(
        algorithm: &str,
        kid: &str,
        instance_name: &str,
        private_pem: &str,
        public_pem: &str,
    ) -> Result<Self, KeyLoadError> {
        Self::build(
            algorithm,
            kid,
            instance_name,
            (private_pem, "<private key>"),
            (public_pem, "<public key>"),
        )
    }

    fn build(
        algorithm: &str,
        kid: &str,
        instance_name: &str,
        (private_pem, private_path): (&str, &str),
        (public_pem, public_path): (&str, &str),
    ) -> Result<Self, KeyLoadError> {
        let alg = Algorithm::from_str(algorithm)
            .map_err(|_| KeyLoadError::UnsupportedAlgorithm(algorithm.to_string()))?;
        let family =
            KeyFamily::of(alg).ok_or_else(|| KeyLoadError::UnsupportedAlgorithm(algorithm.to_string()))?;

        let encoding_key =
            family
                .encoding_key(private_pem.as_bytes())
                .map_err(|e| KeyLoadError::InvalidKey {
                    path: private_path.to_string(),
                    reason: e.to_string(),
                })?;
        let decoding_key =
            family
                .decoding_key(public_pem.as_bytes())
                .map_err(|e| KeyLoadError::InvalidKey {
                    path: public_path.to_string(),
                    reason: e.to_string(),
                })?;

        let key = Self {
            alg,
            alg_name: algorithm.to_string(),
            kid: kid.to_string(),
            instance_name: instance_name.to_string(),
            encoding_key,
            decoding_key,
            public_key_pem: public_pem.to_string(),
        };
        key.check_pair().map_err(|reason| KeyLoadError::InvalidKey {
            path: public_path.to_string(),
            reason,
        })?;
        Ok(key)
    }

    /// Sign and verify a sample claim set so a mismatched pair fails at load time.
    fn check_pair(&self) -> Result<(), String> {
        let sample = serde_json::json!({ "iss": self.instance_name });
        let token = encode(&Header::new(self.alg), &sample, &self.encoding_key)
            .map_err(|e| e.to_string())?;
        decode::<serde_json::Value>(&token, &self.decoding_key, &self.validation())
            .map(|_| ())
            .map_err(|_| "public key does not match private key".to_string())
    }

    /// Validation rules for tokens signed by this key: signature and
    /// algorithm only, no registered claims required.
    pub(crate) fn validation(&self) -> Validation {
        let mut validation = Validation::new(self.alg);
        validation.required_spec_claims.clear();
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation
    }

    pub fn algorithm(&self) -> Algorithm {
        self.alg
    }

    pub fn key_id(&self) -> &str {
        &self.kid
    }

    pub fn instance_name(&self) -> &str {
        &self.instance_name
    }

    pub fn public_key_pem(&self) -> &str {
        &self.public_key_pem
    }

    pub(crate) fn encoding_key(&self) -> &EncodingKey {
        &self.encoding_key
    }

    pub(crate) fn decoding_key(&self) -> &DecodingKey {
        &self.decoding_key
    }

    /// Public half of the key for distribution to clients.
    pub fn public_info(&self) -> PublicKeyInfo {
        PublicKeyInfo {
            alg: self.alg_name.clone(),
            kid: self.kid.clone(),
            instance_name: self.instance_name.clone(),
            public_key: self.public_key_pem.clone(),
        }
    }
}

async fn read_key_file(path: &str) -> Result<String, KeyLoadError> {
    tokio::fs::read_to_string(path)
        .await
        .map_err(|source| KeyLoadError::Read {
            path: path.to_string(),
            source,
        })
}

/// Read and parse the configured key pair.
pub async fn load_signing_key(config: &SigningConfig) -> Result<SigningKey, KeyLoadError> {
    let private_pem = read_key_file(&config.private_key_file).await?;
    let public_pem = read_key_file(&config.public_key_file).await?;

    let key = SigningKey::build(
        &config.algorithm,
        &config.key_id,
        &config.instance_name,
        (&private_pem, &config.private_key_file),
        (&public_pem, &config.public_key_file),
    )?;

    tracing::info!(
        alg = %config.algorithm,
        kid = %config.key_id,
        instance = %config.instance_name,
        "Loaded signing key"
    );
    Ok(key)
}

static SIGNING_KEY: OnceCell<Arc<SigningKey>> = OnceCell::const_new();

/// Process-wide signing key, loaded on first successful call.
///
/// Later calls return the cached key without touching `config` or the
/// filesystem. A failed load leaves the cell empty.
pub async fn signing_key(config: &SigningConfig) -> Result<Arc<SigningKey>, KeyLoadError> {
    SIGNING_KEY
        .get_or_try_init(|| async { load_signing_key(config).await.map(Arc::new) })
        .await
        .map(Arc::clone)
}
