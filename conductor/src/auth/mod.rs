pub mod keys;
pub mod token;

pub use keys::{load_signing_key, signing_key, KeyLoadError, SigningKey};
pub use token::{create_token, create_token_for, verify_token, TokenError, TokenProps};
