//! Session token verification.
//!
//! Sessions are JWTs minted by the identity provider. We only verify them:
//! HS256 with a shared secret, or RS256 with the provider's public key.

use crate::config::AuthConfig;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use std::fs;

/// Claims we rely on. `sub` is the application user id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    pub sub: String,
    pub exp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

#[derive(Clone)]
pub struct SessionVerifier {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl SessionVerifier {
    pub fn new(config: &AuthConfig) -> Result<Self, anyhow::Error> {
        if let Some(path) = &config.jwt_public_key_path {
            let public_key_pem = fs::read_to_string(path).map_err(|e| {
                anyhow::anyhow!("Failed to read public key from {}: {}", path, e)
            })?;
            let decoding_key = DecodingKey::from_rsa_pem(public_key_pem.as_bytes())
                .map_err(|e| anyhow::anyhow!("Failed to parse public key: {}", e))?;

            tracing::info!("Session verifier initialized with RS256 public key");
            return Ok(Self::with_key(decoding_key, Algorithm::RS256, config.issuer.as_deref()));
        }

        let secret = config
            .jwt_secret
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("No session signing key configured"))?;

        tracing::info!("Session verifier initialized with HS256 shared secret");
        Ok(Self::from_secret(secret.expose_secret(), config.issuer.as_deref()))
    }

    pub fn from_secret(secret: &str, issuer: Option<&str>) -> Self {
        Self::with_key(
            DecodingKey::from_secret(secret.as_bytes()),
            Algorithm::HS256,
            issuer,
        )
    }

    fn with_key(decoding_key: DecodingKey, algorithm: Algorithm, issuer: Option<&str>) -> Self {
        let mut validation = Validation::new(algorithm);
        validation.validate_exp = true;
        validation.set_required_spec_claims(&["exp", "sub"]);
        if let Some(iss) = issuer {
            validation.set_issuer(&[iss]);
        }

        Self {
            decoding_key,
            validation,
        }
    }

    pub fn verify(&self, token: &str) -> Result<SessionClaims, anyhow::Error> {
        let token_data = decode::<SessionClaims>(token, &self.decoding_key, &self.validation)
            .map_err(|e| anyhow::anyhow!("Invalid session token: {}", e))?;

        if token_data.claims.sub.trim().is_empty() {
            return Err(anyhow::anyhow!("Session token has an empty subject"));
        }

        Ok(token_data.claims)
    }
}
