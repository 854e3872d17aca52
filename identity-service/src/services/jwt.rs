use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use rsa::RsaPublicKey;
use rsa::pkcs8::DecodePublicKey;
use rsa::traits::PublicKeyParts;
use serde::{Deserialize, Serialize};
use service_core::error::AppError;
use service_core::identity::{AccessTokenClaims, TokenVerifier};
use std::fs;
use std::sync::Arc;
use uuid::Uuid;

use crate::config::JwtConfig;

/// Audience of the issuer's own browser session cookie. Never accepted by a
/// module, which only accepts its own client_id.
pub const SESSION_AUDIENCE: &str = "identity-session";

/// Claims of the `idp_session` cookie.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    pub iss: String,
    pub aud: String,
    pub sub: Uuid,
    pub tenant_id: Uuid,
    pub iat: i64,
    pub exp: i64,
    pub sid: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Jwk {
    pub kty: String,
    #[serde(rename = "use")]
    pub key_use: String,
    pub alg: String,
    pub kid: String,
    pub n: String,
    pub e: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwkSet {
    pub keys: Vec<Jwk>,
}

/// RS256 signing for access tokens and issuer sessions.
#[derive(Clone)]
pub struct TokenSigner {
    encoding_key: Arc<EncodingKey>,
    decoding_key: Arc<DecodingKey>,
    verifier: TokenVerifier,
    key_id: String,
    issuer: String,
    jwk: Jwk,
}

impl TokenSigner {
    pub fn from_pem(
        private_key_pem: &[u8],
        public_key_pem: &[u8],
        key_id: impl Into<String>,
        issuer: impl Into<String>,
    ) -> Result<Self, AppError> {
        let key_id = key_id.into();
        let issuer = issuer.into();

        let encoding_key = EncodingKey::from_rsa_pem(private_key_pem).map_err(|e| {
            AppError::ConfigError(anyhow::anyhow!("Failed to parse private key: {}", e))
        })?;
        let decoding_key = DecodingKey::from_rsa_pem(public_key_pem).map_err(|e| {
            AppError::ConfigError(anyhow::anyhow!("Failed to parse public key: {}", e))
        })?;
        let verifier = TokenVerifier::from_rsa_pem(public_key_pem, issuer.clone())?;
        let jwk = build_jwk(public_key_pem, &key_id)?;

        Ok(Self {
            encoding_key: Arc::new(encoding_key),
            decoding_key: Arc::new(decoding_key),
            verifier,
            key_id,
            issuer,
            jwk,
        })
    }

    pub fn from_files(config: &JwtConfig, issuer: &str) -> Result<Self, AppError> {
        let private_key_pem = fs::read(&config.private_key_path).map_err(|e| {
            AppError::ConfigError(anyhow::anyhow!(
                "Failed to read private key from {}: {}",
                config.private_key_path,
                e
            ))
        })?;
        let public_key_pem = fs::read(&config.public_key_path).map_err(|e| {
            AppError::ConfigError(anyhow::anyhow!(
                "Failed to read public key from {}: {}",
                config.public_key_path,
                e
            ))
        })?;

        let signer = Self::from_pem(&private_key_pem, &public_key_pem, &config.key_id, issuer)?;
        tracing::info!(kid = %config.key_id, "Token signer initialized with RS256 keys");
        Ok(signer)
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    pub fn verifier(&self) -> &TokenVerifier {
        &self.verifier
    }

    fn header(&self) -> Header {
        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some(self.key_id.clone());
        header
    }

    pub fn sign_access_token(&self, claims: &AccessTokenClaims) -> Result<String, anyhow::Error> {
        encode(&self.header(), claims, &self.encoding_key)
            .map_err(|e| anyhow::anyhow!("Failed to encode access token: {}", e))
    }

    pub fn sign_session(&self, claims: &SessionClaims) -> Result<String, anyhow::Error> {
        encode(&self.header(), claims, &self.encoding_key)
            .map_err(|e| anyhow::anyhow!("Failed to encode session token: {}", e))
    }

    /// `None` for anything that is not a live session minted by this issuer.
    pub fn verify_session(&self, token: &str) -> Option<SessionClaims> {
        let mut validation = Validation::new(Algorithm::RS256);
        validation.leeway = 0;
        validation.set_issuer(&[self.issuer.as_str()]);
        validation.set_audience(&[SESSION_AUDIENCE]);

        decode::<SessionClaims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .ok()
    }

    pub fn jwks(&self) -> JwkSet {
        JwkSet {
            keys: vec![self.jwk.clone()],
        }
    }
}

fn build_jwk(public_key_pem: &[u8], key_id: &str) -> Result<Jwk, AppError> {
    let pem = std::str::from_utf8(public_key_pem)
        .map_err(|e| AppError::ConfigError(anyhow::anyhow!("Public key is not UTF-8: {}", e)))?;
    let public_key = RsaPublicKey::from_public_key_pem(pem).map_err(|e| {
        AppError::ConfigError(anyhow::anyhow!("Public key is not SPKI PEM: {}", e))
    })?;

    Ok(Jwk {
        kty: "RSA".to_string(),
        key_use: "sig".to_string(),
        alg: "RS256".to_string(),
        kid: key_id.to_string(),
        n: URL_SAFE_NO_PAD.encode(public_key.n().to_bytes_be()),
        e: URL_SAFE_NO_PAD.encode(public_key.e().to_bytes_be()),
    })
}
