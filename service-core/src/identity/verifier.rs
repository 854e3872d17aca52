use super::claims::{AccessTokenClaims, CLAIMS_VERSION};
use crate::error::AppError;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode, errors::ErrorKind};
use std::path::Path;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VerifyError {
    #[error("token expired")]
    Expired,
    #[error("token invalid: {0}")]
    Invalid(String),
    #[error("unsupported claims version {0}")]
    UnsupportedVersion(u32),
}

/// Local, network-free verification of issuer-signed access tokens.
#[derive(Clone)]
pub struct TokenVerifier {
    decoding_key: Arc<DecodingKey>,
    issuer: String,
}

impl TokenVerifier {
    pub fn from_rsa_pem(public_key_pem: &[u8], issuer: impl Into<String>) -> Result<Self, AppError> {
        let decoding_key = DecodingKey::from_rsa_pem(public_key_pem)
            .map_err(|e| AppError::ConfigError(anyhow::anyhow!("Invalid RSA public key: {}", e)))?;

        Ok(Self {
            decoding_key: Arc::new(decoding_key),
            issuer: issuer.into(),
        })
    }

    pub fn from_pem_file(path: impl AsRef<Path>, issuer: impl Into<String>) -> Result<Self, AppError> {
        let path = path.as_ref();
        let pem = std::fs::read(path).map_err(|e| {
            AppError::ConfigError(anyhow::anyhow!(
                "Failed to read public key from {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_rsa_pem(&pem, issuer)
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Verify signature, issuer, expiry (no leeway) and schema version. When
    /// `audience` is given the token must have been minted for that client.
    pub fn verify_access_token(
        &self,
        token: &str,
        audience: Option<&str>,
    ) -> Result<AccessTokenClaims, VerifyError> {
        let mut validation = Validation::new(Algorithm::RS256);
        validation.leeway = 0;
        validation.set_issuer(&[self.issuer.as_str()]);
        validation.set_required_spec_claims(&["exp", "iat", "sub", "iss", "aud"]);
        match audience {
            Some(aud) => validation.set_audience(&[aud]),
            None => validation.validate_aud = false,
        }

        let data = decode::<AccessTokenClaims>(token, &self.decoding_key, &validation)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => VerifyError::Expired,
                _ => VerifyError::Invalid(e.to_string()),
            })?;

        if data.claims.ver != CLAIMS_VERSION {
            return Err(VerifyError::UnsupportedVersion(data.claims.ver));
        }

        Ok(data.claims)
    }
}
