use crate::db::StoreError;
use service_core::error::AppError;
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum TokenError {
    /// Unknown, expired, used or mismatched code or refresh token.
    #[error("invalid grant: {0}")]
    InvalidGrant(&'static str),

    /// A rotated or revoked refresh token was replayed; its family is gone.
    #[error("refresh token reuse detected for family {family_id}")]
    RefreshTheftSuspected { family_id: Uuid },

    #[error("tenant is suspended")]
    TenantSuspended,

    #[error("user is disabled")]
    UserDisabled,

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("signing error: {0}")]
    Signing(anyhow::Error),
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        AppError::DatabaseError(anyhow::Error::new(err))
    }
}
