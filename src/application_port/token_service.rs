use crate::domain_model::*;
use crate::domain_port::RefreshTokenRecord;
use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("invalid access token")]
    InvalidAccessToken,
    #[error("invalid refresh token")]
    InvalidRefreshToken,
    #[error("no such refresh token")]
    NoSuchRefreshToken,
    #[error("refresh token expired")]
    RefreshTokenExpired,
    #[error("user not found")]
    UserNotFound,
    #[error("store error: {0}")]
    Store(String),
    #[error("internal error: {0}")]
    InternalError(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct AccessToken(pub String);

#[derive(Debug, Clone, Serialize)]
pub struct RefreshToken(pub String);

#[derive(Debug, Clone, Serialize)]
pub struct TokenPair {
    pub access_token: AccessToken,
    pub refresh_token: RefreshToken,
    pub access_token_expires_at: DateTime<Utc>,
    pub refresh_token_expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct AccessTokenClaims {
    pub user_id: UserId,
    pub role: Role,
}

#[derive(Debug, Clone)]
pub struct RefreshTokenClaims {
    pub record_id: RefreshTokenId,
    pub user_id: UserId,
}

/// Stateless signer/verifier for self-contained bearer tokens. No state
/// beyond the signing secret and configured lifetimes; safe to share
/// across workers without locking.
#[async_trait::async_trait]
pub trait TokenCodec: Send + Sync {
    async fn issue_access_token(
        &self,
        user: UserId,
        role: Role,
    ) -> Result<(AccessToken, DateTime<Utc>), TokenError>;
    async fn issue_refresh_token(
        &self,
        record_id: RefreshTokenId,
        user: UserId,
    ) -> Result<(RefreshToken, DateTime<Utc>), TokenError>;
    async fn verify_access_token(&self, token: &AccessToken)
    -> Result<AccessTokenClaims, TokenError>;
    async fn verify_refresh_token(
        &self,
        token: &RefreshToken,
    ) -> Result<RefreshTokenClaims, TokenError>;
}

/// The state machine governing a user's refresh-token lineage.
#[async_trait::async_trait]
pub trait TokenService: Send + Sync {
    /// Mint a fresh access/refresh pair backed by a new Active record.
    /// Entry point right after signup/login.
    async fn issue(&self, user: UserId, role: Role) -> Result<TokenPair, TokenError>;

    /// Read-only validity check. `NoSuchRefreshToken` when the embedded id
    /// has no record, `RefreshTokenExpired` when revoked or past expiry.
    async fn validate(&self, token: &RefreshToken) -> Result<RefreshTokenRecord, TokenError>;

    /// Revoke the presented token's record and issue a replacement pair.
    /// At most one rotation per record ever succeeds: a caller that loses
    /// the race gets `RefreshTokenExpired`, never a second live pair.
    async fn rotate(&self, token: &RefreshToken) -> Result<TokenPair, TokenError>;

    /// Explicit logout. Idempotent; revoking an already-revoked token
    /// succeeds.
    async fn revoke(&self, token: &RefreshToken) -> Result<(), TokenError>;

    /// Invalidate every refresh token belonging to `user` (deactivation,
    /// detected compromise).
    async fn revoke_all_by_owner(&self, user: UserId) -> Result<(), TokenError>;
}
