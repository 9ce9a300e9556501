use crate::domain_model::*;
use chrono::{DateTime, Utc};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The stored version advanced since the record was read. Only
    /// `TokenService` may observe this; it never crosses the API boundary.
    #[error("concurrent modification")]
    ConcurrentModification,
    #[error("store error: {0}")]
    Backend(String),
}

#[derive(Debug, Clone)]
pub struct RefreshTokenRecord {
    pub id: RefreshTokenId,
    pub owner_user_id: UserId,
    pub expires_at: DateTime<Utc>,
    pub revoked: bool,
    /// Bumped by the store on every successful save. `save` writes only if
    /// the stored version still matches the one read here.
    pub version: i64,
    pub created_at: DateTime<Utc>,
}

impl RefreshTokenRecord {
    /// A record is usable iff it has not been revoked and has not expired.
    /// `now` is read once by the caller; expiry never extends.
    pub fn is_usable(&self, now: DateTime<Utc>) -> bool {
        !self.revoked && now < self.expires_at
    }
}

/// Authoritative state of refresh-token records. The only place where
/// `revoked` and `version` change.
#[async_trait::async_trait]
pub trait RefreshTokenRepo: Send + Sync {
    /// Allocate a fresh id and persist a new record with `revoked = false`
    /// and `version = 0`.
    async fn create(
        &self,
        owner: UserId,
        expires_at: DateTime<Utc>,
    ) -> Result<RefreshTokenRecord, StoreError>;

    async fn find_by_id(&self, id: RefreshTokenId)
    -> Result<Option<RefreshTokenRecord>, StoreError>;

    /// Persist `record` iff the stored version equals `record.version`,
    /// bumping the stored version. Fails with `ConcurrentModification`
    /// otherwise; this check is what makes rotation single-use across
    /// concurrent requests and across instances.
    async fn save(&self, record: &RefreshTokenRecord) -> Result<(), StoreError>;

    /// Mark every non-revoked record owned by `owner` as revoked.
    /// Best-effort; per-record atomicity only. Returns how many flipped.
    async fn revoke_all_by_owner(&self, owner: UserId) -> Result<u64, StoreError>;

    /// Delete records past `expires_at`. Revoked-but-unexpired records are
    /// kept so replayed tokens keep failing deterministically. Used by the
    /// background sweeper, never by the request path.
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError>;
}
