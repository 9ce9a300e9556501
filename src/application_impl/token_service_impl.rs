use crate::application_port::*;
use crate::domain_model::*;
use crate::domain_port::{RefreshTokenRecord, RefreshTokenRepo, StoreError, UserRepo};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

pub struct RealTokenService {
    token_codec: Arc<dyn TokenCodec>,
    refresh_repo: Arc<dyn RefreshTokenRepo>,
    user_repo: Arc<dyn UserRepo>,
    refresh_ttl: Duration,
}

impl RealTokenService {
    pub fn new(
        token_codec: Arc<dyn TokenCodec>,
        refresh_repo: Arc<dyn RefreshTokenRepo>,
        user_repo: Arc<dyn UserRepo>,
        refresh_ttl: Duration,
    ) -> Self {
        Self {
            token_codec,
            refresh_repo,
            user_repo,
            refresh_ttl,
        }
    }

    fn store_err(e: StoreError) -> TokenError {
        match e {
            // Never leaks past this service; rotation maps it separately.
            StoreError::ConcurrentModification => TokenError::RefreshTokenExpired,
            StoreError::Backend(msg) => TokenError::Store(msg),
        }
    }

    async fn load_active_user(&self, user_id: UserId) -> Result<(UserId, Role), TokenError> {
        let user = self
            .user_repo
            .find_by_id(user_id)
            .await
            .map_err(|e| TokenError::Store(e.to_string()))?
            .ok_or(TokenError::UserNotFound)?;
        if !user.is_active {
            return Err(TokenError::UserNotFound);
        }
        Ok((user.user_id, user.role))
    }
}

#[async_trait::async_trait]
impl TokenService for RealTokenService {
    async fn issue(&self, user: UserId, role: Role) -> Result<TokenPair, TokenError> {
        let expires_at = Utc::now() + self.refresh_ttl;
        let record = self
            .refresh_repo
            .create(user, expires_at)
            .await
            .map_err(Self::store_err)?;

        let (access_token, access_exp) = self.token_codec.issue_access_token(user, role).await?;
        let (refresh_token, refresh_exp) =
            self.token_codec.issue_refresh_token(record.id, user).await?;

        Ok(TokenPair {
            access_token,
            refresh_token,
            access_token_expires_at: access_exp,
            refresh_token_expires_at: refresh_exp,
        })
    }

    async fn validate(&self, token: &RefreshToken) -> Result<RefreshTokenRecord, TokenError> {
        let claims = self.token_codec.verify_refresh_token(token).await?;

        let record = self
            .refresh_repo
            .find_by_id(claims.record_id)
            .await
            .map_err(Self::store_err)?
            .ok_or(TokenError::NoSuchRefreshToken)?;

        if record.owner_user_id != claims.user_id {
            return Err(TokenError::InvalidRefreshToken);
        }

        // Single clock read for the whole check.
        if !record.is_usable(Utc::now()) {
            return Err(TokenError::RefreshTokenExpired);
        }

        Ok(record)
    }

    async fn rotate(&self, token: &RefreshToken) -> Result<TokenPair, TokenError> {
        let record = self.validate(token).await?;
        let (owner, role) = self.load_active_user(record.owner_user_id).await?;

        // Revoke-then-issue under the store's version check. If another
        // rotation of the same record got there first, this save fails and
        // the caller learns its token is dead; it is never handed a second
        // live pair for the lineage.
        let mut revoked = record;
        revoked.revoked = true;
        match self.refresh_repo.save(&revoked).await {
            Ok(()) => {}
            Err(StoreError::ConcurrentModification) => {
                debug!(record_id = %revoked.id, "lost rotation race");
                return Err(TokenError::RefreshTokenExpired);
            }
            Err(e) => return Err(Self::store_err(e)),
        }

        self.issue(owner, role).await
    }

    async fn revoke(&self, token: &RefreshToken) -> Result<(), TokenError> {
        let claims = self.token_codec.verify_refresh_token(token).await?;

        let record = self
            .refresh_repo
            .find_by_id(claims.record_id)
            .await
            .map_err(Self::store_err)?
            .ok_or(TokenError::NoSuchRefreshToken)?;

        if record.revoked {
            return Ok(());
        }

        let mut revoked = record;
        revoked.revoked = true;
        match self.refresh_repo.save(&revoked).await {
            Ok(()) => Ok(()),
            // Revocation is monotonic: whoever won the race also left the
            // record revoked, which is what this caller asked for.
            Err(StoreError::ConcurrentModification) => Ok(()),
            Err(e) => Err(Self::store_err(e)),
        }
    }

    async fn revoke_all_by_owner(&self, user: UserId) -> Result<(), TokenError> {
        let revoked = self
            .refresh_repo
            .revoke_all_by_owner(user)
            .await
            .map_err(Self::store_err)?;
        debug!(%user, revoked, "revoked all refresh tokens for owner");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application_impl::{JwtConfig, JwtHs256Codec};
    use crate::infra_memory::{MemoryRefreshTokenRepo, MemoryUserRepo};

    const WEEK: Duration = Duration::from_secs(7 * 24 * 60 * 60);

    struct Fixture {
        service: RealTokenService,
        codec: Arc<JwtHs256Codec>,
        refresh_repo: Arc<MemoryRefreshTokenRepo>,
        user_repo: Arc<MemoryUserRepo>,
        user: UserId,
    }

    async fn fixture() -> Fixture {
        let codec = Arc::new(JwtHs256Codec::new(JwtConfig {
            issuer: "gatehouse.auth".to_string(),
            audience: "gatehouse-client".to_string(),
            access_ttl: Duration::from_secs(15 * 60),
            refresh_ttl: WEEK,
            signing_key: b"test-signing-key".to_vec(),
        }));
        let refresh_repo = Arc::new(MemoryRefreshTokenRepo::new());
        let user_repo = Arc::new(MemoryUserRepo::new());

        let user = UserId(uuid::Uuid::new_v4());
        user_repo
            .create(&crate::domain_port::UserRecord {
                user_id: user,
                username: "brian.kernighan".to_string(),
                password_hash: "unused".to_string(),
                role: Role::User,
                is_active: true,
                created_at: Utc::now(),
            })
            .await
            .unwrap();

        let service = RealTokenService::new(
            codec.clone(),
            refresh_repo.clone(),
            user_repo.clone(),
            WEEK,
        );
        Fixture {
            service,
            codec,
            refresh_repo,
            user_repo,
            user,
        }
    }

    #[tokio::test]
    async fn issue_then_validate() {
        let f = fixture().await;
        let pair = f.service.issue(f.user, Role::User).await.unwrap();

        let record = f.service.validate(&pair.refresh_token).await.unwrap();
        assert_eq!(record.owner_user_id, f.user);
        assert!(!record.revoked);
        assert_eq!(record.version, 0);
    }

    #[tokio::test]
    async fn rotate_end_to_end() {
        let f = fixture().await;
        let pair = f.service.issue(f.user, Role::User).await.unwrap();

        let new_pair = f.service.rotate(&pair.refresh_token).await.unwrap();

        // Old refresh token is dead, new one is live.
        let err = f.service.validate(&pair.refresh_token).await.unwrap_err();
        assert!(matches!(err, TokenError::RefreshTokenExpired));
        f.service.validate(&new_pair.refresh_token).await.unwrap();

        // New access token still verifies to the same identity.
        let claims = f
            .codec
            .verify_access_token(&new_pair.access_token)
            .await
            .unwrap();
        assert_eq!(claims.user_id, f.user);
        assert_eq!(claims.role, Role::User);
    }

    #[tokio::test]
    async fn second_rotation_of_same_token_fails() {
        let f = fixture().await;
        let pair = f.service.issue(f.user, Role::User).await.unwrap();

        f.service.rotate(&pair.refresh_token).await.unwrap();
        let err = f.service.rotate(&pair.refresh_token).await.unwrap_err();
        assert!(matches!(err, TokenError::RefreshTokenExpired));
    }

    #[tokio::test]
    async fn concurrent_rotations_admit_exactly_one_winner() {
        let f = fixture().await;
        let pair = f.service.issue(f.user, Role::User).await.unwrap();

        let (a, b) = tokio::join!(
            f.service.rotate(&pair.refresh_token),
            f.service.rotate(&pair.refresh_token),
        );

        let successes = [&a, &b].iter().filter(|r| r.is_ok()).count();
        assert_eq!(successes, 1, "exactly one rotation may win");
        for r in [a, b] {
            if let Err(e) = r {
                assert!(matches!(e, TokenError::RefreshTokenExpired));
            }
        }
    }

    #[tokio::test]
    async fn revoke_is_idempotent() {
        let f = fixture().await;
        let pair = f.service.issue(f.user, Role::User).await.unwrap();

        f.service.revoke(&pair.refresh_token).await.unwrap();
        f.service.revoke(&pair.refresh_token).await.unwrap();

        let err = f.service.validate(&pair.refresh_token).await.unwrap_err();
        assert!(matches!(err, TokenError::RefreshTokenExpired));
    }

    #[tokio::test]
    async fn revoke_all_kills_every_lineage() {
        let f = fixture().await;
        let pairs = [
            f.service.issue(f.user, Role::User).await.unwrap(),
            f.service.issue(f.user, Role::User).await.unwrap(),
            f.service.issue(f.user, Role::User).await.unwrap(),
        ];

        f.service.revoke_all_by_owner(f.user).await.unwrap();

        for pair in &pairs {
            let err = f.service.validate(&pair.refresh_token).await.unwrap_err();
            assert!(matches!(err, TokenError::RefreshTokenExpired));
        }
    }

    #[tokio::test]
    async fn expired_record_fails_validate() {
        let f = fixture().await;
        // Record already past expiry; the token's own claims are fine.
        let record = f
            .refresh_repo
            .create(f.user, Utc::now() - Duration::from_secs(60))
            .await
            .unwrap();
        let (token, _) = f.codec.issue_refresh_token(record.id, f.user).await.unwrap();

        let err = f.service.validate(&token).await.unwrap_err();
        assert!(matches!(err, TokenError::RefreshTokenExpired));
    }

    #[tokio::test]
    async fn unpersisted_token_fails_with_no_such_token() {
        let f = fixture().await;
        let (token, _) = f
            .codec
            .issue_refresh_token(RefreshTokenId::generate(), f.user)
            .await
            .unwrap();

        let err = f.service.validate(&token).await.unwrap_err();
        assert!(matches!(err, TokenError::NoSuchRefreshToken));
    }

    #[tokio::test]
    async fn garbage_refresh_token_is_invalid() {
        let f = fixture().await;
        let err = f
            .service
            .validate(&RefreshToken("not.a.jwt".to_string()))
            .await
            .unwrap_err();
        assert!(matches!(err, TokenError::InvalidRefreshToken));
    }

    #[tokio::test]
    async fn rotation_refuses_deactivated_owner() {
        let f = fixture().await;
        let pair = f.service.issue(f.user, Role::User).await.unwrap();

        f.user_repo.set_active(f.user, false);
        let err = f.service.rotate(&pair.refresh_token).await.unwrap_err();
        assert!(matches!(err, TokenError::UserNotFound));
    }
}
