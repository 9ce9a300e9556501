use super::error::ApiErrorCode;
use crate::application_port::{AccessToken, TokenCodec, TokenError};
use crate::domain_model::Principal;
use crate::domain_port::UserRepo;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;
use warp::path::FullPath;
use warp::{Filter, Rejection, reject};

/// Per-request admission control: the only place an inbound request is
/// turned into an authenticated identity. Access tokens are self-contained,
/// so verification never touches the refresh-token store; the user repo is
/// consulted only to refuse tokens of deleted or deactivated accounts.
pub struct AuthGate {
    token_codec: Arc<dyn TokenCodec>,
    user_repo: Arc<dyn UserRepo>,
    public_paths: HashSet<String>,
}

impl AuthGate {
    pub fn new(
        token_codec: Arc<dyn TokenCodec>,
        user_repo: Arc<dyn UserRepo>,
        public_paths: impl IntoIterator<Item = String>,
    ) -> Self {
        AuthGate {
            token_codec,
            user_repo,
            public_paths: public_paths.into_iter().collect(),
        }
    }

    pub fn is_public(&self, path: &str) -> bool {
        self.public_paths.contains(path)
    }

    /// A present credential must verify; a bad one never degrades to an
    /// anonymous pass. An absent credential passes through anonymous, and
    /// the route's own admission filter decides whether that is enough.
    pub async fn authenticate(
        &self,
        path: &str,
        authorization: Option<&str>,
    ) -> Result<Option<Principal>, TokenError> {
        match authorization {
            Some(header) => self.verify_bearer(header).await.map(Some),
            None => {
                if !self.is_public(path) {
                    debug!(path, "anonymous request outside the public allow-list");
                }
                Ok(None)
            }
        }
    }

    pub async fn verify_bearer(&self, header: &str) -> Result<Principal, TokenError> {
        let token = header
            .strip_prefix("Bearer ")
            .ok_or(TokenError::InvalidAccessToken)?;

        let claims = self
            .token_codec
            .verify_access_token(&AccessToken(token.to_string()))
            .await?;

        let user = self
            .user_repo
            .find_by_id(claims.user_id)
            .await
            .map_err(|e| TokenError::Store(e.to_string()))?
            .ok_or(TokenError::UserNotFound)?;
        if !user.is_active {
            return Err(TokenError::UserNotFound);
        }

        // Role comes from the verified claims; no second store round-trip.
        Ok(Principal {
            user_id: claims.user_id,
            role: claims.role,
        })
    }
}

/// Requires a valid bearer token and hands the Principal to the handler.
pub fn with_principal(
    gate: Arc<AuthGate>,
) -> impl Filter<Extract = (Principal,), Error = Rejection> + Clone {
    warp::path::full()
        .and(warp::header::optional::<String>("authorization"))
        .and_then(move |path: FullPath, header: Option<String>| {
            let gate = gate.clone();
            async move {
                match gate.authenticate(path.as_str(), header.as_deref()).await {
                    Ok(Some(principal)) => Ok(principal),
                    Ok(None) => Err(reject::custom(ApiErrorCode::MissingToken)),
                    Err(e) => Err(reject::custom(ApiErrorCode::from(e))),
                }
            }
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application_impl::{JwtConfig, JwtHs256Codec};
    use crate::domain_model::*;
    use crate::domain_port::UserRecord;
    use crate::infra_memory::MemoryUserRepo;
    use chrono::Utc;
    use std::time::Duration;

    fn codec() -> Arc<JwtHs256Codec> {
        Arc::new(JwtHs256Codec::new(JwtConfig {
            issuer: "gatehouse.auth".to_string(),
            audience: "gatehouse-client".to_string(),
            access_ttl: Duration::from_secs(15 * 60),
            refresh_ttl: Duration::from_secs(7 * 24 * 60 * 60),
            signing_key: b"test-signing-key".to_vec(),
        }))
    }

    async fn gate_with_user() -> (Arc<AuthGate>, Arc<JwtHs256Codec>, Arc<MemoryUserRepo>, UserId) {
        let codec = codec();
        let user_repo = Arc::new(MemoryUserRepo::new());
        let user = UserId(uuid::Uuid::new_v4());
        user_repo
            .create(&UserRecord {
                user_id: user,
                username: "ada.lovelace".to_string(),
                password_hash: "unused".to_string(),
                role: Role::Admin,
                is_active: true,
                created_at: Utc::now(),
            })
            .await
            .unwrap();
        let gate = Arc::new(AuthGate::new(
            codec.clone(),
            user_repo.clone(),
            ["/api/v1/auth/login".to_string()],
        ));
        (gate, codec, user_repo, user)
    }

    #[tokio::test]
    async fn valid_bearer_resolves_principal() {
        let (gate, codec, _, user) = gate_with_user().await;
        let (token, _) = codec.issue_access_token(user, Role::Admin).await.unwrap();

        let principal = gate
            .authenticate("/api/v1/me", Some(&format!("Bearer {}", token.0)))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(principal.user_id, user);
        assert_eq!(principal.role, Role::Admin);
    }

    #[tokio::test]
    async fn absent_credential_passes_anonymous() {
        let (gate, _, _, _) = gate_with_user().await;
        assert!(gate.is_public("/api/v1/auth/login"));
        assert!(!gate.is_public("/api/v1/me"));

        // Anonymous on a public path and on a protected path both pass the
        // gate; the protected route's admission filter is what refuses.
        let p = gate.authenticate("/api/v1/auth/login", None).await.unwrap();
        assert!(p.is_none());
        let p = gate.authenticate("/api/v1/me", None).await.unwrap();
        assert!(p.is_none());
    }

    #[tokio::test]
    async fn malformed_header_is_rejected() {
        let (gate, _, _, _) = gate_with_user().await;
        let err = gate
            .authenticate("/api/v1/me", Some("Token abc"))
            .await
            .unwrap_err();
        assert!(matches!(err, TokenError::InvalidAccessToken));
    }

    #[tokio::test]
    async fn deactivated_user_is_rejected() {
        let (gate, codec, user_repo, user) = gate_with_user().await;
        let (token, _) = codec.issue_access_token(user, Role::Admin).await.unwrap();

        user_repo.set_active(user, false);
        let err = gate
            .authenticate("/api/v1/me", Some(&format!("Bearer {}", token.0)))
            .await
            .unwrap_err();
        assert!(matches!(err, TokenError::UserNotFound));
    }

    #[tokio::test]
    async fn unknown_user_is_rejected() {
        let (gate, codec, _, _) = gate_with_user().await;
        let stranger = UserId(uuid::Uuid::new_v4());
        let (token, _) = codec
            .issue_access_token(stranger, Role::User)
            .await
            .unwrap();

        let err = gate
            .authenticate("/api/v1/me", Some(&format!("Bearer {}", token.0)))
            .await
            .unwrap_err();
        assert!(matches!(err, TokenError::UserNotFound));
    }

    #[tokio::test]
    async fn filter_injects_principal_and_refuses_anonymous() {
        let (gate, codec, _, user) = gate_with_user().await;
        let route = warp::path("me")
            .and(with_principal(gate))
            .map(|p: Principal| warp::reply::json(&p))
            .recover(crate::api::v1::recover_error);

        let (token, _) = codec.issue_access_token(user, Role::Admin).await.unwrap();
        let resp = warp::test::request()
            .path("/me")
            .header("authorization", format!("Bearer {}", token.0))
            .reply(&route)
            .await;
        assert_eq!(resp.status(), 200);

        let resp = warp::test::request().path("/me").reply(&route).await;
        assert_eq!(resp.status(), 401);
    }
}
