use crate::application_port::*;
use crate::domain_model::*;
use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub issuer: String,
    pub audience: String,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
    pub signing_key: Vec<u8>,
}

#[derive(Debug, Serialize, Deserialize)]
struct AccessClaims {
    sub: String, // user id as string
    role: String,
    exp: i64,
    iat: i64,
    iss: String,
    aud: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct RefreshClaims {
    sub: String,
    jti: String, // id of the backing refresh-token record
    exp: i64,
    iat: i64,
    iss: String,
    aud: String,
}

fn encode_access(
    uid: UserId,
    role: Role,
    cfg: &JwtConfig,
) -> Result<(String, DateTime<Utc>), TokenError> {
    let iat_dt = Utc::now();
    let exp_dt = iat_dt + cfg.access_ttl;
    let claims = AccessClaims {
        sub: uid.to_string(),
        role: role.to_string(),
        exp: exp_dt.timestamp(),
        iat: iat_dt.timestamp(),
        iss: cfg.issuer.clone(),
        aud: cfg.audience.clone(),
    };
    let token = encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(&cfg.signing_key),
    )
    .map_err(|e| TokenError::InternalError(e.to_string()))?;
    Ok((token, exp_dt))
}

fn encode_refresh(
    uid: UserId,
    jti: String,
    cfg: &JwtConfig,
) -> Result<(String, DateTime<Utc>), TokenError> {
    let iat_dt = Utc::now();
    let exp_dt = iat_dt + cfg.refresh_ttl;
    let claims = RefreshClaims {
        sub: uid.to_string(),
        jti,
        exp: exp_dt.timestamp(),
        iat: iat_dt.timestamp(),
        iss: cfg.issuer.clone(),
        aud: cfg.audience.clone(),
    };
    let token = encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(&cfg.signing_key),
    )
    .map_err(|e| TokenError::InternalError(e.to_string()))?;
    Ok((token, exp_dt))
}

// Bad signature, malformed payload, and expiry all collapse into the same
// invalid-token error: callers get no hint about which check failed.
fn validation(cfg: &JwtConfig) -> Validation {
    let mut v = Validation::new(Algorithm::HS256);
    v.validate_exp = true;
    v.leeway = 0; // second-granularity expiry, no clock slack
    v.set_audience(&[cfg.audience.clone()]);
    v.set_issuer(&[cfg.issuer.clone()]);
    v
}

fn decode_access(token: &str, cfg: &JwtConfig) -> Result<AccessClaims, TokenError> {
    let data = decode::<AccessClaims>(
        token,
        &DecodingKey::from_secret(&cfg.signing_key),
        &validation(cfg),
    )
    .map_err(|_| TokenError::InvalidAccessToken)?;
    Ok(data.claims)
}

fn decode_refresh(token: &str, cfg: &JwtConfig) -> Result<RefreshClaims, TokenError> {
    let data = decode::<RefreshClaims>(
        token,
        &DecodingKey::from_secret(&cfg.signing_key),
        &validation(cfg),
    )
    .map_err(|_| TokenError::InvalidRefreshToken)?;
    Ok(data.claims)
}

pub struct JwtHs256Codec {
    cfg: JwtConfig,
}

impl JwtHs256Codec {
    pub fn new(cfg: JwtConfig) -> Self {
        JwtHs256Codec { cfg }
    }

    pub fn refresh_ttl(&self) -> Duration {
        self.cfg.refresh_ttl
    }
}

#[async_trait::async_trait]
impl TokenCodec for JwtHs256Codec {
    async fn issue_access_token(
        &self,
        user: UserId,
        role: Role,
    ) -> Result<(AccessToken, DateTime<Utc>), TokenError> {
        let (token, exp_dt) = encode_access(user, role, &self.cfg)?;
        Ok((AccessToken(token), exp_dt))
    }

    async fn issue_refresh_token(
        &self,
        record_id: RefreshTokenId,
        user: UserId,
    ) -> Result<(RefreshToken, DateTime<Utc>), TokenError> {
        let (token, exp_dt) = encode_refresh(user, record_id.to_string(), &self.cfg)?;
        Ok((RefreshToken(token), exp_dt))
    }

    async fn verify_access_token(
        &self,
        token: &AccessToken,
    ) -> Result<AccessTokenClaims, TokenError> {
        let claims = decode_access(&token.0, &self.cfg)?;
        let user_id = claims
            .sub
            .parse::<UserId>()
            .map_err(|_| TokenError::InvalidAccessToken)?;
        let role = claims
            .role
            .parse::<Role>()
            .map_err(|_| TokenError::InvalidAccessToken)?;
        Ok(AccessTokenClaims { user_id, role })
    }

    async fn verify_refresh_token(
        &self,
        token: &RefreshToken,
    ) -> Result<RefreshTokenClaims, TokenError> {
        let claims = decode_refresh(&token.0, &self.cfg)?;
        let user_id = claims
            .sub
            .parse::<UserId>()
            .map_err(|_| TokenError::InvalidRefreshToken)?;
        let record_id = claims
            .jti
            .parse::<RefreshTokenId>()
            .map_err(|_| TokenError::InvalidRefreshToken)?;
        Ok(RefreshTokenClaims { record_id, user_id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_cfg(access_ttl: Duration) -> JwtConfig {
        JwtConfig {
            issuer: "gatehouse.auth".to_string(),
            audience: "gatehouse-client".to_string(),
            access_ttl,
            refresh_ttl: Duration::from_secs(7 * 24 * 60 * 60),
            signing_key: b"test-signing-key".to_vec(),
        }
    }

    fn codec() -> JwtHs256Codec {
        JwtHs256Codec::new(test_cfg(Duration::from_secs(15 * 60)))
    }

    #[tokio::test]
    async fn access_token_round_trip() {
        let codec = codec();
        let uid = UserId(uuid::Uuid::new_v4());
        let (token, exp) = codec.issue_access_token(uid, Role::Admin).await.unwrap();
        assert!(exp > Utc::now());

        let claims = codec.verify_access_token(&token).await.unwrap();
        assert_eq!(claims.user_id, uid);
        assert_eq!(claims.role, Role::Admin);
    }

    #[tokio::test]
    async fn refresh_token_round_trip() {
        let codec = codec();
        let uid = UserId(uuid::Uuid::new_v4());
        let rid = RefreshTokenId::generate();
        let (token, _) = codec.issue_refresh_token(rid, uid).await.unwrap();

        let claims = codec.verify_refresh_token(&token).await.unwrap();
        assert_eq!(claims.user_id, uid);
        assert_eq!(claims.record_id, rid);
    }

    #[tokio::test]
    async fn tampered_access_token_is_rejected() {
        let codec = codec();
        let uid = UserId(uuid::Uuid::new_v4());
        let (token, _) = codec.issue_access_token(uid, Role::User).await.unwrap();

        let mut tampered = token.0.clone();
        let last = tampered.pop().unwrap();
        tampered.push(if last == 'A' { 'B' } else { 'A' });

        let err = codec
            .verify_access_token(&AccessToken(tampered))
            .await
            .unwrap_err();
        assert!(matches!(err, TokenError::InvalidAccessToken));
    }

    #[tokio::test]
    async fn foreign_secret_is_rejected() {
        let codec = codec();
        let mut other_cfg = test_cfg(Duration::from_secs(15 * 60));
        other_cfg.signing_key = b"some-other-key".to_vec();
        let other = JwtHs256Codec::new(other_cfg);

        let uid = UserId(uuid::Uuid::new_v4());
        let rid = RefreshTokenId::generate();
        let (access, _) = other.issue_access_token(uid, Role::User).await.unwrap();
        let (refresh, _) = other.issue_refresh_token(rid, uid).await.unwrap();

        assert!(matches!(
            codec.verify_access_token(&access).await.unwrap_err(),
            TokenError::InvalidAccessToken
        ));
        assert!(matches!(
            codec.verify_refresh_token(&refresh).await.unwrap_err(),
            TokenError::InvalidRefreshToken
        ));
    }

    #[tokio::test]
    async fn expired_access_token_is_rejected() {
        let codec = JwtHs256Codec::new(test_cfg(Duration::from_secs(0)));
        let uid = UserId(uuid::Uuid::new_v4());
        let (token, _) = codec.issue_access_token(uid, Role::User).await.unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(1500)).await;

        let err = codec.verify_access_token(&token).await.unwrap_err();
        assert!(matches!(err, TokenError::InvalidAccessToken));
    }
}
