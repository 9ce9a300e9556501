use super::error::*;
use crate::application_port::*;
use crate::domain_model::*;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;
use warp::http::header::SET_COOKIE;
use warp::{self, reject};

pub const REFRESH_COOKIE: &str = "refresh_token";

// The cookie only travels to the token-lifecycle endpoints themselves;
// every other request carries the access token instead.
const REFRESH_COOKIE_PATH: &str = "/api/v1/auth";

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<ApiError>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        ApiResponse {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn err(code: ApiErrorCode, message: impl Into<String>) -> Self {
        ApiResponse {
            success: false,
            data: None,
            error: Some(ApiError {
                code,
                message: message.into(),
            }),
        }
    }
}

fn refresh_cookie(value: &str, max_age_secs: i64) -> String {
    format!(
        "{}={}; Max-Age={}; Path={}; HttpOnly; SameSite=Lax",
        REFRESH_COOKIE, value, max_age_secs, REFRESH_COOKIE_PATH
    )
}

fn clear_refresh_cookie() -> String {
    refresh_cookie("", 0)
}

fn remaining_secs(until: DateTime<Utc>) -> i64 {
    let secs = (until - Utc::now()).num_seconds();
    if secs <= 0 { 1 } else { secs }
}

#[derive(Debug, Deserialize)]
pub struct SignupRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct SignupResponse {
    pub user_id: UserId,
}

pub async fn signup(
    body: SignupRequest,
    account_service: Arc<dyn AccountService>,
) -> Result<impl warp::Reply, warp::Rejection> {
    let user_id = account_service
        .signup(SignupInput {
            username: body.username,
            password: body.password,
        })
        .await
        .map_err(ApiErrorCode::from)
        .map_err(reject::custom)?;

    Ok(warp::reply::json(&ApiResponse::ok(SignupResponse {
        user_id,
    })))
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub user_id: UserId,
    pub access_token: AccessToken,
    pub access_token_expires_at: DateTime<Utc>,
}

pub async fn login(
    body: LoginRequest,
    account_service: Arc<dyn AccountService>,
    token_service: Arc<dyn TokenService>,
) -> Result<impl warp::Reply, warp::Rejection> {
    let user = account_service
        .authenticate(&body.username, &body.password)
        .await
        .map_err(ApiErrorCode::from)
        .map_err(reject::custom)?;

    let pair = token_service
        .issue(user.user_id, user.role)
        .await
        .map_err(ApiErrorCode::from)
        .map_err(reject::custom)?;

    let cookie = refresh_cookie(
        &pair.refresh_token.0,
        remaining_secs(pair.refresh_token_expires_at),
    );
    let json = warp::reply::json(&ApiResponse::ok(LoginResponse {
        user_id: user.user_id,
        access_token: pair.access_token,
        access_token_expires_at: pair.access_token_expires_at,
    }));
    Ok(warp::reply::with_header(json, SET_COOKIE, cookie))
}

#[derive(Debug, Serialize)]
pub struct RefreshResponse {
    pub access_token: AccessToken,
    pub access_token_expires_at: DateTime<Utc>,
}

pub async fn refresh(
    cookie: Option<String>,
    token_service: Arc<dyn TokenService>,
) -> Result<impl warp::Reply, warp::Rejection> {
    let old = cookie.ok_or_else(|| reject::custom(ApiErrorCode::MissingToken))?;

    let pair = token_service
        .rotate(&RefreshToken(old))
        .await
        .map_err(ApiErrorCode::from)
        .map_err(reject::custom)?;

    let cookie = refresh_cookie(
        &pair.refresh_token.0,
        remaining_secs(pair.refresh_token_expires_at),
    );
    let json = warp::reply::json(&ApiResponse::ok(RefreshResponse {
        access_token: pair.access_token,
        access_token_expires_at: pair.access_token_expires_at,
    }));
    Ok(warp::reply::with_header(json, SET_COOKIE, cookie))
}

#[derive(Debug, Serialize)]
pub struct LogoutResponse;

pub async fn logout(
    cookie: Option<String>,
    token_service: Arc<dyn TokenService>,
) -> Result<impl warp::Reply, warp::Rejection> {
    if let Some(token) = cookie {
        // Logout succeeds regardless: a stale or garbage cookie leaves
        // nothing worth keeping alive.
        if let Err(e) = token_service.revoke(&RefreshToken(token)).await {
            debug!("logout revoke skipped: {}", e);
        }
    }

    let json = warp::reply::json(&ApiResponse::ok(LogoutResponse));
    Ok(warp::reply::with_header(json, SET_COOKIE, clear_refresh_cookie()))
}

pub async fn logout_all(
    principal: Principal,
    token_service: Arc<dyn TokenService>,
) -> Result<impl warp::Reply, warp::Rejection> {
    token_service
        .revoke_all_by_owner(principal.user_id)
        .await
        .map_err(ApiErrorCode::from)
        .map_err(reject::custom)?;

    let json = warp::reply::json(&ApiResponse::ok(LogoutResponse));
    Ok(warp::reply::with_header(json, SET_COOKIE, clear_refresh_cookie()))
}

pub async fn me(principal: Principal) -> Result<impl warp::Reply, warp::Rejection> {
    Ok(warp::reply::json(&ApiResponse::ok(principal)))
}
