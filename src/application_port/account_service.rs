use crate::domain_model::UserId;
use crate::domain_port::UserRecord;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("user already exists")]
    UserExists,
    #[error("user not found")]
    UserNotFound,
    #[error("store error: {0}")]
    Store(String),
    #[error("internal error: {0}")]
    InternalError(String),
}

#[derive(Debug, Clone)]
pub struct SignupInput {
    pub username: String,
    pub password: String,
}

#[async_trait::async_trait]
pub trait CredentialHasher: Send + Sync {
    async fn hash_password(&self, password: &str) -> Result<String, AuthError>;
    async fn verify_password(&self, password: &str, password_hash: &str)
    -> Result<bool, AuthError>;
}

/// Minimal account surface in front of the token lifecycle: everything
/// else about users is somebody else's problem.
#[async_trait::async_trait]
pub trait AccountService: Send + Sync {
    async fn signup(&self, request: SignupInput) -> Result<UserId, AuthError>;

    /// Credential check for login. Unknown user, wrong password, and
    /// deactivated account all collapse to `InvalidCredentials`.
    async fn authenticate(&self, username: &str, password: &str)
    -> Result<UserRecord, AuthError>;
}
