use crate::application_port::AuthError;
use crate::domain_model::*;
use chrono::{DateTime, Utc};

#[derive(Debug, Clone)]
pub struct UserRecord {
    pub user_id: UserId,
    pub username: String,
    pub password_hash: String,
    pub role: Role,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[async_trait::async_trait]
pub trait UserRepo: Send + Sync {
    /// Insert a row. Fails with `UserExists` on a duplicate username.
    async fn create(&self, user: &UserRecord) -> Result<(), AuthError>;

    async fn find_by_id(&self, user_id: UserId) -> Result<Option<UserRecord>, AuthError>;

    /// Fetch by username (for login).
    async fn get_by_username(&self, username: &str) -> Result<Option<UserRecord>, AuthError>;
}
