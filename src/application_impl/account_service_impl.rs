use crate::application_port::*;
use crate::domain_model::*;
use crate::domain_port::{UserRecord, UserRepo};
use argon2::password_hash::rand_core::OsRng;
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

pub struct Argon2PasswordHasher;

#[async_trait::async_trait]
impl CredentialHasher for Argon2PasswordHasher {
    async fn hash_password(&self, password: &str) -> Result<String, AuthError> {
        let salt = argon2::password_hash::SaltString::generate(&mut OsRng);
        let hash = Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| AuthError::InternalError(e.to_string()))?
            .to_string();
        Ok(hash)
    }

    async fn verify_password(
        &self,
        password: &str,
        password_hash: &str,
    ) -> Result<bool, AuthError> {
        let parsed = PasswordHash::new(password_hash)
            .map_err(|e| AuthError::InternalError(format!("invalid PHC hash: {}", e)))?;

        match Argon2::default().verify_password(password.as_bytes(), &parsed) {
            Ok(_) => Ok(true),
            Err(argon2::password_hash::Error::Password) => Ok(false),
            Err(e) => Err(AuthError::InternalError(format!("verify error: {}", e))),
        }
    }
}

pub struct RealAccountService {
    user_repo: Arc<dyn UserRepo>,
    credential_hasher: Arc<dyn CredentialHasher>,
    min_username_len: usize,
    min_password_len: usize,
}

impl RealAccountService {
    pub fn new(user_repo: Arc<dyn UserRepo>, credential_hasher: Arc<dyn CredentialHasher>) -> Self {
        Self {
            user_repo,
            credential_hasher,
            min_username_len: 6,
            min_password_len: 6,
        }
    }

    fn validate_signup(&self, username: &str, password: &str) -> Result<(), AuthError> {
        if username.len() < self.min_username_len {
            return Err(AuthError::InternalError("username too short".to_string()));
        }
        if password.len() < self.min_password_len {
            return Err(AuthError::InternalError("password too short".to_string()));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl AccountService for RealAccountService {
    async fn signup(&self, request: SignupInput) -> Result<UserId, AuthError> {
        let SignupInput { username, password } = request;

        self.validate_signup(&username, &password)?;

        let password_hash = self.credential_hasher.hash_password(&password).await?;
        let user = UserRecord {
            user_id: UserId(Uuid::new_v4()),
            username,
            password_hash,
            role: Role::User,
            is_active: true,
            created_at: Utc::now(),
        };
        self.user_repo.create(&user).await?;

        Ok(user.user_id)
    }

    async fn authenticate(
        &self,
        username: &str,
        password: &str,
    ) -> Result<UserRecord, AuthError> {
        let user = self
            .user_repo
            .get_by_username(username)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        if !user.is_active {
            return Err(AuthError::InvalidCredentials);
        }

        let ok = self
            .credential_hasher
            .verify_password(password, &user.password_hash)
            .await?;
        if !ok {
            return Err(AuthError::InvalidCredentials);
        }

        Ok(user)
    }
}
