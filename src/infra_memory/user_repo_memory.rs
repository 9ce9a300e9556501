use crate::application_port::AuthError;
use crate::domain_model::UserId;
use crate::domain_port::{UserRecord, UserRepo};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

pub struct MemoryUserRepo {
    users: DashMap<UserId, UserRecord>,
    by_username: DashMap<String, UserId>,
}

impl MemoryUserRepo {
    pub fn new() -> Self {
        MemoryUserRepo {
            users: DashMap::new(),
            by_username: DashMap::new(),
        }
    }

    pub fn set_active(&self, user_id: UserId, active: bool) {
        if let Some(mut user) = self.users.get_mut(&user_id) {
            user.is_active = active;
        }
    }
}

impl Default for MemoryUserRepo {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl UserRepo for MemoryUserRepo {
    async fn create(&self, user: &UserRecord) -> Result<(), AuthError> {
        match self.by_username.entry(user.username.clone()) {
            Entry::Occupied(_) => Err(AuthError::UserExists),
            Entry::Vacant(slot) => {
                slot.insert(user.user_id);
                self.users.insert(user.user_id, user.clone());
                Ok(())
            }
        }
    }

    async fn find_by_id(&self, user_id: UserId) -> Result<Option<UserRecord>, AuthError> {
        Ok(self.users.get(&user_id).map(|u| u.clone()))
    }

    async fn get_by_username(&self, username: &str) -> Result<Option<UserRecord>, AuthError> {
        let Some(id) = self.by_username.get(username).map(|id| *id) else {
            return Ok(None);
        };
        Ok(self.users.get(&id).map(|u| u.clone()))
    }
}
