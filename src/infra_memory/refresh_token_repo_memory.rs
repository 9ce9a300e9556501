use crate::domain_model::*;
use crate::domain_port::{RefreshTokenRecord, RefreshTokenRepo, StoreError};
use chrono::{DateTime, Utc};
use dashmap::DashMap;

/// In-memory refresh-token store for the "memory" backend and tests.
/// The version compare-and-swap happens under the shard lock of
/// `get_mut`, giving the same at-most-one-writer guarantee the MySQL
/// adapter gets from its conditional UPDATE.
pub struct MemoryRefreshTokenRepo {
    records: DashMap<RefreshTokenId, RefreshTokenRecord>,
}

impl MemoryRefreshTokenRepo {
    pub fn new() -> Self {
        MemoryRefreshTokenRepo {
            records: DashMap::new(),
        }
    }
}

impl Default for MemoryRefreshTokenRepo {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl RefreshTokenRepo for MemoryRefreshTokenRepo {
    async fn create(
        &self,
        owner: UserId,
        expires_at: DateTime<Utc>,
    ) -> Result<RefreshTokenRecord, StoreError> {
        let record = RefreshTokenRecord {
            id: RefreshTokenId::generate(),
            owner_user_id: owner,
            expires_at,
            revoked: false,
            version: 0,
            created_at: Utc::now(),
        };
        self.records.insert(record.id, record.clone());
        Ok(record)
    }

    async fn find_by_id(
        &self,
        id: RefreshTokenId,
    ) -> Result<Option<RefreshTokenRecord>, StoreError> {
        Ok(self.records.get(&id).map(|r| r.clone()))
    }

    async fn save(&self, record: &RefreshTokenRecord) -> Result<(), StoreError> {
        match self.records.get_mut(&record.id) {
            Some(mut current) if current.version == record.version => {
                let mut next = record.clone();
                next.version += 1;
                *current = next;
                Ok(())
            }
            // A vanished record only happens via the expiry sweep; by then
            // any save attempt is stale anyway.
            _ => Err(StoreError::ConcurrentModification),
        }
    }

    async fn revoke_all_by_owner(&self, owner: UserId) -> Result<u64, StoreError> {
        let mut flipped = 0;
        for mut entry in self.records.iter_mut() {
            if entry.owner_user_id == owner && !entry.revoked {
                entry.revoked = true;
                entry.version += 1;
                flipped += 1;
            }
        }
        Ok(flipped)
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let before = self.records.len();
        self.records.retain(|_, r| now < r.expires_at);
        Ok(before.saturating_sub(self.records.len()) as u64)
    }
}
