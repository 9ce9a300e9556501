use crate::domain_model::*;
use crate::domain_port::{RefreshTokenRecord, RefreshTokenRepo, StoreError};
use chrono::{DateTime, Utc};
use sqlx::mysql::MySqlRow;
use sqlx::{MySqlPool, Row};
use uuid::Uuid;

pub struct MySqlRefreshTokenRepo {
    pool: MySqlPool,
}

impl MySqlRefreshTokenRepo {
    pub fn new(pool: MySqlPool) -> Self {
        MySqlRefreshTokenRepo { pool }
    }

    #[inline]
    fn id_as_bytes(id: &RefreshTokenId) -> &[u8] {
        id.0.as_bytes()
    }

    #[inline]
    fn uid_as_bytes(id: &UserId) -> &[u8] {
        id.0.as_bytes()
    }

    fn row_to_record(row: MySqlRow) -> Result<RefreshTokenRecord, StoreError> {
        let id_bytes: Vec<u8> = row
            .try_get("id")
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        let id = RefreshTokenId(
            Uuid::from_slice(&id_bytes).map_err(|e| StoreError::Backend(e.to_string()))?,
        );

        let owner_bytes: Vec<u8> = row
            .try_get("owner_user_id")
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        let owner_user_id = UserId(
            Uuid::from_slice(&owner_bytes).map_err(|e| StoreError::Backend(e.to_string()))?,
        );

        let expires_at: DateTime<Utc> = row
            .try_get("expires_at")
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        let revoked: bool = row
            .try_get("revoked")
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        let version: i64 = row
            .try_get("version")
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        let created_at: DateTime<Utc> = row
            .try_get("created_at")
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        Ok(RefreshTokenRecord {
            id,
            owner_user_id,
            expires_at,
            revoked,
            version,
            created_at,
        })
    }
}

#[async_trait::async_trait]
impl RefreshTokenRepo for MySqlRefreshTokenRepo {
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

        sqlx::query(
            r#"
INSERT INTO refresh_token (id, owner_user_id, expires_at, revoked, version, created_at)
VALUES (?, ?, ?, ?, ?, ?)
"#,
        )
        .bind(Self::id_as_bytes(&record.id))
        .bind(Self::uid_as_bytes(&record.owner_user_id))
        .bind(record.expires_at)
        .bind(record.revoked)
        .bind(record.version)
        .bind(record.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?;

        Ok(record)
    }

    async fn find_by_id(
        &self,
        id: RefreshTokenId,
    ) -> Result<Option<RefreshTokenRecord>, StoreError> {
        let row_opt: Option<MySqlRow> = sqlx::query(
            r#"
SELECT id, owner_user_id, expires_at, revoked, version, created_at
FROM refresh_token
WHERE id = ?
"#,
        )
        .bind(Self::id_as_bytes(&id))
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?;

        row_opt.map(Self::row_to_record).transpose()
    }

    async fn save(&self, record: &RefreshTokenRecord) -> Result<(), StoreError> {
        // The version predicate is the whole concurrency story: if another
        // writer advanced the row since this record was read, zero rows
        // match and the caller loses.
        let result = sqlx::query(
            r#"
UPDATE refresh_token
SET revoked = ?, version = version + 1
WHERE id = ? AND version = ?
"#,
        )
        .bind(record.revoked)
        .bind(Self::id_as_bytes(&record.id))
        .bind(record.version)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::ConcurrentModification);
        }
        Ok(())
    }

    async fn revoke_all_by_owner(&self, owner: UserId) -> Result<u64, StoreError> {
        let result = sqlx::query(
            r#"
UPDATE refresh_token
SET revoked = TRUE, version = version + 1
WHERE owner_user_id = ? AND revoked = FALSE
"#,
        )
        .bind(Self::uid_as_bytes(&owner))
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?;

        Ok(result.rows_affected())
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let result = sqlx::query(
            r#"
DELETE FROM refresh_token
WHERE expires_at <= ?
"#,
        )
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?;

        Ok(result.rows_affected())
    }
}
