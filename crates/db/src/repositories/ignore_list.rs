use sqlx::Row;

use super::{IgnoreListRepository, RepositoryError};
use crate::DbPool;

pub struct SqlIgnoreListRepository {
    pool: DbPool,
}

impl SqlIgnoreListRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl IgnoreListRepository for SqlIgnoreListRepository {
    async fn load(&self) -> Result<Vec<String>, RepositoryError> {
        let rows = sqlx::query("SELECT identifier FROM ignore_list ORDER BY identifier")
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter()
            .map(|row| row.try_get::<String, _>("identifier").map_err(RepositoryError::from))
            .collect()
    }

    async fn insert(&self, identifier: &str, added_by: &str) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO ignore_list (identifier, added_by, created_at)
             VALUES (?, ?, ?)
             ON CONFLICT(identifier) DO NOTHING",
        )
        .bind(identifier)
        .bind(added_by)
        .bind(chrono::Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn remove(&self, identifier: &str) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM ignore_list WHERE identifier = ?")
            .bind(identifier)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
