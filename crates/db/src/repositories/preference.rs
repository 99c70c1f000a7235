use sqlx::{sqlite::SqliteRow, Row};

use banter_core::domain::message::UserId;
use banter_core::domain::prefs::{TimeFormat, UserPreferences};

use super::{PreferenceRepository, RepositoryError};
use crate::DbPool;

pub struct SqlPreferenceRepository {
    pool: DbPool,
}

impl SqlPreferenceRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl PreferenceRepository for SqlPreferenceRepository {
    async fn find(&self, user: &UserId) -> Result<Option<UserPreferences>, RepositoryError> {
        let row = sqlx::query(
            "SELECT timezone, time_format FROM user_preferences WHERE user_id = ?",
        )
        .bind(&user.0)
        .fetch_optional(&self.pool)
        .await?;

        row.map(prefs_from_row).transpose()
    }

    async fn upsert(
        &self,
        user: &UserId,
        prefs: &UserPreferences,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO user_preferences (user_id, timezone, time_format, updated_at)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(user_id) DO UPDATE SET
                timezone = excluded.timezone,
                time_format = excluded.time_format,
                updated_at = excluded.updated_at",
        )
        .bind(&user.0)
        .bind(&prefs.timezone)
        .bind(prefs.time_format.as_str())
        .bind(chrono::Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

fn prefs_from_row(row: SqliteRow) -> Result<UserPreferences, RepositoryError> {
    let format_raw = row.try_get::<String, _>("time_format")?;
    let time_format = TimeFormat::parse(&format_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown time format `{format_raw}`")))?;

    Ok(UserPreferences { timezone: row.try_get("timezone")?, time_format })
}
