use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row};

use banter_core::domain::message::{TurnPair, UserId};

use super::{RepositoryError, UserHistoryRepository};
use crate::DbPool;

pub struct SqlUserHistoryRepository {
    pool: DbPool,
}

impl SqlUserHistoryRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl UserHistoryRepository for SqlUserHistoryRepository {
    async fn recent_turns(
        &self,
        user: &UserId,
        limit: usize,
    ) -> Result<Vec<TurnPair>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT user_message, bot_reply, created_at
             FROM user_history
             WHERE user_id = ?
             ORDER BY id DESC
             LIMIT ?",
        )
        .bind(&user.0)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        let mut turns = rows
            .into_iter()
            .map(turn_from_row)
            .collect::<Result<Vec<_>, _>>()?;
        turns.reverse();
        Ok(turns)
    }

    async fn append_turn(
        &self,
        user: &UserId,
        turn: &TurnPair,
        keep: usize,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO user_history (user_id, user_message, bot_reply, created_at)
             VALUES (?, ?, ?, ?)",
        )
        .bind(&user.0)
        .bind(&turn.user_message)
        .bind(&turn.bot_reply)
        .bind(turn.at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        // Prune anything past the keep limit in the same call.
        sqlx::query(
            "DELETE FROM user_history
             WHERE user_id = ?
               AND id NOT IN (
                   SELECT id FROM user_history
                   WHERE user_id = ?
                   ORDER BY id DESC
                   LIMIT ?
               )",
        )
        .bind(&user.0)
        .bind(&user.0)
        .bind(keep as i64)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn clear(&self, user: &UserId) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM user_history WHERE user_id = ?")
            .bind(&user.0)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

fn turn_from_row(row: SqliteRow) -> Result<TurnPair, RepositoryError> {
    Ok(TurnPair {
        user_message: row.try_get("user_message")?,
        bot_reply: row.try_get("bot_reply")?,
        at: parse_timestamp("created_at", row.try_get("created_at")?)?,
    })
}

fn parse_timestamp(column: &str, raw: String) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(&raw)
        .map(|value| value.with_timezone(&Utc))
        .map_err(|_| RepositoryError::Decode(format!("invalid timestamp in `{column}`: `{raw}`")))
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use banter_core::domain::message::{TurnPair, UserId};

    use super::SqlUserHistoryRepository;
    use crate::migrations::run_pending;
    use crate::repositories::UserHistoryRepository;
    use crate::connect_with_settings;

    async fn repo() -> SqlUserHistoryRepository {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        run_pending(&pool).await.expect("run migrations");
        SqlUserHistoryRepository::new(pool)
    }

    fn turn(n: usize) -> TurnPair {
        TurnPair {
            user_message: format!("question {n}"),
            bot_reply: format!("answer {n}"),
            at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn appended_turns_come_back_in_chronological_order() {
        let repo = repo().await;
        let user = UserId("ferris".to_string());

        for n in 0..3 {
            repo.append_turn(&user, &turn(n), 20).await.expect("append");
        }

        let turns = repo.recent_turns(&user, 10).await.expect("recent");
        assert_eq!(turns.len(), 3);
        assert_eq!(turns[0].user_message, "question 0");
        assert_eq!(turns[2].user_message, "question 2");
    }

    #[tokio::test]
    async fn append_prunes_past_the_keep_limit() {
        let repo = repo().await;
        let user = UserId("ferris".to_string());

        for n in 0..6 {
            repo.append_turn(&user, &turn(n), 4).await.expect("append");
        }

        let turns = repo.recent_turns(&user, 100).await.expect("recent");
        assert_eq!(turns.len(), 4);
        assert_eq!(turns[0].user_message, "question 2");
    }

    #[tokio::test]
    async fn clear_removes_only_the_named_user() {
        let repo = repo().await;
        let ferris = UserId("ferris".to_string());
        let corro = UserId("corro".to_string());

        repo.append_turn(&ferris, &turn(0), 20).await.expect("append");
        repo.append_turn(&corro, &turn(1), 20).await.expect("append");

        repo.clear(&ferris).await.expect("clear");

        assert!(repo.recent_turns(&ferris, 10).await.expect("recent").is_empty());
        assert_eq!(repo.recent_turns(&corro, 10).await.expect("recent").len(), 1);
    }
}
