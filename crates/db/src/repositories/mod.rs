use async_trait::async_trait;
use thiserror::Error;

use banter_core::domain::message::{TurnPair, UserId};
use banter_core::domain::prefs::UserPreferences;

pub mod history;
pub mod ignore_list;
pub mod memory;
pub mod preference;

pub use history::SqlUserHistoryRepository;
pub use ignore_list::SqlIgnoreListRepository;
pub use memory::{
    InMemoryIgnoreListRepository, InMemoryPreferenceRepository, InMemoryUserHistoryRepository,
};
pub use preference::SqlPreferenceRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

/// Durable per-user exchange history. Oldest entries are pruned past the
/// configured keep limit on every append.
#[async_trait]
pub trait UserHistoryRepository: Send + Sync {
    /// Most recent turn pairs in chronological order.
    async fn recent_turns(
        &self,
        user: &UserId,
        limit: usize,
    ) -> Result<Vec<TurnPair>, RepositoryError>;

    async fn append_turn(
        &self,
        user: &UserId,
        turn: &TurnPair,
        keep: usize,
    ) -> Result<(), RepositoryError>;

    async fn clear(&self, user: &UserId) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait PreferenceRepository: Send + Sync {
    async fn find(&self, user: &UserId) -> Result<Option<UserPreferences>, RepositoryError>;
    async fn upsert(
        &self,
        user: &UserId,
        prefs: &UserPreferences,
    ) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait IgnoreListRepository: Send + Sync {
    async fn load(&self) -> Result<Vec<String>, RepositoryError>;
    async fn insert(&self, identifier: &str, added_by: &str) -> Result<(), RepositoryError>;
    async fn remove(&self, identifier: &str) -> Result<bool, RepositoryError>;
}
