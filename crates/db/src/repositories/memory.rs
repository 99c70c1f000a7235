use std::collections::{BTreeSet, HashMap};

use tokio::sync::RwLock;

use banter_core::domain::message::{TurnPair, UserId};
use banter_core::domain::prefs::UserPreferences;

use super::{
    IgnoreListRepository, PreferenceRepository, RepositoryError, UserHistoryRepository,
};

/// Fallback stores used when the database is unavailable at startup.

#[derive(Default)]
pub struct InMemoryUserHistoryRepository {
    turns: RwLock<HashMap<String, Vec<TurnPair>>>,
}

#[async_trait::async_trait]
impl UserHistoryRepository for InMemoryUserHistoryRepository {
    async fn recent_turns(
        &self,
        user: &UserId,
        limit: usize,
    ) -> Result<Vec<TurnPair>, RepositoryError> {
        let turns = self.turns.read().await;
        let stored = turns.get(&user.0).map(Vec::as_slice).unwrap_or_default();
        let start = stored.len().saturating_sub(limit);
        Ok(stored[start..].to_vec())
    }

    async fn append_turn(
        &self,
        user: &UserId,
        turn: &TurnPair,
        keep: usize,
    ) -> Result<(), RepositoryError> {
        let mut turns = self.turns.write().await;
        let stored = turns.entry(user.0.clone()).or_default();
        stored.push(turn.clone());
        if stored.len() > keep {
            let excess = stored.len() - keep;
            stored.drain(..excess);
        }
        Ok(())
    }

    async fn clear(&self, user: &UserId) -> Result<(), RepositoryError> {
        let mut turns = self.turns.write().await;
        turns.remove(&user.0);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryPreferenceRepository {
    prefs: RwLock<HashMap<String, UserPreferences>>,
}

#[async_trait::async_trait]
impl PreferenceRepository for InMemoryPreferenceRepository {
    async fn find(&self, user: &UserId) -> Result<Option<UserPreferences>, RepositoryError> {
        let prefs = self.prefs.read().await;
        Ok(prefs.get(&user.0).cloned())
    }

    async fn upsert(
        &self,
        user: &UserId,
        incoming: &UserPreferences,
    ) -> Result<(), RepositoryError> {
        let mut prefs = self.prefs.write().await;
        prefs.insert(user.0.clone(), incoming.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryIgnoreListRepository {
    identifiers: RwLock<BTreeSet<String>>,
}

#[async_trait::async_trait]
impl IgnoreListRepository for InMemoryIgnoreListRepository {
    async fn load(&self) -> Result<Vec<String>, RepositoryError> {
        let identifiers = self.identifiers.read().await;
        Ok(identifiers.iter().cloned().collect())
    }

    async fn insert(&self, identifier: &str, _added_by: &str) -> Result<(), RepositoryError> {
        let mut identifiers = self.identifiers.write().await;
        identifiers.insert(identifier.to_string());
        Ok(())
    }

    async fn remove(&self, identifier: &str) -> Result<bool, RepositoryError> {
        let mut identifiers = self.identifiers.write().await;
        Ok(identifiers.remove(identifier))
    }
}
