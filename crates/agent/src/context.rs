//! Bounded conversational memory shared by the pipeline, workers, and
//! router. Channel windows and cooldowns are always in-memory; user turns,
//! preferences, and the ignore list are mirrored to repositories on a
//! best-effort basis.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{Mutex, RwLock};
use tracing::warn;

use banter_core::config::ContextConfig;
use banter_core::domain::message::{ChannelId, ConversationId, MessageRecord, TurnPair, UserId};
use banter_core::domain::prefs::UserPreferences;
use banter_db::repositories::{
    IgnoreListRepository, PreferenceRepository, RepositoryError, UserHistoryRepository,
};

pub struct ContextStore {
    channel_window: usize,
    user_turns_keep: usize,
    channels: RwLock<HashMap<String, VecDeque<MessageRecord>>>,
    user_turns: RwLock<HashMap<String, Vec<TurnPair>>>,
    prefs: RwLock<HashMap<String, UserPreferences>>,
    ignored: RwLock<HashSet<String>>,
    last_delivery: Mutex<HashMap<String, Instant>>,
    history_repo: Arc<dyn UserHistoryRepository>,
    preference_repo: Arc<dyn PreferenceRepository>,
    ignore_repo: Arc<dyn IgnoreListRepository>,
    degraded: AtomicBool,
}

impl ContextStore {
    pub fn new(
        config: &ContextConfig,
        history_repo: Arc<dyn UserHistoryRepository>,
        preference_repo: Arc<dyn PreferenceRepository>,
        ignore_repo: Arc<dyn IgnoreListRepository>,
    ) -> Self {
        Self {
            channel_window: config.channel_window.max(1),
            user_turns_keep: config.user_turns.max(1),
            channels: RwLock::new(HashMap::new()),
            user_turns: RwLock::new(HashMap::new()),
            prefs: RwLock::new(HashMap::new()),
            ignored: RwLock::new(HashSet::new()),
            last_delivery: Mutex::new(HashMap::new()),
            history_repo,
            preference_repo,
            ignore_repo,
            degraded: AtomicBool::new(false),
        }
    }

    /// True once any repository call has failed. The store keeps serving
    /// from memory after that.
    pub fn persistence_degraded(&self) -> bool {
        self.degraded.load(Ordering::Relaxed)
    }

    fn note_degraded(&self, operation: &str, error: &RepositoryError) {
        if !self.degraded.swap(true, Ordering::Relaxed) {
            warn!(%error, operation, "context persistence degraded, continuing in-memory");
        }
    }

    /// Record any channel line, addressed to the bot or not. The window is
    /// strictly bounded; the oldest entry falls off first.
    pub async fn record_channel_message(&self, channel: &ChannelId, record: MessageRecord) {
        let mut channels = self.channels.write().await;
        let window = channels.entry(channel.0.clone()).or_default();
        if window.len() >= self.channel_window {
            window.pop_front();
        }
        window.push_back(record);
    }

    /// Drop a channel's window entirely. Memory-only; nothing durable
    /// backs the window.
    pub async fn clear_channel(&self, channel: &ChannelId) {
        let mut channels = self.channels.write().await;
        channels.remove(&channel.0);
    }

    pub async fn channel_messages(&self, channel: &ChannelId, limit: usize) -> Vec<MessageRecord> {
        let channels = self.channels.read().await;
        let window = match channels.get(&channel.0) {
            Some(window) => window,
            None => return Vec::new(),
        };
        let start = window.len().saturating_sub(limit);
        window.iter().skip(start).cloned().collect()
    }

    /// Most recent completed exchanges for a user, hydrating the cache from
    /// the repository on first access.
    pub async fn user_turns(&self, user: &UserId, limit: usize) -> Vec<TurnPair> {
        self.hydrate_user(user).await;
        let turns = self.user_turns.read().await;
        let stored = turns.get(&user.0).map(Vec::as_slice).unwrap_or_default();
        let start = stored.len().saturating_sub(limit);
        stored[start..].to_vec()
    }

    async fn hydrate_user(&self, user: &UserId) {
        {
            let turns = self.user_turns.read().await;
            if turns.contains_key(&user.0) {
                return;
            }
        }
        let loaded = match self.history_repo.recent_turns(user, self.user_turns_keep).await {
            Ok(loaded) => loaded,
            Err(error) => {
                self.note_degraded("recent_turns", &error);
                Vec::new()
            }
        };
        let mut turns = self.user_turns.write().await;
        turns.entry(user.0.clone()).or_insert(loaded);
    }

    /// Append a completed user/bot exchange, pruning past the keep limit and
    /// mirroring to the repository best-effort.
    pub async fn record_exchange(&self, user: &UserId, user_message: &str, bot_reply: &str) {
        self.hydrate_user(user).await;
        let turn = TurnPair {
            user_message: user_message.to_string(),
            bot_reply: bot_reply.to_string(),
            at: chrono::Utc::now(),
        };

        {
            let mut turns = self.user_turns.write().await;
            let stored = turns.entry(user.0.clone()).or_default();
            stored.push(turn.clone());
            if stored.len() > self.user_turns_keep {
                let excess = stored.len() - self.user_turns_keep;
                stored.drain(..excess);
            }
        }

        if let Err(error) = self.history_repo.append_turn(user, &turn, self.user_turns_keep).await {
            self.note_degraded("append_turn", &error);
        }
    }

    pub async fn clear_user(&self, user: &UserId) {
        {
            let mut turns = self.user_turns.write().await;
            turns.remove(&user.0);
        }
        if let Err(error) = self.history_repo.clear(user).await {
            self.note_degraded("clear", &error);
        }
        // Leave an empty cache entry so the cleared history is not rehydrated.
        let mut turns = self.user_turns.write().await;
        turns.insert(user.0.clone(), Vec::new());
    }

    /// Preference lookup never fails. Unknown users get the defaults.
    pub async fn preferences(&self, user: &UserId) -> UserPreferences {
        {
            let prefs = self.prefs.read().await;
            if let Some(found) = prefs.get(&user.0) {
                return found.clone();
            }
        }
        let loaded = match self.preference_repo.find(user).await {
            Ok(found) => found.unwrap_or_default(),
            Err(error) => {
                self.note_degraded("find preferences", &error);
                UserPreferences::default()
            }
        };
        let mut prefs = self.prefs.write().await;
        prefs.entry(user.0.clone()).or_insert(loaded).clone()
    }

    pub async fn set_preferences(&self, user: &UserId, incoming: UserPreferences) {
        {
            let mut prefs = self.prefs.write().await;
            prefs.insert(user.0.clone(), incoming.clone());
        }
        if let Err(error) = self.preference_repo.upsert(user, &incoming).await {
            self.note_degraded("upsert preferences", &error);
        }
    }

    /// Seed the in-memory ignore set, typically once at startup.
    pub async fn seed_ignored<I: IntoIterator<Item = String>>(&self, identifiers: I) {
        let mut ignored = self.ignored.write().await;
        ignored.extend(identifiers);
    }

    pub async fn is_ignored(&self, identifier: &str) -> bool {
        let ignored = self.ignored.read().await;
        ignored.contains(identifier)
    }

    pub async fn add_ignored(&self, identifier: &str, added_by: &str) {
        {
            let mut ignored = self.ignored.write().await;
            ignored.insert(identifier.to_string());
        }
        if let Err(error) = self.ignore_repo.insert(identifier, added_by).await {
            self.note_degraded("insert ignore", &error);
        }
    }

    pub async fn remove_ignored(&self, identifier: &str) -> bool {
        let removed = {
            let mut ignored = self.ignored.write().await;
            ignored.remove(identifier)
        };
        if let Err(error) = self.ignore_repo.remove(identifier).await {
            self.note_degraded("remove ignore", &error);
        }
        removed
    }

    /// True while a conversation is still inside the delivery cooldown.
    pub async fn in_cooldown(&self, conversation: &ConversationId, window: Duration) -> bool {
        let last = self.last_delivery.lock().await;
        last.get(conversation.label()).map(|sent| sent.elapsed() < window).unwrap_or(false)
    }

    /// Check the cooldown and advance the delivery clock in one step.
    /// Returns false while the previous delivery is still inside the
    /// window; the single lock keeps concurrent workers from both
    /// passing the check.
    pub async fn try_mark_delivered(
        &self,
        conversation: &ConversationId,
        window: Duration,
    ) -> bool {
        let mut last = self.last_delivery.lock().await;
        if let Some(sent) = last.get(conversation.label()) {
            if sent.elapsed() < window {
                return false;
            }
        }
        last.insert(conversation.label().to_string(), Instant::now());
        true
    }
}
