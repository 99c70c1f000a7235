//! Startup wiring. A missing API credential aborts here; a broken database
//! does not, it only downgrades the context store to memory-only.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{info, warn};

use banter_agent::builder::RequestBuilder;
use banter_agent::classify::{HeuristicStrategy, IntentStrategy, ModelStrategy, OffStrategy};
use banter_agent::context::ContextStore;
use banter_agent::llm::{BuildClientError, HttpGenerationClient};
use banter_agent::queue::dispatch_channel;
use banter_agent::router::{ResponseRouter, Transport};
use banter_agent::worker::{RetryPolicy, WorkerPool};
use banter_core::config::{AppConfig, ClassifierMode, ConfigError, LoadOptions};
use banter_core::domain::message::ConversationId;
use banter_core::sanitize::ReplySanitizer;
use banter_db::repositories::{
    IgnoreListRepository, InMemoryIgnoreListRepository, InMemoryPreferenceRepository,
    InMemoryUserHistoryRepository, PreferenceRepository, SqlIgnoreListRepository,
    SqlPreferenceRepository, SqlUserHistoryRepository, UserHistoryRepository,
};
use banter_db::{connect, migrations, DbPool};
use banter_irc::{
    ConfigAdminPolicy, IrcRunner, MessagePipeline, NoopChatConnection, ReconnectPolicy,
};

pub struct Application {
    pub config: AppConfig,
    /// `None` when the database was unreachable and the store runs
    /// memory-only.
    pub db_pool: Option<DbPool>,
    pub store: Arc<ContextStore>,
    pub worker_pool: WorkerPool,
    pub runner: IrcRunner,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Client(#[from] BuildClientError),
}

/// Outbound stand-in until a concrete socket transport is plugged in.
/// Every line that would go to the network is logged instead.
pub struct LogTransport;

#[async_trait]
impl Transport for LogTransport {
    async fn send_line(&self, conversation: &ConversationId, line: &str) -> anyhow::Result<()> {
        info!(conversation = %conversation.label(), line, "outbound line");
        Ok(())
    }
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!("starting bootstrap");

    // Fails fast when api.api_key is absent.
    let client = Arc::new(HttpGenerationClient::new(&config.api)?);

    let (db_pool, history_repo, preference_repo, ignore_repo) = open_repositories(&config).await;

    let store = Arc::new(ContextStore::new(
        &config.context,
        history_repo,
        preference_repo,
        ignore_repo.clone(),
    ));
    seed_ignore_list(&config, ignore_repo.as_ref(), &store).await;

    let classifier: Arc<dyn IntentStrategy> = match config.classifier.mode {
        ClassifierMode::Heuristic => Arc::new(HeuristicStrategy),
        ClassifierMode::Model => {
            Arc::new(ModelStrategy::new(HttpGenerationClient::new(&config.api)?))
        }
        ClassifierMode::Off => Arc::new(OffStrategy),
    };

    let transport: Arc<dyn Transport> = Arc::new(LogTransport);
    let (queue, receiver) = dispatch_channel(config.dispatch.queue_capacity);
    let router = Arc::new(ResponseRouter::new(
        transport.clone(),
        store.clone(),
        ReplySanitizer::new(config.api.max_reply_len),
        config.irc.line_limit,
        Duration::from_millis(config.irc.send_delay_ms),
        Duration::from_secs(config.dispatch.cooldown_secs),
    ));
    let worker_pool = WorkerPool::spawn(
        config.dispatch.worker_count,
        receiver,
        client,
        router,
        store.clone(),
        RetryPolicy::from_config(&config.dispatch),
        Duration::from_secs(config.dispatch.cooldown_secs),
    );
    info!(
        worker_count = config.dispatch.worker_count,
        queue_capacity = config.dispatch.queue_capacity,
        "dispatch pool started"
    );

    let pipeline = Arc::new(MessagePipeline::new(
        config.irc.nick.clone(),
        config.irc.blocked_channels.clone(),
        store.clone(),
        classifier,
        RequestBuilder::new(&config.api, &config.context),
        queue,
        Arc::new(ConfigAdminPolicy::new(config.irc.admin_nicks.iter().cloned())),
    ));
    let runner = IrcRunner::new(
        Arc::new(NoopChatConnection),
        transport,
        pipeline,
        ReconnectPolicy::default(),
    );

    info!(nick = %config.irc.nick, "bootstrap complete");
    Ok(Application { config, db_pool, store, worker_pool, runner })
}

/// Connect and migrate, or fall back to memory-only repositories. The
/// fallback is deliberate: a dead database costs durability, not uptime.
async fn open_repositories(
    config: &AppConfig,
) -> (
    Option<DbPool>,
    Arc<dyn UserHistoryRepository>,
    Arc<dyn PreferenceRepository>,
    Arc<dyn IgnoreListRepository>,
) {
    match connect(&config.database).await {
        Ok(pool) => match migrations::run_pending(&pool).await {
            Ok(()) => {
                info!(url = %config.database.url, "database ready");
                (
                    Some(pool.clone()),
                    Arc::new(SqlUserHistoryRepository::new(pool.clone())),
                    Arc::new(SqlPreferenceRepository::new(pool.clone())),
                    Arc::new(SqlIgnoreListRepository::new(pool)),
                )
            }
            Err(error) => {
                warn!(%error, "database migration failed, continuing memory-only");
                memory_repositories()
            }
        },
        Err(error) => {
            warn!(%error, url = %config.database.url, "database unreachable, continuing memory-only");
            memory_repositories()
        }
    }
}

fn memory_repositories() -> (
    Option<DbPool>,
    Arc<dyn UserHistoryRepository>,
    Arc<dyn PreferenceRepository>,
    Arc<dyn IgnoreListRepository>,
) {
    (
        None,
        Arc::new(InMemoryUserHistoryRepository::default()),
        Arc::new(InMemoryPreferenceRepository::default()),
        Arc::new(InMemoryIgnoreListRepository::default()),
    )
}

/// Persisted entries plus the configured static list, merged into the
/// store's in-memory set for O(1) checks on the hot path.
async fn seed_ignore_list(
    config: &AppConfig,
    ignore_repo: &dyn IgnoreListRepository,
    store: &ContextStore,
) {
    let mut identifiers = match ignore_repo.load().await {
        Ok(persisted) => persisted,
        Err(error) => {
            warn!(%error, "could not load persisted ignore list");
            Vec::new()
        }
    };
    identifiers.extend(config.irc.ignored_nicks.iter().cloned());
    let count = identifiers.len();
    store.seed_ignored(identifiers).await;
    if count > 0 {
        info!(count, "ignore list seeded");
    }
}

#[cfg(test)]
mod tests {
    use banter_core::config::AppConfig;

    use super::{bootstrap_with_config, BootstrapError};

    fn test_config(database_url: &str) -> AppConfig {
        let mut config = AppConfig::default();
        config.database.url = database_url.to_string();
        config.api.api_key = Some("test-key".to_string().into());
        config
    }

    #[tokio::test]
    async fn bootstrap_fails_fast_without_api_credential() {
        let mut config = test_config("sqlite::memory:");
        config.api.api_key = None;

        let result = bootstrap_with_config(config).await;

        let error = result.err().expect("bootstrap should fail");
        assert!(matches!(error, BootstrapError::Client(_)));
        assert!(error.to_string().contains("api key"));
    }

    #[tokio::test]
    async fn bootstrap_runs_migrations_and_wires_the_store() {
        let app = bootstrap_with_config(test_config("sqlite::memory:?cache=shared"))
            .await
            .expect("bootstrap should succeed");

        let pool = app.db_pool.as_ref().expect("database should be available");
        let (table_count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sqlite_master \
             WHERE type = 'table' \
             AND name IN ('user_history', 'user_preferences', 'ignore_list')",
        )
        .fetch_one(pool)
        .await
        .expect("sqlite_master query should work");
        assert_eq!(table_count, 3);
        assert!(!app.store.persistence_degraded());

        app.worker_pool.abort();
    }

    #[tokio::test]
    async fn unreachable_database_degrades_to_memory_only() {
        let app =
            bootstrap_with_config(test_config("sqlite:/nonexistent-banter-dir/banter.db"))
                .await
                .expect("bootstrap should survive a dead database");

        assert!(app.db_pool.is_none());

        app.worker_pool.abort();
    }

    #[tokio::test]
    async fn configured_ignored_nicks_are_seeded() {
        let mut config = test_config("sqlite::memory:");
        config.irc.ignored_nicks = vec!["spammy".to_string()];

        let app = bootstrap_with_config(config).await.expect("bootstrap should succeed");

        assert!(app.store.is_ignored("spammy").await);
        assert!(!app.store.is_ignored("ferris").await);

        app.worker_pool.abort();
    }
}
