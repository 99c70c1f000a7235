//! Connection pump. Owns the reconnect loop and feeds every inbound line
//! through the pipeline; local and admin replies go straight back out,
//! everything else is the worker pool's problem.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use thiserror::Error;
use tokio::time::Duration;
use tracing::{info, warn};

use banter_agent::router::Transport;
use banter_core::domain::message::ConversationId;

use crate::events::{ChatMessage, MessagePipeline, PipelineOutcome};

#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("connect failed: {0}")]
    Connect(String),
    #[error("read failed: {0}")]
    Read(String),
}

/// Inbound side of the chat surface.
#[async_trait]
pub trait ChatConnection: Send + Sync {
    async fn connect(&self) -> Result<(), ConnectionError>;
    /// `Ok(None)` means the stream closed cleanly.
    async fn next_message(&self) -> Result<Option<ChatMessage>, ConnectionError>;
    async fn disconnect(&self) -> Result<(), ConnectionError>;
}

#[derive(Default)]
pub struct NoopChatConnection;

#[async_trait]
impl ChatConnection for NoopChatConnection {
    async fn connect(&self) -> Result<(), ConnectionError> {
        Ok(())
    }

    async fn next_message(&self) -> Result<Option<ChatMessage>, ConnectionError> {
        Ok(None)
    }

    async fn disconnect(&self) -> Result<(), ConnectionError> {
        Ok(())
    }
}

#[derive(Clone, Copy, Debug)]
pub struct ReconnectPolicy {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self { max_retries: 5, base_delay_ms: 250, max_delay_ms: 5_000 }
    }
}

impl ReconnectPolicy {
    fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(16);
        let multiplier = 1_u64 << exponent;
        let delay_ms = self.base_delay_ms.saturating_mul(multiplier).min(self.max_delay_ms);
        Duration::from_millis(delay_ms)
    }
}

pub struct IrcRunner {
    connection: Arc<dyn ChatConnection>,
    transport: Arc<dyn Transport>,
    pipeline: Arc<MessagePipeline>,
    reconnect_policy: ReconnectPolicy,
}

impl IrcRunner {
    pub fn new(
        connection: Arc<dyn ChatConnection>,
        transport: Arc<dyn Transport>,
        pipeline: Arc<MessagePipeline>,
        reconnect_policy: ReconnectPolicy,
    ) -> Self {
        Self { connection, transport, pipeline, reconnect_policy }
    }

    pub async fn start(&self) -> Result<()> {
        for attempt in 0..=self.reconnect_policy.max_retries {
            match self.connect_and_pump(attempt).await {
                Ok(()) => return Ok(()),
                Err(error) => {
                    warn!(
                        attempt,
                        max_retries = self.reconnect_policy.max_retries,
                        %error,
                        "chat connection failed"
                    );

                    if attempt >= self.reconnect_policy.max_retries {
                        warn!(
                            max_retries = self.reconnect_policy.max_retries,
                            "reconnect retries exhausted, giving up the connection"
                        );
                        return Ok(());
                    }

                    let delay = self.reconnect_policy.backoff(attempt);
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        Ok(())
    }

    async fn connect_and_pump(&self, attempt: u32) -> Result<(), ConnectionError> {
        info!(attempt, "opening chat connection");
        self.connection.connect().await?;
        info!(attempt, "chat connection established");

        loop {
            let Some(message) = self.connection.next_message().await? else {
                info!(attempt, "chat stream closed");
                self.connection.disconnect().await?;
                return Ok(());
            };

            let outcome = self.pipeline.handle(&message).await;
            match outcome {
                PipelineOutcome::LocalReply(reply) | PipelineOutcome::AdminReply(reply) => {
                    self.send_reply(&message, &reply).await;
                }
                PipelineOutcome::Enqueued(request_id) => {
                    info!(
                        %request_id,
                        conversation = %message.conversation.label(),
                        "request queued for dispatch"
                    );
                }
                PipelineOutcome::Ignored
                | PipelineOutcome::Recorded
                | PipelineOutcome::Dropped(_) => {}
            }
        }
    }

    /// Local replies skip the worker path entirely; they still land
    /// addressed when spoken in a channel.
    async fn send_reply(&self, message: &ChatMessage, reply: &str) {
        let line = match &message.conversation {
            ConversationId::Channel(_) => format!("{}: {}", message.speaker.0, reply),
            ConversationId::Direct(_) => reply.to_string(),
        };
        if let Err(error) = self.transport.send_line(&message.conversation, &line).await {
            warn!(
                %error,
                conversation = %message.conversation.label(),
                "failed to send local reply"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tokio::sync::Mutex;

    use banter_agent::builder::RequestBuilder;
    use banter_agent::classify::HeuristicStrategy;
    use banter_agent::context::ContextStore;
    use banter_agent::queue::dispatch_channel;
    use banter_agent::router::Transport;
    use banter_core::config::AppConfig;
    use banter_core::domain::message::{ChannelId, ConversationId, UserId};
    use banter_db::repositories::{
        InMemoryIgnoreListRepository, InMemoryPreferenceRepository, InMemoryUserHistoryRepository,
    };

    use super::{ChatConnection, ChatMessage, ConnectionError, IrcRunner, ReconnectPolicy};
    use crate::commands::ConfigAdminPolicy;
    use crate::events::MessagePipeline;

    struct ScriptedConnection {
        messages: Mutex<Vec<ChatMessage>>,
    }

    #[async_trait::async_trait]
    impl ChatConnection for ScriptedConnection {
        async fn connect(&self) -> Result<(), ConnectionError> {
            Ok(())
        }

        async fn next_message(&self) -> Result<Option<ChatMessage>, ConnectionError> {
            let mut messages = self.messages.lock().await;
            if messages.is_empty() {
                Ok(None)
            } else {
                Ok(Some(messages.remove(0)))
            }
        }

        async fn disconnect(&self) -> Result<(), ConnectionError> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingTransport {
        lines: Mutex<Vec<String>>,
    }

    #[async_trait::async_trait]
    impl Transport for RecordingTransport {
        async fn send_line(
            &self,
            _conversation: &ConversationId,
            line: &str,
        ) -> anyhow::Result<()> {
            self.lines.lock().await.push(line.to_string());
            Ok(())
        }
    }

    fn pipeline() -> Arc<MessagePipeline> {
        let config = AppConfig::default();
        let store = Arc::new(ContextStore::new(
            &config.context,
            Arc::new(InMemoryUserHistoryRepository::default()),
            Arc::new(InMemoryPreferenceRepository::default()),
            Arc::new(InMemoryIgnoreListRepository::default()),
        ));
        let (queue, _receiver) = dispatch_channel(4);
        // Receiver is intentionally dropped; these tests only exercise
        // locally answered messages.
        Arc::new(MessagePipeline::new(
            "banter".to_string(),
            Vec::new(),
            store,
            Arc::new(HeuristicStrategy),
            RequestBuilder::new(&config.api, &config.context),
            queue,
            Arc::new(ConfigAdminPolicy::new(["oper".to_string()])),
        ))
    }

    #[tokio::test]
    async fn runner_pumps_until_the_stream_closes() {
        let connection = Arc::new(ScriptedConnection {
            messages: Mutex::new(vec![ChatMessage {
                conversation: ConversationId::Channel(ChannelId("#rust".to_string())),
                speaker: UserId("ferris".to_string()),
                text: "banter: what time is it?".to_string(),
                is_action: false,
            }]),
        });
        let transport = Arc::new(RecordingTransport::default());
        let runner = IrcRunner::new(
            connection,
            transport.clone(),
            pipeline(),
            ReconnectPolicy { max_retries: 0, base_delay_ms: 1, max_delay_ms: 1 },
        );

        runner.start().await.expect("runner finishes");

        let lines = transport.lines.lock().await;
        assert_eq!(lines.len(), 1);
        assert!(lines[0].starts_with("ferris: it's "));
    }

    #[tokio::test]
    async fn noop_connection_finishes_immediately() {
        let runner = IrcRunner::new(
            Arc::new(super::NoopChatConnection),
            Arc::new(RecordingTransport::default()),
            pipeline(),
            ReconnectPolicy::default(),
        );
        runner.start().await.expect("clean shutdown");
    }
}
