//! The inbound message pipeline: gate, record, classify, build, enqueue.
//! Every channel line that survives the gates lands in the channel window,
//! whether or not the bot was addressed and whether or not the queue had
//! room for a request.

use std::sync::Arc;

use tracing::{debug, info, warn};

use banter_agent::builder::{BuildOutcome, RequestBuilder};
use banter_agent::classify::IntentStrategy;
use banter_agent::context::ContextStore;
use banter_agent::queue::DispatchQueue;
use banter_core::domain::message::{ConversationId, MessageRecord, UserId};
use banter_core::domain::request::RequestId;
use banter_core::errors::EnqueueError;

use crate::commands::{AdminCommand, AdminPolicy};
use crate::normalize::{is_foreign_command, is_noise, mentions_nick, strip_address_prefix};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChatMessage {
    pub conversation: ConversationId,
    pub speaker: UserId,
    pub text: String,
    /// True for `/me`-style action lines.
    pub is_action: bool,
}

#[derive(Debug)]
pub enum PipelineOutcome {
    /// Filtered out before classification.
    Ignored,
    /// Kept as passive context, no reply owed.
    Recorded,
    /// Reply produced by an admin command.
    AdminReply(String),
    /// Reply produced without the upstream API.
    LocalReply(String),
    /// Handed to the dispatch queue.
    Enqueued(RequestId),
    /// The queue pushed back; the message stays as passive context only.
    Dropped(EnqueueError),
}

pub struct MessagePipeline {
    nick: String,
    blocked_channels: Vec<String>,
    store: Arc<ContextStore>,
    classifier: Arc<dyn IntentStrategy>,
    builder: RequestBuilder,
    queue: DispatchQueue,
    admin_policy: Arc<dyn AdminPolicy>,
}

impl MessagePipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        nick: String,
        blocked_channels: Vec<String>,
        store: Arc<ContextStore>,
        classifier: Arc<dyn IntentStrategy>,
        builder: RequestBuilder,
        queue: DispatchQueue,
        admin_policy: Arc<dyn AdminPolicy>,
    ) -> Self {
        Self { nick, blocked_channels, store, classifier, builder, queue, admin_policy }
    }

    pub async fn handle(&self, message: &ChatMessage) -> PipelineOutcome {
        if let Some(channel) = message.conversation.channel() {
            if self.blocked_channels.iter().any(|blocked| blocked == &channel.0) {
                return PipelineOutcome::Ignored;
            }
        }

        // O(1) membership check before anything else happens.
        if self.store.is_ignored(&message.speaker.0).await {
            return PipelineOutcome::Ignored;
        }

        if !message.is_action && is_noise(&message.text) {
            return PipelineOutcome::Ignored;
        }

        if let Some(channel) = message.conversation.channel() {
            self.store
                .record_channel_message(
                    channel,
                    MessageRecord {
                        speaker: message.speaker.0.clone(),
                        text: message.text.clone(),
                        at: chrono::Utc::now(),
                    },
                )
                .await;
        }

        if let Some(command) = AdminCommand::parse(&message.text) {
            return self.handle_admin(message, command).await;
        }

        let text = match self.addressed_text(message) {
            Some(text) => text,
            None => return PipelineOutcome::Recorded,
        };

        if text.is_empty() || (!message.is_action && is_foreign_command(&text)) {
            return PipelineOutcome::Recorded;
        }

        let intent = self.classifier.classify(&text, message.is_action).await;
        debug!(
            speaker = %message.speaker.0,
            conversation = %message.conversation.label(),
            intent = intent.as_str(),
            "classified inbound message"
        );

        match self
            .builder
            .build(&self.store, &message.conversation, &message.speaker, &text, intent)
            .await
        {
            BuildOutcome::Skip => PipelineOutcome::Recorded,
            BuildOutcome::Local(reply) => PipelineOutcome::LocalReply(reply),
            BuildOutcome::Request(request) => {
                let request_id = request.id.clone();
                match self.queue.try_enqueue(request) {
                    Ok(()) => PipelineOutcome::Enqueued(request_id),
                    Err(error) => {
                        warn!(
                            %error,
                            speaker = %message.speaker.0,
                            conversation = %message.conversation.label(),
                            "dropping request, dispatch queue pushed back"
                        );
                        PipelineOutcome::Dropped(error)
                    }
                }
            }
        }
    }

    /// Resolve whether the bot was spoken to, returning the cleaned text.
    fn addressed_text(&self, message: &ChatMessage) -> Option<String> {
        match &message.conversation {
            ConversationId::Direct(_) => Some(message.text.trim().to_string()),
            ConversationId::Channel(_) => {
                if mentions_nick(&self.nick, &message.text) {
                    Some(strip_address_prefix(&self.nick, &message.text))
                } else {
                    None
                }
            }
        }
    }

    async fn handle_admin(
        &self,
        message: &ChatMessage,
        command: AdminCommand,
    ) -> PipelineOutcome {
        if command.requires_admin() && !self.admin_policy.is_admin(&message.speaker.0) {
            debug!(speaker = %message.speaker.0, "non-admin command attempt dropped");
            return PipelineOutcome::Ignored;
        }

        match command {
            AdminCommand::ResetSelf => {
                self.store.clear_user(&message.speaker).await;
                PipelineOutcome::AdminReply("your history is gone".to_string())
            }
            AdminCommand::ResetChannel => match message.conversation.channel() {
                Some(channel) => {
                    self.store.clear_channel(channel).await;
                    info!(admin = %message.speaker.0, channel = %channel.0, "channel context reset");
                    PipelineOutcome::AdminReply("channel context cleared".to_string())
                }
                None => PipelineOutcome::AdminReply("nothing to reset here".to_string()),
            },
            AdminCommand::Ignore(nick) => {
                self.store.add_ignored(&nick, &message.speaker.0).await;
                info!(admin = %message.speaker.0, target = %nick, "nick ignored");
                PipelineOutcome::AdminReply(format!("ignoring {nick}"))
            }
            AdminCommand::Unignore(nick) => {
                let removed = self.store.remove_ignored(&nick).await;
                if removed {
                    PipelineOutcome::AdminReply(format!("listening to {nick} again"))
                } else {
                    PipelineOutcome::AdminReply(format!("{nick} was not ignored"))
                }
            }
        }
    }
}
