//! Delivery of finished replies back to the chat surface. The router owns
//! the last mile: scrubbing, addressing, chunking, recording the exchange,
//! and stamping the conversation cooldown.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use banter_core::domain::message::ConversationId;
use banter_core::domain::request::PendingRequest;
use banter_core::sanitize::{ReplySanitizer, Sanitize};

use crate::context::ContextStore;

/// Outbound side of the chat surface. Defined here so the router can be
/// exercised against a test double.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send_line(&self, conversation: &ConversationId, line: &str) -> anyhow::Result<()>;
}

pub struct ResponseRouter {
    transport: Arc<dyn Transport>,
    store: Arc<ContextStore>,
    sanitizer: ReplySanitizer,
    line_limit: usize,
    send_delay: Duration,
    cooldown: Duration,
}

impl ResponseRouter {
    pub fn new(
        transport: Arc<dyn Transport>,
        store: Arc<ContextStore>,
        sanitizer: ReplySanitizer,
        line_limit: usize,
        send_delay: Duration,
        cooldown: Duration,
    ) -> Self {
        Self {
            transport,
            store,
            sanitizer,
            line_limit: line_limit.max(64),
            send_delay,
            cooldown,
        }
    }

    /// Deliver a finished reply. Transport failures are logged and swallowed;
    /// the channel never sees an error message.
    pub async fn deliver(&self, request: &PendingRequest, reply: &str) {
        // Claim-time checks race when workers finish together; the clock
        // is stamped here, atomically, so only one reply per window gets
        // past this point.
        if !self.store.try_mark_delivered(&request.conversation, self.cooldown).await {
            debug!(
                request_id = %request.id,
                conversation = %request.conversation.label(),
                "delivery suppressed inside cooldown window"
            );
            return;
        }

        let cleaned = self.sanitizer.sanitize(reply);
        let addressed = address_reply(&request.conversation, &request.speaker.0, &cleaned);

        self.store
            .record_exchange(&request.speaker, &request.payload.message, &cleaned)
            .await;

        for (n, chunk) in chunk_message(&addressed, self.line_limit).iter().enumerate() {
            if n > 0 && !self.send_delay.is_zero() {
                tokio::time::sleep(self.send_delay).await;
            }
            if let Err(error) = self.transport.send_line(&request.conversation, chunk).await {
                warn!(
                    %error,
                    request_id = %request.id,
                    conversation = %request.conversation.label(),
                    "dropping reply chunk, transport send failed"
                );
                break;
            }
        }
    }
}

/// Prefix channel replies with the asker's nick so they land addressed.
/// Direct messages go out untouched.
fn address_reply(conversation: &ConversationId, speaker: &str, reply: &str) -> String {
    match conversation {
        ConversationId::Direct(_) => reply.to_string(),
        ConversationId::Channel(_) => {
            if reply.to_ascii_lowercase().starts_with(&speaker.to_ascii_lowercase()) {
                reply.to_string()
            } else {
                format!("{speaker}: {reply}")
            }
        }
    }
}

/// Split a reply into transport-sized chunks, preferring word boundaries.
fn chunk_message(text: &str, limit: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        let word_len = word.chars().count();
        let current_len = current.chars().count();

        if current_len + word_len + usize::from(!current.is_empty()) > limit {
            if !current.is_empty() {
                chunks.push(std::mem::take(&mut current));
            }
            if word_len > limit {
                // A single oversized token gets hard-split.
                let glyphs: Vec<char> = word.chars().collect();
                for piece in glyphs.chunks(limit) {
                    chunks.push(piece.iter().collect());
                }
                continue;
            }
        }

        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }

    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}
