//! Turns a classified message into either a locally answered reply or a
//! fully assembled upstream request. Context is snapshotted here; nothing
//! downstream reads the store while the request waits in the queue.

use chrono::Utc;

use banter_core::config::{ApiConfig, ContextConfig};
use banter_core::domain::intent::Intent;
use banter_core::domain::message::{ConversationId, UserId};
use banter_core::domain::request::{
    ContextTurn, Endpoint, PendingRequest, RequestPayload, TurnRole,
};

use crate::classify::parse_preference_change;
use crate::context::ContextStore;

#[derive(Debug)]
pub enum BuildOutcome {
    /// Answered without touching the upstream API.
    Local(String),
    /// Needs a completion; ready for the dispatch queue.
    Request(PendingRequest),
    /// Nothing to do for this message.
    Skip,
}

pub struct RequestBuilder {
    system_prompt: String,
    prompt_channel_entries: usize,
    prompt_user_turns: usize,
}

impl RequestBuilder {
    pub fn new(api: &ApiConfig, context: &ContextConfig) -> Self {
        Self {
            system_prompt: api.system_prompt.clone(),
            prompt_channel_entries: context.prompt_channel_entries,
            prompt_user_turns: context.prompt_user_turns,
        }
    }

    pub async fn build(
        &self,
        store: &ContextStore,
        conversation: &ConversationId,
        speaker: &UserId,
        text: &str,
        intent: Intent,
    ) -> BuildOutcome {
        match intent {
            Intent::Ignored => BuildOutcome::Skip,
            Intent::TimeQuery => BuildOutcome::Local(self.answer_time(store, speaker).await),
            Intent::PreferenceUpdate => {
                BuildOutcome::Local(self.apply_preferences(store, speaker, text).await)
            }
            Intent::Search => {
                let message = text.to_string();
                BuildOutcome::Request(
                    self.assemble(store, conversation, speaker, message, intent,
                        Endpoint::SearchCompletion)
                        .await,
                )
            }
            Intent::EmoteReaction => {
                let message = format!("* {} {}", speaker.0, text);
                BuildOutcome::Request(
                    self.assemble(store, conversation, speaker, message, intent,
                        Endpoint::Completion)
                        .await,
                )
            }
            Intent::PlainChat => {
                let message = text.to_string();
                BuildOutcome::Request(
                    self.assemble(store, conversation, speaker, message, intent,
                        Endpoint::Completion)
                        .await,
                )
            }
        }
    }

    /// Time queries never leave the process.
    async fn answer_time(&self, store: &ContextStore, speaker: &UserId) -> String {
        let prefs = store.preferences(speaker).await;
        format!("it's {}", prefs.format_local_time(Utc::now()))
    }

    async fn apply_preferences(
        &self,
        store: &ContextStore,
        speaker: &UserId,
        text: &str,
    ) -> String {
        let change = parse_preference_change(text);
        if change.is_empty() {
            return "tell me an offset like UTC+5:30 or a clock style like 12h / 24h".to_string();
        }

        let mut prefs = store.preferences(speaker).await;
        if let Some(timezone) = change.timezone {
            prefs.timezone = timezone;
        }
        if let Some(time_format) = change.time_format {
            prefs.time_format = time_format;
        }
        let confirmation =
            format!("noted: {} with the {} clock", prefs.timezone, prefs.time_format.as_str());
        store.set_preferences(speaker, prefs).await;
        confirmation
    }

    async fn assemble(
        &self,
        store: &ContextStore,
        conversation: &ConversationId,
        speaker: &UserId,
        message: String,
        intent: Intent,
        endpoint: Endpoint,
    ) -> PendingRequest {
        let mut system_prompt = self.system_prompt.clone();
        if let Some(channel) = conversation.channel() {
            let recent = store.channel_messages(channel, self.prompt_channel_entries).await;
            if !recent.is_empty() {
                system_prompt.push_str("\n\nRecent channel activity:\n");
                for record in recent {
                    system_prompt.push_str(&format!("{}: {}\n", record.speaker, record.text));
                }
            }
        }

        let turns = store
            .user_turns(speaker, self.prompt_user_turns)
            .await
            .into_iter()
            .flat_map(|turn| {
                [
                    ContextTurn { role: TurnRole::User, content: turn.user_message },
                    ContextTurn { role: TurnRole::Assistant, content: turn.bot_reply },
                ]
            })
            .collect();

        PendingRequest::new(
            conversation.clone(),
            speaker.clone(),
            intent,
            RequestPayload { system_prompt, turns, message },
            endpoint,
        )
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use banter_core::config::AppConfig;
    use banter_core::domain::intent::Intent;
    use banter_core::domain::message::{ChannelId, ConversationId, MessageRecord, UserId};
    use banter_core::domain::prefs::TimeFormat;
    use banter_core::domain::request::{Endpoint, TurnRole};
    use banter_db::repositories::{
        InMemoryIgnoreListRepository, InMemoryPreferenceRepository, InMemoryUserHistoryRepository,
    };

    use super::{BuildOutcome, RequestBuilder};
    use crate::context::ContextStore;

    fn fixture() -> (RequestBuilder, ContextStore) {
        let config = AppConfig::default();
        let builder = RequestBuilder::new(&config.api, &config.context);
        let store = ContextStore::new(
            &config.context,
            Arc::new(InMemoryUserHistoryRepository::default()),
            Arc::new(InMemoryPreferenceRepository::default()),
            Arc::new(InMemoryIgnoreListRepository::default()),
        );
        (builder, store)
    }

    fn channel() -> ConversationId {
        ConversationId::Channel(ChannelId("#rust".to_string()))
    }

    fn speaker() -> UserId {
        UserId("ferris".to_string())
    }

    #[tokio::test]
    async fn time_queries_short_circuit_locally() {
        let (builder, store) = fixture();
        let outcome = builder
            .build(&store, &channel(), &speaker(), "what time is it", Intent::TimeQuery)
            .await;

        match outcome {
            BuildOutcome::Local(reply) => assert!(reply.starts_with("it's ")),
            other => panic!("expected local outcome, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn preference_updates_apply_and_confirm() {
        let (builder, store) = fixture();
        let outcome = builder
            .build(
                &store,
                &channel(),
                &speaker(),
                "set my timezone to UTC+5:30 and 12h please",
                Intent::PreferenceUpdate,
            )
            .await;

        match outcome {
            BuildOutcome::Local(reply) => assert!(reply.contains("UTC+5:30")),
            other => panic!("expected local outcome, got {other:?}"),
        }

        let prefs = store.preferences(&speaker()).await;
        assert_eq!(prefs.timezone, "UTC+5:30");
        assert_eq!(prefs.time_format, TimeFormat::TwelveHour);
    }

    #[tokio::test]
    async fn unparseable_preference_text_asks_for_specifics() {
        let (builder, store) = fixture();
        let outcome = builder
            .build(&store, &channel(), &speaker(), "fix my timezone", Intent::PreferenceUpdate)
            .await;

        match outcome {
            BuildOutcome::Local(reply) => assert!(reply.contains("UTC+5:30")),
            other => panic!("expected local outcome, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn search_intent_targets_the_search_endpoint() {
        let (builder, store) = fixture();
        let outcome = builder
            .build(&store, &channel(), &speaker(), "latest rust release?", Intent::Search)
            .await;

        match outcome {
            BuildOutcome::Request(request) => {
                assert_eq!(request.endpoint, Endpoint::SearchCompletion);
                assert_eq!(request.payload.message, "latest rust release?");
            }
            other => panic!("expected request outcome, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn context_is_snapshotted_into_the_payload() {
        let (builder, store) = fixture();
        let channel_id = ChannelId("#rust".to_string());

        store
            .record_channel_message(
                &channel_id,
                MessageRecord {
                    speaker: "corro".to_string(),
                    text: "borrowck question".to_string(),
                    at: chrono::Utc::now(),
                },
            )
            .await;
        store.record_exchange(&speaker(), "earlier question", "earlier answer").await;

        let outcome = builder
            .build(&store, &channel(), &speaker(), "and a follow-up", Intent::PlainChat)
            .await;

        let request = match outcome {
            BuildOutcome::Request(request) => request,
            other => panic!("expected request outcome, got {other:?}"),
        };

        assert!(request.payload.system_prompt.contains("corro: borrowck question"));
        assert_eq!(request.payload.turns.len(), 2);
        assert_eq!(request.payload.turns[0].role, TurnRole::User);
        assert_eq!(request.payload.turns[0].content, "earlier question");
        assert_eq!(request.payload.turns[1].content, "earlier answer");
    }

    #[tokio::test]
    async fn emotes_are_framed_as_actions() {
        let (builder, store) = fixture();
        let outcome = builder
            .build(&store, &channel(), &speaker(), "pets the bot", Intent::EmoteReaction)
            .await;

        match outcome {
            BuildOutcome::Request(request) => {
                assert_eq!(request.payload.message, "* ferris pets the bot");
                assert_eq!(request.endpoint, Endpoint::Completion);
            }
            other => panic!("expected request outcome, got {other:?}"),
        }
    }
}
