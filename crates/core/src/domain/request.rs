use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::intent::Intent;
use super::message::{ConversationId, UserId};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(pub Uuid);

impl RequestId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Which upstream surface a request targets.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Endpoint {
    Completion,
    SearchCompletion,
}

impl Endpoint {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completion => "completion",
            Self::SearchCompletion => "search_completion",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnRole {
    User,
    Assistant,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextTurn {
    pub role: TurnRole,
    pub content: String,
}

/// Fully assembled upstream payload. Owned by the request; rebuilt only
/// when the search fallback strips the search capability.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestPayload {
    pub system_prompt: String,
    pub turns: Vec<ContextTurn>,
    pub message: String,
}

/// Lifecycle of a dispatched request.
///
/// `Queued → Claimed → (Succeeded | Retrying → Claimed | FailedFinal)`
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestState {
    Queued,
    Claimed,
    Retrying,
    Succeeded,
    FailedFinal,
}

impl RequestState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Claimed => "claimed",
            Self::Retrying => "retrying",
            Self::Succeeded => "succeeded",
            Self::FailedFinal => "failed_final",
        }
    }

    pub fn can_transition_to(&self, target: RequestState) -> bool {
        use RequestState::*;
        matches!(
            (*self, target),
            (Queued, Claimed)
                | (Claimed, Succeeded)
                | (Claimed, Retrying)
                | (Claimed, FailedFinal)
                | (Retrying, Claimed)
                | (Retrying, FailedFinal)
        )
    }
}

/// A unit of outbound work. Created by the request builder, owned by the
/// queue until claimed, then owned by exactly one worker.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingRequest {
    pub id: RequestId,
    pub conversation: ConversationId,
    pub speaker: UserId,
    pub intent: Intent,
    pub payload: RequestPayload,
    pub endpoint: Endpoint,
    pub state: RequestState,
    pub enqueued_at: DateTime<Utc>,
    pub attempt: u32,
}

impl PendingRequest {
    pub fn new(
        conversation: ConversationId,
        speaker: UserId,
        intent: Intent,
        payload: RequestPayload,
        endpoint: Endpoint,
    ) -> Self {
        Self {
            id: RequestId::generate(),
            conversation,
            speaker,
            intent,
            payload,
            endpoint,
            state: RequestState::Queued,
            enqueued_at: Utc::now(),
            attempt: 0,
        }
    }

    /// Advance the state machine, rejecting transitions the lifecycle
    /// does not allow.
    pub fn transition_to(&mut self, target: RequestState) -> Result<(), InvalidTransition> {
        if !self.state.can_transition_to(target) {
            return Err(InvalidTransition { from: self.state, to: target });
        }
        self.state = target;
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
#[error("invalid request transition from {from:?} to {to:?}")]
pub struct InvalidTransition {
    pub from: RequestState,
    pub to: RequestState,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::message::ChannelId;

    fn request() -> PendingRequest {
        PendingRequest::new(
            ConversationId::Channel(ChannelId("#rust".to_string())),
            UserId("ferris".to_string()),
            Intent::PlainChat,
            RequestPayload {
                system_prompt: "be brief".to_string(),
                turns: Vec::new(),
                message: "hello".to_string(),
            },
            Endpoint::Completion,
        )
    }

    #[test]
    fn happy_path_transitions_are_allowed() {
        let mut req = request();
        req.transition_to(RequestState::Claimed).expect("claim");
        req.transition_to(RequestState::Succeeded).expect("succeed");
    }

    #[test]
    fn retry_cycles_back_through_claimed() {
        let mut req = request();
        req.transition_to(RequestState::Claimed).expect("claim");
        req.transition_to(RequestState::Retrying).expect("retry");
        req.transition_to(RequestState::Claimed).expect("re-claim");
        req.transition_to(RequestState::FailedFinal).expect("fail");
    }

    #[test]
    fn queued_cannot_jump_to_terminal_states() {
        let mut req = request();
        assert!(req.transition_to(RequestState::Succeeded).is_err());
        assert!(req.transition_to(RequestState::FailedFinal).is_err());
        assert_eq!(req.state, RequestState::Queued);
    }

    #[test]
    fn terminal_states_are_final() {
        let mut req = request();
        req.transition_to(RequestState::Claimed).expect("claim");
        req.transition_to(RequestState::Succeeded).expect("succeed");
        assert!(req.transition_to(RequestState::Claimed).is_err());
    }
}
