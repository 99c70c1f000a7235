use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChannelId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub String);

/// Where a reply should be delivered: a shared channel or a direct
/// conversation with one user.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConversationId {
    Channel(ChannelId),
    Direct(UserId),
}

impl ConversationId {
    pub fn channel(&self) -> Option<&ChannelId> {
        match self {
            Self::Channel(channel) => Some(channel),
            Self::Direct(_) => None,
        }
    }

    pub fn label(&self) -> &str {
        match self {
            Self::Channel(ChannelId(name)) => name,
            Self::Direct(UserId(nick)) => nick,
        }
    }
}

/// One observed line in a channel window.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRecord {
    pub speaker: String,
    pub text: String,
    pub at: DateTime<Utc>,
}

/// One completed exchange kept in a user's durable history.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnPair {
    pub user_message: String,
    pub bot_reply: String,
    pub at: DateTime<Utc>,
}
