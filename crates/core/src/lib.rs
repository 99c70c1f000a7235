pub mod config;
pub mod domain;
pub mod errors;
pub mod sanitize;

pub use chrono;

pub use config::{AppConfig, ConfigError, ConfigOverrides, LoadOptions};
pub use domain::intent::Intent;
pub use domain::message::{ChannelId, ConversationId, MessageRecord, TurnPair, UserId};
pub use domain::prefs::{TimeFormat, UserPreferences};
pub use domain::request::{
    ContextTurn, Endpoint, PendingRequest, RequestId, RequestPayload, RequestState, TurnRole,
};
pub use errors::{EnqueueError, GenerationError};
pub use sanitize::{ReplySanitizer, Sanitize};
