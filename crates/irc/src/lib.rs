pub mod commands;
pub mod events;
pub mod normalize;
pub mod runner;

pub use commands::{AdminCommand, AdminPolicy, ConfigAdminPolicy};
pub use events::{ChatMessage, MessagePipeline, PipelineOutcome};
pub use runner::{ChatConnection, IrcRunner, NoopChatConnection, ReconnectPolicy};
