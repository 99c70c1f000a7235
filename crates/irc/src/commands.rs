//! In-channel admin commands. Everything except `!resetme` requires the
//! speaker to be on the configured admin list.

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AdminCommand {
    /// `!reset`: wipe the current channel's context window.
    ResetChannel,
    /// `!resetme`: wipe your own stored history. Open to everyone.
    ResetSelf,
    /// `!ignore <nick>`: stop reacting to a user.
    Ignore(String),
    /// `!unignore <nick>`: start reacting to a user again.
    Unignore(String),
}

impl AdminCommand {
    pub fn parse(text: &str) -> Option<Self> {
        let trimmed = text.trim();
        let mut parts = trimmed.split_whitespace();
        let keyword = parts.next()?.to_ascii_lowercase();
        let argument = parts.next();

        match (keyword.as_str(), argument) {
            ("!resetme", None) => Some(Self::ResetSelf),
            ("!reset", None) => Some(Self::ResetChannel),
            ("!ignore", Some(nick)) => Some(Self::Ignore(nick.to_string())),
            ("!unignore", Some(nick)) => Some(Self::Unignore(nick.to_string())),
            _ => None,
        }
    }

    /// `!resetme` is self-service; the rest need privileges.
    pub fn requires_admin(&self) -> bool {
        !matches!(self, Self::ResetSelf)
    }
}

pub trait AdminPolicy: Send + Sync {
    fn is_admin(&self, nick: &str) -> bool;
}

/// Static admin list from configuration, compared case-insensitively.
pub struct ConfigAdminPolicy {
    admins: Vec<String>,
}

impl ConfigAdminPolicy {
    pub fn new<I: IntoIterator<Item = String>>(admins: I) -> Self {
        Self { admins: admins.into_iter().map(|nick| nick.to_ascii_lowercase()).collect() }
    }
}

impl AdminPolicy for ConfigAdminPolicy {
    fn is_admin(&self, nick: &str) -> bool {
        let lower = nick.to_ascii_lowercase();
        self.admins.iter().any(|admin| *admin == lower)
    }
}
