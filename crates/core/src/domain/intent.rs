/// Classified purpose of an observed message. Closed set: every
/// classifier strategy maps into these variants and nothing else.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Intent {
    /// Addressed conversation with no special handling.
    PlainChat,
    /// Needs current information; routed to the search-capable endpoint.
    Search,
    /// Answerable locally from clock plus stored preferences.
    TimeQuery,
    /// Declares a timezone or time-format preference.
    PreferenceUpdate,
    /// An action line directed at the bot.
    EmoteReaction,
    /// Not addressed, or filtered; recorded as passive context only.
    Ignored,
}

impl Intent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PlainChat => "plain_chat",
            Self::Search => "search",
            Self::TimeQuery => "time_query",
            Self::PreferenceUpdate => "preference_update",
            Self::EmoteReaction => "emote_reaction",
            Self::Ignored => "ignored",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "plain_chat" => Some(Self::PlainChat),
            "search" => Some(Self::Search),
            "time_query" => Some(Self::TimeQuery),
            "preference_update" => Some(Self::PreferenceUpdate),
            "emote_reaction" => Some(Self::EmoteReaction),
            "ignored" => Some(Self::Ignored),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Intent;

    #[test]
    fn parse_round_trips_every_variant() {
        let variants = [
            Intent::PlainChat,
            Intent::Search,
            Intent::TimeQuery,
            Intent::PreferenceUpdate,
            Intent::EmoteReaction,
            Intent::Ignored,
        ];
        for intent in variants {
            assert_eq!(Intent::parse(intent.as_str()), Some(intent));
        }
        assert_eq!(Intent::parse("smalltalk"), None);
    }
}
