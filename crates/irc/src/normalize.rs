//! Raw-line hygiene: addressing detection, prefix stripping, and the
//! noise filters that keep joins, mode changes, and other bots out of the
//! pipeline.

/// Word-bounded, case-insensitive nick mention.
pub fn mentions_nick(nick: &str, line: &str) -> bool {
    if nick.is_empty() {
        return false;
    }
    let lower_line = line.to_ascii_lowercase();
    let lower_nick = nick.to_ascii_lowercase();

    let mut search_from = 0;
    while let Some(found) = lower_line[search_from..].find(&lower_nick) {
        let start = search_from + found;
        let end = start + lower_nick.len();
        let before_ok = start == 0
            || !lower_line[..start].chars().next_back().map(is_word_char).unwrap_or(false);
        let after_ok =
            !lower_line[end..].chars().next().map(is_word_char).unwrap_or(false);
        if before_ok && after_ok {
            return true;
        }
        search_from = end;
    }
    false
}

fn is_word_char(ch: char) -> bool {
    ch.is_alphanumeric() || ch == '_'
}

/// Remove a leading `nick:`/`nick,`/`nick>` address so the model sees only
/// the actual message.
pub fn strip_address_prefix(nick: &str, line: &str) -> String {
    let trimmed = line.trim();
    let lower = trimmed.to_ascii_lowercase();
    let lower_nick = nick.to_ascii_lowercase();

    if !lower.starts_with(&lower_nick) {
        return trimmed.to_string();
    }

    let rest = &trimmed[nick.len()..];
    let stripped = rest.trim_start_matches([',', ':', '>', ' ', '\t']);
    if stripped.len() == rest.len() {
        // Nick prefix without an address separator ("banterbot3000" etc.).
        return trimmed.to_string();
    }
    stripped.trim().to_string()
}

/// Server and client chatter that should never reach classification.
pub fn is_noise(line: &str) -> bool {
    let trimmed = line.trim_start();
    if trimmed.starts_with("* ") || trimmed.starts_with('\u{1}') || trimmed.starts_with("MODE ") {
        return true;
    }
    let lower = trimmed.to_ascii_lowercase();
    ["has joined", "has quit", "has left", "has parted"]
        .iter()
        .any(|marker| lower.contains(marker))
}

/// Commands meant for some other bot (`.seen`, `/msg`, `!weather` handled
/// elsewhere). Our own admin commands are parsed before this filter runs.
pub fn is_foreign_command(message: &str) -> bool {
    matches!(message.trim_start().chars().next(), Some('.') | Some('!') | Some('/'))
}

#[cfg(test)]
mod tests {
    use super::{is_foreign_command, is_noise, mentions_nick, strip_address_prefix};

    #[test]
    fn mention_detection_is_word_bounded() {
        assert!(mentions_nick("banter", "banter: hello"));
        assert!(mentions_nick("banter", "hey BANTER, you around?"));
        assert!(mentions_nick("banter", "ask banter"));
        assert!(!mentions_nick("banter", "banterbot is a different bot"));
        assert!(!mentions_nick("banter", "debanter strikes again"));
        assert!(!mentions_nick("banter", "nothing relevant here"));
    }

    #[test]
    fn address_prefix_is_stripped_in_common_shapes() {
        assert_eq!(strip_address_prefix("banter", "banter: tell me a joke"), "tell me a joke");
        assert_eq!(strip_address_prefix("banter", "Banter, you there?"), "you there?");
        assert_eq!(strip_address_prefix("banter", "banter> hi"), "hi");
        assert_eq!(strip_address_prefix("banter", "what about banter then"), "what about banter then");
    }

    #[test]
    fn nick_prefixed_words_are_not_mangled() {
        assert_eq!(
            strip_address_prefix("banter", "banterbot3000 is online"),
            "banterbot3000 is online"
        );
    }

    #[test]
    fn server_chatter_counts_as_noise() {
        assert!(is_noise("* ferris waves"));
        assert!(is_noise("\u{1}ACTION waves\u{1}"));
        assert!(is_noise("MODE #rust +o ferris"));
        assert!(is_noise("ferris has joined #rust"));
        assert!(is_noise("ferris Has Quit (timeout)"));
        assert!(!is_noise("banter: hello"));
    }

    #[test]
    fn foreign_command_prefixes_are_detected() {
        assert!(is_foreign_command(".seen ferris"));
        assert!(is_foreign_command("!weather tokyo"));
        assert!(is_foreign_command("/msg someone hi"));
        assert!(!is_foreign_command("plain question"));
    }
}
