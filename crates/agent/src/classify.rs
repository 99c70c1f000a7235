//! Intent detection for inbound chat lines. The heuristic path is a pure
//! first-match-wins keyword scan; the model-backed path asks the upstream
//! API and falls back to the heuristic when that fails.

use async_trait::async_trait;
use tracing::debug;

use banter_core::domain::intent::Intent;
use banter_core::domain::prefs::{parse_utc_offset, TimeFormat};
use banter_core::domain::request::{Endpoint, RequestPayload};

use crate::llm::GenerationClient;

const SEARCH_MARKERS: &[&str] = &[
    "latest", "current", "today", "tonight", "right now", "news", "weather", "forecast",
    "score", "price", "stock", "headline",
];

const TIME_MARKERS: &[&str] =
    &["what time", "time is it", "current time", "local time", "my time"];

const PREFERENCE_MARKERS: &[&str] =
    &["timezone", "time zone", "time format", "set my time"];

/// Classify one addressed line. Ignore-list and noise filtering happen
/// before this is called.
pub fn classify(text: &str, is_action: bool) -> Intent {
    let normalized = normalize(text);
    if normalized.is_empty() {
        return Intent::Ignored;
    }
    if is_action {
        return Intent::EmoteReaction;
    }
    if contains_any(&normalized, PREFERENCE_MARKERS) {
        return Intent::PreferenceUpdate;
    }
    if contains_any(&normalized, TIME_MARKERS) {
        return Intent::TimeQuery;
    }
    if contains_any(&normalized, SEARCH_MARKERS) {
        return Intent::Search;
    }
    Intent::PlainChat
}

fn normalize(text: &str) -> String {
    text.trim().to_ascii_lowercase()
}

fn contains_any(normalized: &str, markers: &[&str]) -> bool {
    markers.iter().any(|marker| normalized.contains(marker))
}

/// A requested preference change parsed out of free text.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PreferenceChange {
    pub timezone: Option<String>,
    pub time_format: Option<TimeFormat>,
}

impl PreferenceChange {
    pub fn is_empty(&self) -> bool {
        self.timezone.is_none() && self.time_format.is_none()
    }
}

/// Scan for an offset declaration (`UTC+5:30`, `GMT-7`) and a clock style
/// (`12h`, `24 hour`). Either half may be absent.
pub fn parse_preference_change(text: &str) -> PreferenceChange {
    let mut change = PreferenceChange::default();

    for token in text.split_whitespace() {
        let token = token.trim_matches(|ch: char| ch.is_ascii_punctuation() && ch != '+' && ch != '-' && ch != ':');
        if change.timezone.is_none() && parse_utc_offset(token).is_some() {
            change.timezone = Some(token.to_ascii_uppercase());
        }
        if change.time_format.is_none() {
            change.time_format = TimeFormat::parse(token);
        }
    }

    if change.time_format.is_none() {
        let normalized = normalize(text);
        if normalized.contains("12 hour") || normalized.contains("12-hour") {
            change.time_format = Some(TimeFormat::TwelveHour);
        } else if normalized.contains("24 hour") || normalized.contains("24-hour") {
            change.time_format = Some(TimeFormat::TwentyFourHour);
        }
    }

    change
}

#[async_trait]
pub trait IntentStrategy: Send + Sync {
    async fn classify(&self, text: &str, is_action: bool) -> Intent;
}

#[derive(Clone, Debug, Default)]
pub struct HeuristicStrategy;

#[async_trait]
impl IntentStrategy for HeuristicStrategy {
    async fn classify(&self, text: &str, is_action: bool) -> Intent {
        classify(text, is_action)
    }
}

/// Classifier disabled: everything addressed is plain chat.
#[derive(Clone, Debug, Default)]
pub struct OffStrategy;

#[async_trait]
impl IntentStrategy for OffStrategy {
    async fn classify(&self, text: &str, _is_action: bool) -> Intent {
        if text.trim().is_empty() {
            Intent::Ignored
        } else {
            Intent::PlainChat
        }
    }
}

const CLASSIFIER_PROMPT: &str = "Classify the user's message into exactly one label: \
plain_chat, search, time_query, preference_update, or emote_reaction. \
Reply with the label only.";

pub struct ModelStrategy<C> {
    client: C,
}

impl<C: GenerationClient> ModelStrategy<C> {
    pub fn new(client: C) -> Self {
        Self { client }
    }
}

#[async_trait]
impl<C: GenerationClient> IntentStrategy for ModelStrategy<C> {
    async fn classify(&self, text: &str, is_action: bool) -> Intent {
        if is_action {
            return Intent::EmoteReaction;
        }
        let payload = RequestPayload {
            system_prompt: CLASSIFIER_PROMPT.to_string(),
            turns: Vec::new(),
            message: text.to_string(),
        };
        match self.client.generate(&payload, Endpoint::Completion).await {
            Ok(label) => Intent::parse(label.trim()).unwrap_or_else(|| classify(text, is_action)),
            Err(error) => {
                debug!(%error, "model classification failed, using heuristic");
                classify(text, is_action)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use banter_core::domain::intent::Intent;
    use banter_core::domain::prefs::TimeFormat;

    use super::{classify, parse_preference_change};

    #[test]
    fn keyword_table_drives_classification() {
        let cases = [
            ("tell me a joke", Intent::PlainChat),
            ("what's the latest on the election", Intent::Search),
            ("weather in tokyo tomorrow?", Intent::Search),
            ("what time is it for me", Intent::TimeQuery),
            ("set my timezone to UTC+5:30", Intent::PreferenceUpdate),
            ("switch my time format to 12h", Intent::PreferenceUpdate),
            ("", Intent::Ignored),
            ("   ", Intent::Ignored),
        ];

        for (text, expected) in cases {
            assert_eq!(classify(text, false), expected, "text: {text:?}");
        }
    }

    #[test]
    fn actions_classify_as_emotes() {
        assert_eq!(classify("pets the bot", true), Intent::EmoteReaction);
    }

    #[test]
    fn preference_markers_win_over_time_markers() {
        // "time zone" also contains "time"; the preference branch runs first.
        assert_eq!(classify("change my time zone please", false), Intent::PreferenceUpdate);
    }

    #[test]
    fn preference_change_parses_offset_and_format() {
        let change = parse_preference_change("set my timezone to UTC+5:30 and use 12h");
        assert_eq!(change.timezone.as_deref(), Some("UTC+5:30"));
        assert_eq!(change.time_format, Some(TimeFormat::TwelveHour));
    }

    #[test]
    fn preference_change_handles_spoken_format() {
        let change = parse_preference_change("I prefer the 24 hour clock");
        assert_eq!(change.timezone, None);
        assert_eq!(change.time_format, Some(TimeFormat::TwentyFourHour));
    }

    #[test]
    fn garbage_preference_text_yields_empty_change() {
        let change = parse_preference_change("set my timezone to Mars/Olympus");
        assert!(change.is_empty());
    }
}
