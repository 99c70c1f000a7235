use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeFormat {
    TwelveHour,
    TwentyFourHour,
}

impl TimeFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TwelveHour => "12h",
            Self::TwentyFourHour => "24h",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "12h" | "12" | "12-hour" | "12 hour" => Some(Self::TwelveHour),
            "24h" | "24" | "24-hour" | "24 hour" => Some(Self::TwentyFourHour),
            _ => None,
        }
    }
}

/// Per-user durable preferences. Lookups never fail: absent users get
/// the defaults (UTC, 24-hour).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserPreferences {
    /// UTC offset spelled `UTC`, `UTC+5`, `UTC-07:00`, or `GMT+5:30`.
    pub timezone: String,
    pub time_format: TimeFormat,
}

impl Default for UserPreferences {
    fn default() -> Self {
        Self { timezone: "UTC".to_string(), time_format: TimeFormat::TwentyFourHour }
    }
}

impl UserPreferences {
    /// Resolve the stored timezone to an offset, falling back to UTC when
    /// the stored string no longer parses.
    pub fn utc_offset(&self) -> FixedOffset {
        parse_utc_offset(&self.timezone).unwrap_or_else(|| FixedOffset::east_opt(0).unwrap())
    }

    /// Format an instant in the user's local time, e.g.
    /// `14:32 (+05:30)` or `2:32 PM (-07:00)`.
    pub fn format_local_time(&self, now: DateTime<Utc>) -> String {
        let offset = self.utc_offset();
        let local = now.with_timezone(&offset);
        let clock = match self.time_format {
            TimeFormat::TwentyFourHour => local.format("%H:%M").to_string(),
            TimeFormat::TwelveHour => local.format("%-I:%M %p").to_string(),
        };
        format!("{clock} ({offset})")
    }
}

/// Parse a `UTC`/`GMT` offset declaration into a `FixedOffset`.
///
/// Accepted shapes: `UTC`, `GMT`, `UTC+5`, `UTC-7`, `UTC+05:30`,
/// `GMT-07:00`. Anything else is rejected so a bad declaration never
/// sticks as a preference.
pub fn parse_utc_offset(value: &str) -> Option<FixedOffset> {
    let trimmed = value.trim().to_ascii_uppercase();
    let rest = trimmed.strip_prefix("UTC").or_else(|| trimmed.strip_prefix("GMT"))?;

    if rest.is_empty() {
        return FixedOffset::east_opt(0);
    }

    let (sign, magnitude) = match rest.as_bytes().first()? {
        b'+' => (1i32, &rest[1..]),
        b'-' => (-1i32, &rest[1..]),
        _ => return None,
    };

    let (hours_part, minutes_part) = match magnitude.split_once(':') {
        Some((hours, minutes)) => (hours, minutes),
        None => (magnitude, "0"),
    };

    let hours: i32 = hours_part.parse().ok()?;
    let minutes: i32 = minutes_part.parse().ok()?;
    if hours > 14 || minutes >= 60 {
        return None;
    }

    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}
