//! Reply scrubbing before anything reaches a channel: code fences, ASCII
//! art, block shading, mass pings, and over-long replies are all things an
//! IRC surface should never see.

const ART_LINE_THRESHOLD: usize = 4;
const SHADING_RUN_THRESHOLD: usize = 5;
const TRUNCATION_MARKER: &str = " […]";
const ART_REPLACEMENT: &str = "I was gonna draw something cool… but I won't flood the channel";

const BOX_DRAWING: &[char] = &[
    '╔', '═', '║', '╠', '╣', '╚', '╗', '╩', '╦', '╭', '╮', '╰', '╯', '┃', '━', '┏', '┓', '┗',
    '┛', '┣', '┫',
];

pub trait Sanitize: Send + Sync {
    fn sanitize(&self, text: &str) -> String;
}

/// Default sanitizer applied to every delivered reply.
#[derive(Clone, Debug)]
pub struct ReplySanitizer {
    max_reply_len: usize,
}

impl Default for ReplySanitizer {
    fn default() -> Self {
        Self { max_reply_len: 1400 }
    }
}

impl ReplySanitizer {
    pub fn new(max_reply_len: usize) -> Self {
        Self { max_reply_len: max_reply_len.max(16) }
    }
}

impl Sanitize for ReplySanitizer {
    fn sanitize(&self, text: &str) -> String {
        let mut reply = strip_code_fences(text);
        if is_ascii_art(&reply) {
            reply = ART_REPLACEMENT.to_string();
        }
        reply = strip_block_shading(&reply);
        reply = neutralize_mass_pings(&reply);
        truncate_chars(&reply, self.max_reply_len)
    }
}

/// Replace every closed ``` fence pair with a placeholder. An unmatched
/// opening fence is left in place.
fn strip_code_fences(text: &str) -> String {
    let mut output = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(open) = rest.find("```") {
        let after_open = &rest[open + 3..];
        let Some(close) = after_open.find("```") else {
            break;
        };
        output.push_str(&rest[..open]);
        output.push_str(" (code removed) ");
        rest = &after_open[close + 3..];
    }

    output.push_str(rest);
    output
}

/// Real ASCII art: several consecutive lines carrying box-drawing glyphs.
/// A single decorated line (a dad joke with flair) passes through.
fn is_ascii_art(text: &str) -> bool {
    let mut run = 0usize;
    for line in text.lines() {
        if line.chars().any(|ch| BOX_DRAWING.contains(&ch)) {
            run += 1;
            if run >= ART_LINE_THRESHOLD {
                return true;
            }
        } else {
            run = 0;
        }
    }
    false
}

/// Collapse long runs of unicode block-shading glyphs (the big ▓▓▓ walls)
/// into a single space; short runs survive.
fn strip_block_shading(text: &str) -> String {
    let mut output = String::with_capacity(text.len());
    let mut run = String::new();

    for ch in text.chars() {
        if ('\u{2580}'..='\u{259F}').contains(&ch) {
            run.push(ch);
            continue;
        }
        flush_shading_run(&mut output, &mut run);
        output.push(ch);
    }
    flush_shading_run(&mut output, &mut run);
    output
}

fn flush_shading_run(output: &mut String, run: &mut String) {
    if run.chars().count() >= SHADING_RUN_THRESHOLD {
        output.push(' ');
    } else {
        output.push_str(run);
    }
    run.clear();
}

/// Replace `@everyone` / `@here` (any case, word-bounded) with `(nope)`.
fn neutralize_mass_pings(text: &str) -> String {
    let mut output = String::with_capacity(text.len());
    let chars: Vec<char> = text.chars().collect();
    let mut index = 0;

    while index < chars.len() {
        if chars[index] == '@' {
            if let Some(len) = mass_ping_len(&chars[index + 1..]) {
                output.push_str("(nope)");
                index += 1 + len;
                continue;
            }
        }
        output.push(chars[index]);
        index += 1;
    }
    output
}

fn mass_ping_len(rest: &[char]) -> Option<usize> {
    for keyword in ["everyone", "here"] {
        let len = keyword.chars().count();
        if rest.len() < len {
            continue;
        }
        let matches =
            rest[..len].iter().zip(keyword.chars()).all(|(a, b)| a.eq_ignore_ascii_case(&b));
        let bounded = rest.get(len).map(|ch| !ch.is_alphanumeric() && *ch != '_').unwrap_or(true);
        if matches && bounded {
            return Some(len);
        }
    }
    None
}

fn truncate_chars(text: &str, max_len: usize) -> String {
    if text.chars().count() <= max_len {
        return text.to_string();
    }
    let keep = max_len.saturating_sub(10);
    let mut truncated: String = text.chars().take(keep).collect();
    truncated.push_str(TRUNCATION_MARKER);
    truncated
}
