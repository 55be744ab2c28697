//! Terminal output → activity signal.
//!
//! Each chunk is stripped of escape sequences and matched against the
//! provider's pattern set plus a generic set shared by all agents. The
//! strongest signal wins: awaiting input, then busy, then idle.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::domain::{ActivitySignal, Classification};

/// Spinner characters Claude Code draws in front of its status text
pub const SPINNER_CHARS: &[char] = &['·', '✻', '✽', '✶', '✳', '✢'];

const MAX_ACTION_LEN: usize = 120;

struct PatternSet {
    awaiting: Vec<Regex>,
    busy: Vec<Regex>,
    idle: Vec<Regex>,
}

impl PatternSet {
    fn new(awaiting: &[&str], busy: &[&str], idle: &[&str]) -> Self {
        let compile = |patterns: &[&str]| {
            patterns
                .iter()
                .map(|p| Regex::new(p).unwrap())
                .collect::<Vec<_>>()
        };
        Self {
            awaiting: compile(awaiting),
            busy: compile(busy),
            idle: compile(idle),
        }
    }

    fn patterns(&self, signal: ActivitySignal) -> &[Regex] {
        match signal {
            ActivitySignal::AwaitingInput => &self.awaiting,
            ActivitySignal::Busy => &self.busy,
            ActivitySignal::Idle => &self.idle,
            ActivitySignal::Neutral => &[],
        }
    }
}

static GENERIC: Lazy<PatternSet> = Lazy::new(|| {
    PatternSet::new(
        &[
            r"\[Y/n\]|\[y/N\]|\(y/n\)|\(yes/no\)",
            r"(?i)do you want to proceed",
            r"(?i)press enter to continue",
        ],
        &[
            r"(?i)esc to (interrupt|cancel)",
            r"[⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏]",
        ],
        &[],
    )
});

static CLAUDE: Lazy<PatternSet> = Lazy::new(|| {
    PatternSet::new(
        &[
            r"(?m)^[\s│❯>]*1\.\s*(Yes|Allow)",
            r"Do you want to (make this edit|create|run|allow|proceed)",
            r"Allow\?",
        ],
        &[r"(?m)^\s*[·✻✽✶✳✢]\s+\S+…"],
        &[r"\? for shortcuts", r"(?m)^[│\s]*>\s*$"],
    )
});

static CODEX: Lazy<PatternSet> = Lazy::new(|| {
    PatternSet::new(
        &[
            r"(?i)allow command\?",
            r"(?i)approve (this|the) (command|change|patch)",
            r"▌\s*(Yes|No),",
        ],
        &[r"(?m)^\s*[•◦]\s*Working\b", r"Working \(\d+s"],
        &[r"⏎ send", r"(?i)ctrl\+j newline"],
    )
});

static GEMINI: Lazy<PatternSet> = Lazy::new(|| {
    PatternSet::new(
        &[
            r"(?i)allow execution",
            r"(?i)apply this change\?",
            r"(?i)waiting for user confirmation",
        ],
        &[r"(?i)\(esc to cancel"],
        &[r"(?i)type your message"],
    )
});

static TOOL_CALL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^\s*⏺\s+([A-Z][A-Za-z]*(?:\([^\n]*)?)\s*$").unwrap());

static SPINNER_STATUS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^\s*[·✻✽✶✳✢]\s+([^\s(][^(\n]*?…)").unwrap());

fn provider_patterns(provider: Option<&str>) -> Option<&'static PatternSet> {
    match provider? {
        "claude" => Some(&CLAUDE),
        "codex" => Some(&CODEX),
        "gemini" | "qwen" => Some(&GEMINI),
        _ => None,
    }
}

/// Classify one raw output chunk from a PTY owned by `provider`.
pub fn classify(provider: Option<&str>, chunk: &[u8]) -> Classification {
    let text = String::from_utf8_lossy(chunk);
    classify_text(provider, &strip_ansi(&text))
}

/// Classify already-stripped text.
pub fn classify_text(provider: Option<&str>, text: &str) -> Classification {
    let specific = provider_patterns(provider);
    let sets = specific.into_iter().chain(std::iter::once(&*GENERIC));

    let signal = [
        ActivitySignal::AwaitingInput,
        ActivitySignal::Busy,
        ActivitySignal::Idle,
    ]
    .into_iter()
    .find(|signal| {
        sets.clone()
            .any(|set| set.patterns(*signal).iter().any(|re| re.is_match(text)))
    })
    .unwrap_or(ActivitySignal::Neutral);

    Classification {
        signal,
        action: extract_action(text),
    }
}

/// Last tool call (`⏺ Bash(cargo test)`) in `text`, else the last spinner
/// status (`✻ Precipitating…`).
pub fn extract_action(text: &str) -> Option<String> {
    let found = TOOL_CALL
        .captures_iter(text)
        .last()
        .or_else(|| SPINNER_STATUS.captures_iter(text).last())?;
    let action = found.get(1)?.as_str().trim();
    if action.is_empty() {
        return None;
    }
    Some(truncate(action, MAX_ACTION_LEN))
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max_chars.saturating_sub(1)).collect();
    out.push('…');
    out
}

/// Remove escape sequences and control characters.
///
/// Cursor positioning sequences become newlines so line-anchored patterns
/// still see the lines a TUI draws in place.
pub fn strip_ansi(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\x1b' => match chars.next() {
                // CSI: parameters, then a final byte in @..~
                Some('[') => {
                    for next in chars.by_ref() {
                        if ('@'..='~').contains(&next) {
                            if matches!(next, 'H' | 'f' | 'E' | 'B') {
                                result.push('\n');
                            }
                            break;
                        }
                    }
                }
                // OSC: terminated by BEL or ESC \
                Some(']') => {
                    while let Some(next) = chars.next() {
                        if next == '\x07' {
                            break;
                        }
                        if next == '\x1b' {
                            if chars.peek() == Some(&'\\') {
                                chars.next();
                            }
                            break;
                        }
                    }
                }
                // Charset selection and similar: one intermediate byte
                Some('(' | ')' | '*' | '+' | '#' | '%') => {
                    chars.next();
                }
                _ => {}
            },
            '\r' => {
                if chars.peek() != Some(&'\n') {
                    result.push('\n');
                }
            }
            '\n' | '\t' => result.push(c),
            c if c.is_control() => {}
            c => result.push(c),
        }
    }

    result
}
