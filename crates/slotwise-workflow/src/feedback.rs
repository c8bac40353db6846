//! Deterministic reading of approval replies and change requests.

use std::sync::OnceLock;

use chrono::Weekday;
use regex::Regex;

use crate::state::ApprovalState;

/// How targeted slots should move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Adjustment {
    /// Start strictly before the previous start.
    Earlier,
    /// Start strictly after the previous start.
    Later,
    /// Any start other than the previous one.
    Different,
}

/// A parsed change request.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Feedback {
    /// Ordinals named in the text; empty means every slot.
    pub targets: Vec<u32>,
    /// `None` when the text only excludes days.
    pub adjustment: Option<Adjustment>,
    pub excluded_days: Vec<Weekday>,
}

impl Feedback {
    pub fn parse(text: &str) -> Self {
        let mut targets: Vec<u32> = ordinal_re()
            .captures_iter(text)
            .filter_map(|c| c.get(1).and_then(|m| m.as_str().parse().ok()))
            .filter(|n| *n > 0)
            .collect();
        targets.sort_unstable();
        targets.dedup();

        let excluded_days = excluded_weekdays(text);

        let adjustment = if earlier_re().is_match(text) {
            Some(Adjustment::Earlier)
        } else if later_re().is_match(text) {
            Some(Adjustment::Later)
        } else if excluded_days.is_empty() || !targets.is_empty() {
            Some(Adjustment::Different)
        } else {
            None
        };

        Self {
            targets,
            adjustment,
            excluded_days,
        }
    }

    pub fn targets(&self, slot_number: u32) -> bool {
        self.targets.is_empty() || self.targets.contains(&slot_number)
    }
}

/// Read a free-text reply to an approval request.
///
/// Anything that asks for a change wins over an affirmative word ("yes, but
/// move slot 2"); a short negative rejects; an affirmative approves; any
/// other text is treated as a change request.
pub fn interpret_reply(text: &str) -> ApprovalState {
    if change_cue_re().is_match(text) || !excluded_weekdays(text).is_empty() {
        return ApprovalState::ChangesRequested;
    }
    let words = text.split_whitespace().count();
    if words <= 5 && negative_re().is_match(text) {
        return ApprovalState::Rejected;
    }
    if affirmative_re().is_match(text) {
        return ApprovalState::Approved;
    }
    ApprovalState::ChangesRequested
}

fn excluded_weekdays(text: &str) -> Vec<Weekday> {
    let mut days = Vec::new();
    for caps in exclusion_re().captures_iter(text) {
        let Some(list) = caps.get(1) else { continue };
        for word in weekday_word_re().find_iter(list.as_str()) {
            let word = word.as_str().to_ascii_lowercase();
            let found: &[Weekday] = if word.starts_with("weekend") {
                &[Weekday::Sat, Weekday::Sun]
            } else {
                match &word[..3] {
                    "mon" => &[Weekday::Mon],
                    "tue" => &[Weekday::Tue],
                    "wed" => &[Weekday::Wed],
                    "thu" => &[Weekday::Thu],
                    "fri" => &[Weekday::Fri],
                    "sat" => &[Weekday::Sat],
                    "sun" => &[Weekday::Sun],
                    _ => &[],
                }
            };
            for day in found {
                if !days.contains(day) {
                    days.push(*day);
                }
            }
        }
    }
    days
}

// ---------------------------------------------------------------------------
// Patterns
// ---------------------------------------------------------------------------

const WEEKDAY: &str = r"(?:mon|tue|wed|thu|fri|sat|sun)[a-z]*|weekends?";

fn ordinal_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)(?:\b(?:slot|option)\s*#?\s*|#)(\d+)").unwrap())
}

fn earlier_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\b(?:earlier|sooner)\b").unwrap())
}

fn later_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\blater\b").unwrap())
}

fn exclusion_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(&format!(
            r"(?i)\b(?:not|no|skip|avoid|except|without|never)\s+(?:on\s+)?((?:{WEEKDAY})(?:\s*(?:,|and|or|&)\s*(?:{WEEKDAY}))*)\b"
        ))
        .unwrap()
    })
}

fn weekday_word_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(&format!(r"(?i)\b(?:{WEEKDAY})")).unwrap())
}

fn change_cue_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)\b(?:earlier|sooner|later|slot|option|but|instead|move|change|shift|reschedule|different|another)\b|#\d",
        )
        .unwrap()
    })
}

fn affirmative_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)\b(?:yes|yep|yeah|ok|okay|sure|approved?|confirm(?:ed)?|go\s+ahead|sounds\s+good|looks\s+good|lgtm|book\s+it|do\s+it|perfect)\b",
        )
        .unwrap()
    })
}

fn negative_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)^\s*(?:no|nope|nah|cancel|reject|stop|never\s*mind|forget\s+it|don'?t|do\s+not)\b",
        )
        .unwrap()
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
