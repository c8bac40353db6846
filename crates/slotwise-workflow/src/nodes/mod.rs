//! Workflow nodes.
//!
//! Each node reads the [`RunState`] and returns a [`StateDelta`] with only
//! the fields it owns. Nodes never decide where control goes next; that is
//! the router's job.

pub mod approval;
pub mod calendar;
pub mod classifier;
pub mod commit;
pub mod decider;
pub mod filter;
pub mod insights;
pub mod planner;
pub mod reporters;
pub mod selector;

use chrono::{DateTime, NaiveTime, Utc};
use chrono_tz::Tz;
use serde_json::Value;
use slotwise_adapters::CalendarRepository;

use crate::config::EngineConfig;
use crate::extract::{ExtractionRequest, ExtractionSchema, StructuredExtractor};
use crate::state::{Intent, RunState};

/// Everything a node may use besides the run state.
pub struct StepContext<'a> {
    pub config: &'a EngineConfig,
    pub extractor: &'a dyn StructuredExtractor,
    pub calendar: &'a dyn CalendarRepository,
    /// Read once per invocation so every node sees the same instant.
    pub now: DateTime<Utc>,
    pub intent_hint: Option<Intent>,
}

impl StepContext<'_> {
    pub fn tz(&self) -> Tz {
        self.config.timezone
    }

    pub fn extraction_request(&self, schema: ExtractionSchema, state: &RunState) -> ExtractionRequest {
        ExtractionRequest {
            schema,
            history: state.turns.clone(),
            now: self.now,
            timezone: self.config.timezone,
        }
    }
}

// ---------------------------------------------------------------------------
// Lenient readers for extracted JSON
// ---------------------------------------------------------------------------

/// A non-empty string, treating `"null"` and `"unknown"` as absent.
pub(crate) fn value_str(value: &Value) -> Option<&str> {
    let s = value.as_str()?.trim();
    match s.to_ascii_lowercase().as_str() {
        "" | "null" | "none" | "unknown" | "n/a" => None,
        _ => Some(s),
    }
}

/// A positive integer given as a number or a numeric string.
pub(crate) fn value_u32(value: &Value) -> Option<u32> {
    let n = match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f.round() as u64))?,
        Value::String(s) => s.trim().parse::<u64>().ok()?,
        _ => return None,
    };
    u32::try_from(n).ok().filter(|n| *n > 0)
}

/// `HH:MM`, `HH:MM:SS` or `H am/pm`.
pub(crate) fn value_time(value: &Value) -> Option<NaiveTime> {
    let s = value_str(value)?;
    ["%H:%M", "%H:%M:%S", "%I:%M %p", "%I:%M%p"]
        .iter()
        .find_map(|fmt| NaiveTime::parse_from_str(s, fmt).ok())
        .or_else(|| {
            let lower = s.to_ascii_lowercase();
            let (digits, pm) = if let Some(d) = lower.strip_suffix("pm") {
                (d.trim(), true)
            } else if let Some(d) = lower.strip_suffix("am") {
                (d.trim(), false)
            } else {
                return None;
            };
            let hour: u32 = digits.parse().ok().filter(|h| (1..=12).contains(h))?;
            let hour = match (hour, pm) {
                (12, false) => 0,
                (12, true) => 12,
                (h, true) => h + 12,
                (h, false) => h,
            };
            NaiveTime::from_hms_opt(hour, 0, 0)
        })
}

/// Strings of an array, or a single string as a one-element list.
pub(crate) fn value_strings(value: &Value) -> Vec<&str> {
    match value {
        Value::Array(items) => items.iter().filter_map(value_str).collect(),
        other => value_str(other).into_iter().collect(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn lenient_numbers() {
        assert_eq!(value_u32(&json!(30)), Some(30));
        assert_eq!(value_u32(&json!("45")), Some(45));
        assert_eq!(value_u32(&json!(0)), None);
        assert_eq!(value_u32(&json!(null)), None);
        assert_eq!(value_u32(&json!(-3)), None);
    }

    #[test]
    fn lenient_times() {
        assert_eq!(value_time(&json!("07:30")), NaiveTime::from_hms_opt(7, 30, 0));
        assert_eq!(value_time(&json!("2pm")), NaiveTime::from_hms_opt(14, 0, 0));
        assert_eq!(value_time(&json!("12 am")), NaiveTime::from_hms_opt(0, 0, 0));
        assert_eq!(value_time(&json!("null")), None);
    }

    #[test]
    fn strings_from_scalar_or_array() {
        assert_eq!(value_strings(&json!(["morning", ""])), vec!["morning"]);
        assert_eq!(value_strings(&json!("evening")), vec!["evening"]);
        assert!(value_strings(&json!(null)).is_empty());
    }
}
