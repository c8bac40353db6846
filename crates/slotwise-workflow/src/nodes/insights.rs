//! The read-only analysis branch: pick a window, summarise the calendar.
//! Neither node ever sets a plan.

use chrono::{Duration, NaiveDate};
use chrono_tz::Tz;
use serde_json::{Value, json};
use slotwise_adapters::TimeWindow;
use tracing::{info, warn};

use super::calendar::{compute_free_slots, merge_busy};
use super::{StepContext, value_str};
use crate::config::{EngineConfig, MAX_HORIZON_DAYS};
use crate::error::{Result, WorkflowError};
use crate::extract::ExtractionSchema;
use crate::state::{
    DayLoad, InsightFocus, InsightReport, InsightRequest, NormalizedEvent, RunState, StateDelta,
    Turn,
};
use crate::time::{
    at_local_hour, format_day, format_minutes, local_date, local_dates, local_midnight,
};

// ---------------------------------------------------------------------------
// Insight Manager
// ---------------------------------------------------------------------------

pub async fn plan_insight(ctx: &StepContext<'_>, state: &RunState) -> Result<StateDelta> {
    let draft = match ctx
        .extractor
        .extract(&ctx.extraction_request(ExtractionSchema::Insight, state))
        .await
    {
        Ok(value) => value,
        Err(e) => {
            warn!(node = "insight_manager", error = %e, "insight extraction failed, using defaults");
            Value::Null
        }
    };

    let request = interpret_request(&draft, ctx);
    info!(
        node = "insight_manager",
        start = %request.window.start,
        end = %request.window.end,
        focus = ?request.focus,
        "insight window chosen"
    );
    Ok(StateDelta {
        insight_request: Some(request),
        ..StateDelta::default()
    })
}

/// Dates are inclusive local days; anything missing or inverted falls back
/// to the default window starting today.
fn interpret_request(draft: &Value, ctx: &StepContext<'_>) -> InsightRequest {
    let tz = ctx.tz();
    let today = local_date(tz, ctx.now);
    let parse = |key: &str| {
        value_str(&draft[key]).and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok())
    };

    let days = |n: u32| Duration::days(i64::from(n));
    // Dates too close to either end of the representable range fall back to
    // today, so the arithmetic below cannot overflow.
    let start = parse("start")
        .filter(|s| {
            s.checked_sub_signed(days(1)).is_some()
                && s.checked_add_signed(days(MAX_HORIZON_DAYS + 1)).is_some()
        })
        .unwrap_or(today);
    let last = start + days(MAX_HORIZON_DAYS - 1);
    let default_end = start
        .checked_add_signed(days(ctx.config.insight_default_days.saturating_sub(1)))
        .unwrap_or(last);
    let end = parse("end")
        .filter(|end| *end >= start)
        .unwrap_or(default_end)
        .min(last);

    let focus = match value_str(&draft["focus"]).map(str::to_ascii_lowercase).as_deref() {
        Some("busy") => InsightFocus::Busy,
        Some("free") => InsightFocus::Free,
        _ => InsightFocus::Overview,
    };

    InsightRequest {
        window: TimeWindow::new(
            local_midnight(tz, start),
            local_midnight(tz, end + Duration::days(1)),
        ),
        focus,
    }
}

// ---------------------------------------------------------------------------
// Calendar Insights
// ---------------------------------------------------------------------------

pub fn report_insights(ctx: &StepContext<'_>, state: &RunState) -> Result<StateDelta> {
    let request = state.insight_request.as_ref().ok_or_else(|| {
        WorkflowError::contract("calendar_insights", "reached without an insight request")
    })?;

    let report = build_report(&request.window, &state.normalized_events, ctx.config);
    let text = render(&report, request, ctx.tz());

    info!(
        node = "calendar_insights",
        events = report.event_count,
        busy_minutes = report.busy_minutes,
        "insights reported"
    );
    let payload = json!({ "insight_report": report });
    Ok(StateDelta {
        append_turns: vec![Turn::assistant(text).with_payload(payload)],
        insight_report: Some(report),
        ..StateDelta::default()
    })
}

pub fn build_report(
    window: &TimeWindow,
    events: &[NormalizedEvent],
    config: &EngineConfig,
) -> InsightReport {
    let tz = config.timezone;
    let in_window: Vec<TimeWindow> = events
        .iter()
        .map(NormalizedEvent::window)
        .filter(|w| w.overlaps(window))
        .collect();

    let busy_minutes = total_minutes(&merge_busy(window, &in_window));

    let days: Vec<DayLoad> = local_dates(tz, window)
        .into_iter()
        .map(|date| {
            let whole_day = TimeWindow::new(
                local_midnight(tz, date).max(window.start),
                local_midnight(tz, date + Duration::days(1)).min(window.end),
            );
            let working = TimeWindow::new(
                at_local_hour(tz, date, config.day_start_hour).max(window.start),
                at_local_hour(tz, date, config.day_end_hour).min(window.end),
            );
            let free = compute_free_slots(&working, &in_window, Duration::minutes(1));

            DayLoad {
                date,
                event_count: in_window.iter().filter(|w| w.overlaps(&whole_day)).count(),
                busy_minutes: total_minutes(&merge_busy(&whole_day, &in_window)),
                free_minutes: total_minutes(&free),
                longest_free_minutes: free
                    .iter()
                    .map(|w| w.duration().num_minutes())
                    .max()
                    .unwrap_or(0),
            }
        })
        .collect();

    // Ties go to the earlier day.
    let busiest_day = days
        .iter()
        .filter(|d| d.busy_minutes > 0)
        .fold(None::<&DayLoad>, |best, d| match best {
            Some(b) if b.busy_minutes >= d.busy_minutes => Some(b),
            _ => Some(d),
        })
        .map(|d| d.date);

    InsightReport {
        event_count: in_window.len(),
        busy_minutes,
        busiest_day,
        days,
    }
}

fn total_minutes(windows: &[TimeWindow]) -> i64 {
    windows.iter().map(|w| w.duration().num_minutes()).sum()
}

fn render(report: &InsightReport, request: &InsightRequest, tz: Tz) -> String {
    let first = local_date(tz, request.window.start);
    let last = local_date(tz, request.window.end - Duration::seconds(1));
    let mut text = format!(
        "{} to {}: {} event(s), {} busy.",
        format_day(first),
        format_day(last),
        report.event_count,
        format_minutes(report.busy_minutes)
    );
    if let Some(day) = report.busiest_day {
        text.push_str(&format!(" Busiest day: {}.", format_day(day)));
    }

    match request.focus {
        InsightFocus::Overview => {
            for d in &report.days {
                text.push_str(&format!(
                    "\n  {}: {} event(s), {} busy, {} free (longest {})",
                    format_day(d.date),
                    d.event_count,
                    format_minutes(d.busy_minutes),
                    format_minutes(d.free_minutes),
                    format_minutes(d.longest_free_minutes)
                ));
            }
        }
        InsightFocus::Busy => {
            let mut busy: Vec<&DayLoad> = report.days.iter().filter(|d| d.busy_minutes > 0).collect();
            busy.sort_by(|a, b| b.busy_minutes.cmp(&a.busy_minutes).then(a.date.cmp(&b.date)));
            if busy.is_empty() {
                text.push_str("\nNothing is booked.");
            }
            for d in busy {
                text.push_str(&format!(
                    "\n  {}: {} across {} event(s)",
                    format_day(d.date),
                    format_minutes(d.busy_minutes),
                    d.event_count
                ));
            }
        }
        InsightFocus::Free => {
            let mut free: Vec<&DayLoad> = report.days.iter().collect();
            free.sort_by(|a, b| {
                b.longest_free_minutes
                    .cmp(&a.longest_free_minutes)
                    .then(a.date.cmp(&b.date))
            });
            for d in free {
                text.push_str(&format!(
                    "\n  {}: {} free, longest stretch {}",
                    format_day(d.date),
                    format_minutes(d.free_minutes),
                    format_minutes(d.longest_free_minutes)
                ));
            }
        }
    }
    text
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, TimeZone, Utc};
    use slotwise_adapters::InMemoryCalendar;

    use super::*;
    use crate::extract::ScriptedExtractor;

    fn at(d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, d, h, 0, 0).unwrap()
    }

    fn event(id: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> NormalizedEvent {
        NormalizedEvent {
            id: id.into(),
            summary: id.into(),
            start,
            end,
            all_day: false,
        }
    }

    #[test]
    fn defaults_to_the_coming_week() {
        let config = EngineConfig::default();
        let extractor = ScriptedExtractor::new();
        let calendar = InMemoryCalendar::new();
        let ctx = StepContext {
            config: &config,
            extractor: &extractor,
            calendar: &calendar,
            now: at(2, 5),
            intent_hint: None,
        };
        let request = interpret_request(&Value::Null, &ctx);
        assert_eq!(request.window, TimeWindow::new(at(2, 0), at(9, 0)));
        assert_eq!(request.focus, InsightFocus::Overview);

        let explicit = interpret_request(
            &json!({"start": "2026-03-04", "end": "2026-03-04", "focus": "free"}),
            &ctx,
        );
        assert_eq!(explicit.window, TimeWindow::new(at(4, 0), at(5, 0)));
        assert_eq!(explicit.focus, InsightFocus::Free);
    }

    #[test]
    fn dates_at_the_edge_of_the_calendar_fall_back_to_today() {
        let config = EngineConfig::default();
        let extractor = ScriptedExtractor::new();
        let calendar = InMemoryCalendar::new();
        let ctx = StepContext {
            config: &config,
            extractor: &extractor,
            calendar: &calendar,
            now: at(2, 5),
            intent_hint: None,
        };
        for draft in [
            json!({"start": "+262142-12-20"}),
            json!({"start": "+262142-12-20", "end": "+262142-12-31"}),
        ] {
            let request = interpret_request(&draft, &ctx);
            assert_eq!(request.window, TimeWindow::new(at(2, 0), at(9, 0)), "{draft}");
        }
    }

    #[test]
    fn report_counts_busy_and_free_time() {
        let config = EngineConfig::default();
        let window = TimeWindow::new(at(2, 0), at(4, 0));
        let events = vec![
            event("a", at(2, 9), at(2, 11)),
            event("b", at(2, 10), at(2, 12)),
            event("c", at(3, 14), at(3, 15)),
            event("outside", at(5, 9), at(5, 10)),
        ];
        let report = build_report(&window, &events, &config);

        assert_eq!(report.event_count, 3);
        assert_eq!(report.busy_minutes, 240);
        assert_eq!(report.busiest_day, NaiveDate::from_ymd_opt(2026, 3, 2));
        assert_eq!(report.days.len(), 2);

        let monday = &report.days[0];
        assert_eq!(monday.event_count, 2);
        assert_eq!(monday.busy_minutes, 180);
        // Working day 07-22 is 15h, 3h of it busy.
        assert_eq!(monday.free_minutes, 12 * 60);
        assert_eq!(monday.longest_free_minutes, 10 * 60);
    }
}
