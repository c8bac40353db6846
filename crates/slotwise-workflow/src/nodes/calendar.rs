//! The calendar pipeline: fetch, normalize, compute free slots.

use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use slotwise_adapters::{EventStatus, EventTime, RawEvent, TimeWindow, Transparency};
use tracing::{debug, info, warn};

use super::StepContext;
use crate::error::{Result, WorkflowError};
use crate::state::{Intent, NormalizedEvent, RunState, StateDelta};
use crate::time::{local_midnight, local_to_utc};

// ---------------------------------------------------------------------------
// Fetch
// ---------------------------------------------------------------------------

/// The window the current branch reads: the insight window for analysis,
/// the planning horizon otherwise.
pub fn fetch_window(state: &RunState) -> Result<TimeWindow> {
    let window = match state.intent {
        Some(Intent::CalendarAnalysis) => state.insight_request.as_ref().map(|r| r.window),
        _ => state.planning_horizon,
    };
    window.ok_or_else(|| WorkflowError::contract("fetch_events", "no window to fetch"))
}

pub async fn fetch_events(ctx: &StepContext<'_>, state: &RunState) -> Result<StateDelta> {
    let window = fetch_window(state)?;
    let events = ctx
        .calendar
        .list_events(&ctx.config.calendar_id, &window)
        .await
        .map_err(|e| {
            warn!(
                node = "fetch_events",
                backend = ctx.calendar.backend(),
                error = %e,
                "calendar read failed"
            );
            WorkflowError::CalendarFetchFailure {
                reason: e.to_string(),
                retryable: true,
            }
        })?;

    info!(
        node = "fetch_events",
        backend = ctx.calendar.backend(),
        count = events.len(),
        "events fetched"
    );
    Ok(StateDelta {
        raw_events: Some(events),
        ..StateDelta::default()
    })
}

// ---------------------------------------------------------------------------
// Normalize
// ---------------------------------------------------------------------------

pub fn normalize_events(ctx: &StepContext<'_>, state: &RunState) -> Result<StateDelta> {
    let normalized = normalize(&state.raw_events, ctx.tz());
    info!(
        node = "normalize_events",
        raw = state.raw_events.len(),
        busy = normalized.len(),
        "events normalized"
    );
    Ok(StateDelta {
        normalized_events: Some(normalized),
        ..StateDelta::default()
    })
}

/// Align events to UTC and keep only those that block time.
pub fn normalize(raw: &[RawEvent], tz: Tz) -> Vec<NormalizedEvent> {
    let mut events: Vec<NormalizedEvent> = raw
        .iter()
        .filter(|e| e.status != EventStatus::Cancelled)
        .filter(|e| e.transparency != Transparency::Transparent)
        .filter_map(|e| {
            let start = resolve(&e.start, tz);
            let end = match &e.end {
                Some(end) => resolve(end, tz),
                // An all-day event without DTEND covers its date.
                None if e.start.is_all_day() => start + Duration::days(1),
                None => start,
            };
            if end <= start {
                debug!(id = %e.id, "dropping zero-length event");
                return None;
            }
            Some(NormalizedEvent {
                id: e.id.clone(),
                summary: e.summary.clone(),
                start,
                end,
                all_day: e.start.is_all_day(),
            })
        })
        .collect();
    events.sort_by(|a, b| a.start.cmp(&b.start).then(a.end.cmp(&b.end)));
    events
}

fn resolve(time: &EventTime, tz: Tz) -> DateTime<Utc> {
    match time {
        EventTime::Utc { at } => *at,
        EventTime::Zoned { local, tzid } => match tzid.parse::<Tz>() {
            Ok(zone) => local_to_utc(zone, *local),
            Err(_) => {
                warn!(tzid = %tzid, "unknown TZID, using the reference timezone");
                local_to_utc(tz, *local)
            }
        },
        EventTime::Floating { local } => local_to_utc(tz, *local),
        EventTime::Date { date } => local_midnight(tz, *date),
    }
}

// ---------------------------------------------------------------------------
// Free slots
// ---------------------------------------------------------------------------

pub fn compute_free_slots_step(ctx: &StepContext<'_>, state: &RunState) -> Result<StateDelta> {
    let horizon = state.planning_horizon.ok_or_else(|| {
        WorkflowError::contract("compute_free_slots", "no planning horizon")
    })?;
    let busy: Vec<TimeWindow> = state.normalized_events.iter().map(|e| e.window()).collect();
    let free = compute_free_slots(&horizon, &busy, ctx.config.granularity);

    info!(
        node = "compute_free_slots",
        busy = busy.len(),
        free = free.len(),
        "free slots computed"
    );

    // Tasks never pass through the filter, so their candidate set is the
    // free set itself.
    let filtered = (state.intent == Some(Intent::TaskSchedule)).then(|| free.clone());
    Ok(StateDelta {
        free_slots: Some(free),
        filtered_slots: filtered,
        ..StateDelta::default()
    })
}

/// Sort and merge busy intervals (clipped to the horizon) into disjoint
/// windows.
pub fn merge_busy(horizon: &TimeWindow, busy: &[TimeWindow]) -> Vec<TimeWindow> {
    let mut clipped: Vec<TimeWindow> = busy.iter().filter_map(|b| b.intersect(horizon)).collect();
    clipped.sort_by_key(|w| (w.start, w.end));

    let mut merged: Vec<TimeWindow> = Vec::with_capacity(clipped.len());
    for w in clipped {
        match merged.last_mut() {
            Some(last) if w.start <= last.end => last.end = last.end.max(w.end),
            _ => merged.push(w),
        }
    }
    merged
}

/// The gaps between busy intervals inside `horizon`, keeping only those at
/// least `min_len` long.
///
/// Free and busy windows tile the horizon exactly when every gap is at least
/// `min_len`. A shorter gap is dropped and belongs to neither set.
pub fn compute_free_slots(
    horizon: &TimeWindow,
    busy: &[TimeWindow],
    min_len: Duration,
) -> Vec<TimeWindow> {
    if horizon.is_empty() {
        return Vec::new();
    }

    let mut free = Vec::new();
    let mut cursor = horizon.start;
    for b in merge_busy(horizon, busy) {
        if b.start > cursor {
            free.push(TimeWindow::new(cursor, b.start));
        }
        cursor = cursor.max(b.end);
    }
    if cursor < horizon.end {
        free.push(TimeWindow::new(cursor, horizon.end));
    }
    free.retain(|w| w.duration() >= min_len);
    free
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, TimeZone};

    use super::*;

    fn at(d: u32, h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, d, h, m, 0).unwrap()
    }

    fn w(a: DateTime<Utc>, b: DateTime<Utc>) -> TimeWindow {
        TimeWindow::new(a, b)
    }

    #[test]
    fn empty_calendar_is_one_slot() {
        let horizon = w(at(2, 5, 0), at(9, 0, 0));
        assert_eq!(
            compute_free_slots(&horizon, &[], Duration::minutes(15)),
            vec![horizon]
        );
    }

    #[test]
    fn fully_booked_is_empty() {
        let horizon = w(at(2, 8, 0), at(2, 12, 0));
        let busy = [w(at(2, 7, 0), at(2, 10, 0)), w(at(2, 10, 0), at(2, 13, 0))];
        assert!(compute_free_slots(&horizon, &busy, Duration::minutes(15)).is_empty());
    }

    #[test]
    fn gaps_between_overlapping_events() {
        let horizon = w(at(2, 8, 0), at(2, 18, 0));
        let busy = [
            w(at(2, 9, 0), at(2, 10, 0)),
            w(at(2, 9, 30), at(2, 11, 0)),
            w(at(2, 11, 10), at(2, 12, 0)),
            w(at(2, 15, 0), at(2, 16, 0)),
        ];
        let free = compute_free_slots(&horizon, &busy, Duration::minutes(15));
        assert_eq!(
            free,
            vec![
                w(at(2, 8, 0), at(2, 9, 0)),
                // 11:00-11:10 is shorter than the granularity.
                w(at(2, 12, 0), at(2, 15, 0)),
                w(at(2, 16, 0), at(2, 18, 0)),
            ]
        );
    }

    #[test]
    fn normalize_drops_non_blocking_events() {
        let raw = vec![
            RawEvent::timed("a", "Standup", at(2, 9, 0), at(2, 9, 15)),
            RawEvent::timed("b", "Gone", at(2, 10, 0), at(2, 11, 0))
                .with_status(EventStatus::Cancelled),
            RawEvent::timed("c", "FYI", at(2, 12, 0), at(2, 13, 0))
                .with_transparency(Transparency::Transparent),
            RawEvent::timed("d", "Inverted", at(2, 14, 0), at(2, 13, 0)),
        ];
        let events = normalize(&raw, Tz::UTC);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].id, "a");
    }

    #[test]
    fn normalize_resolves_zones_and_dates() {
        let local = NaiveDate::from_ymd_opt(2026, 3, 3)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap();
        let raw = vec![
            RawEvent {
                id: "z".into(),
                summary: "Berlin call".into(),
                start: EventTime::Zoned {
                    local,
                    tzid: "Europe/Berlin".into(),
                },
                end: Some(EventTime::Zoned {
                    local: local + Duration::hours(1),
                    tzid: "Europe/Berlin".into(),
                }),
                status: EventStatus::Confirmed,
                transparency: Transparency::Opaque,
            },
            RawEvent {
                id: "d".into(),
                summary: "Holiday".into(),
                start: EventTime::Date {
                    date: NaiveDate::from_ymd_opt(2026, 3, 2).unwrap(),
                },
                end: None,
                status: EventStatus::Confirmed,
                transparency: Transparency::Opaque,
            },
        ];
        let events = normalize(&raw, Tz::UTC);
        assert_eq!(events[0].id, "d");
        assert!(events[0].all_day);
        assert_eq!(events[0].end, at(3, 0, 0));
        assert_eq!(events[1].start, at(3, 8, 0));
        assert_eq!(events[1].end, at(3, 9, 0));
    }

    #[test]
    fn gap_shorter_than_granularity_is_dropped() {
        let horizon = w(at(2, 9, 0), at(2, 12, 0));
        let busy = vec![w(at(2, 9, 0), at(2, 9, 50)), w(at(2, 10, 0), at(2, 11, 0))];

        let free = compute_free_slots(&horizon, &busy, Duration::minutes(15));
        assert_eq!(free, vec![w(at(2, 11, 0), at(2, 12, 0))]);

        // The 10-minute remnant survives a finer grid.
        let fine = compute_free_slots(&horizon, &busy, Duration::minutes(5));
        assert_eq!(
            fine,
            vec![w(at(2, 9, 50), at(2, 10, 0)), w(at(2, 11, 0), at(2, 12, 0))]
        );
    }

    #[test]
    fn free_and_busy_tile_the_horizon() {
        // Deterministic pseudo-random busy sets on a 15-minute grid, so no
        // gap is ever shorter than the granularity.
        let mut seed: u64 = 0x5eed;
        let mut next = |bound: u64| {
            seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            (seed >> 33) % bound
        };

        let horizon = w(at(2, 0, 0), at(4, 0, 0));
        let quarter = Duration::minutes(15);
        for _ in 0..200 {
            let n = next(12);
            let busy: Vec<TimeWindow> = (0..n)
                .map(|_| {
                    let start = at(1, 20, 0) + quarter * (next(240) as i32);
                    w(start, start + quarter * (1 + next(16) as i32))
                })
                .collect();

            let free = compute_free_slots(&horizon, &busy, quarter);
            let merged = merge_busy(&horizon, &busy);

            let mut pieces: Vec<TimeWindow> = free.iter().chain(merged.iter()).copied().collect();
            pieces.sort_by_key(|p| p.start);

            assert_eq!(pieces.first().map(|p| p.start), Some(horizon.start));
            assert_eq!(pieces.last().map(|p| p.end), Some(horizon.end));
            for pair in pieces.windows(2) {
                assert_eq!(pair[0].end, pair[1].start, "gap or overlap in {pieces:?}");
            }
        }
    }
}
