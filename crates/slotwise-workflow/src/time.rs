//! Local-time arithmetic in the reference timezone.
//!
//! Everything in the run state is UTC; bands, day windows, weekdays and
//! all-day events are defined on the reference zone's wall clock.

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use slotwise_adapters::TimeWindow;

use crate::state::{Energy, TimeBand};

impl TimeBand {
    /// Local `[start_hour, end_hour)` of the band. 24 means next midnight.
    pub fn hours(self) -> (u32, u32) {
        match self {
            Self::Morning => (6, 12),
            Self::Afternoon => (12, 17),
            Self::Evening => (17, 21),
            Self::Night => (21, 24),
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Morning => "morning",
            Self::Afternoon => "afternoon",
            Self::Evening => "evening",
            Self::Night => "night",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "morning" | "mornings" | "am" => Some(Self::Morning),
            "afternoon" | "afternoons" | "midday" => Some(Self::Afternoon),
            "evening" | "evenings" => Some(Self::Evening),
            "night" | "nights" | "late" => Some(Self::Night),
            _ => None,
        }
    }
}

impl Energy {
    /// Bands used when a habit states an energy level but no band.
    pub fn bands(self) -> Vec<TimeBand> {
        match self {
            Self::High => vec![TimeBand::Morning, TimeBand::Afternoon],
            Self::Medium => vec![
                TimeBand::Morning,
                TimeBand::Afternoon,
                TimeBand::Evening,
                TimeBand::Night,
            ],
            Self::Low => vec![TimeBand::Afternoon, TimeBand::Evening],
        }
    }
}

/// Merge bands into sorted, non-adjacent local hour ranges.
pub fn merge_bands(bands: &[TimeBand]) -> Vec<(u32, u32)> {
    let mut sorted: Vec<TimeBand> = bands.to_vec();
    sorted.sort();
    sorted.dedup();

    let mut ranges: Vec<(u32, u32)> = Vec::new();
    for band in sorted {
        let (start, end) = band.hours();
        match ranges.last_mut() {
            Some(last) if last.1 >= start => last.1 = last.1.max(end),
            _ => ranges.push((start, end)),
        }
    }
    ranges
}

/// Convert a local wall-clock time to UTC. Ambiguous times take the
/// earlier instant; times skipped by a DST jump move forward an hour.
pub fn local_to_utc(tz: Tz, local: NaiveDateTime) -> DateTime<Utc> {
    tz.from_local_datetime(&local)
        .earliest()
        .or_else(|| tz.from_local_datetime(&(local + Duration::hours(1))).earliest())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|| local.and_utc())
}

/// The UTC instant of `hour:00` on a local date. `hour` may be 24.
pub fn at_local_hour(tz: Tz, date: NaiveDate, hour: u32) -> DateTime<Utc> {
    let (date, hour) = if hour >= 24 {
        (date.succ_opt().unwrap_or(date), hour - 24)
    } else {
        (date, hour)
    };
    let time = NaiveTime::from_hms_opt(hour, 0, 0).unwrap_or(NaiveTime::MIN);
    local_to_utc(tz, date.and_time(time))
}

pub fn local_midnight(tz: Tz, date: NaiveDate) -> DateTime<Utc> {
    at_local_hour(tz, date, 0)
}

pub fn local_date(tz: Tz, at: DateTime<Utc>) -> NaiveDate {
    at.with_timezone(&tz).date_naive()
}

pub fn local_time(tz: Tz, at: DateTime<Utc>) -> NaiveTime {
    at.with_timezone(&tz).time()
}

/// Every local date the window touches, in order.
pub fn local_dates(tz: Tz, window: &TimeWindow) -> Vec<NaiveDate> {
    if window.is_empty() {
        return Vec::new();
    }
    let first = local_date(tz, window.start);
    // The end is exclusive.
    let last = local_date(tz, window.end - Duration::nanoseconds(1));
    first.iter_days().take_while(|d| *d <= last).collect()
}

/// Round up to the next multiple of `step` since the Unix epoch.
pub fn align_up(at: DateTime<Utc>, step: Duration) -> DateTime<Utc> {
    let step_secs = step.num_seconds();
    if step_secs <= 0 {
        return at;
    }
    let secs = at.timestamp();
    let has_fraction = at.timestamp_subsec_nanos() > 0;
    let rem = secs.rem_euclid(step_secs);
    let aligned = if rem == 0 && !has_fraction {
        secs
    } else {
        secs - rem + step_secs
    };
    DateTime::from_timestamp(aligned, 0).unwrap_or(at)
}

/// Absolute distance in minutes between two local times of day.
pub fn minutes_apart(a: NaiveTime, b: NaiveTime) -> i64 {
    (a - b).num_minutes().abs()
}

// ---------------------------------------------------------------------------
// Display
// ---------------------------------------------------------------------------

/// `Mon 2 Mar`
pub fn format_day(date: NaiveDate) -> String {
    format!("{} {} {}", date.format("%a"), date.day(), date.format("%b"))
}

/// `Mon 2 Mar 06:00-06:15`
pub fn format_span(tz: Tz, start: DateTime<Utc>, end: DateTime<Utc>) -> String {
    let s = start.with_timezone(&tz);
    let e = end.with_timezone(&tz);
    format!(
        "{} {}-{}",
        format_day(s.date_naive()),
        s.format("%H:%M"),
        e.format("%H:%M")
    )
}

/// `1h 30m`, `45m`, `2h`
pub fn format_minutes(minutes: i64) -> String {
    let (h, m) = (minutes / 60, minutes % 60);
    match (h, m) {
        (0, m) => format!("{m}m"),
        (h, 0) => format!("{h}h"),
        (h, m) => format!("{h}h {m}m"),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merges_adjacent_bands() {
        assert_eq!(
            merge_bands(&[TimeBand::Afternoon, TimeBand::Morning]),
            vec![(6, 17)]
        );
        assert_eq!(
            merge_bands(&[TimeBand::Morning, TimeBand::Evening, TimeBand::Morning]),
            vec![(6, 12), (17, 21)]
        );
    }

    #[test]
    fn local_hours_in_berlin() {
        let tz = chrono_tz::Europe::Berlin;
        let date = NaiveDate::from_ymd_opt(2026, 1, 15).unwrap();
        // CET is UTC+1 in January.
        assert_eq!(
            at_local_hour(tz, date, 6),
            Utc.with_ymd_and_hms(2026, 1, 15, 5, 0, 0).unwrap()
        );
        assert_eq!(
            at_local_hour(tz, date, 24),
            Utc.with_ymd_and_hms(2026, 1, 15, 23, 0, 0).unwrap()
        );
    }

    #[test]
    fn dst_gap_moves_forward() {
        // 02:30 does not exist in Berlin on 2026-03-29.
        let tz = chrono_tz::Europe::Berlin;
        let local = NaiveDate::from_ymd_opt(2026, 3, 29)
            .unwrap()
            .and_hms_opt(2, 30, 0)
            .unwrap();
        assert_eq!(
            local_to_utc(tz, local),
            Utc.with_ymd_and_hms(2026, 3, 29, 1, 30, 0).unwrap()
        );
    }

    #[test]
    fn dates_of_window_exclude_end_midnight() {
        let w = TimeWindow::new(
            Utc.with_ymd_and_hms(2026, 3, 2, 5, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2026, 3, 4, 0, 0, 0).unwrap(),
        );
        let dates = local_dates(Tz::UTC, &w);
        assert_eq!(dates.len(), 2);
        assert_eq!(dates[1], NaiveDate::from_ymd_opt(2026, 3, 3).unwrap());
    }

    #[test]
    fn align_up_to_quarter_hour() {
        let step = Duration::minutes(15);
        let at = Utc.with_ymd_and_hms(2026, 3, 2, 5, 7, 0).unwrap();
        assert_eq!(
            align_up(at, step),
            Utc.with_ymd_and_hms(2026, 3, 2, 5, 15, 0).unwrap()
        );
        let exact = Utc.with_ymd_and_hms(2026, 3, 2, 5, 30, 0).unwrap();
        assert_eq!(align_up(exact, step), exact);
    }

    #[test]
    fn formats() {
        assert_eq!(format_minutes(90), "1h 30m");
        assert_eq!(format_minutes(45), "45m");
        assert_eq!(format_minutes(120), "2h");
        let start = Utc.with_ymd_and_hms(2026, 3, 2, 6, 0, 0).unwrap();
        assert_eq!(
            format_span(Tz::UTC, start, start + Duration::minutes(15)),
            "Mon 2 Mar 06:00-06:15"
        );
    }
}
