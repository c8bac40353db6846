//! The Calendar Repository capability and the event types it speaks.
//!
//! Backends return events exactly as the calendar stores them (UTC instants,
//! wall-clock times with a TZID, floating times, or all-day dates). Aligning
//! them to one reference timezone is the consumer's job.

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;

// ---------------------------------------------------------------------------
// Supporting types
// ---------------------------------------------------------------------------

/// A half-open time range `[start, end)` in UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// Length of the window; zero for inverted windows.
    pub fn duration(&self) -> Duration {
        if self.end > self.start {
            self.end - self.start
        } else {
            Duration::zero()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    /// Whether the two windows share at least one instant.
    pub fn overlaps(&self, other: &TimeWindow) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// The overlapping part of the two windows, if any.
    pub fn intersect(&self, other: &TimeWindow) -> Option<TimeWindow> {
        let start = self.start.max(other.start);
        let end = self.end.min(other.end);
        (start < end).then_some(TimeWindow { start, end })
    }
}

/// How an event boundary is expressed by the calendar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventTime {
    /// An absolute instant.
    Utc { at: DateTime<Utc> },
    /// Wall-clock time in a named IANA zone.
    Zoned { local: NaiveDateTime, tzid: String },
    /// Wall-clock time with no zone; interpreted in the reference zone.
    Floating { local: NaiveDateTime },
    /// An all-day boundary.
    Date { date: NaiveDate },
}

impl EventTime {
    pub fn is_all_day(&self) -> bool {
        matches!(self, Self::Date { .. })
    }

    /// Rough UTC position, treating local times as if they were UTC.
    ///
    /// Good enough for window pre-filtering with a day of slack; never use
    /// it for slot arithmetic.
    pub fn approximate_utc(&self) -> DateTime<Utc> {
        match self {
            Self::Utc { at } => *at,
            Self::Zoned { local, .. } | Self::Floating { local } => local.and_utc(),
            Self::Date { date } => date.and_time(NaiveTime::MIN).and_utc(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    #[default]
    Confirmed,
    Tentative,
    Cancelled,
}

/// Whether an event blocks time (`TRANSP` in iCalendar).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transparency {
    #[default]
    Opaque,
    Transparent,
}

/// An event as returned by a backend, before normalization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawEvent {
    /// Provider identifier (UID for CalDAV).
    pub id: String,
    #[serde(default)]
    pub summary: String,
    pub start: EventTime,
    /// Missing end means "same as start" for timed events and "one day" for
    /// all-day events.
    #[serde(default)]
    pub end: Option<EventTime>,
    #[serde(default)]
    pub status: EventStatus,
    #[serde(default)]
    pub transparency: Transparency,
}

impl RawEvent {
    /// A confirmed, opaque event between two instants.
    pub fn timed(
        id: impl Into<String>,
        summary: impl Into<String>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            summary: summary.into(),
            start: EventTime::Utc { at: start },
            end: Some(EventTime::Utc { at: end }),
            status: EventStatus::Confirmed,
            transparency: Transparency::Opaque,
        }
    }

    /// A confirmed, opaque all-day event covering `first..=last`.
    pub fn all_day(
        id: impl Into<String>,
        summary: impl Into<String>,
        first: NaiveDate,
        last: NaiveDate,
    ) -> Self {
        let end = last.succ_opt().unwrap_or(last);
        Self {
            id: id.into(),
            summary: summary.into(),
            start: EventTime::Date { date: first },
            end: Some(EventTime::Date { date: end }),
            status: EventStatus::Confirmed,
            transparency: Transparency::Opaque,
        }
    }

    pub fn with_status(mut self, status: EventStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_transparency(mut self, transparency: Transparency) -> Self {
        self.transparency = transparency;
        self
    }
}

/// An event the engine asks a backend to create.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewEvent {
    pub summary: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

/// An event the backend accepted, with its provider-assigned identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedEvent {
    pub id: String,
    pub summary: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Core trait
// ---------------------------------------------------------------------------

/// The calendar capability the scheduling engine depends on.
///
/// Timeouts, retries and idempotency of `create_event` are the
/// implementation's responsibility; the engine calls each method at most
/// once per logical operation.
#[async_trait]
pub trait CalendarRepository: Send + Sync {
    /// Short backend name for logs and status output (`caldav`, `memory`).
    fn backend(&self) -> &str;

    /// Return every event intersecting `window`.
    async fn list_events(&self, calendar_id: &str, window: &TimeWindow) -> Result<Vec<RawEvent>>;

    /// Create one event and return it with its provider identifier.
    async fn create_event(&self, calendar_id: &str, event: &NewEvent) -> Result<CreatedEvent>;
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
