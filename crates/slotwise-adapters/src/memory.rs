//! In-memory calendar backend.
//!
//! Holds events in process memory, counts every call, and can be told to
//! fail. Used by the CLI in offline mode and throughout the test suites.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Duration;
use tracing::debug;

use crate::error::{AdapterError, Result};
use crate::traits::{CalendarRepository, CreatedEvent, NewEvent, RawEvent, TimeWindow};

#[derive(Default)]
struct Inner {
    events: Vec<RawEvent>,
    created: Vec<CreatedEvent>,
    list_failure: Option<String>,
    /// 1-based create attempts that should fail.
    failing_creates: HashSet<usize>,
}

/// A process-local [`CalendarRepository`].
///
/// Calendar ids are ignored: every id addresses the same event list.
#[derive(Default)]
pub struct InMemoryCalendar {
    inner: Mutex<Inner>,
    list_calls: AtomicUsize,
    create_calls: AtomicUsize,
}

impl InMemoryCalendar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the calendar with existing events.
    pub fn with_events(events: Vec<RawEvent>) -> Self {
        let cal = Self::default();
        cal.lock().events = events;
        cal
    }

    /// Make every subsequent `list_events` call fail.
    pub fn fail_listing(&self, reason: impl Into<String>) {
        self.lock().list_failure = Some(reason.into());
    }

    /// Make the given 1-based `create_event` attempts fail.
    pub fn fail_create_attempts(&self, attempts: impl IntoIterator<Item = usize>) {
        self.lock().failing_creates.extend(attempts);
    }

    pub fn add_event(&self, event: RawEvent) {
        self.lock().events.push(event);
    }

    /// Every event currently stored, seeded and created.
    pub fn events(&self) -> Vec<RawEvent> {
        self.lock().events.clone()
    }

    /// Events created through [`CalendarRepository::create_event`].
    pub fn created(&self) -> Vec<CreatedEvent> {
        self.lock().created.clone()
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A panic while holding the lock cannot leave `Inner` half-updated.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl CalendarRepository for InMemoryCalendar {
    fn backend(&self) -> &str {
        "memory"
    }

    async fn list_events(&self, calendar_id: &str, window: &TimeWindow) -> Result<Vec<RawEvent>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        let inner = self.lock();

        if let Some(reason) = &inner.list_failure {
            return Err(AdapterError::Injected(reason.clone()));
        }

        // Local and all-day times are only approximately placed here, so
        // keep a day of slack on both sides and let the consumer clip.
        let slack = TimeWindow::new(window.start - Duration::days(1), window.end + Duration::days(1));
        let events: Vec<RawEvent> = inner
            .events
            .iter()
            .filter(|ev| {
                let start = ev.start.approximate_utc();
                let end = ev.end.as_ref().map_or(start, |e| e.approximate_utc());
                start < slack.end && end.max(start) >= slack.start
            })
            .cloned()
            .collect();

        debug!(calendar_id, count = events.len(), "in-memory events listed");
        Ok(events)
    }

    async fn create_event(&self, calendar_id: &str, event: &NewEvent) -> Result<CreatedEvent> {
        let attempt = self.create_calls.fetch_add(1, Ordering::SeqCst) + 1;
        let mut inner = self.lock();

        if inner.failing_creates.contains(&attempt) {
            return Err(AdapterError::Injected(format!(
                "create attempt {attempt} refused"
            )));
        }
        if event.end <= event.start {
            return Err(AdapterError::InvalidInput(format!(
                "event `{}` ends before it starts",
                event.summary
            )));
        }

        let created = CreatedEvent {
            id: format!("mem-{attempt}"),
            summary: event.summary.clone(),
            start: event.start,
            end: event.end,
        };
        inner.events.push(RawEvent::timed(
            created.id.clone(),
            created.summary.clone(),
            created.start,
            created.end,
        ));
        inner.created.push(created.clone());

        debug!(calendar_id, id = %created.id, "in-memory event created");
        Ok(created)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;

    fn window() -> TimeWindow {
        TimeWindow::new(
            Utc.with_ymd_and_hms(2026, 3, 2, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2026, 3, 3, 0, 0, 0).unwrap(),
        )
    }

    #[tokio::test]
    async fn lists_only_nearby_events() {
        let cal = InMemoryCalendar::with_events(vec![
            RawEvent::timed(
                "in",
                "Standup",
                Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap(),
                Utc.with_ymd_and_hms(2026, 3, 2, 9, 15, 0).unwrap(),
            ),
            RawEvent::timed(
                "far",
                "Next month",
                Utc.with_ymd_and_hms(2026, 4, 2, 9, 0, 0).unwrap(),
                Utc.with_ymd_and_hms(2026, 4, 2, 10, 0, 0).unwrap(),
            ),
        ]);

        let events = cal.list_events("primary", &window()).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].id, "in");
        assert_eq!(cal.list_calls(), 1);
    }

    #[tokio::test]
    async fn created_events_become_visible() {
        let cal = InMemoryCalendar::new();
        let event = NewEvent {
            summary: "Focus".into(),
            start: Utc.with_ymd_and_hms(2026, 3, 2, 14, 0, 0).unwrap(),
            end: Utc.with_ymd_and_hms(2026, 3, 2, 16, 0, 0).unwrap(),
            description: None,
            location: None,
        };

        let created = cal.create_event("primary", &event).await.unwrap();
        assert_eq!(created.id, "mem-1");
        assert_eq!(cal.created().len(), 1);

        let listed = cal.list_events("primary", &window()).await.unwrap();
        assert_eq!(listed.len(), 1);
    }

    #[tokio::test]
    async fn injected_failures() {
        let cal = InMemoryCalendar::new();
        cal.fail_create_attempts([2]);
        let event = NewEvent {
            summary: "x".into(),
            start: Utc.with_ymd_and_hms(2026, 3, 2, 14, 0, 0).unwrap(),
            end: Utc.with_ymd_and_hms(2026, 3, 2, 15, 0, 0).unwrap(),
            description: None,
            location: None,
        };

        assert!(cal.create_event("primary", &event).await.is_ok());
        assert!(matches!(
            cal.create_event("primary", &event).await,
            Err(AdapterError::Injected(_))
        ));
        assert!(cal.create_event("primary", &event).await.is_ok());
        assert_eq!(cal.create_calls(), 3);
        assert_eq!(cal.created().len(), 2);

        cal.fail_listing("backend down");
        let err = cal.list_events("primary", &window()).await.unwrap_err();
        assert!(err.is_transient());
    }
}
