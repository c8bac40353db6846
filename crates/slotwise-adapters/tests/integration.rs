//! Integration tests for the slotwise-adapters crate.
//!
//! These exercise the backends through the `CalendarRepository` trait
//! object, the way the workflow engine holds them.

use std::sync::Arc;

use chrono::{NaiveDate, TimeZone, Utc};
use slotwise_adapters::{
    CalDavCalendar, CalendarRepository, EventStatus, InMemoryCalendar, NewEvent, RawEvent,
    TimeWindow, Transparency,
};

fn week() -> TimeWindow {
    TimeWindow::new(
        Utc.with_ymd_and_hms(2026, 3, 2, 0, 0, 0).unwrap(),
        Utc.with_ymd_and_hms(2026, 3, 9, 0, 0, 0).unwrap(),
    )
}

// ═══════════════════════════════════════════════════════════════════════
//  In-memory calendar
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn memory_calendar_through_trait_object() {
    let memory = Arc::new(InMemoryCalendar::with_events(vec![
        RawEvent::timed(
            "1",
            "Dentist",
            Utc.with_ymd_and_hms(2026, 3, 3, 15, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2026, 3, 3, 16, 0, 0).unwrap(),
        ),
        RawEvent::all_day(
            "2",
            "Offsite",
            NaiveDate::from_ymd_opt(2026, 3, 5).unwrap(),
            NaiveDate::from_ymd_opt(2026, 3, 6).unwrap(),
        ),
        RawEvent::timed(
            "3",
            "Cancelled sync",
            Utc.with_ymd_and_hms(2026, 3, 4, 9, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2026, 3, 4, 10, 0, 0).unwrap(),
        )
        .with_status(EventStatus::Cancelled),
        RawEvent::timed(
            "4",
            "Reminder",
            Utc.with_ymd_and_hms(2026, 3, 4, 12, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2026, 3, 4, 12, 30, 0).unwrap(),
        )
        .with_transparency(Transparency::Transparent),
    ]));
    let repo: Arc<dyn CalendarRepository> = memory.clone();

    assert_eq!(repo.backend(), "memory");

    // The backend passes through everything in range; filtering is the
    // consumer's job.
    let events = repo.list_events("primary", &week()).await.unwrap();
    assert_eq!(events.len(), 4);

    let created = repo
        .create_event(
            "primary",
            &NewEvent {
                summary: "Write report".into(),
                start: Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap(),
                end: Utc.with_ymd_and_hms(2026, 3, 2, 11, 0, 0).unwrap(),
                description: Some("scheduled by slotwise".into()),
                location: None,
            },
        )
        .await
        .unwrap();

    assert!(!created.id.is_empty());
    assert_eq!(memory.create_calls(), 1);
    assert_eq!(repo.list_events("primary", &week()).await.unwrap().len(), 5);
}

#[tokio::test]
async fn memory_calendar_rejects_inverted_events() {
    let repo = InMemoryCalendar::new();
    let at = Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap();
    let result = repo
        .create_event(
            "primary",
            &NewEvent {
                summary: "zero".into(),
                start: at,
                end: at,
                description: None,
                location: None,
            },
        )
        .await;
    assert!(result.is_err());
    assert!(repo.created().is_empty());
}

// ═══════════════════════════════════════════════════════════════════════
//  CalDAV calendar
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn caldav_unreachable_server_is_transient() {
    // Port 9 (discard) is essentially never listening locally.
    let repo = CalDavCalendar::new("http://127.0.0.1:9/dav/cal").unwrap();
    let err = repo.list_events("primary", &week()).await.unwrap_err();
    assert!(err.is_transient(), "unexpected error kind: {err}");
}
