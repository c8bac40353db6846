//! Calendar Repository adapters for Slotwise.
//!
//! The workflow engine only ever talks to a calendar through the
//! [`CalendarRepository`] trait defined in [`traits`]. Two implementations
//! ship here:
//!
//! - [`CalDavCalendar`] -- any CalDAV server (Nextcloud, Radicale, iCloud,
//!   Fastmail, ...) over `REPORT`/`PUT` with iCalendar bodies.
//! - [`InMemoryCalendar`] -- a process-local calendar with call counters and
//!   failure injection, used offline and in tests.

pub mod caldav;
pub mod error;
pub mod ical;
pub mod memory;
pub mod traits;

pub use caldav::CalDavCalendar;
pub use error::{AdapterError, Result};
pub use memory::InMemoryCalendar;
pub use traits::{
    CalendarRepository, CreatedEvent, EventStatus, EventTime, NewEvent, RawEvent, TimeWindow,
    Transparency,
};
