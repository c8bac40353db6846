//! iCalendar (RFC 5545) and CalDAV (RFC 4791) helpers.
//!
//! Only the subset Slotwise needs: VEVENT parsing with the usual DTSTART /
//! DTEND forms, VEVENT generation for new events, and the calendar-query
//! REPORT body.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use tracing::debug;

use crate::traits::{EventStatus, EventTime, NewEvent, RawEvent, Transparency};

// ---------------------------------------------------------------------------
// Formatting
// ---------------------------------------------------------------------------

/// Format an instant as an iCalendar UTC value (`20260224T100000Z`).
pub fn format_utc(dt: &DateTime<Utc>) -> String {
    dt.format("%Y%m%dT%H%M%SZ").to_string()
}

/// Escape TEXT property values (RFC 5545 section 3.3.11).
pub fn escape_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            ';' => out.push_str("\\;"),
            ',' => out.push_str("\\,"),
            '\n' => out.push_str("\\n"),
            '\r' => {}
            other => out.push(other),
        }
    }
    out
}

fn unescape_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(ch) = chars.next() {
        if ch == '\\' {
            match chars.next() {
                Some('n') | Some('N') => out.push('\n'),
                Some(other) => out.push(other),
                None => out.push('\\'),
            }
        } else {
            out.push(ch);
        }
    }
    out
}

/// Generate a VCALENDAR document holding one VEVENT.
pub fn render_event(uid: &str, event: &NewEvent, stamp: &DateTime<Utc>) -> String {
    let mut ical = String::with_capacity(512);
    ical.push_str("BEGIN:VCALENDAR\r\n");
    ical.push_str("VERSION:2.0\r\n");
    ical.push_str("PRODID:-//Slotwise//Scheduler//EN\r\n");
    ical.push_str("BEGIN:VEVENT\r\n");
    ical.push_str(&format!("UID:{uid}\r\n"));
    ical.push_str(&format!("DTSTAMP:{}\r\n", format_utc(stamp)));
    ical.push_str(&format!("DTSTART:{}\r\n", format_utc(&event.start)));
    ical.push_str(&format!("DTEND:{}\r\n", format_utc(&event.end)));
    ical.push_str(&format!("SUMMARY:{}\r\n", escape_text(&event.summary)));
    if let Some(desc) = &event.description {
        ical.push_str(&format!("DESCRIPTION:{}\r\n", escape_text(desc)));
    }
    if let Some(loc) = &event.location {
        ical.push_str(&format!("LOCATION:{}\r\n", escape_text(loc)));
    }
    ical.push_str("END:VEVENT\r\n");
    ical.push_str("END:VCALENDAR\r\n");
    ical
}

/// Build a CalDAV REPORT body listing VEVENTs in `[start, end)`.
pub fn build_calendar_query_xml(start: &DateTime<Utc>, end: &DateTime<Utc>) -> String {
    format!(
        r#"<?xml version="1.0" encoding="utf-8" ?>
<C:calendar-query xmlns:D="DAV:" xmlns:C="urn:ietf:params:xml:ns:caldav">
  <D:prop>
    <D:getetag/>
    <C:calendar-data/>
  </D:prop>
  <C:filter>
    <C:comp-filter name="VCALENDAR">
      <C:comp-filter name="VEVENT">
        <C:time-range start="{}" end="{}"/>
      </C:comp-filter>
    </C:comp-filter>
  </C:filter>
</C:calendar-query>"#,
        format_utc(start),
        format_utc(end)
    )
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// A content line split into name, parameters and value.
#[derive(Debug, PartialEq, Eq)]
struct Property<'a> {
    name: String,
    params: Vec<(String, &'a str)>,
    value: &'a str,
}

impl Property<'_> {
    fn param(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.trim_matches('"'))
    }
}

fn parse_property(line: &str) -> Option<Property<'_>> {
    let (head, value) = line.split_once(':')?;
    let mut parts = head.split(';');
    let name = parts.next()?.trim().to_ascii_uppercase();
    let params = parts
        .filter_map(|p| p.split_once('='))
        .map(|(k, v)| (k.trim().to_ascii_uppercase(), v))
        .collect();
    Some(Property {
        name,
        params,
        value,
    })
}

/// Decode the XML entities servers use inside `<calendar-data>`.
fn decode_xml_entities(data: &str) -> String {
    data.replace("&#13;", "")
        .replace("&#xD;", "")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

/// Split into logical lines, joining folded continuations.
fn unfold(data: &str) -> Vec<String> {
    let mut lines: Vec<String> = Vec::new();
    for raw in data.lines() {
        let raw = raw.trim_end_matches('\r');
        if (raw.starts_with(' ') || raw.starts_with('\t')) && !lines.is_empty() {
            if let Some(last) = lines.last_mut() {
                last.push_str(&raw[1..]);
            }
        } else {
            lines.push(raw.trim().to_owned());
        }
    }
    lines
}

fn parse_event_time(prop: &Property<'_>) -> Option<EventTime> {
    let value = prop.value.trim();

    if prop.param("VALUE") == Some("DATE") || (value.len() == 8 && !value.contains('T')) {
        return NaiveDate::parse_from_str(value, "%Y%m%d")
            .ok()
            .map(|date| EventTime::Date { date });
    }

    if let Some(utc) = value.strip_suffix('Z') {
        return NaiveDateTime::parse_from_str(utc, "%Y%m%dT%H%M%S")
            .ok()
            .map(|local| EventTime::Utc {
                at: local.and_utc(),
            });
    }

    let local = NaiveDateTime::parse_from_str(value, "%Y%m%dT%H%M%S").ok()?;
    match prop.param("TZID") {
        Some(tzid) => Some(EventTime::Zoned {
            local,
            tzid: tzid.to_owned(),
        }),
        None => Some(EventTime::Floating { local }),
    }
}

#[derive(Default)]
struct EventBuilder {
    uid: Option<String>,
    summary: String,
    start: Option<EventTime>,
    end: Option<EventTime>,
    status: EventStatus,
    transparency: Transparency,
}

impl EventBuilder {
    fn build(self) -> Option<RawEvent> {
        Some(RawEvent {
            id: self.uid?,
            summary: self.summary,
            start: self.start?,
            end: self.end,
            status: self.status,
            transparency: self.transparency,
        })
    }
}

/// Slice out each `BEGIN:VCALENDAR ... END:VCALENDAR` document, which is
/// how calendar objects appear inside a multistatus body.
fn calendar_documents(data: &str) -> Vec<&str> {
    const BEGIN: &str = "BEGIN:VCALENDAR";
    const END: &str = "END:VCALENDAR";

    let mut docs = Vec::new();
    let mut rest = data;
    while let Some(start) = rest.find(BEGIN) {
        let tail = &rest[start..];
        let Some(end) = tail.find(END) else {
            docs.push(tail);
            break;
        };
        docs.push(&tail[..end + END.len()]);
        rest = &tail[end + END.len()..];
    }
    if docs.is_empty() {
        docs.push(data);
    }
    docs
}

/// Extract VEVENT blocks from iCalendar data or a CalDAV multistatus body.
///
/// Events without a UID or a parsable DTSTART are skipped. Nested
/// components (VALARM) are ignored.
pub fn parse_events(data: &str) -> Vec<RawEvent> {
    calendar_documents(data)
        .into_iter()
        .flat_map(|doc| parse_document(&decode_xml_entities(doc)))
        .collect()
}

fn parse_document(data: &str) -> Vec<RawEvent> {
    let mut events = Vec::new();
    let mut current: Option<EventBuilder> = None;
    let mut nested = 0usize;

    for line in unfold(data) {
        match line.as_str() {
            "BEGIN:VEVENT" => {
                current = Some(EventBuilder::default());
                nested = 0;
                continue;
            }
            "END:VEVENT" => {
                if let Some(builder) = current.take() {
                    match builder.build() {
                        Some(event) => events.push(event),
                        None => debug!("skipping VEVENT without UID or DTSTART"),
                    }
                }
                continue;
            }
            _ => {}
        }

        let Some(builder) = current.as_mut() else {
            continue;
        };
        if line.starts_with("BEGIN:") {
            nested += 1;
            continue;
        }
        if line.starts_with("END:") {
            nested = nested.saturating_sub(1);
            continue;
        }
        if nested > 0 {
            continue;
        }

        let Some(prop) = parse_property(&line) else {
            continue;
        };
        match prop.name.as_str() {
            "UID" => builder.uid = Some(prop.value.trim().to_owned()),
            "SUMMARY" => builder.summary = unescape_text(prop.value),
            "DTSTART" => builder.start = parse_event_time(&prop),
            "DTEND" => builder.end = parse_event_time(&prop),
            "STATUS" => {
                builder.status = match prop.value.trim().to_ascii_uppercase().as_str() {
                    "CANCELLED" => EventStatus::Cancelled,
                    "TENTATIVE" => EventStatus::Tentative,
                    _ => EventStatus::Confirmed,
                }
            }
            "TRANSP" => {
                builder.transparency = if prop.value.trim().eq_ignore_ascii_case("TRANSPARENT") {
                    Transparency::Transparent
                } else {
                    Transparency::Opaque
                }
            }
            _ => {}
        }
    }

    events
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn render_event_basic() {
        let event = NewEvent {
            summary: "Stretching, daily".into(),
            start: Utc.with_ymd_and_hms(2026, 2, 24, 10, 0, 0).unwrap(),
            end: Utc.with_ymd_and_hms(2026, 2, 24, 10, 15, 0).unwrap(),
            description: None,
            location: Some("Gym".into()),
        };
        let stamp = Utc.with_ymd_and_hms(2026, 2, 20, 0, 0, 0).unwrap();
        let ical = render_event("uid-1", &event, &stamp);

        assert!(ical.starts_with("BEGIN:VCALENDAR\r\n"));
        assert!(ical.contains("UID:uid-1\r\n"));
        assert!(ical.contains("DTSTART:20260224T100000Z\r\n"));
        assert!(ical.contains("DTEND:20260224T101500Z\r\n"));
        assert!(ical.contains("SUMMARY:Stretching\\, daily\r\n"));
        assert!(ical.contains("LOCATION:Gym\r\n"));
        assert!(!ical.contains("DESCRIPTION"));
    }

    #[test]
    fn query_xml_contains_time_range() {
        let start = Utc.with_ymd_and_hms(2026, 2, 24, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2026, 3, 3, 0, 0, 0).unwrap();
        let xml = build_calendar_query_xml(&start, &end);
        assert!(xml.contains(r#"start="20260224T000000Z""#));
        assert!(xml.contains(r#"end="20260303T000000Z""#));
        assert!(xml.contains("VEVENT"));
    }

    #[test]
    fn parses_all_time_forms() {
        let data = "BEGIN:VCALENDAR\r\n\
BEGIN:VEVENT\r\n\
UID:a\r\n\
SUMMARY:Standup\r\n\
DTSTART:20260224T090000Z\r\n\
DTEND:20260224T091500Z\r\n\
END:VEVENT\r\n\
BEGIN:VEVENT\r\n\
UID:b\r\n\
DTSTART;TZID=Europe/Berlin:20260224T100000\r\n\
DTEND;TZID=\"Europe/Berlin\":20260224T110000\r\n\
END:VEVENT\r\n\
BEGIN:VEVENT\r\n\
UID:c\r\n\
DTSTART;VALUE=DATE:20260225\r\n\
DTEND;VALUE=DATE:20260226\r\n\
TRANSP:TRANSPARENT\r\n\
END:VEVENT\r\n\
BEGIN:VEVENT\r\n\
UID:d\r\n\
DTSTART:20260226T120000\r\n\
STATUS:CANCELLED\r\n\
END:VEVENT\r\n\
END:VCALENDAR\r\n";

        let events = parse_events(data);
        assert_eq!(events.len(), 4);

        assert!(matches!(events[0].start, EventTime::Utc { .. }));
        assert_eq!(events[0].summary, "Standup");

        match &events[1].end {
            Some(EventTime::Zoned { tzid, .. }) => assert_eq!(tzid, "Europe/Berlin"),
            other => panic!("expected zoned end, got {other:?}"),
        }

        assert!(events[2].start.is_all_day());
        assert_eq!(events[2].transparency, Transparency::Transparent);

        assert!(matches!(events[3].start, EventTime::Floating { .. }));
        assert_eq!(events[3].status, EventStatus::Cancelled);
        assert!(events[3].end.is_none());
    }

    #[test]
    fn parses_multistatus_with_entities_and_folding() {
        let body = r#"<?xml version="1.0"?>
<d:multistatus xmlns:d="DAV:" xmlns:cal="urn:ietf:params:xml:ns:caldav">
 <d:response>
  <d:propstat><d:prop>
   <cal:calendar-data>BEGIN:VCALENDAR&#13;
BEGIN:VEVENT&#13;
UID:folded&#13;
SUMMARY:Planning &amp; rev&#13;
 iew&#13;
DTSTART:20260224T130000Z&#13;
DTEND:20260224T140000Z&#13;
BEGIN:VALARM&#13;
TRIGGER:-PT15M&#13;
END:VALARM&#13;
END:VEVENT&#13;
END:VCALENDAR&#13;
</cal:calendar-data>
  </d:prop></d:propstat>
 </d:response>
</d:multistatus>"#;

        let events = parse_events(body);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].id, "folded");
        assert_eq!(events[0].summary, "Planning & review");
    }

    #[test]
    fn skips_events_without_uid() {
        let data = "BEGIN:VEVENT\nDTSTART:20260224T090000Z\nEND:VEVENT\n";
        assert!(parse_events(data).is_empty());
    }

    #[test]
    fn text_escaping_round_trips() {
        let text = "a;b,c\\d\nline";
        assert_eq!(unescape_text(&escape_text(text)), text);
    }
}
