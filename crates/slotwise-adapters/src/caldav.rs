//! CalDAV calendar backend.
//!
//! Talks to any CalDAV-compatible server (Nextcloud, Radicale, iCloud,
//! Fastmail, ...). Events are listed with a `REPORT` calendar-query carrying
//! a time-range filter and created with a `PUT` of a generated iCalendar
//! object whose UID doubles as the provider identifier.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

use crate::error::{AdapterError, Result};
use crate::ical;
use crate::traits::{CalendarRepository, CreatedEvent, NewEvent, RawEvent, TimeWindow};

/// Per-request HTTP timeout.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Calendar ids that address the configured collection itself.
const SELF_IDS: &[&str] = &["", "primary", "default"];

/// Calendar Repository over CalDAV.
pub struct CalDavCalendar {
    /// Collection (or calendar home) URL, always ending in `/`.
    base_url: Url,
    username: Option<String>,
    password: Option<String>,
    client: reqwest::Client,
}

impl CalDavCalendar {
    /// Create a backend for the collection at `url`.
    pub fn new(url: &str) -> Result<Self> {
        let mut base_url = Url::parse(url)
            .map_err(|e| AdapterError::ConfigError(format!("invalid CalDAV URL `{url}`: {e}")))?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let client = reqwest::Client::builder()
            .user_agent(concat!("Slotwise/", env!("CARGO_PKG_VERSION")))
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| AdapterError::ConfigError(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            base_url,
            username: None,
            password: None,
            client,
        })
    }

    /// Attach HTTP basic-auth credentials.
    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    /// Resolve the collection URL for `calendar_id`.
    ///
    /// `primary` (or an empty id) means the configured URL is the collection;
    /// any other id names a child collection of it.
    pub fn collection_url(&self, calendar_id: &str) -> Result<Url> {
        if SELF_IDS.contains(&calendar_id) {
            return Ok(self.base_url.clone());
        }
        self.base_url
            .join(&format!("{}/", calendar_id.trim_matches('/')))
            .map_err(|e| AdapterError::InvalidInput(format!("bad calendar id `{calendar_id}`: {e}")))
    }

    fn request(&self, method: reqwest::Method, url: Url) -> reqwest::RequestBuilder {
        let mut builder = self.client.request(method, url);
        if let Some(user) = &self.username {
            builder = builder.basic_auth(user, self.password.as_deref());
        }
        builder
    }

    async fn read_success_body(response: reqwest::Response, operation: &str) -> Result<String> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AdapterError::RequestFailed {
                operation: operation.into(),
                reason: format!("failed to read response: {e}"),
            })?;

        if !status.is_success() {
            return Err(AdapterError::UnexpectedStatus {
                operation: operation.into(),
                status: status.as_u16(),
                body: body.chars().take(512).collect(),
            });
        }
        Ok(body)
    }
}

#[async_trait]
impl CalendarRepository for CalDavCalendar {
    fn backend(&self) -> &str {
        "caldav"
    }

    async fn list_events(&self, calendar_id: &str, window: &TimeWindow) -> Result<Vec<RawEvent>> {
        let url = self.collection_url(calendar_id)?;
        let body = ical::build_calendar_query_xml(&window.start, &window.end);
        let method = reqwest::Method::from_bytes(b"REPORT")
            .map_err(|e| AdapterError::Internal(format!("REPORT method: {e}")))?;

        debug!(url = %url, start = %window.start, end = %window.end, "listing calendar events");

        let response = self
            .request(method, url)
            .header("Content-Type", "application/xml; charset=utf-8")
            .header("Depth", "1")
            .body(body)
            .send()
            .await
            .map_err(|e| AdapterError::RequestFailed {
                operation: "list_events".into(),
                reason: e.to_string(),
            })?;

        let text = Self::read_success_body(response, "list_events").await?;
        let events = ical::parse_events(&text);

        debug!(count = events.len(), "calendar events listed");
        Ok(events)
    }

    async fn create_event(&self, calendar_id: &str, event: &NewEvent) -> Result<CreatedEvent> {
        if event.end <= event.start {
            return Err(AdapterError::InvalidInput(format!(
                "event `{}` ends before it starts",
                event.summary
            )));
        }

        let uid = Uuid::new_v4().to_string();
        let url = self
            .collection_url(calendar_id)?
            .join(&format!("{uid}.ics"))
            .map_err(|e| AdapterError::Internal(format!("event url: {e}")))?;
        let body = ical::render_event(&uid, event, &Utc::now());

        let response = self
            .request(reqwest::Method::PUT, url.clone())
            .header("Content-Type", "text/calendar; charset=utf-8")
            .header("If-None-Match", "*")
            .body(body)
            .send()
            .await
            .map_err(|e| AdapterError::RequestFailed {
                operation: "create_event".into(),
                reason: e.to_string(),
            })?;

        if let Err(e) = Self::read_success_body(response, "create_event").await {
            warn!(url = %url, error = %e, "calendar rejected event");
            return Err(e);
        }

        info!(uid = %uid, summary = %event.summary, start = %event.start, "calendar event created");

        Ok(CreatedEvent {
            id: uid,
            summary: event.summary.clone(),
            start: event.start,
            end: event.end,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
