//! Engine configuration, derived from the `[scheduling]` config section.

use chrono::Duration;
use chrono_tz::Tz;
use slotwise_agent::SchedulingSettings;

use crate::error::{Result, WorkflowError};

/// Longest horizon any plan may be scheduled over.
pub const MAX_HORIZON_DAYS: u32 = 30;

/// Validated scheduling parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Reference timezone for bands, day windows and all-day events.
    pub timezone: Tz,
    /// Shortest free gap worth keeping; also the start-time alignment.
    pub granularity: Duration,
    /// Tasks may start at or after this local hour.
    pub day_start_hour: u32,
    /// Tasks must end at or before this local hour.
    pub day_end_hour: u32,
    pub default_horizon_days: u32,
    pub insight_default_days: u32,
    /// Change-request rounds allowed per conversation.
    pub max_revisions: u32,
    pub habit_min_gap_hours: Option<u32>,
    /// Calendar addressed for every read and write.
    pub calendar_id: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            timezone: Tz::UTC,
            granularity: Duration::minutes(15),
            day_start_hour: 7,
            day_end_hour: 22,
            default_horizon_days: 7,
            insight_default_days: 7,
            max_revisions: 5,
            habit_min_gap_hours: None,
            calendar_id: "primary".into(),
        }
    }
}

impl EngineConfig {
    /// Build and validate from configuration-file settings.
    pub fn from_settings(settings: &SchedulingSettings, calendar_id: &str) -> Result<Self> {
        let timezone: Tz = settings
            .timezone
            .parse()
            .map_err(|e| WorkflowError::InvalidConfig {
                reason: format!("unknown timezone `{}`: {e}", settings.timezone),
            })?;

        let config = Self {
            timezone,
            granularity: Duration::minutes(i64::from(settings.slot_granularity_minutes)),
            day_start_hour: settings.day_start_hour,
            day_end_hour: settings.day_end_hour,
            default_horizon_days: settings.default_horizon_days,
            insight_default_days: settings.insight_default_days,
            max_revisions: settings.max_revisions,
            habit_min_gap_hours: settings.habit_min_gap_hours,
            calendar_id: calendar_id.to_owned(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the engine cannot work with.
    pub fn validate(&self) -> Result<()> {
        let fail = |reason: String| Err(WorkflowError::InvalidConfig { reason });

        if self.granularity <= Duration::zero() || self.granularity > Duration::hours(4) {
            return fail(format!(
                "slot granularity must be between 1 and 240 minutes, got {}",
                self.granularity.num_minutes()
            ));
        }
        if self.day_start_hour >= self.day_end_hour || self.day_end_hour > 24 {
            return fail(format!(
                "day window {}..{} is not a valid hour range",
                self.day_start_hour, self.day_end_hour
            ));
        }
        if self.default_horizon_days == 0 || self.insight_default_days == 0 {
            return fail("horizons must be at least one day".into());
        }
        if self.max_revisions == 0 {
            return fail("max_revisions must be at least 1".into());
        }
        if self.calendar_id.trim().is_empty() {
            return fail("calendar_id must not be empty".into());
        }
        Ok(())
    }
}
