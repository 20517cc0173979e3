//! Decides which reminders an appointment needs at a given moment.
//!
//! The sweep runs on a fixed interval and never exactly on time, so each
//! reminder kind fires inside a tolerance window around its target offset:
//! the day-before email between 0.95 and 1.05 days ahead (about 1.2 hours
//! either side), the hour-before push between 0.9 and 1.1 hours ahead (6
//! minutes either side). Both bounds are exclusive.

use chrono::{DateTime, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use serde_json::json;
use thiserror::Error;

use crate::domain::appointment::{Appointment, ReminderChannel};
use crate::domain::notification::NotificationPayload;

const DAY_MS: i64 = 24 * 60 * 60 * 1000;
const HOUR_MS: i64 = 60 * 60 * 1000;

/// Settings shared by the reminder evaluator, composer and sweep.
#[derive(Debug, Clone)]
pub struct ReminderSettings {
    pub timezone: Tz,
    pub practice_name: String,
    pub app_url: String,
    pub push_concurrency: usize,
    pub sweep_concurrency: usize,
    pub prune_invalid_tokens: bool,
}

impl Default for ReminderSettings {
    fn default() -> Self {
        Self {
            timezone: chrono_tz::Europe::Madrid,
            practice_name: "Ruiz Nutrición".to_string(),
            app_url: "https://nutricionapp-b7b7d.web.app".to_string(),
            push_concurrency: 8,
            sweep_concurrency: 4,
            prune_invalid_tokens: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReminderKind {
    DayBefore,
    HourBefore,
}

impl ReminderKind {
    pub const ALL: [ReminderKind; 2] = [ReminderKind::DayBefore, ReminderKind::HourBefore];

    pub fn channel(self) -> ReminderChannel {
        match self {
            ReminderKind::DayBefore => ReminderChannel::Email,
            ReminderKind::HourBefore => ReminderChannel::Push,
        }
    }

    /// Exclusive bounds, in milliseconds before the appointment.
    fn window_ms(self) -> (i64, i64) {
        match self {
            ReminderKind::DayBefore => (DAY_MS * 95 / 100, DAY_MS * 105 / 100),
            ReminderKind::HourBefore => (HOUR_MS * 9 / 10, HOUR_MS * 11 / 10),
        }
    }

    fn matches(self, lead_ms: i64) -> bool {
        let (lower, upper) = self.window_ms();
        lead_ms > lower && lead_ms < upper
    }
}

/// The reminder kinds that are due for one appointment. Each kind is gated
/// separately by its channel's sent flag.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReminderKinds {
    day_before: bool,
    hour_before: bool,
}

impl ReminderKinds {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, kind: ReminderKind) {
        match kind {
            ReminderKind::DayBefore => self.day_before = true,
            ReminderKind::HourBefore => self.hour_before = true,
        }
    }

    pub fn contains(&self, kind: ReminderKind) -> bool {
        match kind {
            ReminderKind::DayBefore => self.day_before,
            ReminderKind::HourBefore => self.hour_before,
        }
    }

    pub fn is_empty(&self) -> bool {
        !self.day_before && !self.hour_before
    }

    pub fn iter(&self) -> impl Iterator<Item = ReminderKind> + '_ {
        ReminderKind::ALL
            .into_iter()
            .filter(move |kind| self.contains(*kind))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScheduleError {
    #[error("invalid appointment date {0:?}")]
    InvalidDate(String),
    #[error("invalid appointment time {0:?}")]
    InvalidTime(String),
    #[error("local time {local} does not exist in {timezone}")]
    NonexistentLocalTime {
        local: NaiveDateTime,
        timezone: String,
    },
}

/// Combines the stored date and wall-clock time into one instant.
///
/// A missing or blank time is an error, never midnight. A time repeated by a
/// DST fall-back resolves to its first occurrence.
pub fn appointment_instant(date: &str, time: &str, timezone: Tz) -> Result<DateTime<Tz>, ScheduleError> {
    let parsed_date = NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d")
        .map_err(|_| ScheduleError::InvalidDate(date.to_string()))?;
    let parsed_time = parse_time(time)?;
    let local = parsed_date.and_time(parsed_time);

    match timezone.from_local_datetime(&local) {
        LocalResult::Single(instant) => Ok(instant),
        LocalResult::Ambiguous(earliest, _) => Ok(earliest),
        LocalResult::None => Err(ScheduleError::NonexistentLocalTime {
            local,
            timezone: timezone.name().to_string(),
        }),
    }
}

fn parse_time(raw: &str) -> Result<NaiveTime, ScheduleError> {
    let trimmed = raw.trim();
    NaiveTime::parse_from_str(trimmed, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(trimmed, "%H:%M:%S"))
        .map_err(|_| ScheduleError::InvalidTime(raw.to_string()))
}

/// Classifies an already resolved instant against `now`.
pub fn classify_instant(now: DateTime<Utc>, instant: DateTime<Utc>) -> ReminderKinds {
    let lead_ms = (instant - now).num_milliseconds();
    let mut kinds = ReminderKinds::empty();
    for kind in ReminderKind::ALL {
        if kind.matches(lead_ms) {
            kinds.insert(kind);
        }
    }
    kinds
}

pub fn classify(
    now: DateTime<Utc>,
    appointment: &Appointment,
    timezone: Tz,
) -> Result<ReminderKinds, ScheduleError> {
    let instant = appointment_instant(&appointment.date, &appointment.time, timezone)?;
    Ok(classify_instant(now, instant.with_timezone(&Utc)))
}

/// Push sent one hour ahead of the appointment.
pub fn reminder_push_payload(
    appointment: &Appointment,
    instant: &DateTime<Tz>,
    settings: &ReminderSettings,
) -> NotificationPayload {
    NotificationPayload::new(
        "Recordatorio de cita",
        format!(
            "Tu cita en {} es hoy a las {}.",
            settings.practice_name,
            instant.format("%H:%M")
        ),
    )
    .with_data(json!({
        "type": "appointment_reminder",
        "appointment_id": appointment.id.to_string(),
        "url": settings.app_url,
    }))
}
