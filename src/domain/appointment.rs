use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An appointment booked for a user.
///
/// `date` (`YYYY-MM-DD`) and `time` (`HH:MM`) are stored exactly as the
/// booking flow wrote them, without an offset. They are interpreted in the
/// operational timezone when reminders are evaluated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Uuid,
    pub user_id: Uuid,
    pub date: String,
    pub time: String,
    pub notes: Option<String>,
    pub email_reminder_sent: bool,
    pub push_reminder_sent: bool,
    pub created_at: DateTime<Utc>,
}

impl Appointment {
    pub fn new(user_id: Uuid, date: impl Into<String>, time: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            date: date.into(),
            time: time.into(),
            notes: None,
            email_reminder_sent: false,
            push_reminder_sent: false,
            created_at: Utc::now(),
        }
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    pub fn reminder_sent(&self, channel: ReminderChannel) -> bool {
        match channel {
            ReminderChannel::Email => self.email_reminder_sent,
            ReminderChannel::Push => self.push_reminder_sent,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReminderChannel {
    Email,
    Push,
}

impl ReminderChannel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReminderChannel::Email => "email",
            ReminderChannel::Push => "push",
        }
    }
}
