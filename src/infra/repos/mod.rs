mod inmemory;
mod postgres;

pub use inmemory::InMemoryStore;
pub use postgres::{PgAppointmentRepo, PgDeviceTokenRepo, PgUserRepo};

use anyhow::Result;
use std::collections::BTreeSet;
use uuid::Uuid;

use crate::domain::appointment::{Appointment, ReminderChannel};
use crate::domain::user::User;

#[async_trait::async_trait]
pub trait UserRepo: Send + Sync {
    async fn list_users(&self) -> Result<Vec<User>>;
    async fn get_user(&self, user_id: Uuid) -> Result<Option<User>>;
    async fn list_admins(&self) -> Result<Vec<User>>;
    async fn ping(&self) -> Result<()>;
}

#[async_trait::async_trait]
pub trait AppointmentRepo: Send + Sync {
    async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<Appointment>>;
    async fn get(&self, appointment_id: Uuid) -> Result<Option<Appointment>>;
    async fn insert(&self, appointment: &Appointment) -> Result<()>;
    /// Sets the channel's flag if it is not set yet. Returns false when the
    /// appointment is gone or the flag was already set.
    async fn mark_reminder_sent(
        &self,
        appointment_id: Uuid,
        channel: ReminderChannel,
    ) -> Result<bool>;
    /// Moves the appointment and clears both reminder flags.
    async fn reschedule(
        &self,
        appointment_id: Uuid,
        date: &str,
        time: &str,
        notes: Option<&str>,
    ) -> Result<Option<Appointment>>;
    async fn delete(&self, appointment_id: Uuid) -> Result<bool>;
}

#[async_trait::async_trait]
pub trait DeviceTokenRepo: Send + Sync {
    async fn list(&self, user_id: Uuid) -> Result<BTreeSet<String>>;
    /// Returns false when the token was already registered for the user.
    async fn insert(&self, user_id: Uuid, token: &str) -> Result<bool>;
    async fn replace(&self, user_id: Uuid, tokens: &BTreeSet<String>) -> Result<()>;
    async fn delete(&self, user_id: Uuid, tokens: &[String]) -> Result<u64>;
    async fn clear(&self, user_id: Uuid) -> Result<u64>;
}
