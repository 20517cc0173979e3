use anyhow::Result;
use chrono_tz::Tz;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::app::reminders::{appointment_instant, ScheduleError};
use crate::domain::appointment::Appointment;
use crate::infra::repos::AppointmentRepo;

#[derive(Debug)]
pub enum RescheduleError {
    Invalid(ScheduleError),
    Store(anyhow::Error),
}

impl From<anyhow::Error> for RescheduleError {
    fn from(err: anyhow::Error) -> Self {
        RescheduleError::Store(err)
    }
}

#[derive(Clone)]
pub struct AppointmentService {
    repo: Arc<dyn AppointmentRepo>,
    timezone: Tz,
}

impl AppointmentService {
    pub fn new(repo: Arc<dyn AppointmentRepo>, timezone: Tz) -> Self {
        Self { repo, timezone }
    }

    pub async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<Appointment>> {
        self.repo.list_for_user(user_id).await
    }

    /// Moves an appointment. Both reminder flags are cleared since the new
    /// time invalidates the windows they were sent for.
    pub async fn reschedule(
        &self,
        appointment_id: Uuid,
        date: &str,
        time: &str,
        notes: Option<&str>,
    ) -> Result<Option<Appointment>, RescheduleError> {
        let date = date.trim();
        let time = time.trim();
        appointment_instant(date, time, self.timezone).map_err(RescheduleError::Invalid)?;

        let appointment = self.repo.reschedule(appointment_id, date, time, notes).await?;
        if appointment.is_some() {
            info!(appointment_id = %appointment_id, date, time, "appointment rescheduled");
        }
        Ok(appointment)
    }

    pub async fn cancel(&self, appointment_id: Uuid) -> Result<bool> {
        let deleted = self.repo.delete(appointment_id).await?;
        if deleted {
            info!(appointment_id = %appointment_id, "appointment cancelled");
        }
        Ok(deleted)
    }
}
