use anyhow::{anyhow, Result};
use sqlx::postgres::PgRow;
use sqlx::Row;
use std::collections::BTreeSet;
use uuid::Uuid;

use super::{AppointmentRepo, DeviceTokenRepo, UserRepo};
use crate::domain::appointment::{Appointment, ReminderChannel};
use crate::domain::user::{Role, User};
use crate::infra::db::Db;

const USER_COLUMNS: &str = "id, email, display_name, role, created_at";
const APPOINTMENT_COLUMNS: &str = "id, user_id, scheduled_date, scheduled_time, notes, \
     email_reminder_sent, push_reminder_sent, created_at";

fn user_from_row(row: &PgRow) -> Result<User> {
    let role: String = row.get("role");
    Ok(User {
        id: row.get("id"),
        email: row.get("email"),
        display_name: row.get("display_name"),
        role: role.parse::<Role>().map_err(|err| anyhow!(err))?,
        created_at: row.get("created_at"),
    })
}

fn appointment_from_row(row: &PgRow) -> Appointment {
    Appointment {
        id: row.get("id"),
        user_id: row.get("user_id"),
        date: row.get("scheduled_date"),
        time: row.get("scheduled_time"),
        notes: row.get("notes"),
        email_reminder_sent: row.get("email_reminder_sent"),
        push_reminder_sent: row.get("push_reminder_sent"),
        created_at: row.get("created_at"),
    }
}

#[derive(Clone)]
pub struct PgUserRepo {
    db: Db,
}

impl PgUserRepo {
    pub fn new(db: Db) -> Self {
        Self { db }
    }
}

#[async_trait::async_trait]
impl UserRepo for PgUserRepo {
    async fn list_users(&self) -> Result<Vec<User>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM users ORDER BY created_at, id",
            USER_COLUMNS
        ))
        .fetch_all(self.db.pool())
        .await?;

        rows.iter().map(user_from_row).collect()
    }

    async fn get_user(&self, user_id: Uuid) -> Result<Option<User>> {
        let row = sqlx::query(&format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS))
            .bind(user_id)
            .fetch_optional(self.db.pool())
            .await?;

        row.as_ref().map(user_from_row).transpose()
    }

    async fn list_admins(&self) -> Result<Vec<User>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM users WHERE role = 'admin' ORDER BY created_at, id",
            USER_COLUMNS
        ))
        .fetch_all(self.db.pool())
        .await?;

        rows.iter().map(user_from_row).collect()
    }

    async fn ping(&self) -> Result<()> {
        self.db.ping().await
    }
}

#[derive(Clone)]
pub struct PgAppointmentRepo {
    db: Db,
}

impl PgAppointmentRepo {
    pub fn new(db: Db) -> Self {
        Self { db }
    }
}

#[async_trait::async_trait]
impl AppointmentRepo for PgAppointmentRepo {
    async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<Appointment>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM appointments \
             WHERE user_id = $1 \
             ORDER BY scheduled_date, scheduled_time, id",
            APPOINTMENT_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(self.db.pool())
        .await?;

        Ok(rows.iter().map(appointment_from_row).collect())
    }

    async fn get(&self, appointment_id: Uuid) -> Result<Option<Appointment>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM appointments WHERE id = $1",
            APPOINTMENT_COLUMNS
        ))
        .bind(appointment_id)
        .fetch_optional(self.db.pool())
        .await?;

        Ok(row.as_ref().map(appointment_from_row))
    }

    async fn insert(&self, appointment: &Appointment) -> Result<()> {
        sqlx::query(
            "INSERT INTO appointments \
             (id, user_id, scheduled_date, scheduled_time, notes, \
              email_reminder_sent, push_reminder_sent, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(appointment.id)
        .bind(appointment.user_id)
        .bind(&appointment.date)
        .bind(&appointment.time)
        .bind(&appointment.notes)
        .bind(appointment.email_reminder_sent)
        .bind(appointment.push_reminder_sent)
        .bind(appointment.created_at)
        .execute(self.db.pool())
        .await?;

        Ok(())
    }

    async fn mark_reminder_sent(
        &self,
        appointment_id: Uuid,
        channel: ReminderChannel,
    ) -> Result<bool> {
        let query = match channel {
            ReminderChannel::Email => {
                "UPDATE appointments \
                 SET email_reminder_sent = true \
                 WHERE id = $1 AND email_reminder_sent = false"
            }
            ReminderChannel::Push => {
                "UPDATE appointments \
                 SET push_reminder_sent = true \
                 WHERE id = $1 AND push_reminder_sent = false"
            }
        };

        let result = sqlx::query(query)
            .bind(appointment_id)
            .execute(self.db.pool())
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn reschedule(
        &self,
        appointment_id: Uuid,
        date: &str,
        time: &str,
        notes: Option<&str>,
    ) -> Result<Option<Appointment>> {
        let row = sqlx::query(&format!(
            "UPDATE appointments \
             SET scheduled_date = $2, \
                 scheduled_time = $3, \
                 notes = COALESCE($4, notes), \
                 email_reminder_sent = false, \
                 push_reminder_sent = false \
             WHERE id = $1 \
             RETURNING {}",
            APPOINTMENT_COLUMNS
        ))
        .bind(appointment_id)
        .bind(date)
        .bind(time)
        .bind(notes)
        .fetch_optional(self.db.pool())
        .await?;

        Ok(row.as_ref().map(appointment_from_row))
    }

    async fn delete(&self, appointment_id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM appointments WHERE id = $1")
            .bind(appointment_id)
            .execute(self.db.pool())
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[derive(Clone)]
pub struct PgDeviceTokenRepo {
    db: Db,
}

impl PgDeviceTokenRepo {
    pub fn new(db: Db) -> Self {
        Self { db }
    }
}

#[async_trait::async_trait]
impl DeviceTokenRepo for PgDeviceTokenRepo {
    async fn list(&self, user_id: Uuid) -> Result<BTreeSet<String>> {
        let tokens: Vec<String> =
            sqlx::query_scalar("SELECT token FROM device_tokens WHERE user_id = $1")
                .bind(user_id)
                .fetch_all(self.db.pool())
                .await?;

        Ok(tokens.into_iter().collect())
    }

    async fn insert(&self, user_id: Uuid, token: &str) -> Result<bool> {
        let result = sqlx::query(
            "INSERT INTO device_tokens (user_id, token) \
             VALUES ($1, $2) \
             ON CONFLICT (user_id, token) DO NOTHING",
        )
        .bind(user_id)
        .bind(token)
        .execute(self.db.pool())
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn replace(&self, user_id: Uuid, tokens: &BTreeSet<String>) -> Result<()> {
        let mut tx = self.db.pool().begin().await?;

        sqlx::query("DELETE FROM device_tokens WHERE user_id = $1")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        let tokens: Vec<String> = tokens.iter().cloned().collect();
        sqlx::query(
            "INSERT INTO device_tokens (user_id, token) \
             SELECT $1, token FROM UNNEST($2::text[]) AS token",
        )
        .bind(user_id)
        .bind(&tokens)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn delete(&self, user_id: Uuid, tokens: &[String]) -> Result<u64> {
        let result = sqlx::query(
            "DELETE FROM device_tokens WHERE user_id = $1 AND token = ANY($2)",
        )
        .bind(user_id)
        .bind(tokens)
        .execute(self.db.pool())
        .await?;

        Ok(result.rows_affected())
    }

    async fn clear(&self, user_id: Uuid) -> Result<u64> {
        let result = sqlx::query("DELETE FROM device_tokens WHERE user_id = $1")
            .bind(user_id)
            .execute(self.db.pool())
            .await?;

        Ok(result.rows_affected())
    }
}
