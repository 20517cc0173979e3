use anyhow::Result;
use std::collections::{BTreeSet, HashMap};
use std::sync::Mutex;
use uuid::Uuid;

use super::{AppointmentRepo, DeviceTokenRepo, UserRepo};
use crate::domain::appointment::{Appointment, ReminderChannel};
use crate::domain::user::User;

/// Store backed by process memory, for local runs and tests.
#[derive(Default)]
pub struct InMemoryStore {
    users: Mutex<Vec<User>>,
    appointments: Mutex<Vec<Appointment>>,
    device_tokens: Mutex<HashMap<Uuid, BTreeSet<String>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_user(&self, user: User) {
        let mut users = self.users.lock().unwrap();
        users.retain(|existing| existing.id != user.id);
        users.push(user);
    }
}

#[async_trait::async_trait]
impl UserRepo for InMemoryStore {
    async fn list_users(&self) -> Result<Vec<User>> {
        Ok(self.users.lock().unwrap().clone())
    }

    async fn get_user(&self, user_id: Uuid) -> Result<Option<User>> {
        let users = self.users.lock().unwrap();
        Ok(users.iter().find(|user| user.id == user_id).cloned())
    }

    async fn list_admins(&self) -> Result<Vec<User>> {
        let users = self.users.lock().unwrap();
        Ok(users.iter().filter(|user| user.is_admin()).cloned().collect())
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

#[async_trait::async_trait]
impl AppointmentRepo for InMemoryStore {
    async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<Appointment>> {
        let appointments = self.appointments.lock().unwrap();
        Ok(appointments
            .iter()
            .filter(|appointment| appointment.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn get(&self, appointment_id: Uuid) -> Result<Option<Appointment>> {
        let appointments = self.appointments.lock().unwrap();
        Ok(appointments
            .iter()
            .find(|appointment| appointment.id == appointment_id)
            .cloned())
    }

    async fn insert(&self, appointment: &Appointment) -> Result<()> {
        self.appointments.lock().unwrap().push(appointment.clone());
        Ok(())
    }

    async fn mark_reminder_sent(
        &self,
        appointment_id: Uuid,
        channel: ReminderChannel,
    ) -> Result<bool> {
        let mut appointments = self.appointments.lock().unwrap();
        let Some(appointment) = appointments
            .iter_mut()
            .find(|appointment| appointment.id == appointment_id)
        else {
            return Ok(false);
        };

        let flag = match channel {
            ReminderChannel::Email => &mut appointment.email_reminder_sent,
            ReminderChannel::Push => &mut appointment.push_reminder_sent,
        };
        if *flag {
            return Ok(false);
        }
        *flag = true;
        Ok(true)
    }

    async fn reschedule(
        &self,
        appointment_id: Uuid,
        date: &str,
        time: &str,
        notes: Option<&str>,
    ) -> Result<Option<Appointment>> {
        let mut appointments = self.appointments.lock().unwrap();
        let Some(appointment) = appointments
            .iter_mut()
            .find(|appointment| appointment.id == appointment_id)
        else {
            return Ok(None);
        };

        appointment.date = date.to_string();
        appointment.time = time.to_string();
        if let Some(notes) = notes {
            appointment.notes = Some(notes.to_string());
        }
        appointment.email_reminder_sent = false;
        appointment.push_reminder_sent = false;
        Ok(Some(appointment.clone()))
    }

    async fn delete(&self, appointment_id: Uuid) -> Result<bool> {
        let mut appointments = self.appointments.lock().unwrap();
        let before = appointments.len();
        appointments.retain(|appointment| appointment.id != appointment_id);
        Ok(appointments.len() < before)
    }
}

#[async_trait::async_trait]
impl DeviceTokenRepo for InMemoryStore {
    async fn list(&self, user_id: Uuid) -> Result<BTreeSet<String>> {
        let tokens = self.device_tokens.lock().unwrap();
        Ok(tokens.get(&user_id).cloned().unwrap_or_default())
    }

    async fn insert(&self, user_id: Uuid, token: &str) -> Result<bool> {
        let mut tokens = self.device_tokens.lock().unwrap();
        Ok(tokens.entry(user_id).or_default().insert(token.to_string()))
    }

    async fn replace(&self, user_id: Uuid, tokens: &BTreeSet<String>) -> Result<()> {
        self.device_tokens
            .lock()
            .unwrap()
            .insert(user_id, tokens.clone());
        Ok(())
    }

    async fn delete(&self, user_id: Uuid, tokens: &[String]) -> Result<u64> {
        let mut all_tokens = self.device_tokens.lock().unwrap();
        let Some(user_tokens) = all_tokens.get_mut(&user_id) else {
            return Ok(0);
        };
        let removed = tokens
            .iter()
            .filter(|token| user_tokens.remove(token.as_str()))
            .count();
        Ok(removed as u64)
    }

    async fn clear(&self, user_id: Uuid) -> Result<u64> {
        let removed = self.device_tokens.lock().unwrap().remove(&user_id);
        Ok(removed.map(|tokens| tokens.len() as u64).unwrap_or(0))
    }
}
