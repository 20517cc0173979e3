pub mod app;
pub mod config;
pub mod domain;
pub mod http;
pub mod infra;
pub mod jobs;

use std::sync::Arc;

use crate::app::appointments::AppointmentService;
use crate::app::dispatch::Dispatcher;
use crate::app::notifications::NotificationService;
use crate::app::reminders::ReminderSettings;
use crate::app::tokens::TokenRegistry;
use crate::infra::push::PushGateway;
use crate::infra::queue::MailQueue;
use crate::infra::repos::{AppointmentRepo, DeviceTokenRepo, UserRepo};

#[derive(Clone)]
pub struct AppState {
    pub users: Arc<dyn UserRepo>,
    pub appointments: Arc<dyn AppointmentRepo>,
    pub device_tokens: Arc<dyn DeviceTokenRepo>,
    pub mail: Arc<dyn MailQueue>,
    pub push: Arc<dyn PushGateway>,
    pub reminders: ReminderSettings,
    pub admin_token: Option<String>,
    pub paseto_access_key: [u8; 32],
}

impl AppState {
    pub fn token_registry(&self) -> TokenRegistry {
        TokenRegistry::new(self.device_tokens.clone())
    }

    pub fn dispatcher(&self) -> Dispatcher {
        Dispatcher::new(self.push.clone(), self.reminders.push_concurrency)
    }

    pub fn notification_service(&self) -> NotificationService {
        NotificationService::new(self.users.clone(), self.token_registry(), self.dispatcher())
    }

    pub fn appointment_service(&self) -> AppointmentService {
        AppointmentService::new(self.appointments.clone(), self.reminders.timezone)
    }
}
