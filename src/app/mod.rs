pub mod appointments;
pub mod auth;
pub mod dispatch;
pub mod email;
pub mod notifications;
pub mod reminders;
pub mod tokens;
