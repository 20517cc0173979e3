use axum::{routing::delete, routing::get, routing::patch, routing::post, Router};

use crate::http::handlers;
use crate::AppState;

pub fn health() -> Router<AppState> {
    Router::new().route("/health", get(handlers::health))
}

pub fn devices() -> Router<AppState> {
    Router::new().route("/devices/tokens", post(handlers::register_device_token))
}

pub fn push() -> Router<AppState> {
    Router::new().route("/push/admins", post(handlers::push_to_admins))
}

pub fn admin() -> Router<AppState> {
    Router::new()
        .route("/admin/users/:id/push", post(handlers::push_to_user))
        .route("/admin/users/:id/tokens", get(handlers::list_user_tokens))
        .route("/admin/users/:id/tokens", delete(handlers::clear_user_tokens))
        .route("/admin/users/:id/appointments", get(handlers::list_user_appointments))
        .route("/admin/users/:id/welcome-email", post(handlers::send_welcome_email))
        .route("/admin/appointments/:id", patch(handlers::reschedule_appointment))
        .route("/admin/appointments/:id", delete(handlers::cancel_appointment))
        .route("/admin/reminders/sweep", post(handlers::run_reminder_sweep))
}
