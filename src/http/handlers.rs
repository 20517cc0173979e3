use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::app::appointments::RescheduleError;
use crate::app::dispatch::DispatchReport;
use crate::app::email::compose_welcome;
use crate::app::tokens::TokenRegistration;
use crate::domain::appointment::Appointment;
use crate::domain::notification::NotificationPayload;
use crate::domain::user::User;
use crate::http::{AdminToken, AppError, AuthUser};
use crate::infra::queue::MailQueue;
use crate::jobs::reminder_sweep::{ReminderSweep, SweepReport};
use crate::AppState;

const MAX_TOKEN_LEN: usize = 4096;
const MAX_TITLE_LEN: usize = 200;
const MAX_BODY_LEN: usize = 2000;

#[derive(Serialize)]
pub(crate) struct HealthResponse {
    status: &'static str,
}

#[derive(Serialize)]
pub struct ListResponse<T> {
    pub items: Vec<T>,
}

pub(crate) async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let status = if state.users.ping().await.is_ok() {
        "ok"
    } else {
        "degraded"
    };

    Json(HealthResponse { status })
}

async fn load_user(state: &AppState, user_id: Uuid) -> Result<User, AppError> {
    state
        .users
        .get_user(user_id)
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, user_id = %user_id, "failed to load user");
            AppError::internal("failed to load user")
        })?
        .ok_or_else(|| AppError::not_found("user not found"))
}

async fn ensure_user_exists(state: &AppState, user_id: Uuid) -> Result<(), AppError> {
    load_user(state, user_id).await.map(|_| ())
}

#[derive(Deserialize)]
pub struct RegisterTokenRequest {
    pub token: String,
}

pub async fn register_device_token(
    auth: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<RegisterTokenRequest>,
) -> Result<Json<TokenRegistration>, AppError> {
    let token = payload.token.trim();
    if token.is_empty() {
        return Err(AppError::bad_request("token is required"));
    }
    if token.len() > MAX_TOKEN_LEN {
        return Err(AppError::bad_request("token is too long"));
    }

    ensure_user_exists(&state, auth.user_id).await?;

    let registration = state
        .token_registry()
        .add_token(auth.user_id, token)
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, user_id = %auth.user_id, "failed to register device token");
            AppError::internal("failed to register device token")
        })?;

    Ok(Json(registration))
}

#[derive(Deserialize)]
pub struct PushRequest {
    pub title: String,
    pub body: String,
    pub data: Option<Value>,
}

impl PushRequest {
    fn into_payload(self) -> Result<NotificationPayload, AppError> {
        let title = self.title.trim();
        let body = self.body.trim();
        if title.is_empty() || body.is_empty() {
            return Err(AppError::bad_request("title and body are required"));
        }
        if title.len() > MAX_TITLE_LEN || body.len() > MAX_BODY_LEN {
            return Err(AppError::bad_request("title or body is too long"));
        }

        let mut payload = NotificationPayload::new(title, body);
        if let Some(data) = self.data {
            payload = payload.with_data(data);
        }
        Ok(payload)
    }
}

#[derive(Serialize)]
pub struct PushResponse {
    pub success: bool,
    pub total_devices: usize,
    pub success_devices: usize,
}

impl From<&DispatchReport> for PushResponse {
    fn from(report: &DispatchReport) -> Self {
        Self {
            success: report.is_success(),
            total_devices: report.attempted,
            success_devices: report.succeeded,
        }
    }
}

pub async fn push_to_admins(
    auth: AuthUser,
    State(state): State<AppState>,
    Json(request): Json<PushRequest>,
) -> Result<Json<PushResponse>, AppError> {
    let payload = request.into_payload()?;

    let report = state
        .notification_service()
        .push_to_admins(&payload)
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, sender = %auth.user_id, "failed to push to admins");
            AppError::internal("failed to send push")
        })?;

    let response = match report {
        Some(report) => PushResponse::from(&report),
        None => PushResponse {
            success: false,
            total_devices: 0,
            success_devices: 0,
        },
    };
    Ok(Json(response))
}

pub async fn push_to_user(
    _admin: AdminToken,
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Json(request): Json<PushRequest>,
) -> Result<Json<PushResponse>, AppError> {
    let payload = request.into_payload()?;
    ensure_user_exists(&state, user_id).await?;

    let report = state
        .notification_service()
        .push_to_user(user_id, &payload)
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, user_id = %user_id, "failed to push to user");
            AppError::internal("failed to send push")
        })?
        .ok_or_else(|| AppError::not_found("user has no registered devices"))?;

    Ok(Json(PushResponse::from(&report)))
}

#[derive(Serialize)]
pub struct TokensResponse {
    pub tokens: Vec<String>,
}

pub async fn list_user_tokens(
    _admin: AdminToken,
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<TokensResponse>, AppError> {
    ensure_user_exists(&state, user_id).await?;

    let tokens = state
        .token_registry()
        .list_tokens(user_id)
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, user_id = %user_id, "failed to list device tokens");
            AppError::internal("failed to list device tokens")
        })?;

    Ok(Json(TokensResponse {
        tokens: tokens.into_iter().collect(),
    }))
}

#[derive(Serialize)]
pub struct ClearTokensResponse {
    pub removed: u64,
}

pub async fn clear_user_tokens(
    _admin: AdminToken,
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<ClearTokensResponse>, AppError> {
    ensure_user_exists(&state, user_id).await?;

    let removed = state
        .token_registry()
        .clear_tokens(user_id)
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, user_id = %user_id, "failed to clear device tokens");
            AppError::internal("failed to clear device tokens")
        })?;

    Ok(Json(ClearTokensResponse { removed }))
}

pub async fn list_user_appointments(
    _admin: AdminToken,
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<ListResponse<Appointment>>, AppError> {
    ensure_user_exists(&state, user_id).await?;

    let items = state
        .appointment_service()
        .list_for_user(user_id)
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, user_id = %user_id, "failed to list appointments");
            AppError::internal("failed to list appointments")
        })?;

    Ok(Json(ListResponse { items }))
}

#[derive(Deserialize)]
pub struct RescheduleRequest {
    pub date: String,
    pub time: String,
    pub notes: Option<String>,
}

pub async fn reschedule_appointment(
    _admin: AdminToken,
    State(state): State<AppState>,
    Path(appointment_id): Path<Uuid>,
    Json(payload): Json<RescheduleRequest>,
) -> Result<Json<Appointment>, AppError> {
    let appointment = state
        .appointment_service()
        .reschedule(
            appointment_id,
            &payload.date,
            &payload.time,
            payload.notes.as_deref(),
        )
        .await
        .map_err(|err| match err {
            RescheduleError::Invalid(err) => AppError::bad_request(err.to_string()),
            RescheduleError::Store(err) => {
                tracing::error!(
                    error = ?err,
                    appointment_id = %appointment_id,
                    "failed to reschedule appointment"
                );
                AppError::internal("failed to reschedule appointment")
            }
        })?
        .ok_or_else(|| AppError::not_found("appointment not found"))?;

    Ok(Json(appointment))
}

pub async fn cancel_appointment(
    _admin: AdminToken,
    State(state): State<AppState>,
    Path(appointment_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    let deleted = state
        .appointment_service()
        .cancel(appointment_id)
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, appointment_id = %appointment_id, "failed to cancel appointment");
            AppError::internal("failed to cancel appointment")
        })?;

    if !deleted {
        return Err(AppError::not_found("appointment not found"));
    }
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Serialize)]
pub struct WelcomeEmailResponse {
    pub queued: bool,
}

pub async fn send_welcome_email(
    _admin: AdminToken,
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<WelcomeEmailResponse>, AppError> {
    let user = load_user(&state, user_id).await?;

    let Some(message) = compose_welcome(&user, &state.reminders) else {
        tracing::info!(user_id = %user_id, "skipping welcome email, admin account or no email");
        return Ok(Json(WelcomeEmailResponse { queued: false }));
    };

    state.mail.enqueue(&message).await.map_err(|err| {
        tracing::error!(error = ?err, user_id = %user_id, "failed to queue welcome email");
        AppError::internal("failed to queue welcome email")
    })?;

    tracing::info!(user_id = %user_id, "welcome email queued");
    Ok(Json(WelcomeEmailResponse { queued: true }))
}

pub async fn run_reminder_sweep(
    _admin: AdminToken,
    State(state): State<AppState>,
) -> Result<Json<SweepReport>, AppError> {
    let report = ReminderSweep::new(&state)
        .run_once(Utc::now())
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, "manual reminder sweep failed");
            AppError::internal("reminder sweep failed")
        })?;

    Ok(Json(report))
}
