#![allow(dead_code)]

use axum::body::{Body, Bytes};
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use chrono::{DateTime, TimeZone, Utc};
use chrono_tz::Europe::Madrid;
use http_body_util::BodyExt;
use pasetors::claims::Claims;
use pasetors::keys::SymmetricKey;
use pasetors::{local, version4::V4};
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceExt;
use uuid::Uuid;

use nutria::app::auth::TOKEN_ISSUER;
use nutria::app::reminders::ReminderSettings;
use nutria::domain::appointment::Appointment;
use nutria::domain::user::{Role, User};
use nutria::infra::push::InMemoryPushGateway;
use nutria::infra::queue::{InMemoryMailQueue, MailQueue};
use nutria::infra::repos::{AppointmentRepo, DeviceTokenRepo, InMemoryStore};
use nutria::jobs::reminder_sweep::ReminderSweep;
use nutria::AppState;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

// test-only key, "0123456789abcdef0123456789abcdef"
const TEST_PASETO_ACCESS_KEY: [u8; 32] = *b"0123456789abcdef0123456789abcdef";
pub const TEST_ADMIN_TOKEN: &str = "test-admin-token-12345";

/// Instant of a Madrid wall-clock time.
pub fn madrid(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
    Madrid
        .with_ymd_and_hms(y, m, d, h, min, 0)
        .single()
        .expect("unambiguous Madrid time")
        .with_timezone(&Utc)
}

// ---------------------------------------------------------------------------
// TestApp: in-memory store, recording mail queue, scripted push gateway
// ---------------------------------------------------------------------------

pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub store: Arc<InMemoryStore>,
    pub mail: Arc<InMemoryMailQueue>,
    pub push: Arc<InMemoryPushGateway>,
}

pub struct TestResponse {
    pub status: StatusCode,
    body_bytes: Bytes,
}

impl TestResponse {
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body_bytes).unwrap_or(Value::Null)
    }

    pub fn error_message(&self) -> String {
        self.json()["error"].as_str().unwrap_or("").to_string()
    }
}

impl TestApp {
    pub fn new() -> Self {
        let mail = Arc::new(InMemoryMailQueue::new());
        Self::with_mail_queue(mail.clone(), mail)
    }

    /// Builds the app around a custom mail queue; `mail` is still returned
    /// for inspection but may not be the queue the app uses.
    pub fn with_mail_queue(queue: Arc<dyn MailQueue>, mail: Arc<InMemoryMailQueue>) -> Self {
        let store = Arc::new(InMemoryStore::new());
        Self::build(store, queue, mail)
    }

    pub fn build(
        store: Arc<InMemoryStore>,
        queue: Arc<dyn MailQueue>,
        mail: Arc<InMemoryMailQueue>,
    ) -> Self {
        let push = Arc::new(InMemoryPushGateway::new());

        let state = AppState {
            users: store.clone(),
            appointments: store.clone(),
            device_tokens: store.clone(),
            mail: queue,
            push: push.clone(),
            reminders: ReminderSettings::default(),
            admin_token: Some(TEST_ADMIN_TOKEN.to_string()),
            paseto_access_key: TEST_PASETO_ACCESS_KEY,
        };

        let router = nutria::http::router(state.clone());

        TestApp {
            router,
            state,
            store,
            mail,
            push,
        }
    }

    pub fn sweep(&self) -> ReminderSweep {
        ReminderSweep::new(&self.state)
    }

    // ------------------------------------------------------------------
    // Low-level request helper
    // ------------------------------------------------------------------
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
        headers: &[(&str, &str)],
    ) -> TestResponse {
        let mut builder = Request::builder()
            .method(method)
            .uri(path)
            .header("host", "localhost");

        for &(key, value) in headers {
            builder = builder.header(key, value);
        }

        let request = if let Some(body) = body {
            builder
                .header("content-type", "application/json")
                .body(Body::from(serde_json::to_string(&body).unwrap()))
                .unwrap()
        } else {
            builder.body(Body::empty()).unwrap()
        };

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("oneshot failed");

        let status = response.status();
        let body_bytes = response
            .into_body()
            .collect()
            .await
            .expect("failed to collect body")
            .to_bytes();

        TestResponse { status, body_bytes }
    }

    // ------------------------------------------------------------------
    // Convenience HTTP helpers
    // ------------------------------------------------------------------
    pub async fn post_json(&self, path: &str, body: Value, token: Option<&str>) -> TestResponse {
        let mut headers = vec![];
        let auth;
        if let Some(t) = token {
            auth = format!("Bearer {}", t);
            headers.push(("Authorization", auth.as_str()));
        }
        self.request(Method::POST, path, Some(body), &headers).await
    }

    pub async fn get_admin(&self, path: &str, admin_token: Option<&str>) -> TestResponse {
        let mut headers = vec![];
        if let Some(t) = admin_token {
            headers.push(("x-admin-token", t));
        }
        self.request(Method::GET, path, None, &headers).await
    }

    pub async fn post_admin(
        &self,
        path: &str,
        body: Value,
        admin_token: Option<&str>,
    ) -> TestResponse {
        let mut headers = vec![];
        if let Some(t) = admin_token {
            headers.push(("x-admin-token", t));
        }
        self.request(Method::POST, path, Some(body), &headers).await
    }

    pub async fn patch_admin(&self, path: &str, body: Value) -> TestResponse {
        self.request(
            Method::PATCH,
            path,
            Some(body),
            &[("x-admin-token", TEST_ADMIN_TOKEN)],
        )
        .await
    }

    pub async fn delete_admin(&self, path: &str) -> TestResponse {
        self.request(
            Method::DELETE,
            path,
            None,
            &[("x-admin-token", TEST_ADMIN_TOKEN)],
        )
        .await
    }

    // ------------------------------------------------------------------
    // Test data helpers
    // ------------------------------------------------------------------

    pub fn create_user(&self, suffix: &str, role: Role) -> User {
        let user = User {
            id: Uuid::new_v4(),
            email: format!("test_{}@example.com", suffix),
            display_name: format!("Test User {}", suffix),
            role,
            created_at: Utc::now(),
        };
        self.store.insert_user(user.clone());
        user
    }

    pub fn create_patient(&self, suffix: &str) -> User {
        self.create_user(suffix, Role::Patient)
    }

    pub async fn create_appointment(&self, user_id: Uuid, date: &str, time: &str) -> Appointment {
        let appointment = Appointment::new(user_id, date, time);
        AppointmentRepo::insert(self.store.as_ref(), &appointment)
            .await
            .expect("failed to insert appointment");
        appointment
    }

    pub async fn appointment(&self, appointment_id: Uuid) -> Option<Appointment> {
        AppointmentRepo::get(self.store.as_ref(), appointment_id)
            .await
            .expect("failed to load appointment")
    }

    pub async fn register_tokens(&self, user_id: Uuid, tokens: &[&str]) {
        for token in tokens {
            DeviceTokenRepo::insert(self.store.as_ref(), user_id, token)
                .await
                .expect("failed to insert token");
        }
    }

    pub async fn tokens(&self, user_id: Uuid) -> Vec<String> {
        DeviceTokenRepo::list(self.store.as_ref(), user_id)
            .await
            .expect("failed to list tokens")
            .into_iter()
            .collect()
    }

    /// Access token as the identity service would mint it.
    pub fn access_token(&self, user_id: Uuid) -> String {
        mint_token(TEST_PASETO_ACCESS_KEY, user_id, "access")
    }
}

pub fn mint_token(key: [u8; 32], user_id: Uuid, typ: &str) -> String {
    let mut claims = Claims::new_expires_in(&std::time::Duration::from_secs(900))
        .expect("failed to build claims");
    claims.issuer(TOKEN_ISSUER).unwrap();
    claims.audience(TOKEN_ISSUER).unwrap();
    claims.subject(&user_id.to_string()).unwrap();
    claims.add_additional("typ", typ).unwrap();
    let key = SymmetricKey::<V4>::from(&key).expect("invalid key");
    local::encrypt(&key, &claims, None, None).expect("failed to encrypt token")
}
