mod common;

use axum::http::StatusCode;
use chrono::Utc;
use common::{TestApp, TEST_ADMIN_TOKEN};
use nutria::domain::user::{Role, User};
use serde_json::json;
use uuid::Uuid;

fn welcome_path(user_id: Uuid) -> String {
    format!("/admin/users/{}/welcome-email", user_id)
}

#[tokio::test]
async fn welcome_email_is_queued_for_patient() {
    let app = TestApp::new();
    let user = app.create_patient("welcome");

    let resp = app
        .post_admin(&welcome_path(user.id), json!({}), Some(TEST_ADMIN_TOKEN))
        .await;

    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.json()["queued"], true);
    let messages = app.mail.messages();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].to, user.email);
    assert!(messages[0].subject.starts_with("Bienvenido a"));
}

#[tokio::test]
async fn welcome_email_skips_blank_address() {
    let app = TestApp::new();
    let user = User {
        id: Uuid::new_v4(),
        email: "".to_string(),
        display_name: "Sin correo".to_string(),
        role: Role::Patient,
        created_at: Utc::now(),
    };
    app.store.insert_user(user.clone());

    let resp = app
        .post_admin(&welcome_path(user.id), json!({}), Some(TEST_ADMIN_TOKEN))
        .await;

    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.json()["queued"], false);
    assert!(app.mail.messages().is_empty());
}

#[tokio::test]
async fn welcome_email_skips_admin_accounts() {
    let app = TestApp::new();
    let admin = app.create_user("welcome_admin", Role::Admin);

    let resp = app
        .post_admin(&welcome_path(admin.id), json!({}), Some(TEST_ADMIN_TOKEN))
        .await;

    assert_eq!(resp.json()["queued"], false);
    assert!(app.mail.messages().is_empty());
}

#[tokio::test]
async fn welcome_email_reports_queue_failure() {
    let app = TestApp::new();
    let user = app.create_patient("welcome_down");
    app.mail.set_unavailable(true);

    let resp = app
        .post_admin(&welcome_path(user.id), json!({}), Some(TEST_ADMIN_TOKEN))
        .await;

    assert_eq!(resp.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(resp.error_message(), "failed to queue welcome email");
}

#[tokio::test]
async fn welcome_email_requires_admin_token_and_known_user() {
    let app = TestApp::new();
    let user = app.create_patient("welcome_guard");

    let resp = app.post_admin(&welcome_path(user.id), json!({}), None).await;
    assert_eq!(resp.status, StatusCode::FORBIDDEN);

    let resp = app
        .post_admin(&welcome_path(Uuid::new_v4()), json!({}), Some(TEST_ADMIN_TOKEN))
        .await;
    assert_eq!(resp.status, StatusCode::NOT_FOUND);
    assert!(app.mail.messages().is_empty());
}
