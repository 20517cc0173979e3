use anyhow::{anyhow, Result};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use url::Url;

use crate::config::AppConfig;
use crate::domain::notification::NotificationPayload;

/// Gateway error codes meaning the token will never work again.
/// `invalid-argument` is left out: it is also returned for payload errors,
/// which say nothing about the token.
const PERMANENT_TOKEN_ERRORS: &[&str] = &[
    "registration-token-not-registered",
    "invalid-registration-token",
];

pub fn is_permanent_token_error(code: &str) -> bool {
    let code = code.strip_prefix("messaging/").unwrap_or(code);
    PERMANENT_TOKEN_ERRORS.contains(&code)
}

/// Outcome of delivering one payload to one device token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushResult {
    pub ok: bool,
    pub error_code: Option<String>,
}

impl PushResult {
    pub fn delivered() -> Self {
        Self {
            ok: true,
            error_code: None,
        }
    }

    pub fn failed(code: impl Into<String>) -> Self {
        Self {
            ok: false,
            error_code: Some(code.into()),
        }
    }
}

#[async_trait::async_trait]
pub trait PushGateway: Send + Sync {
    /// `Err` means the gateway could not be reached at all; a rejected token
    /// is an `Ok` result with `ok == false`.
    async fn send_to_token(&self, token: &str, payload: &NotificationPayload)
        -> Result<PushResult>;
}

#[derive(Serialize)]
struct GatewayRequest<'a> {
    token: &'a str,
    notification: GatewayNotification<'a>,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<&'a serde_json::Value>,
    webpush: WebPush,
}

#[derive(Serialize)]
struct GatewayNotification<'a> {
    title: &'a str,
    body: &'a str,
}

#[derive(Serialize)]
struct WebPush {
    notification: WebPushNotification,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WebPushNotification {
    icon: &'static str,
    badge: &'static str,
    require_interaction: bool,
}

#[derive(Deserialize)]
struct GatewayResponse {
    #[serde(default)]
    ok: Option<bool>,
    #[serde(default, alias = "code")]
    error_code: Option<String>,
    #[serde(default)]
    error: Option<GatewayError>,
}

#[derive(Deserialize)]
struct GatewayError {
    code: String,
}

/// Maps a gateway HTTP response onto a per-token result.
fn result_from_response(status: StatusCode, body: &str) -> PushResult {
    let parsed = serde_json::from_str::<GatewayResponse>(body).ok();
    let error_code = parsed.as_ref().and_then(|response| {
        response
            .error_code
            .clone()
            .or_else(|| response.error.as_ref().map(|error| error.code.clone()))
    });

    if status.is_success() {
        let ok = parsed
            .as_ref()
            .and_then(|response| response.ok)
            .unwrap_or(error_code.is_none());
        if ok {
            return PushResult::delivered();
        }
        return PushResult::failed(error_code.unwrap_or_else(|| "unknown".to_string()));
    }

    PushResult::failed(error_code.unwrap_or_else(|| format!("http-{}", status.as_u16())))
}

#[derive(Clone)]
pub struct HttpPushGateway {
    client: reqwest::Client,
    send_url: Url,
    api_key: Option<String>,
}

impl HttpPushGateway {
    pub fn new(config: &AppConfig) -> Result<Self> {
        Self::from_parts(
            &config.push_gateway_url,
            config.push_gateway_key.clone(),
            Duration::from_secs(config.push_timeout_seconds),
        )
    }

    pub fn from_parts(base_url: &Url, api_key: Option<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        let send_url = base_url
            .join("send")
            .map_err(|err| anyhow!("invalid PUSH_GATEWAY_URL: {}", err))?;

        Ok(Self {
            client,
            send_url,
            api_key,
        })
    }
}

#[async_trait::async_trait]
impl PushGateway for HttpPushGateway {
    async fn send_to_token(
        &self,
        token: &str,
        payload: &NotificationPayload,
    ) -> Result<PushResult> {
        let request = GatewayRequest {
            token,
            notification: GatewayNotification {
                title: &payload.title,
                body: &payload.body,
            },
            data: payload.data.as_ref(),
            webpush: WebPush {
                notification: WebPushNotification {
                    icon: "/logo192.png",
                    badge: "/logo192.png",
                    require_interaction: true,
                },
            },
        };

        let mut builder = self.client.post(self.send_url.clone()).json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await?;
        let status = response.status();
        // a truncated body on a 2xx is not proof of delivery
        let body = response.text().await?;
        Ok(result_from_response(status, &body))
    }
}

/// Scripted gateway: every token succeeds unless told otherwise.
#[derive(Default)]
pub struct InMemoryPushGateway {
    sent: Mutex<Vec<(String, NotificationPayload)>>,
    rejected: Mutex<HashMap<String, String>>,
    unreachable: Mutex<bool>,
}

impl InMemoryPushGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every send to `token` fail with `error_code`.
    pub fn reject_token(&self, token: &str, error_code: &str) {
        self.rejected
            .lock()
            .unwrap()
            .insert(token.to_string(), error_code.to_string());
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        *self.unreachable.lock().unwrap() = unreachable;
    }

    /// Successful deliveries, in completion order.
    pub fn delivered(&self) -> Vec<(String, NotificationPayload)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl PushGateway for InMemoryPushGateway {
    async fn send_to_token(
        &self,
        token: &str,
        payload: &NotificationPayload,
    ) -> Result<PushResult> {
        if *self.unreachable.lock().unwrap() {
            return Err(anyhow!("push gateway unreachable"));
        }
        if let Some(code) = self.rejected.lock().unwrap().get(token) {
            return Ok(PushResult::failed(code.clone()));
        }
        self.sent
            .lock()
            .unwrap()
            .push((token.to_string(), payload.clone()));
        Ok(PushResult::delivered())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permanent_codes_accept_messaging_prefix() {
        assert!(is_permanent_token_error("registration-token-not-registered"));
        assert!(is_permanent_token_error("messaging/invalid-registration-token"));
        assert!(!is_permanent_token_error("messaging/internal-error"));
        assert!(!is_permanent_token_error("unavailable"));
    }

    #[test]
    fn success_status_without_body_is_delivered() {
        assert_eq!(result_from_response(StatusCode::OK, ""), PushResult::delivered());
    }

    #[test]
    fn success_status_with_rejection_body_is_failure() {
        let result = result_from_response(
            StatusCode::OK,
            r#"{"ok": false, "error_code": "messaging/registration-token-not-registered"}"#,
        );
        assert!(!result.ok);
        assert_eq!(
            result.error_code.as_deref(),
            Some("messaging/registration-token-not-registered")
        );
    }

    #[test]
    fn error_status_reads_nested_code() {
        let result = result_from_response(
            StatusCode::BAD_REQUEST,
            r#"{"error": {"code": "invalid-argument"}}"#,
        );
        assert_eq!(result, PushResult::failed("invalid-argument"));
    }

    #[test]
    fn payload_errors_do_not_condemn_the_token() {
        assert!(!is_permanent_token_error("invalid-argument"));
        assert!(!is_permanent_token_error("messaging/invalid-argument"));
    }

    /// Serves one canned response after reading the full request.
    async fn serve_once(response: &'static [u8]) -> Url {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            loop {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    return;
                }
                request.extend_from_slice(&buf[..n]);
                let text = String::from_utf8_lossy(&request).to_lowercase();
                if let Some(end) = text.find("\r\n\r\n") {
                    let length = text
                        .lines()
                        .find_map(|line| line.strip_prefix("content-length:"))
                        .and_then(|value| value.trim().parse::<usize>().ok())
                        .unwrap_or(0);
                    if request.len() >= end + 4 + length {
                        break;
                    }
                }
            }
            socket.write_all(response).await.unwrap();
            socket.shutdown().await.ok();
        });
        Url::parse(&format!("http://{}/", addr)).unwrap()
    }

    fn gateway(base_url: &Url) -> HttpPushGateway {
        HttpPushGateway::from_parts(base_url, Some("key".to_string()), Duration::from_secs(5))
            .unwrap()
    }

    #[tokio::test]
    async fn complete_success_response_is_delivered() {
        let url = serve_once(b"HTTP/1.1 200 OK\r\nContent-Length: 11\r\nConnection: close\r\n\r\n{\"ok\":true}").await;
        let result = gateway(&url)
            .send_to_token("device", &NotificationPayload::new("t", "b"))
            .await
            .unwrap();
        assert_eq!(result, PushResult::delivered());
    }

    #[tokio::test]
    async fn truncated_success_body_is_an_error() {
        let url = serve_once(b"HTTP/1.1 200 OK\r\nContent-Length: 64\r\nConnection: close\r\n\r\n{\"ok\"").await;
        let result = gateway(&url)
            .send_to_token("device", &NotificationPayload::new("t", "b"))
            .await;
        assert!(result.is_err());
    }

    #[test]
    fn error_status_without_body_uses_http_code() {
        let result = result_from_response(StatusCode::SERVICE_UNAVAILABLE, "not json");
        assert_eq!(result, PushResult::failed("http-503"));
    }
}
