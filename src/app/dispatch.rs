use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::domain::notification::NotificationPayload;
use crate::infra::push::{is_permanent_token_error, PushGateway};

/// Error code recorded when the gateway itself could not be reached.
pub const GATEWAY_UNREACHABLE: &str = "gateway-unreachable";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TokenOutcome {
    pub token: String,
    pub ok: bool,
    pub error_code: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DispatchReport {
    pub attempted: usize,
    pub succeeded: usize,
    pub per_token: Vec<TokenOutcome>,
}

impl DispatchReport {
    /// The recipient counts as reached when any device accepted the message.
    pub fn is_success(&self) -> bool {
        self.succeeded > 0
    }

    pub fn failed(&self) -> usize {
        self.attempted - self.succeeded
    }

    /// Tokens the gateway reported as permanently invalid.
    pub fn invalid_tokens(&self) -> Vec<String> {
        self.per_token
            .iter()
            .filter(|outcome| {
                !outcome.ok
                    && outcome
                        .error_code
                        .as_deref()
                        .map(is_permanent_token_error)
                        .unwrap_or(false)
            })
            .map(|outcome| outcome.token.clone())
            .collect()
    }
}

/// Sends one payload to every device of a recipient.
#[derive(Clone)]
pub struct Dispatcher {
    gateway: Arc<dyn PushGateway>,
    concurrency: usize,
}

impl Dispatcher {
    pub fn new(gateway: Arc<dyn PushGateway>, concurrency: usize) -> Self {
        Self {
            gateway,
            concurrency: concurrency.max(1),
        }
    }

    /// Fans out to all tokens with bounded parallelism. A failing token never
    /// stops delivery to the others, and nothing is retried here.
    pub async fn send(
        &self,
        tokens: &BTreeSet<String>,
        payload: &NotificationPayload,
    ) -> DispatchReport {
        let gateway = &self.gateway;
        let per_token: Vec<TokenOutcome> = stream::iter(tokens.iter().cloned())
            .map(move |token| async move {
                match gateway.send_to_token(&token, payload).await {
                    Ok(result) => {
                        if !result.ok {
                            debug!(
                                token = %token_prefix(&token),
                                error_code = ?result.error_code,
                                "push rejected for token"
                            );
                        }
                        TokenOutcome {
                            token,
                            ok: result.ok,
                            error_code: result.error_code,
                        }
                    }
                    Err(err) => {
                        warn!(error = ?err, token = %token_prefix(&token), "push gateway request failed");
                        TokenOutcome {
                            token,
                            ok: false,
                            error_code: Some(GATEWAY_UNREACHABLE.to_string()),
                        }
                    }
                }
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let succeeded = per_token.iter().filter(|outcome| outcome.ok).count();
        DispatchReport {
            attempted: per_token.len(),
            succeeded,
            per_token,
        }
    }
}

/// Tokens are credentials; logs only carry their first characters.
fn token_prefix(token: &str) -> &str {
    match token.char_indices().nth(12) {
        Some((index, _)) => &token[..index],
        None => token,
    }
}
