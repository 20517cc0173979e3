use anyhow::Result;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::app::dispatch::{DispatchReport, Dispatcher};
use crate::app::tokens::TokenRegistry;
use crate::domain::notification::NotificationPayload;
use crate::infra::repos::UserRepo;

/// On-demand pushes outside the reminder sweep.
#[derive(Clone)]
pub struct NotificationService {
    users: Arc<dyn UserRepo>,
    tokens: TokenRegistry,
    dispatcher: Dispatcher,
}

impl NotificationService {
    pub fn new(users: Arc<dyn UserRepo>, tokens: TokenRegistry, dispatcher: Dispatcher) -> Self {
        Self {
            users,
            tokens,
            dispatcher,
        }
    }

    /// Pushes to every device of one user. `None` when the user has no
    /// registered devices.
    pub async fn push_to_user(
        &self,
        user_id: Uuid,
        payload: &NotificationPayload,
    ) -> Result<Option<DispatchReport>> {
        let tokens = self.tokens.list_tokens(user_id).await?;
        if tokens.is_empty() {
            return Ok(None);
        }

        info!(user_id = %user_id, devices = tokens.len(), "sending push to user");
        let report = self.dispatcher.send(&tokens, payload).await;
        Ok(Some(report))
    }

    /// Pushes to every device of every admin. `None` when there is no admin
    /// or no admin has a registered device.
    pub async fn push_to_admins(
        &self,
        payload: &NotificationPayload,
    ) -> Result<Option<DispatchReport>> {
        let admins = self.users.list_admins().await?;
        let mut tokens = BTreeSet::new();
        for admin in &admins {
            tokens.extend(self.tokens.list_tokens(admin.id).await?);
        }
        if tokens.is_empty() {
            info!(admins = admins.len(), "no admin devices registered");
            return Ok(None);
        }

        info!(admins = admins.len(), devices = tokens.len(), "sending push to admins");
        let report = self.dispatcher.send(&tokens, payload).await;
        Ok(Some(report))
    }
}
