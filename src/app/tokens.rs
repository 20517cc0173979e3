use anyhow::{anyhow, Result};
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::infra::repos::DeviceTokenRepo;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TokenRegistration {
    pub added: bool,
    pub total_tokens: usize,
}

/// Each user's set of device tokens for push delivery.
#[derive(Clone)]
pub struct TokenRegistry {
    repo: Arc<dyn DeviceTokenRepo>,
}

impl TokenRegistry {
    pub fn new(repo: Arc<dyn DeviceTokenRepo>) -> Self {
        Self { repo }
    }

    pub async fn list_tokens(&self, user_id: Uuid) -> Result<BTreeSet<String>> {
        self.repo.list(user_id).await
    }

    /// Registers a device token. Registering a known token is a no-op.
    pub async fn add_token(&self, user_id: Uuid, token: &str) -> Result<TokenRegistration> {
        let token = token.trim();
        if token.is_empty() {
            return Err(anyhow!("device token must not be empty"));
        }

        let added = self.repo.insert(user_id, token).await?;
        let total_tokens = self.repo.list(user_id).await?.len();
        if added {
            info!(user_id = %user_id, total_tokens, "device token registered");
        }

        Ok(TokenRegistration {
            added,
            total_tokens,
        })
    }

    pub async fn replace_tokens<I>(&self, user_id: Uuid, tokens: I) -> Result<()>
    where
        I: IntoIterator<Item = String>,
    {
        let tokens: BTreeSet<String> = tokens
            .into_iter()
            .map(|token| token.trim().to_string())
            .filter(|token| !token.is_empty())
            .collect();
        self.repo.replace(user_id, &tokens).await
    }

    pub async fn remove_tokens(&self, user_id: Uuid, tokens: &[String]) -> Result<u64> {
        if tokens.is_empty() {
            return Ok(0);
        }
        self.repo.delete(user_id, tokens).await
    }

    pub async fn clear_tokens(&self, user_id: Uuid) -> Result<u64> {
        let removed = self.repo.clear(user_id).await?;
        info!(user_id = %user_id, removed, "device tokens cleared");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::repos::InMemoryStore;

    fn registry() -> TokenRegistry {
        TokenRegistry::new(Arc::new(InMemoryStore::new()))
    }

    #[tokio::test]
    async fn add_token_is_idempotent() {
        let registry = registry();
        let user_id = Uuid::new_v4();

        let first = registry.add_token(user_id, "token-a").await.unwrap();
        let second = registry.add_token(user_id, "token-a").await.unwrap();

        assert_eq!(first, TokenRegistration { added: true, total_tokens: 1 });
        assert_eq!(second, TokenRegistration { added: false, total_tokens: 1 });
        assert_eq!(registry.list_tokens(user_id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn surrounding_whitespace_does_not_create_duplicates() {
        let registry = registry();
        let user_id = Uuid::new_v4();
        registry.add_token(user_id, "token-a").await.unwrap();
        let again = registry.add_token(user_id, "  token-a\n").await.unwrap();
        assert!(!again.added);
    }

    #[tokio::test]
    async fn blank_token_is_rejected() {
        let registry = registry();
        assert!(registry.add_token(Uuid::new_v4(), "   ").await.is_err());
    }

    #[tokio::test]
    async fn unknown_user_has_no_tokens() {
        let registry = registry();
        assert!(registry.list_tokens(Uuid::new_v4()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn replace_dedups_and_clear_empties() {
        let registry = registry();
        let user_id = Uuid::new_v4();
        registry.add_token(user_id, "old").await.unwrap();

        registry
            .replace_tokens(
                user_id,
                vec!["a".to_string(), "b".to_string(), "a".to_string(), " ".to_string()],
            )
            .await
            .unwrap();
        let tokens = registry.list_tokens(user_id).await.unwrap();
        assert_eq!(tokens.into_iter().collect::<Vec<_>>(), vec!["a", "b"]);

        assert_eq!(registry.clear_tokens(user_id).await.unwrap(), 2);
        assert!(registry.list_tokens(user_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn remove_tokens_only_touches_named_tokens() {
        let registry = registry();
        let user_id = Uuid::new_v4();
        registry.add_token(user_id, "keep").await.unwrap();
        registry.add_token(user_id, "dead").await.unwrap();

        let removed = registry
            .remove_tokens(user_id, &["dead".to_string(), "missing".to_string()])
            .await
            .unwrap();

        assert_eq!(removed, 1);
        let tokens = registry.list_tokens(user_id).await.unwrap();
        assert!(tokens.contains("keep"));
        assert!(!tokens.contains("dead"));
    }
}
