//! Caller identity. The HTTP layer hands the raw bearer credential to an
//! [`IdentityResolver`], which yields a stable user id or rejects it.

use async_trait::async_trait;
use std::collections::HashMap;
use tracing::debug;

/// Extract the token from an `Authorization` header value.
///
/// Returns `None` unless the value is `Bearer <token>` with a non-empty token.
pub fn bearer_token(header_value: &str) -> Option<&str> {
    header_value
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Maps a bearer credential to a user id.
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    /// `None` means the credential is unknown or invalid.
    async fn resolve(&self, token: &str) -> Option<String>;
}

/// Resolver backed by a fixed token → user id table.
#[derive(Debug, Clone, Default)]
pub struct StaticTokenResolver {
    tokens: HashMap<String, String>,
}

impl StaticTokenResolver {
    pub fn new(tokens: HashMap<String, String>) -> Self {
        Self { tokens }
    }

    pub fn with_token(mut self, token: impl Into<String>, user_id: impl Into<String>) -> Self {
        self.tokens.insert(token.into(), user_id.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

#[async_trait]
impl IdentityResolver for StaticTokenResolver {
    async fn resolve(&self, token: &str) -> Option<String> {
        let user_id = self.tokens.get(token).cloned();
        match &user_id {
            Some(user_id) => debug!(user_id = %user_id, "Bearer token resolved"),
            None => debug!(known_tokens = self.tokens.len(), "Bearer token not recognized"),
        }
        user_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bearer_token_parsing() {
        assert_eq!(bearer_token("Bearer abc123"), Some("abc123"));
        assert_eq!(bearer_token("Bearer   "), None);
        assert_eq!(bearer_token("Basic abc123"), None);
        assert_eq!(bearer_token("abc123"), None);
    }

    #[tokio::test]
    async fn static_resolver_maps_known_tokens() {
        let resolver = StaticTokenResolver::default().with_token("t-1", "user-1");
        assert_eq!(resolver.resolve("t-1").await.as_deref(), Some("user-1"));
        assert!(resolver.resolve("t-2").await.is_none());
        assert!(!resolver.is_empty());
    }
}
