//! Authentication collaborator
//!
//! Resolves a transport-level credential to a player identity at connection
//! time. The core never inspects credentials itself; a connection that fails
//! to resolve simply stays anonymous and is limited to unauthenticated events.

use crate::error::LobbyError;
use crate::types::PlayerId;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;

/// Trait for resolving connection credentials to player identities
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Resolve a credential to a player id, or `None` for anonymous.
    async fn resolve(&self, credential: &str) -> Result<Option<PlayerId>, LobbyError>;
}

/// Token-table authenticator for tests and local development.
#[derive(Debug, Default)]
pub struct StaticAuthenticator {
    tokens: RwLock<HashMap<String, PlayerId>>,
}

impl StaticAuthenticator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_token(&self, credential: impl Into<String>, player: impl Into<PlayerId>) {
        if let Ok(mut tokens) = self.tokens.write() {
            tokens.insert(credential.into(), player.into());
        }
    }
}

#[async_trait]
impl Authenticator for StaticAuthenticator {
    async fn resolve(&self, credential: &str) -> Result<Option<PlayerId>, LobbyError> {
        let tokens = self.tokens.read().map_err(|_| LobbyError::Internal {
            message: "Failed to acquire tokens lock".to_string(),
        })?;
        Ok(tokens.get(credential).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_resolve_known_and_unknown_tokens() {
        let auth = StaticAuthenticator::new();
        auth.register_token("cookie-1", "alice");

        assert_eq!(
            auth.resolve("cookie-1").await.unwrap(),
            Some("alice".to_string())
        );
        assert_eq!(auth.resolve("cookie-2").await.unwrap(), None);
    }
}
