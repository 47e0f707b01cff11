//! Game-server lifecycle collaborator
//!
//! Invoked when a lobby is created or closed to provision and release actual
//! game servers. A provisioning failure aborts lobby creation; a release
//! failure is logged and the close proceeds. The engine never retries.

use crate::error::LobbyError;
use crate::types::LobbyId;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use tracing::info;

/// Connection details for the server backing a lobby
#[derive(Debug, Clone, Default)]
pub struct ServerSettings {
    pub host: String,
    pub rcon_password: String,
    pub server_password: String,
}

/// Trait for provisioning and releasing game servers
#[async_trait]
pub trait GameServerLifecycle: Send + Sync {
    async fn provision(
        &self,
        lobby_id: LobbyId,
        settings: &ServerSettings,
    ) -> Result<(), LobbyError>;

    async fn release(&self, lobby_id: LobbyId) -> Result<(), LobbyError>;
}

/// Provisioner that only logs; useful when no server fleet is attached.
#[derive(Debug, Default)]
pub struct NoopProvisioner;

#[async_trait]
impl GameServerLifecycle for NoopProvisioner {
    async fn provision(
        &self,
        lobby_id: LobbyId,
        settings: &ServerSettings,
    ) -> Result<(), LobbyError> {
        info!(
            "Provisioning server for lobby {} at '{}'",
            lobby_id, settings.host
        );
        Ok(())
    }

    async fn release(&self, lobby_id: LobbyId) -> Result<(), LobbyError> {
        info!("Releasing server for lobby {}", lobby_id);
        Ok(())
    }
}

/// Mock provisioner for testing
#[derive(Debug, Default)]
pub struct MockProvisioner {
    provisioned: Mutex<Vec<LobbyId>>,
    released: Mutex<Vec<LobbyId>>,
    fail_provision: AtomicBool,
    fail_release: AtomicBool,
}

impl MockProvisioner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next_provision(&self) {
        self.fail_provision.store(true, Ordering::SeqCst);
    }

    pub fn fail_release(&self) {
        self.fail_release.store(true, Ordering::SeqCst);
    }

    pub fn provisioned(&self) -> Vec<LobbyId> {
        self.provisioned.lock().map(|v| v.clone()).unwrap_or_default()
    }

    pub fn released(&self) -> Vec<LobbyId> {
        self.released.lock().map(|v| v.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl GameServerLifecycle for MockProvisioner {
    async fn provision(
        &self,
        lobby_id: LobbyId,
        _settings: &ServerSettings,
    ) -> Result<(), LobbyError> {
        if self.fail_provision.swap(false, Ordering::SeqCst) {
            return Err(LobbyError::Provision {
                message: "mock provision failure".to_string(),
            });
        }
        if let Ok(mut provisioned) = self.provisioned.lock() {
            provisioned.push(lobby_id);
        }
        Ok(())
    }

    async fn release(&self, lobby_id: LobbyId) -> Result<(), LobbyError> {
        if self.fail_release.load(Ordering::SeqCst) {
            return Err(LobbyError::Provision {
                message: "mock release failure".to_string(),
            });
        }
        if let Ok(mut released) = self.released.lock() {
            released.push(lobby_id);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_records_calls() {
        let provisioner = MockProvisioner::new();
        provisioner
            .provision(1, &ServerSettings::default())
            .await
            .unwrap();
        provisioner.release(1).await.unwrap();

        assert_eq!(provisioner.provisioned(), vec![1]);
        assert_eq!(provisioner.released(), vec![1]);
    }

    #[tokio::test]
    async fn test_mock_provision_failure_is_one_shot() {
        let provisioner = MockProvisioner::new();
        provisioner.fail_next_provision();

        assert!(provisioner
            .provision(1, &ServerSettings::default())
            .await
            .is_err());
        assert!(provisioner
            .provision(2, &ServerSettings::default())
            .await
            .is_ok());
        assert_eq!(provisioner.provisioned(), vec![2]);
    }
}
