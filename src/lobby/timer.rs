//! Ready-up expiry scheduling
//!
//! One cancellable deferred task per lobby, keyed by lobby id — never by a
//! live reference to the lobby. Cancellation is best-effort: the expiry
//! callback must re-check lobby state itself, because an abort can race the
//! fire on any transport.

use crate::error::LobbyError;
use crate::types::LobbyId;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::debug;

struct ArmedTask {
    generation: u64,
    handle: JoinHandle<()>,
}

/// Schedules at most one pending expiry per lobby.
///
/// Re-arming a lobby aborts and replaces its previous task. Completed tasks
/// remove their own entry, guarded by a generation counter so a stale task
/// never evicts its replacement.
#[derive(Default)]
pub struct ReadyUpScheduler {
    tasks: Arc<Mutex<HashMap<LobbyId, ArmedTask>>>,
    next_generation: AtomicU64,
}

impl ReadyUpScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm (or re-arm) the expiry for a lobby. After `delay`, `on_expire` runs
    /// once unless the timer is cancelled first.
    pub fn arm<F, Fut>(
        &self,
        lobby_id: LobbyId,
        delay: Duration,
        on_expire: F,
    ) -> Result<(), LobbyError>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let generation = self.next_generation.fetch_add(1, Ordering::SeqCst);
        let tasks = Arc::clone(&self.tasks);

        let handle = tokio::spawn({
            let tasks = Arc::clone(&self.tasks);
            async move {
                tokio::time::sleep(delay).await;
                on_expire().await;

                if let Ok(mut tasks) = tasks.lock() {
                    if tasks
                        .get(&lobby_id)
                        .is_some_and(|task| task.generation == generation)
                    {
                        tasks.remove(&lobby_id);
                    }
                }
            }
        });

        let mut tasks = tasks.lock().map_err(|_| LobbyError::Internal {
            message: "Failed to acquire scheduler lock".to_string(),
        })?;
        if let Some(previous) = tasks.insert(lobby_id, ArmedTask { generation, handle }) {
            debug!("Re-arming ready-up timer for lobby {}", lobby_id);
            previous.handle.abort();
        }
        Ok(())
    }

    /// Cancel the pending expiry for a lobby, if armed. Best-effort.
    pub fn cancel(&self, lobby_id: LobbyId) -> Result<(), LobbyError> {
        let mut tasks = self.tasks.lock().map_err(|_| LobbyError::Internal {
            message: "Failed to acquire scheduler lock".to_string(),
        })?;
        if let Some(task) = tasks.remove(&lobby_id) {
            task.handle.abort();
        }
        Ok(())
    }

    /// Number of currently armed (not yet fired or cancelled) timers.
    pub fn armed_count(&self) -> usize {
        self.tasks
            .lock()
            .map(|tasks| {
                tasks
                    .values()
                    .filter(|task| !task.handle.is_finished())
                    .count()
            })
            .unwrap_or(0)
    }

    /// Abort every pending timer. Used on shutdown.
    pub fn shutdown(&self) {
        if let Ok(mut tasks) = self.tasks.lock() {
            for (_, task) in tasks.drain() {
                task.handle.abort();
            }
        }
    }
}
