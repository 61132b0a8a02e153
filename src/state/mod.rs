pub mod bus;
pub mod commands;
pub mod grid;
pub mod runtime;
pub mod session;
pub mod state_machine;
pub mod timers;

use std::{sync::Arc, time::Duration};

use dashmap::{DashMap, mapref::entry::Entry};
use tokio::sync::{RwLock, watch};
use uuid::Uuid;

use crate::{config::AppConfig, dao::session_store::SessionStore, error::ServiceError};

pub use self::runtime::{HostPresence, Mutation, PendingWrite, SessionRuntime, TransitionOutcome};
pub use self::state_machine::{AbortError, ApplyError, Plan, PlanError, PlanId, Snapshot};

pub type SharedState = Arc<AppState>;

/// Central application state: storage handle, degraded flag and the registry of live sessions.
pub struct AppState {
    session_store: RwLock<Option<Arc<dyn SessionStore>>>,
    degraded: watch::Sender<bool>,
    sessions: DashMap<Uuid, Arc<SessionRuntime>>,
    join_codes: DashMap<String, Uuid>,
    config: Arc<AppConfig>,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned cheaply.
    ///
    /// The application starts in degraded mode until a storage backend is installed.
    pub fn new(config: AppConfig) -> SharedState {
        let (degraded_tx, _rx) = watch::channel(true);
        Arc::new(Self {
            session_store: RwLock::new(None),
            degraded: degraded_tx,
            sessions: DashMap::new(),
            join_codes: DashMap::new(),
            config: Arc::new(config),
        })
    }

    /// Application configuration.
    pub fn config(&self) -> Arc<AppConfig> {
        self.config.clone()
    }

    /// Upper bound applied to the persistence step of every write.
    pub fn transition_timeout(&self) -> Option<Duration> {
        Some(self.config.transition_timeout).filter(|limit| !limit.is_zero())
    }

    /// Inactivity after which a session is treated as abandoned by its host.
    pub fn host_idle_timeout(&self) -> Option<Duration> {
        Some(self.config.host_idle_timeout).filter(|limit| !limit.is_zero())
    }

    /// Obtain a handle to the current session store, if one is installed.
    pub async fn session_store(&self) -> Option<Arc<dyn SessionStore>> {
        let guard = self.session_store.read().await;
        guard.as_ref().cloned()
    }

    /// Current session store or [`ServiceError::Degraded`].
    pub async fn require_session_store(&self) -> Result<Arc<dyn SessionStore>, ServiceError> {
        self.session_store().await.ok_or(ServiceError::Degraded)
    }

    /// Install a new session store implementation and leave degraded mode.
    pub async fn install_session_store(&self, store: Arc<dyn SessionStore>) {
        {
            let mut guard = self.session_store.write().await;
            *guard = Some(store);
        }
        self.update_degraded(false);
    }

    /// Remove the current session store and enter degraded mode.
    pub async fn clear_session_store(&self) {
        {
            let mut guard = self.session_store.write().await;
            guard.take();
        }
        self.update_degraded(true);
    }

    /// Current degraded flag.
    pub fn is_degraded(&self) -> bool {
        *self.degraded.borrow()
    }

    /// Subscribe to degraded mode updates.
    pub fn degraded_watcher(&self) -> watch::Receiver<bool> {
        self.degraded.subscribe()
    }

    /// Update and broadcast the degraded flag when the value changes.
    pub fn update_degraded(&self, value: bool) {
        self.degraded.send_if_modified(|current| {
            if *current == value {
                return false;
            }
            *current = value;
            true
        });
    }

    /// Reserve `code` for `session_id`. Fails when another live session holds it.
    pub fn reserve_join_code(&self, code: &str, session_id: Uuid) -> bool {
        match self.join_codes.entry(code.to_string()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(session_id);
                true
            }
        }
    }

    /// Release a reservation made with [`AppState::reserve_join_code`].
    pub fn release_join_code(&self, code: &str, session_id: Uuid) {
        self.join_codes.remove_if(code, |_, owner| *owner == session_id);
    }

    /// Track a launched session.
    pub fn register_session(&self, runtime: Arc<SessionRuntime>) {
        self.sessions.insert(runtime.id(), runtime);
    }

    /// Stop tracking a session and free its join code.
    pub fn retire_session(&self, session_id: Uuid) -> Option<Arc<SessionRuntime>> {
        let (_, runtime) = self.sessions.remove(&session_id)?;
        self.release_join_code(runtime.join_code(), session_id);
        Some(runtime)
    }

    /// Live session by id.
    pub fn live_session(&self, session_id: Uuid) -> Option<Arc<SessionRuntime>> {
        self.sessions
            .get(&session_id)
            .map(|entry| entry.value().clone())
    }

    /// Live session by id or [`ServiceError::NotFound`].
    pub fn session(&self, session_id: Uuid) -> Result<Arc<SessionRuntime>, ServiceError> {
        self.live_session(session_id)
            .ok_or_else(|| ServiceError::NotFound(format!("session `{session_id}` not found")))
    }

    /// Live session holding `code`.
    pub fn session_by_code(&self, code: &str) -> Result<Arc<SessionRuntime>, ServiceError> {
        self.join_codes
            .get(code)
            .map(|entry| *entry.value())
            .and_then(|session_id| self.live_session(session_id))
            .ok_or_else(|| ServiceError::NotFound(format!("no session with join code `{code}`")))
    }

    /// Every session held in memory.
    pub fn live_sessions(&self) -> Vec<Arc<SessionRuntime>> {
        self.sessions
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Number of sessions held in memory.
    pub fn live_session_count(&self) -> usize {
        self.sessions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dao::session_store::MemorySessionStore;

    #[tokio::test]
    async fn store_installation_toggles_degraded_mode() {
        let state = AppState::new(AppConfig::default());
        let mut watcher = state.degraded_watcher();
        assert!(state.is_degraded());
        assert!(matches!(
            state.require_session_store().await,
            Err(ServiceError::Degraded)
        ));

        state
            .install_session_store(Arc::new(MemorySessionStore::new()))
            .await;
        assert!(!state.is_degraded());
        assert!(watcher.has_changed().unwrap());
        assert!(!*watcher.borrow_and_update());

        state.clear_session_store().await;
        assert!(state.is_degraded());
    }

    #[test]
    fn join_codes_are_exclusive_until_released() {
        let state = AppState::new(AppConfig::default());
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();
        assert!(state.reserve_join_code("123456", first));
        assert!(!state.reserve_join_code("123456", second));

        state.release_join_code("123456", second);
        assert!(!state.reserve_join_code("123456", second));

        state.release_join_code("123456", first);
        assert!(state.reserve_join_code("123456", second));
    }
}
