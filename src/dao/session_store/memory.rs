use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use dashmap::DashMap;
use futures::future::BoxFuture;
use thiserror::Error;
use uuid::Uuid;

use crate::dao::{
    models::{PlayerEntity, SessionEntity},
    session_store::SessionStore,
    storage::{StorageError, StorageResult},
};

/// Failure reported while the in-memory store is switched offline.
#[derive(Debug, Error)]
#[error("in-memory store is offline")]
pub struct MemoryStoreOffline;

/// Process-local [`SessionStore`], used when no database is configured and in tests.
#[derive(Clone, Default)]
pub struct MemorySessionStore {
    sessions: Arc<DashMap<Uuid, SessionEntity>>,
    players: Arc<DashMap<(Uuid, Uuid), PlayerEntity>>,
    offline: Arc<AtomicBool>,
}

impl MemorySessionStore {
    /// Empty, online store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Toggle simulated unavailability. Every call fails while offline.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn check_online(&self, operation: &str) -> StorageResult<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(StorageError::unavailable(
                format!("{operation} failed"),
                MemoryStoreOffline,
            ));
        }
        Ok(())
    }

    fn sorted_players(&self, session_id: Uuid) -> Vec<PlayerEntity> {
        let mut players: Vec<PlayerEntity> = self
            .players
            .iter()
            .filter(|entry| entry.key().0 == session_id)
            .map(|entry| entry.value().clone())
            .collect();
        players.sort_by_key(|player| player.joined_at);
        players
    }
}

impl SessionStore for MemorySessionStore {
    fn save_session(&self, session: SessionEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store.check_online("save session")?;
            store.sessions.insert(session.id, session);
            Ok(())
        })
    }

    fn find_session(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<SessionEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            store.check_online("find session")?;
            Ok(store.sessions.get(&id).map(|entry| entry.value().clone()))
        })
    }

    fn save_player(&self, player: PlayerEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store.check_online("save player")?;
            store
                .players
                .insert((player.session_id, player.id), player);
            Ok(())
        })
    }

    fn delete_player(
        &self,
        session_id: Uuid,
        player_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move {
            store.check_online("delete player")?;
            Ok(store.players.remove(&(session_id, player_id)).is_some())
        })
    }

    fn list_players(&self, session_id: Uuid) -> BoxFuture<'static, StorageResult<Vec<PlayerEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            store.check_online("list players")?;
            Ok(store.sorted_players(session_id))
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.check_online("health check") })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.check_online("reconnect") })
    }
}
