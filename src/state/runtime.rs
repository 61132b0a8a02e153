use std::{
    future::Future,
    sync::{
        Arc,
        atomic::{AtomicU64, AtomicUsize, Ordering},
    },
    time::{Duration, Instant, SystemTime},
};

use dashmap::DashMap;
use tokio::{
    sync::{Mutex, RwLock, broadcast, mpsc},
    time::timeout,
};
use tracing::warn;
use uuid::Uuid;

use crate::{
    dao::{session_store::SessionStore, storage::StorageResult},
    dto::{
        notification::{DirectMessage, Notification},
        session::{SessionSnapshot, SessionView},
    },
    error::ServiceError,
    state::{
        Plan, PlanError, Snapshot,
        bus::SessionBus,
        session::Session,
        state_machine::{SessionEvent, SessionPhase, SessionStateMachine},
        timers::PhaseTimers,
    },
};

/// Handle used to push direct messages to a connected player device.
#[derive(Clone)]
pub struct PlayerConnection {
    /// Distinguishes successive connections of the same player.
    pub connection_id: Uuid,
    /// Sender drained by the connection's follower.
    pub tx: mpsc::UnboundedSender<DirectMessage>,
}

/// Record that must reach the store before a mutation is committed in memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingWrite {
    /// Nothing changed.
    Nothing,
    /// The session document.
    Session,
    /// One player record.
    Player(Uuid),
    /// Removal of one player record.
    DeletePlayer(Uuid),
}

/// Result of a non-lifecycle mutation: the value handed back to the caller, the record to
/// persist and the notifications published once it is committed.
pub struct Mutation<T> {
    /// Returned to the caller.
    pub value: T,
    /// Record to persist.
    pub write: PendingWrite,
    /// Published after commit, in order.
    pub notifications: Vec<Notification>,
}

impl<T> Mutation<T> {
    /// A mutation that persists `write` and notifies nobody yet.
    pub fn new(value: T, write: PendingWrite) -> Self {
        Self {
            value,
            write,
            notifications: Vec::new(),
        }
    }

    /// A read-only outcome; nothing is persisted or published.
    pub fn unchanged(value: T) -> Self {
        Self::new(value, PendingWrite::Nothing)
    }

    /// Append a notification published after commit.
    pub fn notify(mut self, notification: Notification) -> Self {
        self.notifications.push(notification);
        self
    }
}

/// Outcome of a lifecycle transition request.
#[derive(Debug, Clone)]
pub enum TransitionOutcome {
    /// The transition was persisted and applied.
    Applied {
        /// Phase before the transition.
        from: SessionPhase,
        /// Phase after the transition.
        to: SessionPhase,
        /// Snapshot broadcast to subscribers.
        snapshot: SessionSnapshot,
    },
    /// The session already reached the requested state; nothing changed.
    AlreadyApplied {
        /// Current phase.
        phase: SessionPhase,
        /// Current snapshot.
        snapshot: SessionSnapshot,
    },
}

impl TransitionOutcome {
    /// Whether this request changed the session.
    pub fn applied(&self) -> bool {
        matches!(self, TransitionOutcome::Applied { .. })
    }

    /// Phase after the request.
    pub fn phase(&self) -> SessionPhase {
        match self {
            TransitionOutcome::Applied { to, .. } => *to,
            TransitionOutcome::AlreadyApplied { phase, .. } => *phase,
        }
    }

    /// Snapshot after the request.
    pub fn into_snapshot(self) -> SessionSnapshot {
        match self {
            TransitionOutcome::Applied { snapshot, .. }
            | TransitionOutcome::AlreadyApplied { snapshot, .. } => snapshot,
        }
    }
}

/// Keeps the host counted as present while a host stream is attached.
pub struct HostPresence {
    runtime: Arc<SessionRuntime>,
}

impl Drop for HostPresence {
    fn drop(&mut self) {
        self.runtime.host_streams.fetch_sub(1, Ordering::Relaxed);
        self.runtime.touch_host();
    }
}

struct SessionCore {
    machine: SessionStateMachine,
    record: Session,
}

/// Live state of one session: lifecycle machine, authoritative record, bus and timers.
///
/// Every write goes through the transition gate, so a session has a single writer at a
/// time while other sessions proceed independently.
pub struct SessionRuntime {
    id: Uuid,
    join_code: String,
    host_token: String,
    core: RwLock<SessionCore>,
    gate: Mutex<()>,
    bus: SessionBus,
    connections: DashMap<Uuid, PlayerConnection>,
    timers: PhaseTimers,
    transition_timeout: Option<Duration>,
    launched_at: Instant,
    // Milliseconds after `launched_at` of the last host activity.
    host_seen_ms: AtomicU64,
    host_streams: AtomicUsize,
}

impl SessionRuntime {
    /// Wrap a freshly launched session.
    pub fn new(session: Session, bus_capacity: usize, transition_timeout: Option<Duration>) -> Self {
        Self {
            id: session.id,
            join_code: session.join_code.clone(),
            host_token: Uuid::new_v4().simple().to_string(),
            core: RwLock::new(SessionCore {
                machine: SessionStateMachine::new(session.layout()),
                record: session,
            }),
            gate: Mutex::new(()),
            bus: SessionBus::new(bus_capacity),
            connections: DashMap::new(),
            timers: PhaseTimers::new(),
            transition_timeout,
            launched_at: Instant::now(),
            host_seen_ms: AtomicU64::new(0),
            host_streams: AtomicUsize::new(0),
        }
    }

    /// Session identifier.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Join code reserved by this session.
    pub fn join_code(&self) -> &str {
        &self.join_code
    }

    /// Secret expected from host commands.
    pub fn host_token(&self) -> &str {
        &self.host_token
    }

    /// Whether `token` authorises host commands.
    pub fn verify_host_token(&self, token: &str) -> bool {
        self.host_token == token
    }

    /// Record host activity now.
    pub fn touch_host(&self) {
        let elapsed = u64::try_from(self.launched_at.elapsed().as_millis()).unwrap_or(u64::MAX);
        self.host_seen_ms.fetch_max(elapsed, Ordering::Relaxed);
    }

    /// Count the host as present until the returned guard is dropped.
    pub fn host_presence(self: &Arc<Self>) -> HostPresence {
        self.host_streams.fetch_add(1, Ordering::Relaxed);
        self.touch_host();
        HostPresence {
            runtime: self.clone(),
        }
    }

    /// Whether the host has shown no sign of life for longer than `limit` at `now`.
    pub fn host_idle(&self, now: Instant, limit: Duration) -> bool {
        if self.host_streams.load(Ordering::Relaxed) > 0 {
            return false;
        }
        let seen = self.launched_at
            + Duration::from_millis(self.host_seen_ms.load(Ordering::Relaxed));
        now.saturating_duration_since(seen) > limit
    }

    /// Timers armed for the current phase.
    pub fn timers(&self) -> &PhaseTimers {
        &self.timers
    }

    /// Subscribe to the session bus.
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.bus.subscribe()
    }

    /// Publish a notification outside of a mutation.
    pub fn publish(&self, notification: Notification) {
        self.bus.publish(notification);
    }

    /// Current lifecycle phase.
    pub async fn phase(&self) -> SessionPhase {
        self.core.read().await.machine.phase()
    }

    #[cfg(test)]
    pub(crate) async fn machine_snapshot(&self) -> Snapshot {
        self.core.read().await.machine.snapshot()
    }

    /// Read the record together with its phase.
    pub async fn read<T>(&self, f: impl FnOnce(&Session, SessionPhase) -> T) -> T {
        let core = self.core.read().await;
        f(&core.record, core.machine.phase())
    }

    /// Shared snapshot of the session.
    pub async fn snapshot(&self) -> SessionSnapshot {
        let core = self.core.read().await;
        SessionSnapshot::build(&core.record, core.machine.phase(), core.machine.version())
    }

    /// Full view used to seed a client.
    pub async fn view(&self) -> SessionView {
        let core = self.core.read().await;
        SessionView::build(&core.record, core.machine.phase(), core.machine.version())
    }

    /// Plan `event`, persist the resulting record and apply the plan.
    ///
    /// `guard` runs against the current record before planning and may veto the event. A
    /// persistence failure or timeout aborts the plan and leaves the session untouched. On
    /// success the new snapshot is published before the gate is released, so notifications
    /// leave in version order.
    pub async fn run_transition<G>(
        &self,
        store: &Arc<dyn SessionStore>,
        event: SessionEvent,
        guard: G,
    ) -> Result<TransitionOutcome, ServiceError>
    where
        G: FnOnce(&Session) -> Result<(), ServiceError>,
    {
        let gate = self.gate.lock().await;

        let (plan, mut draft) = {
            let mut core = self.core.write().await;
            match core.machine.plan(event) {
                Ok(plan) => {
                    if let Err(err) = guard(&core.record) {
                        abort_plan(&mut core.machine, &plan, "failed to abort vetoed transition");
                        return Err(err);
                    }
                    let draft = core.record.clone();
                    (plan, draft)
                }
                Err(PlanError::AlreadyApplied(phase)) => {
                    let snapshot =
                        SessionSnapshot::build(&core.record, phase, core.machine.version());
                    return Ok(TransitionOutcome::AlreadyApplied { phase, snapshot });
                }
                Err(err) => return Err(err.into()),
            }
        };

        draft.enter_phase(plan.to, SystemTime::now());
        draft.touch();
        let entity = draft.to_entity(plan.to, plan.version_next);

        match self.persist(store.save_session(entity)).await {
            Ok(()) => {
                let mut core = self.core.write().await;
                let next = core.machine.apply(plan.id)?;
                core.record = draft;
                let snapshot = SessionSnapshot::build(&core.record, next, core.machine.version());
                self.bus
                    .publish(Notification::SessionUpdated(snapshot.clone()));
                drop(core);
                drop(gate);
                Ok(TransitionOutcome::Applied {
                    from: plan.from,
                    to: next,
                    snapshot,
                })
            }
            Err(err) => {
                let mut core = self.core.write().await;
                let context = if matches!(err, ServiceError::Timeout) {
                    "failed to abort transition after timeout"
                } else {
                    "failed to abort transition after persistence error"
                };
                abort_plan(&mut core.machine, &plan, context);
                drop(core);
                drop(gate);
                Err(err)
            }
        }
    }

    /// Mutate the record outside of a lifecycle transition.
    ///
    /// The closure works on a copy; the copy replaces the record only after the write it
    /// names reached the store.
    pub async fn write<F, T>(
        &self,
        store: &Arc<dyn SessionStore>,
        mutate: F,
    ) -> Result<T, ServiceError>
    where
        F: FnOnce(&mut Session, &Snapshot) -> Result<Mutation<T>, ServiceError>,
    {
        let _gate = self.gate.lock().await;

        let (machine, mut draft) = {
            let core = self.core.read().await;
            (core.machine.snapshot(), core.record.clone())
        };

        let Mutation {
            value,
            write,
            notifications,
        } = mutate(&mut draft, &machine)?;

        match write {
            PendingWrite::Nothing => return Ok(value),
            PendingWrite::Session => {
                draft.touch();
                let entity = draft.to_entity(machine.phase, machine.version);
                self.persist(store.save_session(entity)).await?;
            }
            PendingWrite::Player(player_id) => {
                let entity = draft
                    .players
                    .get(&player_id)
                    .map(|player| player.to_entity(draft.id))
                    .ok_or_else(|| {
                        ServiceError::NotFound(format!("player `{player_id}` not found"))
                    })?;
                self.persist(store.save_player(entity)).await?;
            }
            PendingWrite::DeletePlayer(player_id) => {
                self.persist(store.delete_player(draft.id, player_id))
                    .await?;
            }
        }

        let mut core = self.core.write().await;
        core.record = draft;
        for notification in notifications {
            self.bus.publish(notification);
        }
        Ok(value)
    }

    /// Register a live player connection, replacing any previous one for that player.
    pub fn attach_connection(
        &self,
        player_id: Uuid,
    ) -> (Uuid, mpsc::UnboundedReceiver<DirectMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let connection_id = Uuid::new_v4();
        self.connections
            .insert(player_id, PlayerConnection { connection_id, tx });
        (connection_id, rx)
    }

    /// Forget a connection unless it was already replaced by a newer one.
    pub fn detach_connection(&self, player_id: Uuid, connection_id: Uuid) {
        self.connections
            .remove_if(&player_id, |_, connection| {
                connection.connection_id == connection_id
            });
    }

    /// Number of live player connections.
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Fire-and-forget message to one player's live connection.
    pub fn send_direct(&self, player_id: Uuid, message: DirectMessage) -> bool {
        let Some(connection) = self.connections.get(&player_id) else {
            return false;
        };
        let tx = connection.tx.clone();
        drop(connection);
        tx.send(message).is_ok()
    }

    /// Fire-and-forget message to every live connection.
    pub fn send_direct_to_all(&self, message: DirectMessage) {
        for connection in self.connections.iter() {
            let _ = connection.tx.send(message.clone());
        }
    }

    async fn persist<T>(
        &self,
        work: impl Future<Output = StorageResult<T>>,
    ) -> Result<T, ServiceError> {
        match self.transition_timeout {
            Some(limit) => match timeout(limit, work).await {
                Ok(result) => result.map_err(ServiceError::from),
                Err(_) => Err(ServiceError::Timeout),
            },
            None => work.await.map_err(ServiceError::from),
        }
    }
}

fn abort_plan(machine: &mut SessionStateMachine, plan: &Plan, context: &'static str) {
    if let Err(abort_err) = machine.abort(plan.id) {
        warn!(
            event = ?plan.event,
            plan_id = %plan.id,
            error = ?abort_err,
            "{context}"
        );
    }
}
