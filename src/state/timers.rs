use dashmap::DashMap;
use tokio::task::AbortHandle;
use uuid::Uuid;

/// Kind of timer a session can have armed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    /// Preview delay before answers open.
    Preview,
    /// Answering deadline of a timed question.
    Deadline,
}

struct ArmedTimer {
    id: Uuid,
    handle: AbortHandle,
}

/// At most one armed timer per [`TimerKind`]; arming a kind aborts the previous one.
#[derive(Default)]
pub struct PhaseTimers {
    slots: DashMap<TimerKind, ArmedTimer>,
}

impl PhaseTimers {
    /// Empty timer set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a spawned timer task, aborting the one it replaces.
    pub fn arm(&self, kind: TimerKind, id: Uuid, handle: AbortHandle) {
        if let Some(previous) = self.slots.insert(kind, ArmedTimer { id, handle }) {
            previous.handle.abort();
        }
    }

    /// Forget a timer that is firing, without aborting it.
    ///
    /// Returns `false` when the slot was re-armed in the meantime and the caller is stale.
    pub fn release(&self, kind: TimerKind, id: Uuid) -> bool {
        self.slots.remove_if(&kind, |_, timer| timer.id == id).is_some()
    }

    /// Abort the timer of one kind, if armed.
    pub fn cancel(&self, kind: TimerKind) {
        if let Some((_, timer)) = self.slots.remove(&kind) {
            timer.handle.abort();
        }
    }

    /// Abort every armed timer.
    pub fn cancel_all(&self) {
        self.cancel(TimerKind::Preview);
        self.cancel(TimerKind::Deadline);
    }

    /// Whether a timer of this kind is armed.
    pub fn is_armed(&self, kind: TimerKind) -> bool {
        self.slots.contains_key(&kind)
    }
}
