//! Event Bus - broadcast of run events to any number of observers

use tokio::sync::broadcast;
use tracing::debug;

use super::types::RunEvent;
use crate::orchestrator::RequestPhase;
use crate::recovery::RecoveryAction;

/// Default channel capacity (events)
pub const DEFAULT_CHANNEL_CAPACITY: usize = 4096;

/// Central event bus for run activity
///
/// Emitting never blocks and never fails: with no subscribers the event is
/// dropped, and slow subscribers lose the oldest events.
pub struct EventBus {
    tx: broadcast::Sender<RunEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        debug!(capacity, "EventBus::new: creating event bus");
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn with_default_capacity() -> Self {
        Self::new(DEFAULT_CHANNEL_CAPACITY)
    }

    pub fn emit(&self, event: RunEvent) {
        debug!(event_type = event.event_type(), request_id = event.request_id(), "EventBus::emit");
        let _ = self.tx.send(event);
    }

    /// Receive every event emitted after this call
    pub fn subscribe(&self) -> broadcast::Receiver<RunEvent> {
        debug!("EventBus::subscribe: new subscriber");
        self.tx.subscribe()
    }

    /// Emitter bound to one request
    pub fn emitter_for(&self, request_id: impl Into<String>) -> EventEmitter {
        let request_id = request_id.into();
        debug!(%request_id, "EventBus::emitter_for: creating emitter");
        EventEmitter {
            tx: Some(self.tx.clone()),
            request_id,
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}

/// Cheap handle that stamps every event with its request id
#[derive(Clone)]
pub struct EventEmitter {
    tx: Option<broadcast::Sender<RunEvent>>,
    request_id: String,
}

impl EventEmitter {
    /// Emitter that drops everything, for runs nobody observes
    pub fn disconnected(request_id: impl Into<String>) -> Self {
        Self {
            tx: None,
            request_id: request_id.into(),
        }
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn emit(&self, event: RunEvent) {
        if let Some(tx) = &self.tx {
            debug!(event_type = event.event_type(), "EventEmitter::emit");
            let _ = tx.send(event);
        }
    }

    // === Convenience methods ===

    pub fn phase_changed(&self, phase: RequestPhase) {
        self.emit(RunEvent::PhaseChanged {
            request_id: self.request_id.clone(),
            phase,
        });
    }

    pub fn wave_started(&self, wave: usize, task_ids: &[String]) {
        self.emit(RunEvent::WaveStarted {
            request_id: self.request_id.clone(),
            wave,
            task_ids: task_ids.to_vec(),
        });
    }

    pub fn checkpoint_created(&self, wave: usize, checkpoint_id: &str, files: Vec<String>) {
        self.emit(RunEvent::CheckpointCreated {
            request_id: self.request_id.clone(),
            wave,
            checkpoint_id: checkpoint_id.to_string(),
            files,
        });
    }

    pub fn checkpoint_failed(&self, wave: usize, error: &str) {
        self.emit(RunEvent::CheckpointFailed {
            request_id: self.request_id.clone(),
            wave,
            error: error.to_string(),
        });
    }

    pub fn task_started(&self, task_id: &str) {
        self.emit(RunEvent::TaskStarted {
            request_id: self.request_id.clone(),
            task_id: task_id.to_string(),
        });
    }

    pub fn task_completed(&self, task_id: &str) {
        self.emit(RunEvent::TaskCompleted {
            request_id: self.request_id.clone(),
            task_id: task_id.to_string(),
        });
    }

    pub fn task_failed(&self, task_id: &str, error: &str) {
        self.emit(RunEvent::TaskFailed {
            request_id: self.request_id.clone(),
            task_id: task_id.to_string(),
            error: error.to_string(),
        });
    }

    pub fn recovery_applied(&self, task_id: &str, action: RecoveryAction, fix_task_id: Option<&str>) {
        self.emit(RunEvent::RecoveryApplied {
            request_id: self.request_id.clone(),
            task_id: task_id.to_string(),
            action,
            fix_task_id: fix_task_id.map(str::to_string),
        });
    }

    pub fn wave_completed(&self, wave: usize, succeeded: usize, failed: usize) {
        self.emit(RunEvent::WaveCompleted {
            request_id: self.request_id.clone(),
            wave,
            succeeded,
            failed,
        });
    }

    pub fn run_finished(&self, summary: &str) {
        self.emit(RunEvent::RunFinished {
            request_id: self.request_id.clone(),
            summary: summary.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_emit_reaches_subscribers() {
        let bus = EventBus::new(16);
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);

        let emitter = bus.emitter_for("req-1");
        emitter.task_started("a");

        for rx in [&mut rx1, &mut rx2] {
            let event = rx.recv().await.unwrap();
            assert_eq!(event.event_type(), "TaskStarted");
            assert_eq!(event.request_id(), "req-1");
        }
    }

    #[tokio::test]
    async fn test_emit_without_subscribers_is_fine() {
        let bus = EventBus::default();
        bus.emitter_for("r").run_finished("done");
        let mut rx = bus.subscribe();
        bus.emitter_for("r").wave_started(1, &["a".to_string()]);
        assert_eq!(rx.recv().await.unwrap().event_type(), "WaveStarted");
    }

    #[test]
    fn test_disconnected_emitter_drops_events() {
        let emitter = EventEmitter::disconnected("r");
        emitter.task_failed("a", "boom");
        assert_eq!(emitter.request_id(), "r");
    }
}
