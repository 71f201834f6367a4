//! Event system for quest operations
//!
//! Services emit an event after every successful commit. Listeners use them
//! for audit logging; the live view does not depend on them, it follows the
//! store's snapshots.

use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, trace};

/// Domain events emitted by services
#[derive(Debug, Clone, PartialEq)]
pub enum QuestEvent {
    // Session events
    MemberLoggedIn {
        uid: String,
        first_login: bool,
    },
    MemberLoggedOut {
        uid: String,
    },

    // Habit events
    HabitCreated {
        id: String,
        user_id: String,
        title: String,
    },
    HabitsSeeded {
        user_id: String,
        count: usize,
    },
    HabitEdited {
        id: String,
    },
    HabitDeleted {
        id: String,
    },
    HabitCompleted {
        id: String,
        user_id: String,
        title: String,
        exp: u32,
    },
    HabitUndone {
        id: String,
        user_id: String,
        exp: u32,
    },

    // Log events
    LogSaved {
        id: String,
        user_id: String,
        xp_delta: i64,
    },
}

/// Consumer of quest events
pub trait EventListener: Send + Sync {
    /// Handle an event
    fn on_event(&self, event: &QuestEvent);
}

/// Event bus for broadcasting quest events
pub struct EventBus {
    sender: broadcast::Sender<QuestEvent>,
}

impl EventBus {
    /// Bus holding the last 256 undelivered events
    pub fn new() -> Self {
        Self::with_capacity(256)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish after a successful commit
    pub fn emit(&self, event: QuestEvent) {
        trace!(event = ?event, "Emitting quest event");
        // No subscribers is fine
        let _ = self.sender.send(event);
    }

    /// Subscribe to events
    pub fn subscribe(&self) -> broadcast::Receiver<QuestEvent> {
        self.sender.subscribe()
    }

    pub fn listener_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Writes every quest event to the trace log
pub struct LoggingEventListener;

impl EventListener for LoggingEventListener {
    fn on_event(&self, event: &QuestEvent) {
        match event {
            QuestEvent::MemberLoggedIn { uid, first_login } => {
                debug!(uid = %uid, first_login = first_login, "Member logged in");
            }
            QuestEvent::HabitCompleted {
                id,
                user_id,
                title,
                exp,
            } => {
                debug!(id = %id, user = %user_id, title = %title, exp = exp, "Habit completed");
            }
            QuestEvent::HabitUndone { id, user_id, exp } => {
                debug!(id = %id, user = %user_id, exp = exp, "Habit completion undone");
            }
            QuestEvent::LogSaved {
                id,
                user_id,
                xp_delta,
            } => {
                debug!(id = %id, user = %user_id, xp_delta = xp_delta, "Daily log saved");
            }
            _ => {
                trace!(event = ?event, "Quest event");
            }
        }
    }
}

/// Run a [`LoggingEventListener`] until the bus closes
pub fn spawn_logging_listener(event_bus: Arc<EventBus>) -> tokio::task::JoinHandle<()> {
    let mut events = event_bus.subscribe();
    
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => LoggingEventListener.on_event(&event),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    debug!(skipped = n, "Audit log fell behind the event bus");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("Quest event bus closed");
                    break;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{timeout, Duration};

    #[tokio::test]
    async fn test_completion_event_delivered() {
        let bus = EventBus::new();
        let mut receiver = bus.subscribe();

        bus.emit(QuestEvent::HabitCompleted {
            id: "h1".into(),
            user_id: "user_a".into(),
            title: "WORKOUT".into(),
            exp: 100,
        });

        let event = timeout(Duration::from_millis(100), receiver.recv())
            .await
            .expect("timeout")
            .expect("receive error");

        match event {
            QuestEvent::HabitCompleted { id, exp, .. } => {
                assert_eq!(id, "h1");
                assert_eq!(exp, 100);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_emit_without_listeners() {
        let bus = EventBus::new();
        bus.emit(QuestEvent::HabitDeleted { id: "h1".into() });
        assert_eq!(bus.listener_count(), 0);
    }
}
