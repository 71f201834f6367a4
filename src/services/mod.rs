//! Service layer for habitquest
//!
//! Services hold the progression rules between the HTTP handlers and the
//! document store. Each mutating service call:
//! - reads the current documents fresh from the store
//! - plans the change as a pure function of what it read
//! - commits the whole change as one atomic `WriteBatch`
//! - emits a `QuestEvent` once the commit succeeded
//!
//! ## Architecture
//!
//! ```text
//! HTTP Handlers / Session (thin)
//!     ↓
//! Service Layer (progression rules)
//!     ↓
//! DocumentStore (store/*.rs)
//!     ↓
//! MemoryStore | SledStore
//! ```

pub mod events;
pub mod habit_service;
pub mod log_service;
pub mod response;
pub mod user_service;

// Re-exports
pub use events::{EventBus, EventListener, QuestEvent};
pub use habit_service::{plan_toggle, HabitService, ToggleOutcome, TogglePlan};
pub use log_service::{xp_delta, LogDraft, LogSaveOutcome, LogService, XP_PER_TASK};
pub use response::*;
pub use user_service::UserService;

use std::sync::Arc;

use crate::clock::Clock;
use crate::roster::Roster;
use crate::store::{DocumentStore, Records};

/// Service container for dependency injection
///
/// Built once at startup and shared by every session.
pub struct Services {
    pub store: Arc<dyn DocumentStore>,
    pub records: Records,
    pub clock: Arc<dyn Clock>,
    pub roster: Arc<Roster>,
    pub users: Arc<UserService>,
    pub habits: Arc<HabitService>,
    pub logs: Arc<LogService>,
    pub events: Arc<EventBus>,
}

impl Services {
    /// Create all services over one store
    pub fn new(store: Arc<dyn DocumentStore>, clock: Arc<dyn Clock>, roster: Roster) -> Self {
        let events = Arc::new(EventBus::new());
        Self::with_events(store, clock, roster, events)
    }

    /// Create services emitting on an existing event bus
    pub fn with_events(
        store: Arc<dyn DocumentStore>,
        clock: Arc<dyn Clock>,
        roster: Roster,
        events: Arc<EventBus>,
    ) -> Self {
        let records = Records::new(store.clone());

        Self {
            users: Arc::new(UserService::new(records.clone())),
            habits: Arc::new(HabitService::new(
                records.clone(),
                clock.clone(),
                events.clone(),
            )),
            logs: Arc::new(LogService::new(records.clone(), clock.clone(), events.clone())),
            roster: Arc::new(roster),
            store,
            records,
            clock,
            events,
        }
    }
}
