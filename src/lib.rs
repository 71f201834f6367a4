//! HabitQuest - shared habit tracker for a two-member roster
//!
//! Members log in with a PIN, complete habits and daily task logs, earn
//! experience, level up and follow each other's progress on a shared feed.
//! Every change lands in a document store and is pushed live to every
//! connected client.
//!
//! ## Architecture
//!
//! - **progression**: experience → level curve
//! - **services**: habit toggling, daily log sync, login bootstrap
//! - **store**: keyed document collections with atomic batches and live
//!   full-snapshot subscriptions (in-memory or sled)
//! - **live / live_ws**: latest snapshots, rebroadcast over WebSocket
//! - **http**: JSON API over the services
//!
//! ## Storage Layout
//!
//! ```text
//! ~/.local/share/habitquest/
//! ├── documents.sled/        # users, habits, logs, feed trees
//! └── config.toml            # Configuration
//! ```

pub mod clock;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod http;
pub mod live;
pub mod live_ws;
pub mod models;
pub mod progression;
pub mod roster;
pub mod services;
pub mod session;
pub mod store;

// Re-exports
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{Backend, Config};
pub use error::QuestError;
pub use http::HttpServer;
pub use live::{LiveMessage, LiveView, LiveViewConfig};
pub use models::{DailyLog, FeedEvent, Habit, Mood, Task, User};
pub use roster::{Roster, RosterMember};
pub use services::{EventBus, QuestEvent, Services};
pub use session::{Session, SessionStore};
pub use store::{Collection, DocumentStore, MemoryStore, SledStore, WriteBatch};
