//! Member sessions
//!
//! A [`Session`] is the explicit context of one logged-in client: who is
//! acting, the shared services, and which entities have a mutation in
//! flight. Sessions are created by [`SessionStore::login`] and dropped on
//! logout or expiry.

use dashmap::{DashMap, DashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::QuestError;
use crate::roster::MemberView;
use crate::services::{QuestEvent, Services};

/// One logged-in client
pub struct Session {
    id: String,
    member: MemberView,
    services: Arc<Services>,
    created_at: u64,
    ttl_secs: u64,
    last_activity: AtomicU64,
    in_flight: DashSet<String>,
}

impl Session {
    fn new(id: String, member: MemberView, services: Arc<Services>, ttl_secs: u64) -> Self {
        let now = unix_now(&services);
        Self {
            id,
            member,
            services,
            created_at: now,
            ttl_secs,
            last_activity: AtomicU64::new(now),
            in_flight: DashSet::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// The acting member's user id
    pub fn uid(&self) -> &str {
        &self.member.uid
    }

    pub fn member(&self) -> &MemberView {
        &self.member
    }

    pub fn services(&self) -> &Arc<Services> {
        &self.services
    }

    pub fn created_at(&self) -> u64 {
        self.created_at
    }

    /// Expired once idle for longer than the TTL
    pub fn is_expired(&self) -> bool {
        let idle = unix_now(&self.services).saturating_sub(self.last_activity.load(Ordering::Relaxed));
        idle >= self.ttl_secs
    }

    pub fn touch(&self) {
        self.last_activity
            .store(unix_now(&self.services), Ordering::Relaxed);
    }

    /// Claim `key` until the returned guard drops
    ///
    /// A second claim of the same key while the first is held fails with
    /// [`QuestError::Busy`]; it is never queued.
    pub fn begin(&self, key: impl Into<String>) -> Result<InFlight<'_>, QuestError> {
        let key = key.into();
        if !self.in_flight.insert(key.clone()) {
            debug!(session = %self.id, key = %key, "Mutation already in flight");
            return Err(QuestError::Busy(key));
        }
        Ok(InFlight {
            set: &self.in_flight,
            key,
        })
    }

    /// Whether a mutation of `key` is currently running
    pub fn is_busy(&self, key: &str) -> bool {
        self.in_flight.contains(key)
    }
}

/// Held while a mutation of one entity is in flight
pub struct InFlight<'a> {
    set: &'a DashSet<String>,
    key: String,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.set.remove(&self.key);
    }
}

fn unix_now(services: &Services) -> u64 {
    services.clock.now().timestamp().max(0) as u64
}

/// In-memory session table with idle expiry
pub struct SessionStore {
    sessions: DashMap<String, Arc<Session>>,
    services: Arc<Services>,
    ttl_secs: u64,
}

impl SessionStore {
    pub fn new(services: Arc<Services>, ttl_secs: u64) -> Self {
        Self {
            sessions: DashMap::new(),
            services,
            ttl_secs,
        }
    }

    /// Check the PIN, bootstrap the user record and open a session
    ///
    /// A rejected PIN performs no write.
    pub async fn login(&self, uid: &str, pin: &str) -> Result<Arc<Session>, QuestError> {
        let member = self.services.roster.verify(uid, pin)?.clone();
        let (_, first_login) = self.services.users.ensure_member(&member).await?;

        let session_id = format!("sess_{}", uuid::Uuid::new_v4());
        let session = Arc::new(Session::new(
            session_id.clone(),
            member.public(),
            self.services.clone(),
            self.ttl_secs,
        ));
        self.sessions.insert(session_id.clone(), session.clone());

        self.services.events.emit(QuestEvent::MemberLoggedIn {
            uid: member.uid.clone(),
            first_login,
        });
        info!(uid = %member.uid, session = %session_id, "Session opened");

        Ok(session)
    }

    /// Validate and return a live session, refreshing its activity
    pub fn get(&self, session_id: &str) -> Result<Arc<Session>, QuestError> {
        let session = self
            .sessions
            .get(session_id)
            .map(|s| s.value().clone())
            .ok_or(QuestError::Unauthorized)?;

        if session.is_expired() {
            self.sessions.remove(session_id);
            debug!(session = %session_id, "Session expired");
            return Err(QuestError::Unauthorized);
        }

        session.touch();
        Ok(session)
    }

    /// Tear down a session
    pub fn logout(&self, session_id: &str) -> Result<(), QuestError> {
        let (_, session) = self
            .sessions
            .remove(session_id)
            .ok_or(QuestError::Unauthorized)?;

        self.services.events.emit(QuestEvent::MemberLoggedOut {
            uid: session.uid().to_string(),
        });
        info!(uid = %session.uid(), session = %session_id, "Session closed");
        Ok(())
    }

    /// Drop expired sessions, returning how many were removed
    pub fn cleanup(&self) -> usize {
        let before = self.sessions.len();
        self.sessions.retain(|_, s| !s.is_expired());
        let removed = before.saturating_sub(self.sessions.len());
        if removed > 0 {
            info!("Cleaned up {} expired sessions", removed);
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::models::User;
    use crate::roster::Roster;
    use crate::store::MemoryStore;
    use chrono::NaiveDate;

    fn setup(ttl: u64) -> (SessionStore, Arc<FixedClock>) {
        let clock = Arc::new(FixedClock::on(NaiveDate::from_ymd_opt(2024, 5, 1).unwrap()));
        let services = Arc::new(Services::new(
            Arc::new(MemoryStore::new()),
            clock.clone(),
            Roster::default(),
        ));
        (SessionStore::new(services, ttl), clock)
    }

    #[tokio::test]
    async fn test_login_creates_user() {
        let (sessions, _) = setup(3600);
        let session = sessions.login("user_rushu", "2006").await.unwrap();
        assert!(session.id().starts_with("sess_"));
        assert_eq!(session.uid(), "user_rushu");

        let user: User = session
            .services()
            .records
            .get("user_rushu")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(user.name, "RUSHU");
        assert_eq!(user.points, 0);
    }

    #[tokio::test]
    async fn test_wrong_pin_writes_nothing() {
        let (sessions, _) = setup(3600);
        assert!(matches!(
            sessions.login("user_vedu", "0000").await,
            Err(QuestError::PinMismatch(_))
        ));
        let users = sessions.services.store.list(crate::store::Collection::Users).await.unwrap();
        assert!(users.is_empty());
        assert!(sessions.is_empty());
    }

    #[tokio::test]
    async fn test_expiry_and_logout() {
        let (sessions, clock) = setup(60);
        let session = sessions.login("user_vedu", "2005").await.unwrap();
        assert!(sessions.get(session.id()).is_ok());

        clock.advance_days(1);
        assert!(matches!(sessions.get(session.id()), Err(QuestError::Unauthorized)));

        let session = sessions.login("user_vedu", "2005").await.unwrap();
        sessions.logout(session.id()).unwrap();
        assert!(sessions.get(session.id()).is_err());
        assert!(sessions.logout(session.id()).is_err());
    }

    #[tokio::test]
    async fn test_in_flight_guard() {
        let (sessions, _) = setup(3600);
        let session = sessions.login("user_rushu", "2006").await.unwrap();

        let guard = session.begin("habit:h1").unwrap();
        assert!(matches!(session.begin("habit:h1"), Err(QuestError::Busy(_))));
        assert!(session.begin("habit:h2").is_ok());
        drop(guard);
        assert!(!session.is_busy("habit:h1"));
        assert!(session.begin("habit:h1").is_ok());
    }
}
