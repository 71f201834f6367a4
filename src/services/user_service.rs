//! User records: creation at first login and lookups

use serde_json::{Map, Value};
use tracing::info;

use crate::error::QuestError;
use crate::models::User;
use crate::roster::RosterMember;
use crate::store::records::encode;
use crate::store::{Collection, Records, WriteBatch};

pub struct UserService {
    records: Records,
}

impl UserService {
    pub fn new(records: Records) -> Self {
        Self { records }
    }

    /// Make sure the member has a user record
    ///
    /// An existing record only gets its avatar refreshed; points and streak
    /// are left alone. Returns the record and whether it was just created.
    pub async fn ensure_member(&self, member: &RosterMember) -> Result<(User, bool), QuestError> {
        if let Some(mut user) = self.records.get::<User>(&member.uid).await? {
            if user.avatar != member.avatar {
                let mut fields = Map::new();
                fields.insert("avatar".into(), Value::from(member.avatar.clone()));
                self.records
                    .store()
                    .commit(WriteBatch::new().update(Collection::Users, &member.uid, fields))
                    .await?;
                user.avatar = member.avatar.clone();
            }
            return Ok((user, false));
        }

        let user = User {
            uid: member.uid.clone(),
            name: member.name.clone(),
            avatar: member.avatar.clone(),
            color: member.color.clone(),
            points: 0,
            streak: 0,
            goal: (!member.default_goal.is_empty()).then(|| member.default_goal.clone()),
        };
        self.records
            .store()
            .commit(WriteBatch::new().set(Collection::Users, &user.uid, encode(&user)?))
            .await?;

        info!(uid = %user.uid, "Created user record");
        Ok((user, true))
    }

    pub async fn get(&self, uid: &str) -> Result<Option<User>, QuestError> {
        self.records.get(uid).await
    }

    pub async fn list(&self) -> Result<Vec<User>, QuestError> {
        self.records.list().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{DocumentStore, MemoryStore};
    use serde_json::json;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_existing_user_keeps_progress() {
        let store = Arc::new(MemoryStore::new());
        store
            .set(
                Collection::Users,
                "user_rushu",
                json!({ "name": "RUSHU", "avatar": "old", "points": 340, "streak": 4 }),
            )
            .await
            .unwrap();

        let service = UserService::new(Records::new(store));
        let members = RosterMember::defaults();
        let member = &members[0];
        let (user, created) = service.ensure_member(member).await.unwrap();
        assert!(!created);
        assert_eq!(user.points, 340);
        assert_eq!(user.streak, 4);

        let stored = service.get("user_rushu").await.unwrap().unwrap();
        assert_eq!(stored.avatar, member.avatar);
        assert_eq!(stored.points, 340);
    }

    #[tokio::test]
    async fn test_first_login_creates_record() {
        let service = UserService::new(Records::new(Arc::new(MemoryStore::new())));
        let members = RosterMember::defaults();
        let member = &members[1];
        let (user, created) = service.ensure_member(member).await.unwrap();
        assert!(created);
        assert_eq!(user.goal.as_deref(), Some("LEVEL UP DAILY"));
        assert_eq!(service.list().await.unwrap().len(), 1);
    }
}
