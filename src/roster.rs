//! Fixed roster and PIN gate
//!
//! Login is a selection gate, not a security boundary: the PIN is compared
//! against the configured value and never written to the store.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::QuestError;

/// One member allowed to log in
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterMember {
    pub uid: String,
    pub name: String,
    pub avatar: String,
    pub color: String,
    /// Goal text written to the user record on first login
    #[serde(default)]
    pub default_goal: String,
    pub pin: String,
}

impl RosterMember {
    /// The two built-in members
    pub fn defaults() -> Vec<RosterMember> {
        vec![
            RosterMember {
                uid: "user_rushu".into(),
                name: "RUSHU".into(),
                avatar: "🐶".into(),
                color: "blue".into(),
                default_goal: "MAX STATS".into(),
                pin: "2006".into(),
            },
            RosterMember {
                uid: "user_vedu".into(),
                name: "VEDU".into(),
                avatar: "🐱".into(),
                color: "pink".into(),
                default_goal: "LEVEL UP DAILY".into(),
                pin: "2005".into(),
            },
        ]
    }

    pub fn public(&self) -> MemberView {
        MemberView {
            uid: self.uid.clone(),
            name: self.name.clone(),
            avatar: self.avatar.clone(),
            color: self.color.clone(),
        }
    }
}

/// Roster entry as shown on the login screen
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MemberView {
    pub uid: String,
    pub name: String,
    pub avatar: String,
    pub color: String,
}

#[derive(Debug, Clone)]
pub struct Roster {
    members: Vec<RosterMember>,
}

impl Roster {
    pub fn new(members: Vec<RosterMember>) -> Result<Self, QuestError> {
        if members.is_empty() {
            return Err(QuestError::Config("roster has no members".into()));
        }
        for (i, member) in members.iter().enumerate() {
            if members[..i].iter().any(|m| m.uid == member.uid) {
                return Err(QuestError::Config(format!(
                    "duplicate roster uid: {}",
                    member.uid
                )));
            }
        }
        Ok(Self { members })
    }

    pub fn members(&self) -> &[RosterMember] {
        &self.members
    }

    pub fn get(&self, uid: &str) -> Option<&RosterMember> {
        self.members.iter().find(|m| m.uid == uid)
    }

    /// Check a login attempt
    pub fn verify(&self, uid: &str, pin: &str) -> Result<&RosterMember, QuestError> {
        let member = self
            .get(uid)
            .ok_or_else(|| QuestError::UnknownMember(uid.to_string()))?;

        if member.pin != pin.trim() {
            warn!(uid = %uid, "PIN mismatch");
            return Err(QuestError::PinMismatch(uid.to_string()));
        }

        debug!(uid = %uid, "PIN accepted");
        Ok(member)
    }

    /// The first other member, shown as the partner on the dashboard
    pub fn partner_of(&self, uid: &str) -> Option<&RosterMember> {
        self.members.iter().find(|m| m.uid != uid)
    }

    pub fn public(&self) -> Vec<MemberView> {
        self.members.iter().map(RosterMember::public).collect()
    }
}

impl Default for Roster {
    fn default() -> Self {
        Self {
            members: RosterMember::defaults(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verify() {
        let roster = Roster::default();
        assert_eq!(roster.verify("user_rushu", "2006").unwrap().name, "RUSHU");
        assert!(matches!(
            roster.verify("user_rushu", "2005"),
            Err(QuestError::PinMismatch(_))
        ));
        assert!(matches!(
            roster.verify("user_nobody", "2006"),
            Err(QuestError::UnknownMember(_))
        ));
    }

    #[test]
    fn test_partner() {
        let roster = Roster::default();
        assert_eq!(roster.partner_of("user_rushu").unwrap().uid, "user_vedu");
        assert_eq!(roster.partner_of("user_vedu").unwrap().uid, "user_rushu");
    }

    #[test]
    fn test_rejects_duplicates() {
        let mut members = RosterMember::defaults();
        members[1].uid = members[0].uid.clone();
        assert!(Roster::new(members).is_err());
        assert!(Roster::new(Vec::new()).is_err());
    }

    #[test]
    fn test_public_view_has_no_pin() {
        let json = serde_json::to_value(Roster::default().public()).unwrap();
        assert!(json[0].get("pin").is_none());
    }
}
