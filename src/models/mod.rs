//! Typed records for the four shared collections
//!
//! Field names on the wire are camelCase (`userId`, `lastCompleted`), dates
//! are `YYYY-MM-DD` strings and timestamps RFC 3339. Decoding is lenient:
//! see [`defaults`] for the substitution rules.

pub mod defaults;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::store::Collection;

/// A record stored as one document of a collection
pub trait Record: Serialize + for<'de> Deserialize<'de> {
    const COLLECTION: Collection;

    /// Document key
    fn id(&self) -> &str;

    /// Restore the key from the document envelope after decoding
    fn set_id(&mut self, id: String);
}

// ============================================================================
// Users
// ============================================================================

/// One roster member's progression record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(default)]
    pub uid: String,
    #[serde(default, deserialize_with = "defaults::text")]
    pub name: String,
    #[serde(default, deserialize_with = "defaults::text")]
    pub avatar: String,
    #[serde(default, deserialize_with = "defaults::text")]
    pub color: String,
    #[serde(default, deserialize_with = "defaults::count")]
    pub points: u64,
    #[serde(default, deserialize_with = "defaults::count")]
    pub streak: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub goal: Option<String>,
}

impl Record for User {
    const COLLECTION: Collection = Collection::Users;

    fn id(&self) -> &str {
        &self.uid
    }

    fn set_id(&mut self, id: String) {
        self.uid = id;
    }
}

// ============================================================================
// Habits
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Habit {
    #[serde(default)]
    pub id: String,
    #[serde(default, deserialize_with = "defaults::text")]
    pub user_id: String,
    #[serde(default, deserialize_with = "defaults::text")]
    pub title: String,
    #[serde(default, deserialize_with = "defaults::text")]
    pub category: String,
    #[serde(
        default = "defaults::default_habit_exp",
        deserialize_with = "defaults::habit_exp"
    )]
    pub exp: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "defaults::count")]
    pub streak: u64,
    #[serde(default, deserialize_with = "defaults::optional_date")]
    pub last_completed: Option<NaiveDate>,
}

impl Habit {
    /// `lastCompleted == today` is the only completion marker
    pub fn is_done_on(&self, date: NaiveDate) -> bool {
        self.last_completed == Some(date)
    }
}

impl Record for Habit {
    const COLLECTION: Collection = Collection::Habits;

    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }
}

/// Fields supplied when creating a habit
#[derive(Debug, Clone, Deserialize)]
pub struct NewHabit {
    pub title: String,
    #[serde(default = "default_category")]
    pub category: String,
    #[serde(default = "defaults::default_habit_exp")]
    pub exp: u32,
    #[serde(default)]
    pub description: Option<String>,
}

fn default_category() -> String {
    "HEALTH".to_string()
}

/// Editable habit fields; `None` leaves the field unchanged
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HabitEdit {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub exp: Option<u32>,
    #[serde(default)]
    pub description: Option<String>,
}

impl HabitEdit {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.category.is_none()
            && self.exp.is_none()
            && self.description.is_none()
    }
}

/// Entry of the built-in seeding list
#[derive(Debug, Clone, Copy)]
pub struct PresetHabit {
    pub title: &'static str,
    pub category: &'static str,
    pub exp: u32,
}

pub const PRESET_HABITS: &[PresetHabit] = &[
    PresetHabit { title: "WAKE UP EARLY", category: "HEALTH", exp: 50 },
    PresetHabit { title: "DRINK WATER", category: "HEALTH", exp: 20 },
    PresetHabit { title: "WORKOUT", category: "HEALTH", exp: 100 },
    PresetHabit { title: "READ 10 PAGES", category: "MIND", exp: 60 },
    PresetHabit { title: "MEDITATE", category: "MIND", exp: 40 },
    PresetHabit { title: "JOURNAL", category: "MIND", exp: 40 },
    PresetHabit { title: "CLEAN ROOM", category: "ENV", exp: 50 },
    PresetHabit { title: "NO SUGAR", category: "HEALTH", exp: 80 },
    PresetHabit { title: "STUDY 1H", category: "WORK", exp: 100 },
    PresetHabit { title: "CODE 1H", category: "WORK", exp: 100 },
];

impl From<&PresetHabit> for NewHabit {
    fn from(preset: &PresetHabit) -> Self {
        Self {
            title: preset.title.to_string(),
            category: preset.category.to_string(),
            exp: preset.exp,
            description: None,
        }
    }
}

// ============================================================================
// Daily logs
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Mood {
    Peak,
    Good,
    Okay,
    Low,
    #[default]
    #[serde(other)]
    Neutral,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    #[serde(default, deserialize_with = "defaults::flexible_id")]
    pub id: String,
    #[serde(default, deserialize_with = "defaults::text")]
    pub text: String,
    #[serde(default, deserialize_with = "defaults::flag")]
    pub completed: bool,
}

/// One user's record for one calendar day
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyLog {
    #[serde(default)]
    pub id: String,
    #[serde(default, deserialize_with = "defaults::text")]
    pub user_id: String,
    /// Restored from the `<userId>_<date>` key when missing or unparsable
    #[serde(default, deserialize_with = "defaults::date")]
    pub date: NaiveDate,
    #[serde(default, deserialize_with = "defaults::tasks")]
    pub tasks: Vec<Task>,
    #[serde(default, deserialize_with = "defaults::mood")]
    pub mood: Mood,
    #[serde(default = "defaults::default_energy", deserialize_with = "defaults::energy")]
    pub energy: u8,
    #[serde(default, deserialize_with = "defaults::hours")]
    pub hours: f64,
    #[serde(default, deserialize_with = "defaults::text")]
    pub note: String,
}

impl DailyLog {
    /// Deterministic key: one log per user per date
    pub fn key(user_id: &str, date: NaiveDate) -> String {
        format!("{}_{}", user_id, date.format("%Y-%m-%d"))
    }

    pub fn completed_count(&self) -> usize {
        self.tasks.iter().filter(|t| t.completed).count()
    }
}

impl Record for DailyLog {
    const COLLECTION: Collection = Collection::Logs;

    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: String) {
        if let Some(date) = defaults::date_from_log_key(&id) {
            self.date = date;
        }
        self.id = id;
    }
}

// ============================================================================
// Feed
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedEventType {
    HabitComplete,
}

/// Append-only record of a habit completion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedEvent {
    #[serde(default)]
    pub id: String,
    #[serde(default, deserialize_with = "defaults::text")]
    pub user_id: String,
    #[serde(rename = "type")]
    pub event_type: FeedEventType,
    #[serde(default, deserialize_with = "defaults::text")]
    pub title: String,
    #[serde(default, deserialize_with = "defaults::count")]
    pub exp: u64,
    pub timestamp: DateTime<Utc>,
}

impl Record for FeedEvent {
    const COLLECTION: Collection = Collection::Feed;

    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_user_defaults_for_missing_fields() {
        let user: User = serde_json::from_value(json!({ "uid": "user_a", "name": "A" })).unwrap();
        assert_eq!(user.points, 0);
        assert_eq!(user.streak, 0);
        assert_eq!(user.avatar, "");
    }

    #[test]
    fn test_habit_exp_falls_back() {
        let habit: Habit = serde_json::from_value(json!({
            "userId": "user_a",
            "title": "WORKOUT",
            "exp": null,
            "lastCompleted": "not a date",
        }))
        .unwrap();
        assert_eq!(habit.exp, defaults::DEFAULT_HABIT_EXP);
        assert_eq!(habit.last_completed, None);

        let habit: Habit = serde_json::from_value(json!({ "title": "X", "exp": -3 })).unwrap();
        assert_eq!(habit.exp, defaults::DEFAULT_HABIT_EXP);
    }

    #[test]
    fn test_habit_wire_names() {
        let habit = Habit {
            id: "h1".into(),
            user_id: "user_a".into(),
            title: "MEDITATE".into(),
            category: "MIND".into(),
            exp: 40,
            description: None,
            streak: 3,
            last_completed: NaiveDate::from_ymd_opt(2024, 5, 1),
        };
        let value = serde_json::to_value(&habit).unwrap();
        assert_eq!(value["userId"], "user_a");
        assert_eq!(value["lastCompleted"], "2024-05-01");
        assert!(value.get("description").is_none());
    }

    #[test]
    fn test_log_defaults() {
        let log: DailyLog = serde_json::from_value(json!({
            "userId": "user_a",
            "date": "2024-05-01",
            "mood": "ECSTATIC",
            "note": null,
            "tasks": [{ "id": 1714521600000u64, "text": "ship", "completed": true }],
        }))
        .unwrap();
        assert_eq!(log.mood, Mood::Neutral);
        assert_eq!(log.energy, 50);
        assert_eq!(log.hours, 0.0);
        assert_eq!(log.tasks[0].id, "1714521600000");
        assert_eq!(log.completed_count(), 1);
    }

    #[test]
    fn test_dateless_log_takes_date_from_key() {
        let doc = crate::store::Document {
            id: "user_a_2024-05-01".into(),
            data: json!({
                "userId": "user_a",
                "tasks": [{ "id": "t1", "text": "ship", "completed": true }],
            }),
        };
        let log: DailyLog = crate::store::records::decode(&doc).unwrap();
        assert_eq!(log.date, NaiveDate::from_ymd_opt(2024, 5, 1).unwrap());
        assert_eq!(log.completed_count(), 1);
    }

    #[test]
    fn test_log_key() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 9).unwrap();
        assert_eq!(DailyLog::key("user_a", date), "user_a_2024-01-09");
    }

    #[test]
    fn test_feed_event_type_wire() {
        let event = FeedEvent {
            id: "f1".into(),
            user_id: "user_a".into(),
            event_type: FeedEventType::HabitComplete,
            title: "WORKOUT".into(),
            exp: 100,
            timestamp: Utc::now(),
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "habit_complete");
    }

    #[test]
    fn test_presets() {
        assert_eq!(PRESET_HABITS.len(), 10);
        assert!(PRESET_HABITS.iter().all(|p| p.exp > 0));
    }
}
