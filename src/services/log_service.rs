//! Daily log editing and synchronization
//!
//! A saved log is credited by the change in completed tasks against the log
//! previously stored for the same member and date, so saving the same log
//! twice earns nothing the second time.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use super::events::{EventBus, QuestEvent};
use crate::clock::Clock;
use crate::error::QuestError;
use crate::models::{defaults, DailyLog, Mood, Task};
use crate::session::Session;
use crate::store::records::encode;
use crate::store::{Collection, Records, WriteBatch};

/// Points per newly completed task
pub const XP_PER_TASK: i64 = 20;

/// Points earned (or lost) by replacing `previous` with `next`
pub fn xp_delta(previous: Option<&DailyLog>, next: &DailyLog) -> i64 {
    let before = previous.map(DailyLog::completed_count).unwrap_or(0) as i64;
    let after = next.completed_count() as i64;
    (after - before) * XP_PER_TASK
}

/// A log being edited before it is saved
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogDraft {
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

impl Default for LogDraft {
    fn default() -> Self {
        Self {
            tasks: Vec::new(),
            mood: Mood::Neutral,
            energy: defaults::DEFAULT_ENERGY,
            hours: 0.0,
            note: String::new(),
        }
    }
}

impl LogDraft {
    pub fn from_log(log: &DailyLog) -> Self {
        Self {
            tasks: log.tasks.clone(),
            mood: log.mood,
            energy: log.energy,
            hours: log.hours,
            note: log.note.clone(),
        }
    }

    /// Add an open task; blank text adds nothing
    pub fn add_task(&mut self, text: &str) -> Option<&Task> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }
        self.tasks.push(Task {
            id: uuid::Uuid::new_v4().to_string(),
            text: text.to_string(),
            completed: false,
        });
        self.tasks.last()
    }

    pub fn toggle_task(&mut self, task_id: &str) -> bool {
        match self.tasks.iter_mut().find(|t| t.id == task_id) {
            Some(task) => {
                task.completed = !task.completed;
                true
            }
            None => false,
        }
    }

    pub fn delete_task(&mut self, task_id: &str) -> bool {
        let before = self.tasks.len();
        self.tasks.retain(|t| t.id != task_id);
        self.tasks.len() != before
    }

    pub fn set_mood(&mut self, mood: Mood) {
        self.mood = mood;
    }

    /// Clamped to 0..=100
    pub fn set_energy(&mut self, energy: i64) {
        self.energy = energy.clamp(0, 100) as u8;
    }

    /// Non-negative, in half-hour steps
    pub fn set_hours(&mut self, hours: f64) {
        self.hours = if hours.is_finite() && hours > 0.0 {
            (hours * 2.0).round() / 2.0
        } else {
            0.0
        };
    }

    pub fn set_note(&mut self, note: impl Into<String>) {
        self.note = note.into();
    }

    pub fn completed_count(&self) -> usize {
        self.tasks.iter().filter(|t| t.completed).count()
    }

    /// The full log stored for `user_id` on `date`
    pub fn into_log(self, user_id: &str, date: NaiveDate) -> DailyLog {
        DailyLog {
            id: DailyLog::key(user_id, date),
            user_id: user_id.to_string(),
            date,
            tasks: self.tasks,
            mood: self.mood,
            energy: self.energy.min(100),
            hours: if self.hours.is_finite() && self.hours > 0.0 {
                self.hours
            } else {
                0.0
            },
            note: self.note,
        }
    }
}

/// Result of a save as shown to the member
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogSaveOutcome {
    pub log: DailyLog,
    pub xp_delta: i64,
    /// Member's points after the commit
    pub points: u64,
    pub notice: String,
}

pub struct LogService {
    records: Records,
    clock: Arc<dyn Clock>,
    events: Arc<EventBus>,
}

impl LogService {
    pub fn new(records: Records, clock: Arc<dyn Clock>, events: Arc<EventBus>) -> Self {
        Self {
            records,
            clock,
            events,
        }
    }

    pub async fn load(&self, user_id: &str, date: NaiveDate) -> Result<Option<DailyLog>, QuestError> {
        self.records.get(&DailyLog::key(user_id, date)).await
    }

    /// Today's stored log for the session's member, if any
    pub async fn today(&self, session: &Session) -> Result<Option<DailyLog>, QuestError> {
        self.load(session.uid(), self.clock.today()).await
    }

    /// Start editing today's log from what is stored, or from defaults
    pub async fn draft_today(&self, session: &Session) -> Result<LogDraft, QuestError> {
        Ok(self
            .today(session)
            .await?
            .as_ref()
            .map(LogDraft::from_log)
            .unwrap_or_default())
    }

    /// Save the draft as today's log
    pub async fn save_today(
        &self,
        session: &Session,
        draft: LogDraft,
    ) -> Result<LogSaveOutcome, QuestError> {
        self.save(session, self.clock.today(), draft).await
    }

    /// Overwrite the member's log for `date` and credit the completion change
    pub async fn save(
        &self,
        session: &Session,
        date: NaiveDate,
        draft: LogDraft,
    ) -> Result<LogSaveOutcome, QuestError> {
        let uid = session.uid();
        let log = draft.into_log(uid, date);
        let _in_flight = session.begin(format!("log:{}", log.id))?;

        let previous: Option<DailyLog> = self.records.get(&log.id).await?;
        let delta = xp_delta(previous.as_ref(), &log);

        let mut batch = WriteBatch::new();
        if delta != 0 {
            batch = batch.adjust(Collection::Users, uid, "points", delta);
        }
        batch = batch.set(Collection::Logs, log.id.clone(), encode(&log)?);
        self.records.store().commit(batch).await?;

        let points = self
            .records
            .get::<crate::models::User>(uid)
            .await?
            .map(|u| u.points)
            .unwrap_or_default();

        self.events.emit(QuestEvent::LogSaved {
            id: log.id.clone(),
            user_id: uid.to_string(),
            xp_delta: delta,
        });
        debug!(log = %log.id, xp_delta = delta, "Log synchronized");

        let notice = if delta > 0 {
            format!("Log Saved. +{} XP", delta)
        } else {
            "Log Saved.".to_string()
        };

        Ok(LogSaveOutcome {
            log,
            xp_delta: delta,
            points,
            notice,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn log_with(completed: usize, open: usize) -> DailyLog {
        let mut draft = LogDraft::default();
        for i in 0..completed + open {
            let id = draft.add_task(&format!("task {}", i)).unwrap().id.clone();
            if i < completed {
                draft.toggle_task(&id);
            }
        }
        draft.into_log("user_a", NaiveDate::from_ymd_opt(2024, 5, 1).unwrap())
    }

    #[test]
    fn test_xp_delta() {
        assert_eq!(xp_delta(Some(&log_with(2, 1)), &log_with(5, 0)), 60);
        assert_eq!(xp_delta(None, &log_with(3, 2)), 60);
        assert_eq!(xp_delta(Some(&log_with(3, 0)), &log_with(3, 0)), 0);
        assert_eq!(xp_delta(Some(&log_with(3, 0)), &log_with(1, 2)), -40);
    }

    #[test]
    fn test_draft_editing() {
        let mut draft = LogDraft::default();
        assert!(draft.add_task("   ").is_none());
        let id = draft.add_task("write tests").unwrap().id.clone();
        assert!(draft.toggle_task(&id));
        assert_eq!(draft.completed_count(), 1);
        assert!(!draft.toggle_task("missing"));
        assert!(draft.delete_task(&id));
        assert!(draft.tasks.is_empty());

        draft.set_energy(140);
        assert_eq!(draft.energy, 100);
        draft.set_energy(-5);
        assert_eq!(draft.energy, 0);

        draft.set_hours(2.3);
        assert_eq!(draft.hours, 2.5);
        draft.set_hours(-1.0);
        assert_eq!(draft.hours, 0.0);
    }

    #[test]
    fn test_draft_into_log_key() {
        let log = LogDraft::default().into_log("user_a", NaiveDate::from_ymd_opt(2024, 2, 29).unwrap());
        assert_eq!(log.id, "user_a_2024-02-29");
        assert_eq!(log.mood, Mood::Neutral);
        assert_eq!(log.energy, 50);
    }

    #[test]
    fn test_draft_from_request_body() {
        let draft: LogDraft = serde_json::from_value(serde_json::json!({
            "tasks": [{ "id": "t1", "text": "ship", "completed": true }],
            "mood": "PEAK",
            "energy": 80,
            "hours": 1.5,
        }))
        .unwrap();
        assert_eq!(draft.completed_count(), 1);
        assert_eq!(draft.mood, Mood::Peak);
        assert_eq!(draft.note, "");
    }
}
