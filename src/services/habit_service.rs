//! Habit toggling and management
//!
//! Completing a habit credits its owner and appends a feed event; undoing it
//! debits the owner and leaves the feed untouched. The habit update, the
//! points adjustment and the feed append are one atomic batch.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, info};

use super::events::{EventBus, QuestEvent};
use crate::clock::Clock;
use crate::error::QuestError;
use crate::models::{
    defaults, FeedEvent, FeedEventType, Habit, HabitEdit, NewHabit, User, PRESET_HABITS,
};
use crate::session::Session;
use crate::store::records::encode;
use crate::store::{Collection, Records, WriteBatch};

/// Changes a toggle will make, computed from the habit as read
#[derive(Debug, Clone, PartialEq)]
pub struct TogglePlan {
    /// True when the habit goes from not done to done today
    pub completing: bool,
    pub last_completed: Option<NaiveDate>,
    pub streak: u64,
    /// Signed change to the owner's points, clamped at 0 on commit
    pub points_delta: i64,
    pub feed_event: Option<FeedEvent>,
}

/// Plan a toggle of `habit` on `today`
pub fn plan_toggle(habit: &Habit, today: NaiveDate, now: DateTime<Utc>) -> TogglePlan {
    let exp = i64::from(habit.exp);

    if habit.is_done_on(today) {
        TogglePlan {
            completing: false,
            last_completed: None,
            streak: habit.streak.saturating_sub(1),
            points_delta: -exp,
            feed_event: None,
        }
    } else {
        TogglePlan {
            completing: true,
            last_completed: Some(today),
            streak: habit.streak.saturating_add(1),
            points_delta: exp,
            feed_event: Some(FeedEvent {
                id: uuid::Uuid::new_v4().to_string(),
                user_id: habit.user_id.clone(),
                event_type: FeedEventType::HabitComplete,
                title: habit.title.clone(),
                exp: u64::from(habit.exp),
                timestamp: now,
            }),
        }
    }
}

impl TogglePlan {
    fn into_batch(self, habit_id: &str, user_id: &str) -> Result<WriteBatch, QuestError> {
        let mut fields = Map::new();
        fields.insert(
            "lastCompleted".into(),
            serde_json::to_value(self.last_completed)?,
        );
        fields.insert("streak".into(), Value::from(self.streak));

        let mut batch = WriteBatch::new()
            .update(Collection::Habits, habit_id, fields)
            .adjust(Collection::Users, user_id, "points", self.points_delta);

        if let Some(event) = &self.feed_event {
            batch = batch.append(Collection::Feed, event.id.clone(), encode(event)?);
        }
        Ok(batch)
    }
}

/// Result of a toggle as shown to the member
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToggleOutcome {
    pub habit: Habit,
    pub completed: bool,
    /// Owner's points after the commit
    pub points: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notice: Option<String>,
}

pub struct HabitService {
    records: Records,
    clock: Arc<dyn Clock>,
    events: Arc<EventBus>,
}

impl HabitService {
    pub fn new(records: Records, clock: Arc<dyn Clock>, events: Arc<EventBus>) -> Self {
        Self {
            records,
            clock,
            events,
        }
    }

    /// Habits owned by `user_id`
    pub async fn list_for(&self, user_id: &str) -> Result<Vec<Habit>, QuestError> {
        let habits: Vec<Habit> = self.records.list().await?;
        Ok(habits.into_iter().filter(|h| h.user_id == user_id).collect())
    }

    /// Complete or undo a habit for today
    pub async fn toggle(&self, session: &Session, habit_id: &str) -> Result<ToggleOutcome, QuestError> {
        let _in_flight = session.begin(format!("habit:{}", habit_id))?;
        let uid = session.uid();

        let user: User = self
            .records
            .get(uid)
            .await?
            .ok_or_else(|| QuestError::not_found(Collection::Users, uid))?;
        let habit = self.owned_habit(uid, habit_id).await?;

        let plan = plan_toggle(&habit, self.clock.today(), self.clock.now());
        let completing = plan.completing;
        let mut updated = habit.clone();
        updated.last_completed = plan.last_completed;
        updated.streak = plan.streak;

        self.records
            .store()
            .commit(plan.into_batch(habit_id, &user.uid)?)
            .await?;

        let points = self
            .records
            .get::<User>(uid)
            .await?
            .map(|u| u.points)
            .unwrap_or_default();

        if completing {
            self.events.emit(QuestEvent::HabitCompleted {
                id: habit.id.clone(),
                user_id: uid.to_string(),
                title: habit.title.clone(),
                exp: habit.exp,
            });
        } else {
            self.events.emit(QuestEvent::HabitUndone {
                id: habit.id.clone(),
                user_id: uid.to_string(),
                exp: habit.exp,
            });
        }
        debug!(habit = %habit_id, completing = completing, points = points, "Habit toggled");

        Ok(ToggleOutcome {
            notice: completing.then(|| format!("+{} XP", habit.exp)),
            habit: updated,
            completed: completing,
            points,
        })
    }

    /// Create a habit for the session's member
    pub async fn create(&self, session: &Session, new: NewHabit) -> Result<Habit, QuestError> {
        let habit = self.build(session.uid(), new)?;
        self.records
            .store()
            .commit(WriteBatch::new().append(Collection::Habits, habit.id.clone(), encode(&habit)?))
            .await?;

        self.events.emit(QuestEvent::HabitCreated {
            id: habit.id.clone(),
            user_id: habit.user_id.clone(),
            title: habit.title.clone(),
        });
        Ok(habit)
    }

    /// Add every preset habit; seeding again adds independent copies
    pub async fn seed_presets(&self, session: &Session) -> Result<Vec<Habit>, QuestError> {
        let habits = PRESET_HABITS
            .iter()
            .map(|preset| self.build(session.uid(), NewHabit::from(preset)))
            .collect::<Result<Vec<_>, _>>()?;

        let mut batch = WriteBatch::new();
        for habit in &habits {
            batch = batch.append(Collection::Habits, habit.id.clone(), encode(habit)?);
        }
        self.records.store().commit(batch).await?;

        info!(user = %session.uid(), count = habits.len(), "Seeded preset habits");
        self.events.emit(QuestEvent::HabitsSeeded {
            user_id: session.uid().to_string(),
            count: habits.len(),
        });
        Ok(habits)
    }

    /// Change title, category, exp or description
    pub async fn edit(
        &self,
        session: &Session,
        habit_id: &str,
        edit: HabitEdit,
    ) -> Result<Habit, QuestError> {
        let _in_flight = session.begin(format!("habit:{}", habit_id))?;
        let mut habit = self.owned_habit(session.uid(), habit_id).await?;
        if edit.is_empty() {
            return Ok(habit);
        }

        let mut fields = Map::new();
        if let Some(title) = edit.title {
            let title = non_blank_title(&title)?;
            fields.insert("title".into(), Value::from(title.clone()));
            habit.title = title;
        }
        if let Some(category) = edit.category {
            fields.insert("category".into(), Value::from(category.clone()));
            habit.category = category;
        }
        if let Some(exp) = edit.exp {
            if exp == 0 {
                return Err(QuestError::InvalidInput("exp must be positive".into()));
            }
            fields.insert("exp".into(), Value::from(exp));
            habit.exp = exp;
        }
        if let Some(description) = edit.description {
            fields.insert("description".into(), Value::from(description.clone()));
            habit.description = Some(description);
        }

        self.records
            .store()
            .commit(WriteBatch::new().update(Collection::Habits, habit_id, fields))
            .await?;
        self.events.emit(QuestEvent::HabitEdited {
            id: habit_id.to_string(),
        });
        Ok(habit)
    }

    pub async fn delete(&self, session: &Session, habit_id: &str) -> Result<(), QuestError> {
        let _in_flight = session.begin(format!("habit:{}", habit_id))?;
        self.owned_habit(session.uid(), habit_id).await?;

        self.records
            .store()
            .commit(WriteBatch::new().delete(Collection::Habits, habit_id))
            .await?;
        self.events.emit(QuestEvent::HabitDeleted {
            id: habit_id.to_string(),
        });
        Ok(())
    }

    async fn owned_habit(&self, uid: &str, habit_id: &str) -> Result<Habit, QuestError> {
        let habit: Habit = self
            .records
            .get(habit_id)
            .await?
            .ok_or_else(|| QuestError::not_found(Collection::Habits, habit_id))?;
        if habit.user_id != uid {
            return Err(QuestError::Forbidden(format!(
                "habit {} belongs to another member",
                habit_id
            )));
        }
        Ok(habit)
    }

    fn build(&self, uid: &str, new: NewHabit) -> Result<Habit, QuestError> {
        Ok(Habit {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: uid.to_string(),
            title: non_blank_title(&new.title)?,
            category: new.category,
            exp: if new.exp == 0 {
                defaults::DEFAULT_HABIT_EXP
            } else {
                new.exp
            },
            description: new.description.filter(|d| !d.trim().is_empty()),
            streak: 0,
            last_completed: None,
        })
    }
}

fn non_blank_title(title: &str) -> Result<String, QuestError> {
    let title = title.trim();
    if title.is_empty() {
        return Err(QuestError::InvalidInput("habit title is empty".into()));
    }
    Ok(title.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn habit(streak: u64, last_completed: Option<NaiveDate>) -> Habit {
        Habit {
            id: "h1".into(),
            user_id: "user_a".into(),
            title: "WORKOUT".into(),
            category: "HEALTH".into(),
            exp: 100,
            description: None,
            streak,
            last_completed,
        }
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, d).unwrap()
    }

    #[test]
    fn test_plan_complete() {
        let plan = plan_toggle(&habit(2, Some(day(1))), day(2), Utc::now());
        assert!(plan.completing);
        assert_eq!(plan.last_completed, Some(day(2)));
        assert_eq!(plan.streak, 3);
        assert_eq!(plan.points_delta, 100);

        let event = plan.feed_event.unwrap();
        assert_eq!(event.event_type, FeedEventType::HabitComplete);
        assert_eq!(event.exp, 100);
        assert_eq!(event.user_id, "user_a");
    }

    #[test]
    fn test_plan_undo() {
        let plan = plan_toggle(&habit(3, Some(day(2))), day(2), Utc::now());
        assert!(!plan.completing);
        assert_eq!(plan.last_completed, None);
        assert_eq!(plan.streak, 2);
        assert_eq!(plan.points_delta, -100);
        assert!(plan.feed_event.is_none());
    }

    #[test]
    fn test_plan_undo_streak_floor() {
        let plan = plan_toggle(&habit(0, Some(day(2))), day(2), Utc::now());
        assert_eq!(plan.streak, 0);
    }

    #[test]
    fn test_batch_shape() {
        let batch = plan_toggle(&habit(0, None), day(2), Utc::now())
            .into_batch("h1", "user_a")
            .unwrap();
        assert_eq!(
            batch.touched(),
            vec![Collection::Users, Collection::Habits, Collection::Feed]
        );
        assert_eq!(batch.len(), 3);
    }

    #[test]
    fn test_blank_title_rejected() {
        assert!(non_blank_title("   ").is_err());
        assert_eq!(non_blank_title(" READ ").unwrap(), "READ");
    }
}
