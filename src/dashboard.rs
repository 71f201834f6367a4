//! Derived read views: dashboard, leaderboard, calendar and feed
//!
//! Pure functions over decoded records; nothing here writes.

use chrono::{Datelike, NaiveDate};
use serde::Serialize;
use std::collections::BTreeSet;

use crate::error::QuestError;
use crate::models::{DailyLog, FeedEvent, Habit, User};
use crate::progression::{self, LevelProgress};
use crate::store::Collection;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub uid: String,
    pub name: String,
    pub avatar: String,
    pub color: String,
    pub points: u64,
    pub streak: u64,
    pub level: u32,
    pub progress: LevelProgress,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub goal: Option<String>,
}

impl From<&User> for UserSummary {
    fn from(user: &User) -> Self {
        Self {
            uid: user.uid.clone(),
            name: user.name.clone(),
            avatar: user.avatar.clone(),
            color: user.color.clone(),
            points: user.points,
            streak: user.streak,
            level: progression::level(user.points),
            progress: LevelProgress::for_exp(user.points),
            goal: user.goal.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardSummary {
    pub me: UserSummary,
    /// The other member, once they have logged in at least once
    pub partner: Option<UserSummary>,
    pub habits_done_today: usize,
    pub habits_total: usize,
}

/// `partner_uid` is the other roster member, see [`crate::roster::Roster::partner_of`]
pub fn dashboard(
    uid: &str,
    partner_uid: Option<&str>,
    users: &[User],
    habits: &[Habit],
    today: NaiveDate,
) -> Result<DashboardSummary, QuestError> {
    let me = users
        .iter()
        .find(|u| u.uid == uid)
        .ok_or_else(|| QuestError::not_found(Collection::Users, uid))?;
    let partner = partner_uid.and_then(|p| users.iter().find(|u| u.uid == p));

    let mine = habits.iter().filter(|h| h.user_id == uid);
    let habits_total = mine.clone().count();
    let habits_done_today = mine.filter(|h| h.is_done_on(today)).count();

    Ok(DashboardSummary {
        me: me.into(),
        partner: partner.map(UserSummary::from),
        habits_done_today,
        habits_total,
    })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    pub rank: usize,
    pub uid: String,
    pub name: String,
    pub avatar: String,
    pub points: u64,
    pub level: u32,
}

/// Users by points, highest first; ties by name
pub fn leaderboard(users: &[User]) -> Vec<LeaderboardEntry> {
    let mut sorted: Vec<&User> = users.iter().collect();
    sorted.sort_by(|a, b| b.points.cmp(&a.points).then_with(|| a.name.cmp(&b.name)));

    sorted
        .into_iter()
        .enumerate()
        .map(|(i, user)| LeaderboardEntry {
            rank: i + 1,
            uid: user.uid.clone(),
            name: user.name.clone(),
            avatar: user.avatar.clone(),
            points: user.points,
            level: progression::level(user.points),
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarDay {
    pub date: NaiveDate,
    pub day: u32,
    pub has_log: bool,
    pub is_today: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarMonth {
    pub year: i32,
    pub month: u32,
    /// Empty cells before the 1st in a Sunday-first week grid
    pub leading_blanks: u32,
    pub days: Vec<CalendarDay>,
    /// Distinct dates in the month with a log by this member
    pub active_days: usize,
}

pub fn calendar_month(
    uid: &str,
    logs: &[DailyLog],
    year: i32,
    month: u32,
    today: NaiveDate,
) -> Result<CalendarMonth, QuestError> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)
        .ok_or_else(|| QuestError::InvalidInput(format!("no such month: {}-{}", year, month)))?;

    let logged: BTreeSet<NaiveDate> = logs
        .iter()
        .filter(|l| l.user_id == uid && l.date.year() == year && l.date.month() == month)
        .map(|l| l.date)
        .collect();

    let days = first
        .iter_days()
        .take_while(|d| d.month() == month)
        .map(|date| CalendarDay {
            date,
            day: date.day(),
            has_log: logged.contains(&date),
            is_today: date == today,
        })
        .collect();

    Ok(CalendarMonth {
        year,
        month,
        leading_blanks: first.weekday().num_days_from_sunday(),
        days,
        active_days: logged.len(),
    })
}

/// Feed events, most recent first
pub fn recent_feed(mut events: Vec<FeedEvent>) -> Vec<FeedEvent> {
    events.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then_with(|| a.id.cmp(&b.id)));
    events
}
