//! Lenient field decoders for stored documents
//!
//! Documents written by older clients can carry missing, null, negative or
//! mistyped fields. These decoders substitute defaults instead of failing
//! the whole record.

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

use super::{Mood, Task};

/// Experience value used when a habit has none (or a non-positive one)
pub const DEFAULT_HABIT_EXP: u32 = 10;

/// Energy level of a fresh log
pub const DEFAULT_ENERGY: u8 = 50;

/// Non-negative counter: points, streaks. Anything else becomes 0.
pub fn count<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(value_to_count(&value))
}

pub(crate) fn value_to_count(value: &Value) -> u64 {
    match value {
        Value::Number(n) => {
            if let Some(u) = n.as_u64() {
                u
            } else if let Some(f) = n.as_f64() {
                if f.is_finite() && f > 0.0 {
                    f.floor() as u64
                } else {
                    0
                }
            } else {
                0
            }
        }
        Value::String(s) => s.trim().parse().unwrap_or(0),
        _ => 0,
    }
}

/// Habit experience: positive integer, [`DEFAULT_HABIT_EXP`] otherwise
pub fn habit_exp<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
    let value = Value::deserialize(deserializer)?;
    let exp = value_to_count(&value);
    if exp == 0 {
        Ok(DEFAULT_HABIT_EXP)
    } else {
        Ok(exp.min(u32::MAX as u64) as u32)
    }
}

pub fn default_habit_exp() -> u32 {
    DEFAULT_HABIT_EXP
}

/// Energy in 0..=100
pub fn energy<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u8, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Null => DEFAULT_ENERGY,
        other => value_to_count(&other).min(100) as u8,
    })
}

pub fn default_energy() -> u8 {
    DEFAULT_ENERGY
}

/// Hours worked; negative or non-numeric becomes 0
pub fn hours<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    let value = Value::deserialize(deserializer)?;
    let hours = match value {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => s.trim().parse().unwrap_or(0.0),
        _ => 0.0,
    };
    Ok(if hours.is_finite() && hours > 0.0 { hours } else { 0.0 })
}

/// Optional date; unparsable strings read as `None`
pub fn optional_date<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<NaiveDate>, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::String(s) => NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").ok(),
        _ => None,
    })
}

/// Required date; unparsable values read as the epoch until the key restores them
pub fn date<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveDate, D::Error> {
    optional_date(deserializer).map(Option::unwrap_or_default)
}

/// Date suffix of a `<userId>_<YYYY-MM-DD>` log key
pub fn date_from_log_key(key: &str) -> Option<NaiveDate> {
    let (_, date) = key.rsplit_once('_')?;
    NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()
}

/// Mood; unknown or null values read as NEUTRAL
pub fn mood<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Mood, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).unwrap_or_default())
}

/// Task list; a missing list is empty and undecodable entries are dropped
pub fn tasks<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<Task>, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Array(items) => items
            .into_iter()
            .filter_map(|item| serde_json::from_value(item).ok())
            .collect(),
        _ => Vec::new(),
    })
}

/// Identifier that may have been stored as a number (millisecond timestamps)
pub fn flexible_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::String(s) => s,
        Value::Number(n) => n.to_string(),
        _ => String::new(),
    })
}

/// String field that tolerates null
pub fn text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    })
}

/// Boolean that tolerates null and 0/1
pub fn flag<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Bool(b) => b,
        Value::Number(n) => n.as_u64().unwrap_or(0) != 0,
        _ => false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_value_to_count() {
        assert_eq!(value_to_count(&json!(42)), 42);
        assert_eq!(value_to_count(&json!(-5)), 0);
        assert_eq!(value_to_count(&json!(12.9)), 12);
        assert_eq!(value_to_count(&json!("17")), 17);
        assert_eq!(value_to_count(&json!(null)), 0);
        assert_eq!(value_to_count(&json!({"nested": 1})), 0);
    }

    #[test]
    fn test_date_from_log_key() {
        assert_eq!(
            date_from_log_key("user_rushu_2024-05-01"),
            NaiveDate::from_ymd_opt(2024, 5, 1)
        );
        assert_eq!(date_from_log_key("user_rushu"), None);
        assert_eq!(date_from_log_key("nodate"), None);
    }
}
