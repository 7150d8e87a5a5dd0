//! Habits and their dated entries. User-owned rows with no file
//! representation: they survive cache rebuilds by never being derived.

use chrono::NaiveDate;
use rusqlite::{params, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

use super::Storage;
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HabitType {
    Boolean,
    Number,
    Text,
    Rating,
}

impl HabitType {
    pub fn as_str(&self) -> &'static str {
        match self {
            HabitType::Boolean => "boolean",
            HabitType::Number => "number",
            HabitType::Text => "text",
            HabitType::Rating => "rating",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "boolean" => Some(HabitType::Boolean),
            "number" => Some(HabitType::Number),
            "text" => Some(HabitType::Text),
            "rating" => Some(HabitType::Rating),
            _ => None,
        }
    }

    /// Entry values are stored as text, typed by the owning habit.
    pub fn validate_value(&self, value: &str) -> Result<()> {
        let ok = match self {
            HabitType::Boolean => value == "true" || value == "false",
            HabitType::Number => value.parse::<f64>().is_ok(),
            HabitType::Rating => matches!(value.parse::<u8>(), Ok(1..=5)),
            HabitType::Text => true,
        };
        if ok {
            Ok(())
        } else {
            Err(Error::InvalidInput(format!(
                "value {value:?} is not a valid {} entry",
                self.as_str()
            )))
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Habit {
    pub id: i64,
    pub name: String,
    pub habit_type: HabitType,
    pub unit: Option<String>,
    pub target_value: Option<f64>,
    pub color: Option<String>,
    pub archived: bool,
    pub sort_order: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HabitEntry {
    pub id: i64,
    pub habit_id: i64,
    pub date: NaiveDate,
    /// Presence of a time opts this habit-day into multiple entries.
    pub time: Option<String>,
    pub value: String,
    pub notes: Option<String>,
}

fn habit_from_row(row: &Row) -> rusqlite::Result<Habit> {
    let type_str: String = row.get(2)?;
    Ok(Habit {
        id: row.get(0)?,
        name: row.get(1)?,
        habit_type: HabitType::parse(&type_str).unwrap_or(HabitType::Text),
        unit: row.get(3)?,
        target_value: row.get(4)?,
        color: row.get(5)?,
        archived: row.get::<_, i64>(6)? != 0,
        sort_order: row.get(7)?,
    })
}

fn entry_from_row(row: &Row) -> rusqlite::Result<HabitEntry> {
    let date: String = row.get(2)?;
    Ok(HabitEntry {
        id: row.get(0)?,
        habit_id: row.get(1)?,
        date: NaiveDate::parse_from_str(&date, "%Y-%m-%d").map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, Box::new(e))
        })?,
        time: row.get(3)?,
        value: row.get(4)?,
        notes: row.get(5)?,
    })
}

const HABIT_COLS: &str = "id, name, habit_type, unit, target_value, color, archived, sort_order";
const ENTRY_COLS: &str = "id, habit_id, date, time, value, notes";

impl Storage {
    pub fn create_habit(
        &self,
        name: &str,
        habit_type: HabitType,
        unit: Option<&str>,
        target_value: Option<f64>,
        color: Option<&str>,
    ) -> Result<Habit> {
        let conn = self.conn();
        let next_order: i64 = conn.query_row(
            "SELECT COALESCE(MAX(sort_order), -1) + 1 FROM habits",
            [],
            |r| r.get(0),
        )?;
        conn.execute(
            "INSERT INTO habits (name, habit_type, unit, target_value, color, sort_order)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![name, habit_type.as_str(), unit, target_value, color, next_order],
        )?;
        Ok(Habit {
            id: conn.last_insert_rowid(),
            name: name.to_string(),
            habit_type,
            unit: unit.map(str::to_string),
            target_value,
            color: color.map(str::to_string),
            archived: false,
            sort_order: next_order,
        })
    }

    pub fn get_habit(&self, id: i64) -> Result<Option<Habit>> {
        let conn = self.conn();
        let habit = conn
            .query_row(
                &format!("SELECT {HABIT_COLS} FROM habits WHERE id = ?1"),
                params![id],
                habit_from_row,
            )
            .optional()?;
        Ok(habit)
    }

    pub fn list_habits(&self, include_archived: bool) -> Result<Vec<Habit>> {
        let conn = self.conn();
        let sql = if include_archived {
            format!("SELECT {HABIT_COLS} FROM habits ORDER BY sort_order, id")
        } else {
            format!("SELECT {HABIT_COLS} FROM habits WHERE archived = 0 ORDER BY sort_order, id")
        };
        let mut stmt = conn.prepare(&sql)?;
        let habits = stmt
            .query_map([], habit_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(habits)
    }

    /// Full-row update. The habit type is immutable once entries exist,
    /// since changing it would invalidate historical values.
    pub fn update_habit(&self, habit: &Habit) -> Result<bool> {
        let existing = match self.get_habit(habit.id)? {
            Some(h) => h,
            None => return Ok(false),
        };
        if existing.habit_type != habit.habit_type && self.habit_entry_count(habit.id)? > 0 {
            return Err(Error::TypeLocked(habit.id));
        }

        let conn = self.conn();
        let changed = conn.execute(
            "UPDATE habits SET name = ?2, habit_type = ?3, unit = ?4, target_value = ?5,
                               color = ?6, archived = ?7, sort_order = ?8
             WHERE id = ?1",
            params![
                habit.id,
                habit.name,
                habit.habit_type.as_str(),
                habit.unit,
                habit.target_value,
                habit.color,
                habit.archived as i64,
                habit.sort_order
            ],
        )?;
        Ok(changed > 0)
    }

    pub fn archive_habit(&self, id: i64, archived: bool) -> Result<bool> {
        let conn = self.conn();
        let changed = conn.execute(
            "UPDATE habits SET archived = ?2 WHERE id = ?1",
            params![id, archived as i64],
        )?;
        Ok(changed > 0)
    }

    pub fn delete_habit(&self, id: i64) -> Result<bool> {
        let conn = self.conn();
        let changed = conn.execute("DELETE FROM habits WHERE id = ?1", params![id])?;
        Ok(changed > 0)
    }

    fn habit_entry_count(&self, habit_id: i64) -> Result<usize> {
        let conn = self.conn();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM habit_entries WHERE habit_id = ?1",
            params![habit_id],
            |r| r.get(0),
        )?;
        Ok(count as usize)
    }

    /// Logs an entry. Without a time, the entry replaces any existing entry
    /// for that day; with a time, multiple entries per day are allowed.
    pub fn log_habit_entry(
        &self,
        habit_id: i64,
        date: NaiveDate,
        time: Option<&str>,
        value: &str,
        notes: Option<&str>,
    ) -> Result<Option<HabitEntry>> {
        let habit = match self.get_habit(habit_id)? {
            Some(h) => h,
            None => return Ok(None),
        };
        habit.habit_type.validate_value(value)?;

        let date_str = date.format("%Y-%m-%d").to_string();
        let conn = self.conn();
        conn.execute(
            "INSERT INTO habit_entries (habit_id, date, time, value, notes)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(habit_id, date) WHERE time IS NULL
             DO UPDATE SET value = excluded.value, notes = excluded.notes",
            params![habit_id, date_str, time, value, notes],
        )?;
        let id: i64 = match time {
            Some(_) => conn.last_insert_rowid(),
            None => conn.query_row(
                "SELECT id FROM habit_entries WHERE habit_id = ?1 AND date = ?2 AND time IS NULL",
                params![habit_id, date_str],
                |r| r.get(0),
            )?,
        };
        let entry = conn
            .query_row(
                &format!("SELECT {ENTRY_COLS} FROM habit_entries WHERE id = ?1"),
                params![id],
                entry_from_row,
            )
            .optional()?;
        Ok(entry)
    }

    pub fn get_habit_entry(&self, id: i64) -> Result<Option<HabitEntry>> {
        let conn = self.conn();
        let entry = conn
            .query_row(
                &format!("SELECT {ENTRY_COLS} FROM habit_entries WHERE id = ?1"),
                params![id],
                entry_from_row,
            )
            .optional()?;
        Ok(entry)
    }

    pub fn update_habit_entry(&self, entry: &HabitEntry) -> Result<bool> {
        if let Some(habit) = self.get_habit(entry.habit_id)? {
            habit.habit_type.validate_value(&entry.value)?;
        }
        let conn = self.conn();
        let changed = conn.execute(
            "UPDATE habit_entries SET date = ?2, time = ?3, value = ?4, notes = ?5 WHERE id = ?1",
            params![
                entry.id,
                entry.date.format("%Y-%m-%d").to_string(),
                entry.time,
                entry.value,
                entry.notes
            ],
        )?;
        Ok(changed > 0)
    }

    pub fn delete_habit_entry(&self, id: i64) -> Result<bool> {
        let conn = self.conn();
        let changed = conn.execute("DELETE FROM habit_entries WHERE id = ?1", params![id])?;
        Ok(changed > 0)
    }

    pub fn habit_entries_for_range(
        &self,
        habit_id: i64,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<HabitEntry>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {ENTRY_COLS} FROM habit_entries
             WHERE habit_id = ?1 AND date >= ?2 AND date <= ?3
             ORDER BY date, time"
        ))?;
        let entries = stmt
            .query_map(
                params![
                    habit_id,
                    start.format("%Y-%m-%d").to_string(),
                    end.format("%Y-%m-%d").to_string()
                ],
                entry_from_row,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(entries)
    }

    /// Flips a boolean habit for a day. Returns the new state: true when an
    /// entry now exists, false when the existing entry was removed.
    pub fn toggle_habit(&self, habit_id: i64, date: NaiveDate) -> Result<bool> {
        let habit = self
            .get_habit(habit_id)?
            .ok_or_else(|| Error::InvalidInput(format!("no habit with id {habit_id}")))?;
        if habit.habit_type != HabitType::Boolean {
            return Err(Error::InvalidInput(format!(
                "habit {} is not boolean, cannot toggle",
                habit.name
            )));
        }

        let date_str = date.format("%Y-%m-%d").to_string();
        let conn = self.conn();
        let removed = conn.execute(
            "DELETE FROM habit_entries WHERE habit_id = ?1 AND date = ?2 AND time IS NULL",
            params![habit_id, date_str],
        )?;
        if removed > 0 {
            return Ok(false);
        }
        conn.execute(
            "INSERT INTO habit_entries (habit_id, date, value) VALUES (?1, ?2, 'true')",
            params![habit_id, date_str],
        )?;
        Ok(true)
    }
}
