//! Schedule blocks: calendar-time intervals, optionally linked to a note.
//! User-owned rows; deleting the linked note only nulls the reference.

use chrono::NaiveDate;
use rusqlite::{params, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

use super::Storage;
use crate::error::{Error, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleBlock {
    pub id: i64,
    pub note_id: Option<i64>,
    pub date: NaiveDate,
    /// "HH:MM", strictly before `end_time`.
    pub start_time: String,
    pub end_time: String,
    pub label: String,
    pub color: Option<String>,
    pub context: Option<String>,
}

fn block_from_row(row: &Row) -> rusqlite::Result<ScheduleBlock> {
    let date: String = row.get(2)?;
    Ok(ScheduleBlock {
        id: row.get(0)?,
        note_id: row.get(1)?,
        date: NaiveDate::parse_from_str(&date, "%Y-%m-%d").map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, Box::new(e))
        })?,
        start_time: row.get(3)?,
        end_time: row.get(4)?,
        label: row.get(5)?,
        color: row.get(6)?,
        context: row.get(7)?,
    })
}

const BLOCK_COLS: &str = "id, note_id, date, start_time, end_time, label, color, context";

fn check_interval(start_time: &str, end_time: &str) -> Result<()> {
    if start_time >= end_time {
        return Err(Error::InvalidInput(format!(
            "schedule block start {start_time} must be before end {end_time}"
        )));
    }
    Ok(())
}

impl Storage {
    #[allow(clippy::too_many_arguments)]
    pub fn create_schedule_block(
        &self,
        note_id: Option<i64>,
        date: NaiveDate,
        start_time: &str,
        end_time: &str,
        label: &str,
        color: Option<&str>,
        context: Option<&str>,
    ) -> Result<ScheduleBlock> {
        check_interval(start_time, end_time)?;
        let conn = self.conn();
        conn.execute(
            "INSERT INTO schedule_blocks (note_id, date, start_time, end_time, label, color, context)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                note_id,
                date.format("%Y-%m-%d").to_string(),
                start_time,
                end_time,
                label,
                color,
                context
            ],
        )?;
        let id = conn.last_insert_rowid();
        Ok(ScheduleBlock {
            id,
            note_id,
            date,
            start_time: start_time.to_string(),
            end_time: end_time.to_string(),
            label: label.to_string(),
            color: color.map(str::to_string),
            context: context.map(str::to_string),
        })
    }

    pub fn get_schedule_block(&self, id: i64) -> Result<Option<ScheduleBlock>> {
        let conn = self.conn();
        let block = conn
            .query_row(
                &format!("SELECT {BLOCK_COLS} FROM schedule_blocks WHERE id = ?1"),
                params![id],
                block_from_row,
            )
            .optional()?;
        Ok(block)
    }

    /// Full-row update. Returns false when the id does not exist.
    pub fn update_schedule_block(&self, block: &ScheduleBlock) -> Result<bool> {
        check_interval(&block.start_time, &block.end_time)?;
        let conn = self.conn();
        let changed = conn.execute(
            "UPDATE schedule_blocks
             SET note_id = ?2, date = ?3, start_time = ?4, end_time = ?5,
                 label = ?6, color = ?7, context = ?8
             WHERE id = ?1",
            params![
                block.id,
                block.note_id,
                block.date.format("%Y-%m-%d").to_string(),
                block.start_time,
                block.end_time,
                block.label,
                block.color,
                block.context
            ],
        )?;
        Ok(changed > 0)
    }

    pub fn delete_schedule_block(&self, id: i64) -> Result<bool> {
        let conn = self.conn();
        let changed = conn.execute("DELETE FROM schedule_blocks WHERE id = ?1", params![id])?;
        Ok(changed > 0)
    }

    pub fn schedule_for_date(&self, date: NaiveDate) -> Result<Vec<ScheduleBlock>> {
        self.schedule_for_range(date, date)
    }

    pub fn schedule_for_range(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<ScheduleBlock>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {BLOCK_COLS} FROM schedule_blocks
             WHERE date >= ?1 AND date <= ?2 ORDER BY date, start_time"
        ))?;
        let blocks = stmt
            .query_map(
                params![
                    start.format("%Y-%m-%d").to_string(),
                    end.format("%Y-%m-%d").to_string()
                ],
                block_from_row,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(blocks)
    }

    pub fn schedule_for_note(&self, note_id: i64) -> Result<Vec<ScheduleBlock>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {BLOCK_COLS} FROM schedule_blocks
             WHERE note_id = ?1 ORDER BY date, start_time"
        ))?;
        let blocks = stmt
            .query_map(params![note_id], block_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(blocks)
    }
}
