//! SQLite-backed repository for all derived and user-owned entities.
//!
//! One connection per vault behind a mutex: a single logical writer, with
//! every multi-row update for one file inside one transaction. Everything in
//! the `notes`/`properties`/`tags`/`backlinks`/`todos`/FTS tables is
//! disposable and rebuilt from the Markdown corpus; `schedule_blocks`,
//! `habits` and `habit_entries` are user-owned and survive rebuilds.

pub mod habits;
pub mod notes;
pub mod properties;
pub mod schedule;

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use rusqlite::Connection;

use crate::error::Result;

const SCHEMA: &str = "
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS notes (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    path        TEXT UNIQUE NOT NULL,
    title       TEXT NOT NULL,
    hash        TEXT NOT NULL,
    pinned      INTEGER NOT NULL DEFAULT 0,
    created_at  INTEGER NOT NULL,
    updated_at  INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS properties (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    note_id     INTEGER NOT NULL REFERENCES notes(id) ON DELETE CASCADE,
    key         TEXT NOT NULL,
    value       TEXT NOT NULL,
    value_type  TEXT NOT NULL DEFAULT 'text',
    sort_order  INTEGER NOT NULL DEFAULT 0,
    UNIQUE(note_id, key)
);

CREATE TABLE IF NOT EXISTS folder_properties (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    folder_path TEXT NOT NULL,
    key         TEXT NOT NULL,
    value       TEXT NOT NULL,
    value_type  TEXT NOT NULL DEFAULT 'text',
    UNIQUE(folder_path, key)
);

CREATE TABLE IF NOT EXISTS tags (
    note_id     INTEGER NOT NULL REFERENCES notes(id) ON DELETE CASCADE,
    tag         TEXT NOT NULL,
    UNIQUE(note_id, tag)
);

CREATE TABLE IF NOT EXISTS backlinks (
    from_note_id INTEGER NOT NULL REFERENCES notes(id) ON DELETE CASCADE,
    to_note_id   INTEGER NOT NULL REFERENCES notes(id) ON DELETE CASCADE,
    UNIQUE(from_note_id, to_note_id)
);

CREATE TABLE IF NOT EXISTS todos (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    note_id      INTEGER NOT NULL REFERENCES notes(id) ON DELETE CASCADE,
    line_number  INTEGER NOT NULL,
    description  TEXT NOT NULL,
    completed    INTEGER NOT NULL DEFAULT 0,
    heading_path TEXT NOT NULL DEFAULT '',
    context      TEXT,
    priority     TEXT,
    due_date     TEXT,
    created_at   INTEGER NOT NULL,
    updated_at   INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS schedule_blocks (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    note_id    INTEGER REFERENCES notes(id) ON DELETE SET NULL,
    date       TEXT NOT NULL,
    start_time TEXT NOT NULL,
    end_time   TEXT NOT NULL,
    label      TEXT NOT NULL,
    color      TEXT,
    context    TEXT,
    CHECK(start_time < end_time)
);

CREATE TABLE IF NOT EXISTS habits (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    name         TEXT NOT NULL,
    habit_type   TEXT NOT NULL CHECK(habit_type IN ('boolean','number','text','rating')),
    unit         TEXT,
    target_value REAL,
    color        TEXT,
    archived     INTEGER NOT NULL DEFAULT 0,
    sort_order   INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS habit_entries (
    id        INTEGER PRIMARY KEY AUTOINCREMENT,
    habit_id  INTEGER NOT NULL REFERENCES habits(id) ON DELETE CASCADE,
    date      TEXT NOT NULL,
    time      TEXT,
    value     TEXT NOT NULL,
    notes     TEXT
);

-- One entry per habit per day unless an explicit time opts into multiples.
CREATE UNIQUE INDEX IF NOT EXISTS idx_habit_entries_daily
    ON habit_entries(habit_id, date) WHERE time IS NULL;

CREATE VIRTUAL TABLE IF NOT EXISTS notes_fts USING fts5(content);

CREATE TABLE IF NOT EXISTS embeddings (
    note_id    INTEGER PRIMARY KEY REFERENCES notes(id) ON DELETE CASCADE,
    vector     BLOB NOT NULL,
    updated_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_properties_key ON properties(key);
CREATE INDEX IF NOT EXISTS idx_tags_note ON tags(note_id);
CREATE INDEX IF NOT EXISTS idx_todos_note ON todos(note_id);
CREATE INDEX IF NOT EXISTS idx_blocks_date ON schedule_blocks(date);
CREATE INDEX IF NOT EXISTS idx_entries_habit ON habit_entries(habit_id, date);
";

#[derive(Clone)]
pub struct Storage {
    conn: Arc<Mutex<Connection>>,
}

impl Storage {
    pub fn open(db_path: &Path) -> Result<Self> {
        let conn = Connection::open(db_path)?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub(crate) fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Drops all derived rows so the index can be rebuilt from the Markdown
    /// corpus. Schedule blocks lose their note reference (FK set-null);
    /// habits and their entries are untouched.
    pub fn clear_derived(&self) -> Result<()> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM notes", [])?;
        tx.execute("DELETE FROM notes_fts", [])?;
        tx.commit()?;
        Ok(())
    }

    pub fn note_count(&self) -> Result<usize> {
        let conn = self.conn();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM notes", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

pub(crate) fn now_unix() -> i64 {
    chrono::Utc::now().timestamp()
}
