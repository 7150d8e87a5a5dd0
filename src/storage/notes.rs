//! Note rows, their derived rows (todos/tags/backlinks), the full-text
//! index row, and the optional embedding row.

use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

use super::{now_unix, Storage};
use crate::error::Result;
use crate::vault::analyzer::Analysis;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Note {
    pub id: i64,
    pub path: String,
    pub title: String,
    pub hash: String,
    pub pinned: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Todo {
    pub id: i64,
    pub note_id: i64,
    pub line_number: i64,
    pub description: String,
    pub completed: bool,
    pub heading_path: String,
    pub context: Option<String>,
    pub priority: Option<String>,
    pub due_date: Option<NaiveDate>,
    pub created_at: i64,
    pub updated_at: i64,
}

fn note_from_row(row: &Row) -> rusqlite::Result<Note> {
    Ok(Note {
        id: row.get(0)?,
        path: row.get(1)?,
        title: row.get(2)?,
        hash: row.get(3)?,
        pinned: row.get::<_, i64>(4)? != 0,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

fn todo_from_row(row: &Row) -> rusqlite::Result<Todo> {
    let due: Option<String> = row.get(8)?;
    Ok(Todo {
        id: row.get(0)?,
        note_id: row.get(1)?,
        line_number: row.get(2)?,
        description: row.get(3)?,
        completed: row.get::<_, i64>(4)? != 0,
        heading_path: row.get(5)?,
        context: row.get(6)?,
        priority: row.get(7)?,
        due_date: due.and_then(|d| NaiveDate::parse_from_str(&d, "%Y-%m-%d").ok()),
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
    })
}

const NOTE_COLS: &str = "id, path, title, hash, pinned, created_at, updated_at";
const TODO_COLS: &str = "id, note_id, line_number, description, completed, heading_path, \
                         context, priority, due_date, created_at, updated_at";

impl Storage {
    /// Upserts the note row and replaces every derived row for it (todos,
    /// tags, backlinks and the full-text row) in a single transaction.
    /// Derived rows have no stable identity across edits, so replacement is
    /// delete-then-insert. Returns the note id.
    pub fn index_note(
        &self,
        path: &str,
        title: &str,
        hash: &str,
        analysis: &Analysis,
    ) -> Result<i64> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let now = now_unix();

        let existing: Option<i64> = tx
            .query_row("SELECT id FROM notes WHERE path = ?1", params![path], |r| {
                r.get(0)
            })
            .optional()?;

        let note_id = match existing {
            Some(id) => {
                tx.execute(
                    "UPDATE notes SET title = ?2, hash = ?3, updated_at = ?4 WHERE id = ?1",
                    params![id, title, hash, now],
                )?;
                id
            }
            None => {
                tx.execute(
                    "INSERT INTO notes (path, title, hash, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?4)",
                    params![path, title, hash, now],
                )?;
                tx.last_insert_rowid()
            }
        };

        tx.execute("DELETE FROM todos WHERE note_id = ?1", params![note_id])?;
        tx.execute("DELETE FROM tags WHERE note_id = ?1", params![note_id])?;
        tx.execute(
            "DELETE FROM backlinks WHERE from_note_id = ?1",
            params![note_id],
        )?;

        for todo in &analysis.todos {
            tx.execute(
                "INSERT INTO todos (note_id, line_number, description, completed, heading_path,
                                    context, priority, due_date, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)",
                params![
                    note_id,
                    todo.line_number as i64,
                    todo.description,
                    todo.completed as i64,
                    todo.heading_path,
                    todo.context,
                    todo.priority,
                    todo.due_date.map(|d| d.format("%Y-%m-%d").to_string()),
                    now,
                ],
            )?;
        }

        for tag in &analysis.tags {
            tx.execute(
                "INSERT OR IGNORE INTO tags (note_id, tag) VALUES (?1, ?2)",
                params![note_id, tag],
            )?;
        }

        for target in &analysis.links {
            // Dangling links produce no row.
            if let Some(to_id) = resolve_link_target(&tx, target)? {
                if to_id != note_id {
                    tx.execute(
                        "INSERT OR IGNORE INTO backlinks (from_note_id, to_note_id) VALUES (?1, ?2)",
                        params![note_id, to_id],
                    )?;
                }
            }
        }

        let fts_content = format!("{} {}", title, analysis.plain_text);
        tx.execute("DELETE FROM notes_fts WHERE rowid = ?1", params![note_id])?;
        tx.execute(
            "INSERT INTO notes_fts (rowid, content) VALUES (?1, ?2)",
            params![note_id, fts_content],
        )?;
        // Content changed, so any stored vector is stale; drop it and let
        // the next semantic search backfill it.
        tx.execute(
            "DELETE FROM embeddings WHERE note_id = ?1",
            params![note_id],
        )?;

        tx.commit()?;
        Ok(note_id)
    }

    /// Deletes the note row; properties/tags/backlinks/todos cascade, the
    /// embedding cascades, and schedule blocks only lose their reference.
    /// Returns the deleted note's id, or None if the path was not indexed.
    pub fn delete_note_by_path(&self, path: &str) -> Result<Option<i64>> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        let id: Option<i64> = tx
            .query_row("SELECT id FROM notes WHERE path = ?1", params![path], |r| {
                r.get(0)
            })
            .optional()?;

        if let Some(id) = id {
            tx.execute("DELETE FROM notes WHERE id = ?1", params![id])?;
            tx.execute("DELETE FROM notes_fts WHERE rowid = ?1", params![id])?;
        }

        tx.commit()?;
        Ok(id)
    }

    /// Renames a note in place, preserving its id and user-set properties.
    pub fn rename_note(&self, old_path: &str, new_path: &str) -> Result<Option<i64>> {
        let conn = self.conn();
        let id: Option<i64> = conn
            .query_row(
                "SELECT id FROM notes WHERE path = ?1",
                params![old_path],
                |r| r.get(0),
            )
            .optional()?;
        if let Some(id) = id {
            conn.execute(
                "UPDATE notes SET path = ?2, updated_at = ?3 WHERE id = ?1",
                params![id, new_path, now_unix()],
            )?;
        }
        Ok(id)
    }

    pub fn get_note(&self, id: i64) -> Result<Option<Note>> {
        let conn = self.conn();
        let note = conn
            .query_row(
                &format!("SELECT {NOTE_COLS} FROM notes WHERE id = ?1"),
                params![id],
                note_from_row,
            )
            .optional()?;
        Ok(note)
    }

    pub fn get_note_by_path(&self, path: &str) -> Result<Option<Note>> {
        let conn = self.conn();
        let note = conn
            .query_row(
                &format!("SELECT {NOTE_COLS} FROM notes WHERE path = ?1"),
                params![path],
                note_from_row,
            )
            .optional()?;
        Ok(note)
    }

    pub fn note_hash(&self, path: &str) -> Result<Option<String>> {
        let conn = self.conn();
        let hash = conn
            .query_row(
                "SELECT hash FROM notes WHERE path = ?1",
                params![path],
                |r| r.get(0),
            )
            .optional()?;
        Ok(hash)
    }

    pub fn list_notes(&self) -> Result<Vec<Note>> {
        let conn = self.conn();
        let mut stmt =
            conn.prepare(&format!("SELECT {NOTE_COLS} FROM notes ORDER BY id"))?;
        let notes = stmt
            .query_map([], note_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(notes)
    }

    pub fn set_pinned(&self, note_id: i64, pinned: bool) -> Result<()> {
        let conn = self.conn();
        conn.execute(
            "UPDATE notes SET pinned = ?2 WHERE id = ?1",
            params![note_id, pinned as i64],
        )?;
        Ok(())
    }

    pub fn tags_for(&self, note_id: i64) -> Result<Vec<String>> {
        let conn = self.conn();
        let mut stmt = conn.prepare("SELECT tag FROM tags WHERE note_id = ?1 ORDER BY tag")?;
        let tags = stmt
            .query_map(params![note_id], |r| r.get(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(tags)
    }

    /// Notes that link to the given note.
    pub fn backlinks_for(&self, note_id: i64) -> Result<Vec<Note>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {NOTE_COLS} FROM notes
             WHERE id IN (SELECT from_note_id FROM backlinks WHERE to_note_id = ?1)
             ORDER BY id"
        ))?;
        let notes = stmt
            .query_map(params![note_id], note_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(notes)
    }

    pub fn todos_for(&self, note_id: i64) -> Result<Vec<Todo>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {TODO_COLS} FROM todos WHERE note_id = ?1 ORDER BY line_number"
        ))?;
        let todos = stmt
            .query_map(params![note_id], todo_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(todos)
    }

    pub fn get_todo(&self, id: i64) -> Result<Option<Todo>> {
        let conn = self.conn();
        let todo = conn
            .query_row(
                &format!("SELECT {TODO_COLS} FROM todos WHERE id = ?1"),
                params![id],
                todo_from_row,
            )
            .optional()?;
        Ok(todo)
    }

    pub fn list_todos(&self) -> Result<Vec<Todo>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {TODO_COLS} FROM todos ORDER BY note_id, line_number"
        ))?;
        let todos = stmt
            .query_map([], todo_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(todos)
    }

    /// BM25-ranked full-text hits, best first. Never called with an empty
    /// query: the FTS table is not consulted when there is no lexical term.
    pub fn fts_search(&self, query: &str, limit: usize) -> Result<Vec<(i64, f64)>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT rowid, bm25(notes_fts) AS score FROM notes_fts
             WHERE notes_fts MATCH ?1 ORDER BY score LIMIT ?2",
        )?;
        let hits = stmt
            .query_map(params![query, limit as i64], |r| {
                Ok((r.get::<_, i64>(0)?, r.get::<_, f64>(1)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(hits)
    }

    /// The indexed text for one note, as fed to the FTS table. Used as the
    /// embedding source so vectors and lexical search see the same text.
    pub fn fts_content(&self, note_id: i64) -> Result<Option<String>> {
        let conn = self.conn();
        let content = conn
            .query_row(
                "SELECT content FROM notes_fts WHERE rowid = ?1",
                params![note_id],
                |r| r.get(0),
            )
            .optional()?;
        Ok(content)
    }

    pub fn upsert_embedding(&self, note_id: i64, vector: &[f32]) -> Result<()> {
        let mut bytes = Vec::with_capacity(vector.len() * 4);
        for v in vector {
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        let conn = self.conn();
        conn.execute(
            "INSERT OR REPLACE INTO embeddings (note_id, vector, updated_at) VALUES (?1, ?2, ?3)",
            params![note_id, bytes, now_unix()],
        )?;
        Ok(())
    }

    pub fn embedding_for(&self, note_id: i64) -> Result<Option<Vec<f32>>> {
        let conn = self.conn();
        let bytes: Option<Vec<u8>> = conn
            .query_row(
                "SELECT vector FROM embeddings WHERE note_id = ?1",
                params![note_id],
                |r| r.get(0),
            )
            .optional()?;
        Ok(bytes.map(|b| decode_vector(&b)))
    }

    pub fn all_embeddings(&self) -> Result<Vec<(i64, Vec<f32>)>> {
        let conn = self.conn();
        let mut stmt = conn.prepare("SELECT note_id, vector FROM embeddings")?;
        let rows = stmt
            .query_map([], |r| Ok((r.get::<_, i64>(0)?, r.get::<_, Vec<u8>>(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows
            .into_iter()
            .map(|(id, bytes)| (id, decode_vector(&bytes)))
            .collect())
    }
}

fn decode_vector(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

/// Resolves a `[[wikilink]]` target against indexed notes: exact path,
/// path with `.md` appended, file stem, then title.
fn resolve_link_target(conn: &Connection, target: &str) -> Result<Option<i64>> {
    let with_md = if target.ends_with(".md") {
        target.to_string()
    } else {
        format!("{target}.md")
    };

    let id: Option<i64> = conn
        .query_row(
            "SELECT id FROM notes WHERE path = ?1 OR path = ?2
             OR path LIKE '%/' || ?2 OR title = ?1
             ORDER BY id LIMIT 1",
            params![target, with_md],
            |r| r.get(0),
        )
        .optional()?;
    Ok(id)
}
