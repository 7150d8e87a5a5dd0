//! Note- and folder-scoped key/value properties, inheritance resolution,
//! and the atomic bulk operations (rename/merge/delete across all notes).

use rusqlite::{params, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

use super::Storage;
use crate::error::Result;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Property {
    pub id: i64,
    pub note_id: i64,
    pub key: String,
    pub value: String,
    pub value_type: String,
    pub sort_order: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FolderProperty {
    pub id: i64,
    pub folder_path: String,
    pub key: String,
    pub value: String,
    pub value_type: String,
}

/// A property as seen by a note, with its provenance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EffectiveProperty {
    pub key: String,
    pub value: String,
    pub value_type: String,
    pub inherited: bool,
    pub inherited_from: Option<String>,
}

/// Result of a bulk property operation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct BulkChange {
    pub affected_count: usize,
    pub notes_affected: usize,
}

fn property_from_row(row: &Row) -> rusqlite::Result<Property> {
    Ok(Property {
        id: row.get(0)?,
        note_id: row.get(1)?,
        key: row.get(2)?,
        value: row.get(3)?,
        value_type: row.get(4)?,
        sort_order: row.get(5)?,
    })
}

impl Storage {
    pub fn get_properties(&self, note_id: i64) -> Result<Vec<Property>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, note_id, key, value, value_type, sort_order
             FROM properties WHERE note_id = ?1 ORDER BY sort_order, id",
        )?;
        let props = stmt
            .query_map(params![note_id], property_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(props)
    }

    pub fn set_property(
        &self,
        note_id: i64,
        key: &str,
        value: &str,
        value_type: &str,
    ) -> Result<i64> {
        let conn = self.conn();
        let next_order: i64 = conn.query_row(
            "SELECT COALESCE(MAX(sort_order), -1) + 1 FROM properties WHERE note_id = ?1",
            params![note_id],
            |r| r.get(0),
        )?;
        conn.execute(
            "INSERT INTO properties (note_id, key, value, value_type, sort_order)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(note_id, key)
             DO UPDATE SET value = excluded.value, value_type = excluded.value_type",
            params![note_id, key, value, value_type, next_order],
        )?;
        let id: i64 = conn.query_row(
            "SELECT id FROM properties WHERE note_id = ?1 AND key = ?2",
            params![note_id, key],
            |r| r.get(0),
        )?;
        Ok(id)
    }

    pub fn delete_property(&self, note_id: i64, key: &str) -> Result<bool> {
        let conn = self.conn();
        let changed = conn.execute(
            "DELETE FROM properties WHERE note_id = ?1 AND key = ?2",
            params![note_id, key],
        )?;
        Ok(changed > 0)
    }

    pub fn get_folder_properties(&self, folder_path: &str) -> Result<Vec<FolderProperty>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, folder_path, key, value, value_type
             FROM folder_properties WHERE folder_path = ?1 ORDER BY key",
        )?;
        let props = stmt
            .query_map(params![folder_path], |row| {
                Ok(FolderProperty {
                    id: row.get(0)?,
                    folder_path: row.get(1)?,
                    key: row.get(2)?,
                    value: row.get(3)?,
                    value_type: row.get(4)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(props)
    }

    pub fn set_folder_property(
        &self,
        folder_path: &str,
        key: &str,
        value: &str,
        value_type: &str,
    ) -> Result<i64> {
        let folder_path = folder_path.trim_end_matches('/');
        let conn = self.conn();
        conn.execute(
            "INSERT INTO folder_properties (folder_path, key, value, value_type)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(folder_path, key)
             DO UPDATE SET value = excluded.value, value_type = excluded.value_type",
            params![folder_path, key, value, value_type],
        )?;
        let id: i64 = conn.query_row(
            "SELECT id FROM folder_properties WHERE folder_path = ?1 AND key = ?2",
            params![folder_path, key],
            |r| r.get(0),
        )?;
        Ok(id)
    }

    pub fn delete_folder_property(&self, folder_path: &str, key: &str) -> Result<bool> {
        let conn = self.conn();
        let changed = conn.execute(
            "DELETE FROM folder_properties WHERE folder_path = ?1 AND key = ?2",
            params![folder_path.trim_end_matches('/'), key],
        )?;
        Ok(changed > 0)
    }

    /// Effective properties for a note: folder-inherited keys from every
    /// enclosing folder (nearest folder wins on conflicts), overridden by
    /// the note's own keys. Each value carries its provenance.
    pub fn effective_properties(
        &self,
        note_id: i64,
        note_path: &str,
    ) -> Result<Vec<EffectiveProperty>> {
        let mut effective: Vec<EffectiveProperty> = Vec::new();

        // Walk ancestors outermost-first so nearer folders overwrite.
        for folder in ancestor_folders(note_path) {
            for fp in self.get_folder_properties(&folder)? {
                let entry = EffectiveProperty {
                    key: fp.key,
                    value: fp.value,
                    value_type: fp.value_type,
                    inherited: true,
                    inherited_from: Some(fp.folder_path),
                };
                match effective.iter_mut().find(|e| e.key == entry.key) {
                    Some(existing) => *existing = entry,
                    None => effective.push(entry),
                }
            }
        }

        for prop in self.get_properties(note_id)? {
            let entry = EffectiveProperty {
                key: prop.key,
                value: prop.value,
                value_type: prop.value_type,
                inherited: false,
                inherited_from: None,
            };
            match effective.iter_mut().find(|e| e.key == entry.key) {
                Some(existing) => *existing = entry,
                None => effective.push(entry),
            }
        }

        Ok(effective)
    }

    /// Renames a key across all notes. Where a note already has the new key,
    /// the renamed value wins.
    pub fn rename_property_key(&self, old_key: &str, new_key: &str) -> Result<BulkChange> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let notes_affected = count_notes_with_key(&tx, old_key)?;
        let affected_count = tx.execute(
            "UPDATE OR REPLACE properties SET key = ?2 WHERE key = ?1",
            params![old_key, new_key],
        )?;
        tx.commit()?;
        Ok(BulkChange {
            affected_count,
            notes_affected,
        })
    }

    /// Renames one value of a key across all notes.
    pub fn rename_property_value(
        &self,
        key: &str,
        old_value: &str,
        new_value: &str,
    ) -> Result<BulkChange> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let notes_affected: i64 = tx.query_row(
            "SELECT COUNT(DISTINCT note_id) FROM properties WHERE key = ?1 AND value = ?2",
            params![key, old_value],
            |r| r.get(0),
        )?;
        let affected_count = tx.execute(
            "UPDATE properties SET value = ?3 WHERE key = ?1 AND value = ?2",
            params![key, old_value, new_value],
        )?;
        tx.commit()?;
        Ok(BulkChange {
            affected_count,
            notes_affected: notes_affected as usize,
        })
    }

    /// Folds `source_key` into `target_key` across all notes. Where a note
    /// has both, the existing target value is kept and the source dropped.
    pub fn merge_property_keys(&self, source_key: &str, target_key: &str) -> Result<BulkChange> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let notes_affected = count_notes_with_key(&tx, source_key)?;
        let mut affected_count = tx.execute(
            "UPDATE OR IGNORE properties SET key = ?2 WHERE key = ?1",
            params![source_key, target_key],
        )?;
        affected_count += tx.execute(
            "DELETE FROM properties WHERE key = ?1",
            params![source_key],
        )?;
        tx.commit()?;
        Ok(BulkChange {
            affected_count,
            notes_affected,
        })
    }

    /// Deletes a key from every note.
    pub fn delete_property_key(&self, key: &str) -> Result<BulkChange> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let notes_affected = count_notes_with_key(&tx, key)?;
        let affected_count = tx.execute("DELETE FROM properties WHERE key = ?1", params![key])?;
        tx.commit()?;
        Ok(BulkChange {
            affected_count,
            notes_affected,
        })
    }

    pub fn property_keys(&self) -> Result<Vec<String>> {
        let conn = self.conn();
        let mut stmt = conn.prepare("SELECT DISTINCT key FROM properties ORDER BY key")?;
        let keys = stmt
            .query_map([], |r| r.get(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(keys)
    }

    pub fn property_values(&self, key: &str) -> Result<Vec<String>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT DISTINCT value FROM properties WHERE key = ?1 ORDER BY value",
        )?;
        let values = stmt
            .query_map(params![key], |r| r.get(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(values)
    }

    /// Distinct items of a list-typed property, comma-split.
    pub fn list_property_values(&self, key: &str) -> Result<Vec<String>> {
        let mut items: Vec<String> = Vec::new();
        for value in self.property_values(key)? {
            for item in value.split(',') {
                let item = item.trim();
                if !item.is_empty() && !items.iter().any(|i| i == item) {
                    items.push(item.to_string());
                }
            }
        }
        items.sort();
        Ok(items)
    }

    pub fn get_property(&self, note_id: i64, key: &str) -> Result<Option<Property>> {
        let conn = self.conn();
        let prop = conn
            .query_row(
                "SELECT id, note_id, key, value, value_type, sort_order
                 FROM properties WHERE note_id = ?1 AND key = ?2",
                params![note_id, key],
                property_from_row,
            )
            .optional()?;
        Ok(prop)
    }
}

fn count_notes_with_key(conn: &rusqlite::Connection, key: &str) -> Result<usize> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(DISTINCT note_id) FROM properties WHERE key = ?1",
        params![key],
        |r| r.get(0),
    )?;
    Ok(count as usize)
}

/// Enclosing folders of a vault-relative path, outermost first.
/// `projects/x/note.md` yields `["projects", "projects/x"]`.
fn ancestor_folders(note_path: &str) -> Vec<String> {
    let mut folders = Vec::new();
    let mut prefix = String::new();
    let components: Vec<&str> = note_path.split('/').collect();
    for component in components.iter().take(components.len().saturating_sub(1)) {
        if !prefix.is_empty() {
            prefix.push('/');
        }
        prefix.push_str(component);
        folders.push(prefix.clone());
    }
    folders
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vault::analyzer::Analysis;

    fn note(storage: &Storage, path: &str) -> i64 {
        storage
            .index_note(path, path, "hash", &Analysis::default())
            .unwrap()
    }

    #[test]
    fn test_ancestor_folders() {
        assert_eq!(
            ancestor_folders("projects/x/note.md"),
            vec!["projects", "projects/x"]
        );
        assert!(ancestor_folders("note.md").is_empty());
    }

    #[test]
    fn test_set_property_upserts() {
        let storage = Storage::open_in_memory().unwrap();
        let id = note(&storage, "a.md");
        storage.set_property(id, "status", "draft", "text").unwrap();
        storage.set_property(id, "status", "final", "text").unwrap();

        let props = storage.get_properties(id).unwrap();
        assert_eq!(props.len(), 1);
        assert_eq!(props[0].value, "final");
    }

    #[test]
    fn test_folder_inheritance_nearest_wins() {
        let storage = Storage::open_in_memory().unwrap();
        let id = note(&storage, "projects/x/note.md");
        storage
            .set_folder_property("projects", "status", "parked", "text")
            .unwrap();
        storage
            .set_folder_property("projects/x", "status", "active", "text")
            .unwrap();

        let effective = storage.effective_properties(id, "projects/x/note.md").unwrap();
        let status = effective.iter().find(|p| p.key == "status").unwrap();
        assert_eq!(status.value, "active");
        assert!(status.inherited);
        assert_eq!(status.inherited_from.as_deref(), Some("projects/x"));
    }

    #[test]
    fn test_note_property_shadows_inherited() {
        let storage = Storage::open_in_memory().unwrap();
        let id = note(&storage, "projects/x/note.md");
        storage
            .set_folder_property("projects/x", "status", "active", "text")
            .unwrap();
        storage.set_property(id, "status", "done", "text").unwrap();

        let effective = storage.effective_properties(id, "projects/x/note.md").unwrap();
        let status = effective.iter().find(|p| p.key == "status").unwrap();
        assert_eq!(status.value, "done");
        assert!(!status.inherited);
        assert_eq!(status.inherited_from, None);
    }

    #[test]
    fn test_rename_key_counts() {
        let storage = Storage::open_in_memory().unwrap();
        let a = note(&storage, "a.md");
        let b = note(&storage, "b.md");
        storage.set_property(a, "prio", "high", "text").unwrap();
        storage.set_property(b, "prio", "low", "text").unwrap();

        let change = storage.rename_property_key("prio", "priority").unwrap();
        assert_eq!(
            change,
            BulkChange {
                affected_count: 2,
                notes_affected: 2
            }
        );
        assert_eq!(storage.property_keys().unwrap(), vec!["priority"]);
    }

    #[test]
    fn test_merge_keys_target_wins_on_conflict() {
        let storage = Storage::open_in_memory().unwrap();
        let a = note(&storage, "a.md");
        let b = note(&storage, "b.md");
        storage.set_property(a, "state", "old", "text").unwrap();
        storage.set_property(a, "status", "kept", "text").unwrap();
        storage.set_property(b, "state", "moved", "text").unwrap();

        let change = storage.merge_property_keys("state", "status").unwrap();
        assert_eq!(change.notes_affected, 2);

        assert_eq!(storage.get_property(a, "status").unwrap().unwrap().value, "kept");
        assert_eq!(storage.get_property(b, "status").unwrap().unwrap().value, "moved");
        assert!(storage.get_property(a, "state").unwrap().is_none());
    }

    #[test]
    fn test_rename_value_and_delete_key() {
        let storage = Storage::open_in_memory().unwrap();
        let a = note(&storage, "a.md");
        let b = note(&storage, "b.md");
        storage.set_property(a, "kind", "blog", "text").unwrap();
        storage.set_property(b, "kind", "blog", "text").unwrap();

        let change = storage.rename_property_value("kind", "blog", "article").unwrap();
        assert_eq!(change.affected_count, 2);
        assert_eq!(storage.property_values("kind").unwrap(), vec!["article"]);

        let change = storage.delete_property_key("kind").unwrap();
        assert_eq!(change.notes_affected, 2);
        assert!(storage.property_keys().unwrap().is_empty());
    }

    #[test]
    fn test_list_property_values() {
        let storage = Storage::open_in_memory().unwrap();
        let a = note(&storage, "a.md");
        let b = note(&storage, "b.md");
        storage.set_property(a, "tags", "urgent,work", "list").unwrap();
        storage.set_property(b, "tags", "home, work", "list").unwrap();

        let items = storage.list_property_values("tags").unwrap();
        assert_eq!(items, vec!["home", "urgent", "work"]);
    }
}
