//! The vault: one root directory of Markdown files, its SQLite index, the
//! watcher keeping the two consistent, and the file-touching note
//! operations. All state is carried by this handle; there is no ambient
//! "current vault".

pub mod analyzer;
pub mod files;
pub mod sync;
pub mod watcher;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::info;

use crate::config::{VaultConfig, VAULT_DATA_DIR, VAULT_DB_FILE};
use crate::error::{Error, Result};
use crate::events::{EventBus, VaultEvent};
use crate::storage::notes::Todo;
use crate::storage::Storage;
use analyzer::Analyzer;
use sync::{SyncEngine, SyncOutcome};
use watcher::WatcherHandle;

#[derive(Debug, Clone, Serialize)]
pub struct VaultInfo {
    pub root: PathBuf,
    pub note_count: usize,
    pub watching: bool,
    pub config: VaultConfig,
}

pub struct VaultOptions {
    pub debounce: Duration,
    pub watch: bool,
    /// App-level default for semantic search, applied when the vault has no
    /// saved config of its own.
    pub semantic_search: bool,
}

impl Default for VaultOptions {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(300),
            watch: true,
            semantic_search: false,
        }
    }
}

pub struct Vault {
    root: PathBuf,
    config: VaultConfig,
    storage: Storage,
    sync: SyncEngine,
    events: EventBus,
    watcher: Option<WatcherHandle>,
}

impl Vault {
    /// Opens a vault: loads its config, opens the index database, runs the
    /// initial full scan, then starts the live watcher.
    pub fn open(root: &Path, options: VaultOptions) -> Result<Self> {
        let root = root
            .canonicalize()
            .map_err(|e| Error::io(root, e))?;
        if !root.is_dir() {
            return Err(Error::Config(format!(
                "vault root {} is not a directory",
                root.display()
            )));
        }

        let mut config = VaultConfig::load(&root)?;
        if !VaultConfig::path_for(&root).exists() {
            config.semantic_search = options.semantic_search;
        }
        let data_dir = root.join(VAULT_DATA_DIR);
        fs::create_dir_all(&data_dir).map_err(|e| Error::io(&data_dir, e))?;
        let storage = Storage::open(&data_dir.join(VAULT_DB_FILE))?;

        let analyzer =
            Arc::new(Analyzer::new().map_err(|e| Error::Config(e.to_string()))?);
        let events = EventBus::default();
        let sync = SyncEngine::new(root.clone(), storage.clone(), analyzer, events.clone());

        info!("opening vault at {}", root.display());
        sync.initial_scan()?;

        let watcher = if options.watch {
            Some(WatcherHandle::spawn(
                root.clone(),
                options.debounce,
                sync.clone(),
                events.clone(),
            )?)
        } else {
            None
        };

        Ok(Self {
            root,
            config,
            storage,
            sync,
            events,
            watcher,
        })
    }

    /// Stops the watcher; any in-flight per-file transaction finishes or
    /// rolls back on its own.
    pub fn close(&mut self) {
        if let Some(mut watcher) = self.watcher.take() {
            watcher.stop();
        }
        info!("closed vault at {}", self.root.display());
    }

    pub fn info(&self) -> Result<VaultInfo> {
        Ok(VaultInfo {
            root: self.root.clone(),
            note_count: self.storage.note_count()?,
            watching: self.watcher.is_some(),
            config: self.config.clone(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    pub fn config(&self) -> &VaultConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: VaultConfig) -> Result<()> {
        config.save(&self.root)?;
        self.config = config;
        Ok(())
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<VaultEvent> {
        self.events.subscribe()
    }

    pub(crate) fn events(&self) -> &EventBus {
        &self.events
    }

    /// Drops every derived row and rescans the Markdown corpus. Schedule
    /// blocks and habits survive; note references on blocks become null.
    pub fn rebuild_index(&self) -> Result<usize> {
        self.storage.clear_derived()?;
        self.sync.initial_scan()
    }

    pub fn read_note_content(&self, rel_path: &str) -> Result<String> {
        files::read(&self.sync.abs_path(rel_path))
    }

    /// Writes note content and indexes it through the same sync-engine path
    /// a watcher event would take. Returns the note id.
    pub fn save_note(&self, rel_path: &str, content: &str) -> Result<i64> {
        let abs = self.sync.abs_path(rel_path);
        files::write_atomic(&abs, content)?;
        match self.sync.process(&abs)? {
            SyncOutcome::Indexed(id) => {
                self.events
                    .publish(VaultEvent::NotesUpdated { note_ids: vec![id] });
                Ok(id)
            }
            // Unchanged content: the note already exists with this hash.
            _ => {
                let rel = self.sync.rel_path(&abs);
                self.storage
                    .get_note_by_path(&rel)?
                    .map(|n| n.id)
                    .ok_or_else(|| Error::InvalidInput(format!("note {rel} was not indexed")))
            }
        }
    }

    /// Renames the file and updates the note row in place, preserving its id
    /// and user-set properties.
    pub fn rename_note(&self, old_rel: &str, new_rel: &str) -> Result<Option<i64>> {
        let old_abs = self.sync.abs_path(old_rel);
        let new_abs = self.sync.abs_path(new_rel);
        if let Some(parent) = new_abs.parent() {
            fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
        }
        fs::rename(&old_abs, &new_abs).map_err(|e| Error::io(&old_abs, e))?;

        let id = self.storage.rename_note(old_rel, new_rel)?;
        if let Some(id) = id {
            self.events
                .publish(VaultEvent::NotesUpdated { note_ids: vec![id] });
        }
        Ok(id)
    }

    /// Deletes the file and cascades the index rows. Returns the deleted
    /// note's id if it was indexed.
    pub fn delete_note(&self, rel_path: &str) -> Result<Option<i64>> {
        let abs = self.sync.abs_path(rel_path);
        if abs.exists() {
            files::remove(&abs)?;
        }
        let id = self.storage.delete_note_by_path(rel_path)?;
        if let Some(id) = id {
            self.events
                .publish(VaultEvent::NotesDeleted { note_ids: vec![id] });
        }
        Ok(id)
    }

    /// Flips the checkbox of one task line in the underlying file, touching
    /// nothing else, then reindexes. Returns the re-parsed todo.
    pub fn toggle_todo(&self, todo_id: i64) -> Result<Option<Todo>> {
        let todo = match self.storage.get_todo(todo_id)? {
            Some(t) => t,
            None => return Ok(None),
        };
        let note = match self.storage.get_note(todo.note_id)? {
            Some(n) => n,
            None => return Ok(None),
        };

        let abs = self.sync.abs_path(&note.path);
        let content = files::read(&abs)?;
        let rewritten = toggle_checkbox_line(&content, todo.line_number as usize)
            .ok_or_else(|| {
                Error::InvalidInput(format!(
                    "line {} of {} is not a task line",
                    todo.line_number, note.path
                ))
            })?;
        files::write_atomic(&abs, &rewritten)?;

        if let SyncOutcome::Indexed(id) = self.sync.process(&abs)? {
            self.events
                .publish(VaultEvent::NotesUpdated { note_ids: vec![id] });
        }

        let toggled = self
            .storage
            .todos_for(note.id)?
            .into_iter()
            .find(|t| t.line_number == todo.line_number);
        Ok(toggled)
    }
}

impl Drop for Vault {
    fn drop(&mut self) {
        self.close();
    }
}

/// Flips `[ ]` ↔ `[x]` on the given 1-based line. The checkbox is located
/// through the task-marker syntax at the start of the line, so bracket
/// literals later in the description are never touched. Returns None when
/// the line does not exist or is not a task line.
fn toggle_checkbox_line(content: &str, line_number: usize) -> Option<String> {
    let ends_with_newline = content.ends_with('\n');
    let mut lines: Vec<String> = content.lines().map(str::to_string).collect();
    let line = lines.get_mut(line_number.checked_sub(1)?)?;

    let indent = line.len() - line.trim_start().len();
    let rest = &line[indent..];
    if !matches!(rest.chars().next(), Some('-' | '*' | '+')) {
        return None;
    }
    let after_marker = &rest[1..];
    let gap = after_marker.len() - after_marker.trim_start().len();
    if gap == 0 {
        return None;
    }

    let box_start = indent + 1 + gap;
    let replacement = match line.get(box_start..box_start + 3)? {
        "[ ]" => "[x]",
        "[x]" | "[X]" => "[ ]",
        _ => return None,
    };
    line.replace_range(box_start..box_start + 3, replacement);

    let mut out = lines.join("\n");
    if ends_with_newline {
        out.push('\n');
    }
    Some(out)
}
