//! The application boundary: one handle owning an open vault, exposing every
//! operation a front end calls. Methods are thin and serializable at both
//! ends; the behavior lives in `vault`, `storage`, `query`, and `search`.

use std::path::Path;

use chrono::NaiveDate;

use crate::error::{Error, Result};
use crate::events::VaultEvent;
use crate::query::embed::{execute_query_embed, EmbedResponse};
use crate::query::{QueryEngine, QueryRequest, QueryResults};
use crate::search::{EmbeddingProvider, HybridSearch, SearchResult};
use crate::storage::habits::{Habit, HabitEntry, HabitType};
use crate::storage::notes::{Note, Todo};
use crate::storage::properties::{BulkChange, EffectiveProperty, FolderProperty, Property};
use crate::storage::schedule::ScheduleBlock;
use crate::vault::{Vault, VaultInfo, VaultOptions};

pub struct App {
    vault: Option<Vault>,
    embedder: Option<Box<dyn EmbeddingProvider>>,
}

impl App {
    pub fn new() -> Self {
        Self {
            vault: None,
            embedder: None,
        }
    }

    pub fn with_embedder(embedder: Box<dyn EmbeddingProvider>) -> Self {
        Self {
            vault: None,
            embedder: Some(embedder),
        }
    }

    fn vault(&self) -> Result<&Vault> {
        self.vault.as_ref().ok_or(Error::VaultClosed)
    }

    // ---- vault ----

    /// Opens a vault, replacing any previously open one.
    pub fn open_vault(&mut self, root: &Path, options: VaultOptions) -> Result<VaultInfo> {
        let vault = Vault::open(root, options)?;
        let info = vault.info()?;
        self.vault = Some(vault);
        Ok(info)
    }

    pub fn close_vault(&mut self) {
        if let Some(mut vault) = self.vault.take() {
            vault.close();
        }
    }

    pub fn get_vault_info(&self) -> Result<VaultInfo> {
        self.vault()?.info()
    }

    pub fn rebuild_index(&self) -> Result<usize> {
        self.vault()?.rebuild_index()
    }

    pub fn subscribe(&self) -> Result<tokio::sync::broadcast::Receiver<VaultEvent>> {
        Ok(self.vault()?.subscribe())
    }

    // ---- notes ----

    pub fn list_notes(&self) -> Result<Vec<Note>> {
        self.vault()?.storage().list_notes()
    }

    pub fn get_note(&self, note_id: i64) -> Result<Option<Note>> {
        self.vault()?.storage().get_note(note_id)
    }

    pub fn get_note_content(&self, rel_path: &str) -> Result<String> {
        self.vault()?.read_note_content(rel_path)
    }

    pub fn save_note(&self, rel_path: &str, content: &str) -> Result<i64> {
        self.vault()?.save_note(rel_path, content)
    }

    pub fn rename_note(&self, old_rel: &str, new_rel: &str) -> Result<Option<i64>> {
        self.vault()?.rename_note(old_rel, new_rel)
    }

    pub fn delete_note(&self, rel_path: &str) -> Result<Option<i64>> {
        self.vault()?.delete_note(rel_path)
    }

    pub fn set_note_pinned(&self, note_id: i64, pinned: bool) -> Result<()> {
        self.vault()?.storage().set_pinned(note_id, pinned)
    }

    pub fn get_backlinks(&self, note_id: i64) -> Result<Vec<Note>> {
        self.vault()?.storage().backlinks_for(note_id)
    }

    pub fn toggle_todo(&self, todo_id: i64) -> Result<Option<Todo>> {
        self.vault()?.toggle_todo(todo_id)
    }

    // ---- properties ----

    pub fn get_properties(&self, note_id: i64) -> Result<Vec<Property>> {
        self.vault()?.storage().get_properties(note_id)
    }

    pub fn set_property(
        &self,
        note_id: i64,
        key: &str,
        value: &str,
        value_type: &str,
    ) -> Result<i64> {
        self.vault()?
            .storage()
            .set_property(note_id, key, value, value_type)
    }

    pub fn delete_property(&self, note_id: i64, key: &str) -> Result<bool> {
        self.vault()?.storage().delete_property(note_id, key)
    }

    pub fn get_folder_properties(&self, folder_path: &str) -> Result<Vec<FolderProperty>> {
        self.vault()?.storage().get_folder_properties(folder_path)
    }

    pub fn set_folder_property(
        &self,
        folder_path: &str,
        key: &str,
        value: &str,
        value_type: &str,
    ) -> Result<i64> {
        self.vault()?
            .storage()
            .set_folder_property(folder_path, key, value, value_type)
    }

    pub fn delete_folder_property(&self, folder_path: &str, key: &str) -> Result<bool> {
        self.vault()?
            .storage()
            .delete_folder_property(folder_path, key)
    }

    /// Note properties with folder inheritance applied; each value says
    /// where it came from.
    pub fn get_properties_with_inheritance(
        &self,
        note_id: i64,
    ) -> Result<Vec<EffectiveProperty>> {
        let storage = self.vault()?.storage();
        let note = storage
            .get_note(note_id)?
            .ok_or_else(|| Error::InvalidInput(format!("no note with id {note_id}")))?;
        storage.effective_properties(note_id, &note.path)
    }

    pub fn rename_property_key(&self, old_key: &str, new_key: &str) -> Result<BulkChange> {
        self.vault()?.storage().rename_property_key(old_key, new_key)
    }

    pub fn rename_property_value(
        &self,
        key: &str,
        old_value: &str,
        new_value: &str,
    ) -> Result<BulkChange> {
        self.vault()?
            .storage()
            .rename_property_value(key, old_value, new_value)
    }

    pub fn merge_property_keys(&self, source_key: &str, target_key: &str) -> Result<BulkChange> {
        self.vault()?
            .storage()
            .merge_property_keys(source_key, target_key)
    }

    pub fn delete_property_key(&self, key: &str) -> Result<BulkChange> {
        self.vault()?.storage().delete_property_key(key)
    }

    pub fn get_property_keys(&self) -> Result<Vec<String>> {
        self.vault()?.storage().property_keys()
    }

    pub fn get_property_values(&self, key: &str) -> Result<Vec<String>> {
        self.vault()?.storage().property_values(key)
    }

    /// Distinct items of a comma-separated list property.
    pub fn get_list_property_values(&self, key: &str) -> Result<Vec<String>> {
        self.vault()?.storage().list_property_values(key)
    }

    // ---- schedule ----

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
        self.vault()?
            .storage()
            .create_schedule_block(note_id, date, start_time, end_time, label, color, context)
    }

    pub fn get_schedule_block(&self, id: i64) -> Result<Option<ScheduleBlock>> {
        self.vault()?.storage().get_schedule_block(id)
    }

    pub fn update_schedule_block(&self, block: &ScheduleBlock) -> Result<bool> {
        self.vault()?.storage().update_schedule_block(block)
    }

    pub fn delete_schedule_block(&self, id: i64) -> Result<bool> {
        self.vault()?.storage().delete_schedule_block(id)
    }

    pub fn get_schedule_for_date(&self, date: NaiveDate) -> Result<Vec<ScheduleBlock>> {
        self.vault()?.storage().schedule_for_date(date)
    }

    pub fn get_schedule_for_range(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<ScheduleBlock>> {
        self.vault()?.storage().schedule_for_range(start, end)
    }

    pub fn get_schedule_for_note(&self, note_id: i64) -> Result<Vec<ScheduleBlock>> {
        self.vault()?.storage().schedule_for_note(note_id)
    }

    // ---- habits ----

    pub fn create_habit(
        &self,
        name: &str,
        habit_type: HabitType,
        unit: Option<&str>,
        target_value: Option<f64>,
        color: Option<&str>,
    ) -> Result<Habit> {
        self.vault()?
            .storage()
            .create_habit(name, habit_type, unit, target_value, color)
    }

    pub fn get_habit(&self, id: i64) -> Result<Option<Habit>> {
        self.vault()?.storage().get_habit(id)
    }

    pub fn list_habits(&self, include_archived: bool) -> Result<Vec<Habit>> {
        self.vault()?.storage().list_habits(include_archived)
    }

    pub fn update_habit(&self, habit: &Habit) -> Result<bool> {
        self.vault()?.storage().update_habit(habit)
    }

    pub fn archive_habit(&self, id: i64, archived: bool) -> Result<bool> {
        self.vault()?.storage().archive_habit(id, archived)
    }

    pub fn delete_habit(&self, id: i64) -> Result<bool> {
        self.vault()?.storage().delete_habit(id)
    }

    pub fn log_habit_entry(
        &self,
        habit_id: i64,
        date: NaiveDate,
        time: Option<&str>,
        value: &str,
        notes: Option<&str>,
    ) -> Result<Option<HabitEntry>> {
        self.vault()?
            .storage()
            .log_habit_entry(habit_id, date, time, value, notes)
    }

    pub fn get_habit_entry(&self, id: i64) -> Result<Option<HabitEntry>> {
        self.vault()?.storage().get_habit_entry(id)
    }

    pub fn update_habit_entry(&self, entry: &HabitEntry) -> Result<bool> {
        self.vault()?.storage().update_habit_entry(entry)
    }

    pub fn delete_habit_entry(&self, id: i64) -> Result<bool> {
        self.vault()?.storage().delete_habit_entry(id)
    }

    pub fn get_habit_entries(
        &self,
        habit_id: i64,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<HabitEntry>> {
        self.vault()?
            .storage()
            .habit_entries_for_range(habit_id, start, end)
    }

    pub fn toggle_habit(&self, habit_id: i64, date: NaiveDate) -> Result<bool> {
        self.vault()?.storage().toggle_habit(habit_id, date)
    }

    // ---- query and search ----

    pub fn run_query(&self, request: &QueryRequest) -> Result<QueryResults> {
        QueryEngine::new(self.vault()?.storage()).run(request)
    }

    /// Runs a YAML query embed. Parse and evaluation failures come back
    /// inside the response payload rather than as an Err.
    pub fn execute_query_embed(&self, yaml: &str) -> Result<EmbedResponse> {
        Ok(execute_query_embed(self.vault()?.storage(), yaml))
    }

    pub fn search_notes(&self, query: &str, limit: Option<usize>) -> Result<Vec<SearchResult>> {
        let vault = self.vault()?;
        let provider = if vault.config().semantic_search {
            self.embedder.as_deref()
        } else {
            None
        };
        HybridSearch::new(vault.storage(), provider).search(query, limit.unwrap_or(20))
    }
}

impl Default for App {
    fn default() -> Self {
        Self::new()
    }
}
