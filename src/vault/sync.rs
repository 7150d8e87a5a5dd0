//! The sync engine: reconciles one Markdown file with the index.
//!
//! Per-file state machine: missing file → delete cascade; stored hash equal
//! to the file's current hash → skip with zero writes; otherwise analyze and
//! replace everything about the note in a single transaction. Jobs are
//! processed sequentially per vault, so "index complete" counts stay
//! deterministic.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};
use walkdir::WalkDir;

use super::analyzer::Analyzer;
use super::{files, watcher};
use crate::error::Result;
use crate::events::{EventBus, VaultEvent};
use crate::storage::Storage;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Content hash unchanged; zero writes performed.
    Skipped,
    Indexed(i64),
    Removed(i64),
}

#[derive(Clone)]
pub struct SyncEngine {
    root: PathBuf,
    storage: Storage,
    analyzer: Arc<Analyzer>,
    events: EventBus,
}

impl SyncEngine {
    pub fn new(root: PathBuf, storage: Storage, analyzer: Arc<Analyzer>, events: EventBus) -> Self {
        Self {
            root,
            storage,
            analyzer,
            events,
        }
    }

    /// The one code path for "this file changed", regardless of whether the
    /// change came from the UI or an external editor.
    pub fn process(&self, abs_path: &Path) -> Result<SyncOutcome> {
        let rel = self.rel_path(abs_path);

        if !abs_path.exists() {
            return Ok(match self.storage.delete_note_by_path(&rel)? {
                Some(id) => {
                    debug!("removed from index: {rel}");
                    SyncOutcome::Removed(id)
                }
                None => SyncOutcome::Skipped,
            });
        }

        let content = files::read(abs_path)?;
        let hash = files::content_hash(&content);
        if self.storage.note_hash(&rel)?.as_deref() == Some(hash.as_str()) {
            return Ok(SyncOutcome::Skipped);
        }

        let analysis = self.analyzer.analyze(&content);
        let title = analysis.title.clone().unwrap_or_else(|| {
            abs_path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("Untitled")
                .to_string()
        });

        let id = self.storage.index_note(&rel, &title, &hash, &analysis)?;
        debug!("indexed {rel} as note {id}");
        Ok(SyncOutcome::Indexed(id))
    }

    /// Full scan on vault open: every Markdown file becomes a reindex job,
    /// processed sequentially before the live watcher takes over. One file's
    /// failure never blocks the rest.
    pub fn initial_scan(&self) -> Result<usize> {
        let started = Instant::now();
        let mut indexed = 0usize;

        for entry in WalkDir::new(&self.root)
            .follow_links(false)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            let path = entry.path();
            if !entry.file_type().is_file() || !watcher::is_indexable(&self.root, path) {
                continue;
            }
            match self.process(path) {
                Ok(SyncOutcome::Indexed(_)) => indexed += 1,
                Ok(_) => {}
                Err(e) => warn!("failed to index {}: {e}", path.display()),
            }
        }

        let duration_ms = started.elapsed().as_millis() as u64;
        info!("initial scan: {indexed} notes indexed in {duration_ms}ms");
        self.events.publish(VaultEvent::IndexComplete {
            notes_indexed: indexed,
            duration_ms,
        });
        Ok(indexed)
    }

    /// Vault-relative path with forward slashes; files outside the root keep
    /// their absolute form rather than failing.
    pub fn rel_path(&self, abs_path: &Path) -> String {
        let rel = abs_path.strip_prefix(&self.root).unwrap_or(abs_path);
        rel.components()
            .filter_map(|c| c.as_os_str().to_str())
            .collect::<Vec<_>>()
            .join("/")
    }

    pub fn abs_path(&self, rel: &str) -> PathBuf {
        self.root.join(rel)
    }
}
