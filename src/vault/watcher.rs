//! Filesystem watching with per-path debouncing.
//!
//! The debouncer is an explicit pending-job map: every event for a Markdown
//! path inserts or merges a job keyed by absolute path, and a job is only
//! dispatched once no further event has arrived for it within the window.
//! Editors that save through multi-write sequences therefore cost one
//! reindex, not five.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use notify::{RecommendedWatcher, RecursiveMode, Watcher as _};
use tracing::{debug, error, warn};

use super::sync::{SyncEngine, SyncOutcome};
use crate::config::VAULT_DATA_DIR;
use crate::error::{Error, Result};
use crate::events::{EventBus, VaultEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobKind {
    Reindex,
    Remove,
}

#[derive(Debug)]
struct PendingJob {
    kind: JobKind,
    deadline: Instant,
}

/// Per-path pending-job map. Later events win: a Remove arriving inside the
/// window of a pending Reindex cancels the reindex into a removal, and a
/// Reindex after a Remove (file recreated) turns it back.
#[derive(Debug)]
pub struct Debouncer {
    window: Duration,
    pending: HashMap<PathBuf, PendingJob>,
}

impl Debouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            pending: HashMap::new(),
        }
    }

    pub fn push(&mut self, kind: JobKind, path: PathBuf, now: Instant) {
        let deadline = now + self.window;
        self.pending.insert(path, PendingJob { kind, deadline });
    }

    /// Jobs whose quiet window has elapsed, in deterministic path order.
    pub fn drain_ready(&mut self, now: Instant) -> Vec<(PathBuf, JobKind)> {
        let mut ready: Vec<(PathBuf, JobKind)> = Vec::new();
        self.pending.retain(|path, job| {
            if job.deadline <= now {
                ready.push((path.clone(), job.kind));
                false
            } else {
                true
            }
        });
        ready.sort_by(|a, b| a.0.cmp(&b.0));
        ready
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }
}

/// True for paths the index cares about: `.md` files outside the vault's
/// data directory and not hidden. Hidden-ness is judged on the vault-relative
/// path, so a dotted directory above the root does not hide the whole vault.
pub fn is_indexable(root: &Path, path: &Path) -> bool {
    if path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("md"))
        != Some(true)
    {
        return false;
    }
    let rel = path.strip_prefix(root).unwrap_or(path);
    !rel.components().any(|c| {
        c.as_os_str()
            .to_str()
            .is_some_and(|s| s.starts_with('.') || s == VAULT_DATA_DIR)
    })
}

pub struct WatcherHandle {
    shutdown: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl WatcherHandle {
    /// Starts the watcher thread: notify events feed the debouncer, due jobs
    /// are flushed sequentially into the sync engine, and batched
    /// `notes:updated` / `notes:deleted` events go out per flush.
    pub fn spawn(
        root: PathBuf,
        window: Duration,
        sync: SyncEngine,
        events: EventBus,
    ) -> Result<Self> {
        let (tx, rx) = mpsc::channel::<notify::Result<notify::Event>>();
        let mut watcher: RecommendedWatcher = notify::recommended_watcher(move |res| {
            let _ = tx.send(res);
        })?;
        watcher.watch(&root, RecursiveMode::Recursive)?;

        let shutdown = Arc::new(AtomicBool::new(false));
        let stop = shutdown.clone();

        let thread = std::thread::spawn(move || {
            // Keep the notify watcher alive for the thread's lifetime.
            let _watcher = watcher;
            let mut debouncer = Debouncer::new(window);
            let tick = Duration::from_millis(50).min(window);

            while !stop.load(Ordering::Relaxed) {
                match rx.recv_timeout(tick) {
                    Ok(Ok(event)) => {
                        let now = Instant::now();
                        for path in event.paths {
                            if !is_indexable(&root, &path) {
                                continue;
                            }
                            // Presence on disk decides the job kind; this
                            // also covers both halves of a rename.
                            let kind = if path.exists() {
                                JobKind::Reindex
                            } else {
                                JobKind::Remove
                            };
                            debouncer.push(kind, path, now);
                        }
                    }
                    Ok(Err(e)) => warn!("watcher event error: {e}"),
                    Err(mpsc::RecvTimeoutError::Timeout) => {}
                    Err(mpsc::RecvTimeoutError::Disconnected) => break,
                }

                flush(&mut debouncer, &sync, &events);
            }
        });

        Ok(Self {
            shutdown,
            thread: Some(thread),
        })
    }

    pub fn stop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for WatcherHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

fn flush(debouncer: &mut Debouncer, sync: &SyncEngine, events: &EventBus) {
    let ready = debouncer.drain_ready(Instant::now());
    if ready.is_empty() {
        return;
    }

    let mut updated = Vec::new();
    let mut deleted = Vec::new();

    for (path, kind) in ready {
        match sync.process(&path) {
            Ok(SyncOutcome::Indexed(id)) => updated.push(id),
            Ok(SyncOutcome::Removed(id)) => deleted.push(id),
            Ok(SyncOutcome::Skipped) => debug!("unchanged: {}", path.display()),
            Err(e @ Error::Storage(_)) => {
                // Rolled back; leave the file pending for the next tick.
                warn!("reindex of {} failed, will retry: {e}", path.display());
                debouncer.push(kind, path, Instant::now());
            }
            Err(e) => error!("failed to process {}: {e}", path.display()),
        }
    }

    if !updated.is_empty() {
        events.publish(VaultEvent::NotesUpdated { note_ids: updated });
    }
    if !deleted.is_empty() {
        events.publish(VaultEvent::NotesDeleted { note_ids: deleted });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_millis(100);

    #[test]
    fn test_rapid_events_coalesce_to_one_job() {
        let mut debouncer = Debouncer::new(WINDOW);
        let t0 = Instant::now();
        let path = PathBuf::from("/vault/a.md");

        for i in 0..5 {
            debouncer.push(
                JobKind::Reindex,
                path.clone(),
                t0 + Duration::from_millis(i * 10),
            );
        }

        // Nothing ready while events keep arriving.
        assert!(debouncer.drain_ready(t0 + Duration::from_millis(60)).is_empty());

        let ready = debouncer.drain_ready(t0 + Duration::from_millis(200));
        assert_eq!(ready, vec![(path, JobKind::Reindex)]);
        assert!(debouncer.is_empty());
    }

    #[test]
    fn test_remove_cancels_pending_reindex() {
        let mut debouncer = Debouncer::new(WINDOW);
        let t0 = Instant::now();
        let path = PathBuf::from("/vault/a.md");

        debouncer.push(JobKind::Reindex, path.clone(), t0);
        debouncer.push(JobKind::Remove, path.clone(), t0 + Duration::from_millis(20));

        let ready = debouncer.drain_ready(t0 + Duration::from_millis(500));
        assert_eq!(ready, vec![(path, JobKind::Remove)]);
    }

    #[test]
    fn test_reindex_after_remove_wins() {
        let mut debouncer = Debouncer::new(WINDOW);
        let t0 = Instant::now();
        let path = PathBuf::from("/vault/a.md");

        debouncer.push(JobKind::Remove, path.clone(), t0);
        debouncer.push(JobKind::Reindex, path.clone(), t0 + Duration::from_millis(20));

        let ready = debouncer.drain_ready(t0 + Duration::from_millis(500));
        assert_eq!(ready, vec![(path, JobKind::Reindex)]);
    }

    #[test]
    fn test_independent_paths_stay_separate() {
        let mut debouncer = Debouncer::new(WINDOW);
        let t0 = Instant::now();

        debouncer.push(JobKind::Reindex, PathBuf::from("/v/b.md"), t0);
        debouncer.push(JobKind::Reindex, PathBuf::from("/v/a.md"), t0);
        assert_eq!(debouncer.len(), 2);

        let ready = debouncer.drain_ready(t0 + WINDOW);
        assert_eq!(ready.len(), 2);
        // Deterministic path order.
        assert_eq!(ready[0].0, PathBuf::from("/v/a.md"));
        assert_eq!(ready[1].0, PathBuf::from("/v/b.md"));
    }

    #[test]
    fn test_is_indexable() {
        let root = Path::new("/vault");
        assert!(is_indexable(root, Path::new("/vault/note.md")));
        assert!(is_indexable(root, Path::new("/vault/sub dir/Note.MD")));
        assert!(!is_indexable(root, Path::new("/vault/image.png")));
        assert!(!is_indexable(root, Path::new("/vault/.notegraph/index.db")));
        assert!(!is_indexable(root, Path::new("/vault/.hidden/note.md")));
        assert!(!is_indexable(root, Path::new("/vault/note.md.tmp~")));

        // A dotted ancestor above the root never hides the vault itself.
        let tmp_root = Path::new("/tmp/.tmpA1B2");
        assert!(is_indexable(tmp_root, Path::new("/tmp/.tmpA1B2/note.md")));
        assert!(!is_indexable(tmp_root, Path::new("/tmp/.tmpA1B2/.obsidian/a.md")));
    }
}
