//! File Watcher (§4.7): a debounced, coalesced stream of `add`/`change`/
//! `unlink` events over a source root, built on raw `notify` rather than
//! `notify-debouncer-full` so the per-path coalescing table below is exact.

use std::{
    collections::BTreeMap,
    path::PathBuf,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::{mpsc, Notify};

use crate::{codec, error::RouxError, paths, scanner};

/// A raw, unfiltered, unnormalized notification from the underlying watcher.
#[derive(Debug, Clone)]
pub struct RawFsEvent {
    pub path: PathBuf,
    pub kind: RawKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawKind {
    Add,
    Modify,
    Remove,
}

/// A logical, debounced, coalesced event ready for the coordinator (§4.8).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Add,
    Change,
    Unlink,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FsEvent {
    pub relative_path: String,
    pub kind: EventKind,
}

fn raw_events_from_notify(event: notify::Event) -> Vec<RawFsEvent> {
    use notify::{EventKind as NK, ModifyKind, RenameMode};
    match event.kind {
        NK::Create(_) => event
            .paths
            .into_iter()
            .map(|path| RawFsEvent { path, kind: RawKind::Add })
            .collect(),
        NK::Remove(_) => event
            .paths
            .into_iter()
            .map(|path| RawFsEvent { path, kind: RawKind::Remove })
            .collect(),
        NK::Modify(ModifyKind::Name(RenameMode::From)) => event
            .paths
            .into_iter()
            .map(|path| RawFsEvent { path, kind: RawKind::Remove })
            .collect(),
        NK::Modify(ModifyKind::Name(RenameMode::To)) => event
            .paths
            .into_iter()
            .map(|path| RawFsEvent { path, kind: RawKind::Add })
            .collect(),
        NK::Modify(ModifyKind::Name(RenameMode::Both)) => {
            let mut out = Vec::new();
            if let Some(from) = event.paths.first() {
                out.push(RawFsEvent { path: from.clone(), kind: RawKind::Remove });
            }
            if let Some(to) = event.paths.get(1) {
                out.push(RawFsEvent { path: to.clone(), kind: RawKind::Add });
            }
            out
        }
        NK::Modify(_) => event
            .paths
            .into_iter()
            .map(|path| RawFsEvent { path, kind: RawKind::Modify })
            .collect(),
        _ => Vec::new(),
    }
}

/// Apply one coalescing rule per the §4.7 table. `None` means "drop the path
/// from the batch" (the add-then-unlink case).
fn coalesce(existing: Option<EventKind>, new: EventKind) -> Option<EventKind> {
    use EventKind::*;
    match (existing, new) {
        (None, new) => Some(new),
        (Some(Add), Change) => Some(Add),
        (Some(Add), Unlink) => None,
        (Some(Change), Unlink) => Some(Unlink),
        (Some(Change), Add) => Some(Add),
        (Some(Unlink), Add) => Some(Add),
        (Some(Unlink), Change) => Some(Unlink),
        (Some(existing), _) => Some(existing),
    }
}

pub struct FileWatcher {
    root: PathBuf,
    excluded_dirs: Vec<String>,
    debounce: Duration,
    paused: Arc<AtomicBool>,
    raw_rx: mpsc::UnboundedReceiver<RawFsEvent>,
    flush: Arc<Notify>,
    pending: BTreeMap<String, EventKind>,
    order: Vec<String>,
    // Held only to keep the OS watch alive for the struct's lifetime.
    _watcher: RecommendedWatcher,
}

impl FileWatcher {
    pub fn start(root: PathBuf, excluded_dirs: Vec<String>, debounce: Duration) -> Result<Self, RouxError> {
        let (tx, raw_rx) = mpsc::unbounded_channel();
        let paused = Arc::new(AtomicBool::new(false));
        let paused_for_callback = paused.clone();

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            if paused_for_callback.load(Ordering::Relaxed) {
                return;
            }
            match res {
                Ok(event) => {
                    for raw in raw_events_from_notify(event) {
                        if tx.send(raw).is_err() {
                            tracing::debug!("file watcher channel closed, dropping event");
                        }
                    }
                }
                Err(err) => {
                    if matches!(err.kind, notify::ErrorKind::MaxFilesWatch) {
                        tracing::error!(
                            "file watcher hit the OS file-descriptor limit; raise the open-files ulimit"
                        );
                    } else {
                        tracing::warn!("file watcher error: {err}");
                    }
                }
            }
        })?;
        watcher.watch(&root, RecursiveMode::Recursive)?;

        Ok(FileWatcher {
            root,
            excluded_dirs,
            debounce,
            paused,
            raw_rx,
            flush: Arc::new(Notify::new()),
            pending: BTreeMap::new(),
            order: Vec::new(),
            _watcher: watcher,
        })
    }

    pub fn pause(&self) {
        self.paused.store(true, Ordering::Relaxed);
    }

    pub fn resume(&self) {
        self.paused.store(false, Ordering::Relaxed);
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Relaxed)
    }

    /// Force immediate emission of the current batch, even mid-debounce.
    pub fn flush(&self) {
        self.flush.notify_one();
    }

    fn filter_and_normalize(&self, path: &std::path::Path) -> Option<String> {
        let relative = path.strip_prefix(&self.root).ok()?;
        if scanner::is_excluded(path, &self.root, &self.excluded_dirs) {
            return None;
        }
        let ext = relative.extension().and_then(|e| e.to_str())?;
        codec::lookup(ext)?;
        Some(paths::normalize_relative(&paths::os_path_to_string(relative)))
    }

    fn ingest(&mut self, raw: RawFsEvent) {
        let Some(relative_path) = self.filter_and_normalize(&raw.path) else {
            return;
        };
        let new_kind = match raw.kind {
            RawKind::Add => EventKind::Add,
            RawKind::Modify => EventKind::Change,
            RawKind::Remove => EventKind::Unlink,
        };
        match coalesce(self.pending.get(&relative_path).copied(), new_kind) {
            Some(kind) => {
                if self.pending.insert(relative_path.clone(), kind).is_none() {
                    self.order.push(relative_path);
                }
            }
            None => {
                self.pending.remove(&relative_path);
                self.order.retain(|p| p != &relative_path);
            }
        }
    }

    fn drain_batch(&mut self) -> Vec<FsEvent> {
        let order = std::mem::take(&mut self.order);
        let pending = std::mem::take(&mut self.pending);
        order
            .into_iter()
            .filter_map(|path| {
                pending.get(&path).map(|kind| FsEvent { relative_path: path, kind: *kind })
            })
            .collect()
    }

    /// Wait for the next debounced, coalesced batch. Returns `None` once the
    /// underlying watcher channel is closed (the watcher was dropped).
    pub async fn next_batch(&mut self) -> Option<Vec<FsEvent>> {
        loop {
            if self.pending.is_empty() {
                tokio::select! {
                    raw = self.raw_rx.recv() => match raw {
                        Some(raw) => self.ingest(raw),
                        None => return None,
                    },
                    _ = self.flush.notified() => continue,
                }
            }
            loop {
                tokio::select! {
                    raw = self.raw_rx.recv() => match raw {
                        Some(raw) => self.ingest(raw),
                        None => return Some(self.drain_batch()),
                    },
                    _ = tokio::time::sleep(self.debounce) => return Some(self.drain_batch()),
                    _ = self.flush.notified() => return Some(self.drain_batch()),
                }
                if self.pending.is_empty() {
                    break;
                }
            }
        }
    }
}
