//! Store Coordinator (§4.8): the sole write authority. Composes the
//! document cache, vector index, graph index, and link resolver, and
//! enforces every cross-component invariant they can't enforce alone.

use std::{
    collections::{BTreeMap, BTreeSet},
    path::{Path, PathBuf},
    sync::Arc,
    time::{Instant, SystemTime},
};

use parking_lot::{Mutex, RwLock};

use crate::{
    cache::DocumentCache,
    codec,
    config::Config,
    embedder::Embedder,
    error::RouxError,
    graph::GraphIndex,
    id,
    node::{Node, SourceRef},
    paths,
    resolver::{self, RealNodeInput},
    scanner,
    vector::VectorIndex,
    watch::{EventKind, FileWatcher, FsEvent},
};

fn systemtime_to_unix(t: SystemTime) -> i64 {
    t.duration_since(SystemTime::UNIX_EPOCH).map(|d| d.as_secs() as i64).unwrap_or(0)
}

fn unix_now() -> i64 {
    systemtime_to_unix(SystemTime::now())
}

struct PendingUnlink {
    #[allow(dead_code)]
    path: String,
    since: Instant,
}

/// Orchestrates bulk sync (§4.8.1), incremental reconciliation (§4.8.2),
/// embedding coordination (§4.8.3), and CRUD (§4.8.4) across the cache,
/// vector index, and graph index, with its own mutation serialized behind
/// a single writer lock (§4.8.5, §5).
pub struct StoreCoordinator {
    root: PathBuf,
    config: Config,
    cache: DocumentCache,
    vectors: VectorIndex,
    graph: RwLock<GraphIndex>,
    embedder: Option<Arc<dyn Embedder>>,
    watcher: Option<FileWatcher>,
    pending_unlinks: Mutex<BTreeMap<String, PendingUnlink>>,
    write_lock: tokio::sync::Mutex<()>,
}

impl StoreCoordinator {
    pub async fn open(
        root: PathBuf,
        config: Config,
        embedder: Option<Arc<dyn Embedder>>,
    ) -> Result<StoreCoordinator, RouxError> {
        let roux_dir = root.join(".roux");
        tokio::fs::create_dir_all(&roux_dir).await?;
        let cache = DocumentCache::open(&roux_dir.join("cache.db")).await?;
        let vectors = VectorIndex::open(&roux_dir.join("vectors.db")).await?;
        if let Some(e) = &embedder {
            e.on_register();
        }
        Ok(StoreCoordinator {
            root,
            config,
            cache,
            vectors,
            graph: RwLock::new(GraphIndex::default()),
            embedder,
            watcher: None,
            pending_unlinks: Mutex::new(BTreeMap::new()),
            write_lock: tokio::sync::Mutex::new(()),
        })
    }

    pub fn attach_watcher(&mut self, watcher: FileWatcher) {
        self.watcher = Some(watcher);
    }

    pub async fn next_watch_batch(&mut self) -> Option<Vec<FsEvent>> {
        self.watcher.as_mut()?.next_batch().await
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn cache(&self) -> &DocumentCache {
        &self.cache
    }

    pub fn vectors(&self) -> &VectorIndex {
        &self.vectors
    }

    pub fn embedder(&self) -> Option<&Arc<dyn Embedder>> {
        self.embedder.as_ref()
    }

    pub fn graph(&self) -> parking_lot::RwLockReadGuard<'_, GraphIndex> {
        self.graph.read()
    }

    /// Read, parse, and (if the file lacks a valid id) TOCTOU-guard a
    /// generated-id writeback, producing a ready-to-upsert [`Node`]. Returns
    /// `Ok(None)` when the file vanished or the writeback had to be skipped
    /// — both cases simply defer the file to the next sync/reconcile pass.
    async fn load_and_prepare_node(
        &self,
        absolute_path: &Path,
        relative_path: &str,
        extension: &str,
    ) -> Result<Option<Node>, RouxError> {
        let raw = match tokio::fs::read(absolute_path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let Some(reader) = codec::lookup(extension) else {
            return Ok(None);
        };
        let mut parsed = reader.parse(&raw)?;
        let title = parsed.title.take().unwrap_or_else(|| paths::title_from_filename(relative_path));
        let mtime_before = scanner::mtime(absolute_path)?;

        let node_id = match parsed.id.take().filter(|id| id::is_valid_id(id)) {
            Some(id) => id,
            None => {
                let generated = id::generate_id();
                let rewritten = reader.write_id(&raw, &generated)?;
                let current_mtime = scanner::mtime(absolute_path).unwrap_or(mtime_before);
                if current_mtime != mtime_before {
                    tracing::warn!(
                        "skipping id writeback for {relative_path}: file changed concurrently, retrying next pass"
                    );
                    return Ok(None);
                }
                tokio::fs::write(absolute_path, &rewritten).await?;
                generated
            }
        };
        let mtime = scanner::mtime(absolute_path).unwrap_or(mtime_before);

        Ok(Some(Node {
            id: node_id,
            title,
            content: Some(parsed.content),
            tags: parsed.tags,
            outgoing_links: parsed.raw_link_targets,
            properties: parsed.properties,
            source_ref: Some(SourceRef {
                kind: extension.to_string(),
                absolute_path: absolute_path.to_path_buf(),
                last_modified: mtime,
            }),
        }))
    }

    async fn resolve_links(&self) -> Result<(), RouxError> {
        let all = self.cache.list_all().await?;
        let (reals, ghosts): (Vec<Node>, Vec<Node>) = all.into_iter().partition(|n| !n.is_ghost());
        let inputs: Vec<RealNodeInput> = reals
            .iter()
            .map(|n| RealNodeInput {
                id: n.id.clone(),
                title: n.title.clone(),
                source_path: n.source_path_str(),
                raw_targets: n.outgoing_links.clone(),
            })
            .collect();
        let output = resolver::resolve(&inputs, &ghosts);
        for warning in &output.ambiguous_warnings {
            tracing::warn!("{warning}");
        }
        let existing_ghost_ids: BTreeSet<&str> = ghosts.iter().map(|g| g.id.as_str()).collect();
        for (ghost_id, ghost) in &output.ghosts_needed {
            if !existing_ghost_ids.contains(ghost_id.as_str()) {
                self.cache.upsert_ghost(ghost).await?;
            }
        }
        for ghost_id in &output.ghost_ids_to_prune {
            self.cache.delete(ghost_id).await?;
        }
        for (id, links) in &output.rewritten_links {
            self.cache.update_outgoing_links(id, links).await?;
        }
        Ok(())
    }

    async fn rebuild_graph(&self) -> Result<(), RouxError> {
        let all = self.cache.list_all().await?;
        let graph = GraphIndex::from_nodes(&all);
        let centrality = graph.compute_centrality();
        let now = unix_now();
        for (id, record) in &centrality {
            self.cache.store_centrality(id, *record, now).await?;
        }
        *self.graph.write() = graph;
        Ok(())
    }

    async fn embed_missing(&self) {
        let Some(embedder) = &self.embedder else {
            return;
        };
        let Ok(all) = self.cache.list_all().await else {
            return;
        };
        for node in all.iter().filter(|n| !n.is_ghost()) {
            let Some(content) = node.content.as_deref().filter(|c| !c.is_empty()) else {
                continue;
            };
            match self.vectors.has_embedding(&node.id).await {
                Ok(true) => continue,
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!("failed checking embedding state for {}: {e}", node.id);
                    continue;
                }
            }
            self.embed_one(&node.id, content, embedder).await;
        }
    }

    async fn embed_one(&self, id: &str, content: &str, embedder: &Arc<dyn Embedder>) {
        match embedder.embed(content).await {
            Ok(vector) => {
                if let Err(e) = self.vectors.store(id, &vector, &embedder.model_id()).await {
                    tracing::warn!("failed storing embedding for {id}: {e}");
                }
            }
            Err(e) => tracing::warn!("embedder failed for {id}: {e}"),
        }
    }

    async fn reembed(&self, ids: &BTreeSet<String>) {
        let Some(embedder) = self.embedder.clone() else {
            return;
        };
        for id in ids {
            let Ok(Some(node)) = self.cache.get(id).await else {
                continue;
            };
            if node.is_ghost() {
                continue;
            }
            let Some(content) = node.content.as_deref().filter(|c| !c.is_empty()) else {
                continue;
            };
            self.embed_one(id, content, &embedder).await;
        }
    }

    async fn expire_pending_unlinks(&self) -> Result<(), RouxError> {
        let grace = self.config.grace_period();
        let now = Instant::now();
        let expired: Vec<String> = {
            let mut pending = self.pending_unlinks.lock();
            let expired_ids: Vec<String> = pending
                .iter()
                .filter(|(_, info)| now.duration_since(info.since) >= grace)
                .map(|(id, _)| id.clone())
                .collect();
            for id in &expired_ids {
                pending.remove(id);
            }
            expired_ids
        };
        for id in expired {
            self.vectors.delete(&id).await?;
        }
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    pub async fn sync(&self) -> Result<(), RouxError> {
        let _guard = self.write_lock.lock().await;
        if let Some(w) = &self.watcher {
            w.pause();
        }
        let result = self.sync_inner().await;
        if let Some(w) = &self.watcher {
            w.resume();
        }
        result?;
        self.embed_missing().await;
        Ok(())
    }

    async fn sync_inner(&self) -> Result<(), RouxError> {
        let scanned = scanner::scan(&self.root, &self.config.excluded_dirs())?;
        let tracked = self.cache.list_all_tracked_paths().await?;
        let mut seen_ids = BTreeSet::new();
        let mut current_paths = BTreeSet::new();

        for file in &scanned {
            current_paths.insert(file.relative_path.clone());
            let cached = self.cache.get_by_path(&file.relative_path).await?;
            let disk_mtime = match scanner::mtime(&file.absolute_path) {
                Ok(m) => m,
                Err(e) => {
                    tracing::warn!("failed to stat {}: {e}", file.relative_path);
                    continue;
                }
            };
            let up_to_date = cached
                .as_ref()
                .and_then(|n| n.source_ref.as_ref())
                .map(|s| s.last_modified >= disk_mtime)
                .unwrap_or(false);
            if up_to_date {
                if let Some(n) = &cached {
                    seen_ids.insert(n.id.clone());
                }
                continue;
            }

            let node = match self
                .load_and_prepare_node(&file.absolute_path, &file.relative_path, &file.extension)
                .await
            {
                Ok(Some(n)) => n,
                Ok(None) => continue,
                Err(e) => {
                    tracing::warn!("failed syncing {}: {e}", file.relative_path);
                    continue;
                }
            };

            if !seen_ids.insert(node.id.clone()) {
                tracing::warn!(
                    "duplicate id {} at {}; keeping the first occurrence this sync",
                    node.id,
                    file.relative_path
                );
                if let Some(existing) = &cached {
                    self.cache.delete(&existing.id).await?;
                }
                continue;
            }

            let source_ref = node
                .source_ref
                .as_ref()
                .expect("load_and_prepare_node always attaches a source_ref");
            self.cache
                .upsert(&node, &source_ref.kind, &file.relative_path, systemtime_to_unix(source_ref.last_modified))
                .await?;
        }

        for (id, path) in tracked {
            if !current_paths.contains(&path) {
                self.cache.delete(&id).await?;
                self.vectors.delete(&id).await?;
            }
        }

        self.resolve_links().await?;
        self.rebuild_graph().await?;
        Ok(())
    }

    #[tracing::instrument(skip(self, batch))]
    pub async fn reconcile(&self, batch: Vec<FsEvent>) -> Result<Vec<String>, RouxError> {
        let _guard = self.write_lock.lock().await;
        if let Some(w) = &self.watcher {
            w.pause();
        }
        let result = self.reconcile_inner(batch).await;
        if let Some(w) = &self.watcher {
            w.resume();
        }
        result
    }

    async fn reconcile_inner(&self, batch: Vec<FsEvent>) -> Result<Vec<String>, RouxError> {
        self.expire_pending_unlinks().await?;

        let mut batch_unlinks: BTreeMap<String, String> = BTreeMap::new();
        for ev in batch.iter().filter(|e| e.kind == EventKind::Unlink) {
            if let Some(node) = self.cache.get_by_path(&ev.relative_path).await? {
                batch_unlinks.insert(node.id.clone(), ev.relative_path.clone());
            }
        }

        let mut touched: BTreeSet<String> = BTreeSet::new();

        for ev in batch.iter().filter(|e| e.kind == EventKind::Add) {
            let Some(node) = self.reconcile_upsert(&ev.relative_path, &batch_unlinks).await? else {
                continue;
            };
            batch_unlinks.remove(&node.id);
            self.pending_unlinks.lock().remove(&node.id);
            touched.insert(node.id);
        }

        for ev in batch.iter().filter(|e| e.kind == EventKind::Change) {
            let Some(node) = self.reconcile_upsert(&ev.relative_path, &BTreeMap::new()).await? else {
                continue;
            };
            touched.insert(node.id);
        }

        for (id, path) in batch_unlinks {
            self.cache.delete(&id).await?;
            self.pending_unlinks
                .lock()
                .insert(id.clone(), PendingUnlink { path, since: Instant::now() });
            touched.insert(id);
        }

        if !touched.is_empty() {
            self.resolve_links().await?;
            self.rebuild_graph().await?;
            self.reembed(&touched).await;
        }

        Ok(touched.into_iter().collect())
    }

    /// Shared `add`/`change` handling: parse the file at `relative_path`,
    /// evict whatever cache row (if any) currently owns that path under a
    /// different id, then upsert. `rename_candidates` holds this batch's
    /// not-yet-consumed unlinks, so a same-batch rename just updates the
    /// existing row's path instead of deleting and recreating it.
    async fn reconcile_upsert(
        &self,
        relative_path: &str,
        rename_candidates: &BTreeMap<String, String>,
    ) -> Result<Option<Node>, RouxError> {
        let absolute = self.root.join(relative_path);
        let Some(extension) = Path::new(relative_path).extension().and_then(|e| e.to_str()) else {
            return Ok(None);
        };
        let extension = extension.to_lowercase();
        let node = match self.load_and_prepare_node(&absolute, relative_path, &extension).await {
            Ok(Some(n)) => n,
            Ok(None) => return Ok(None),
            Err(e) => {
                tracing::warn!("failed processing {relative_path}: {e}");
                return Ok(None);
            }
        };

        if !rename_candidates.contains_key(&node.id) {
            if let Some(existing) = self.cache.get_by_path(relative_path).await? {
                if existing.id != node.id {
                    self.cache.delete(&existing.id).await?;
                    self.vectors.delete(&existing.id).await?;
                }
            }
        }

        let source_ref = node.source_ref.as_ref().expect("load_and_prepare_node always attaches a source_ref");
        self.cache
            .upsert(&node, &source_ref.kind, relative_path, systemtime_to_unix(source_ref.last_modified))
            .await?;
        Ok(Some(node))
    }

    /// Create a new real node at `relative_path` (§4.8.4). `relative_path`
    /// must end in a registered reader's extension.
    #[tracing::instrument(skip(self, content))]
    pub async fn create(
        &self,
        relative_path: &str,
        content: &str,
        title: Option<String>,
        tags: Vec<String>,
    ) -> Result<Node, RouxError> {
        let _guard = self.write_lock.lock().await;
        let normalized = paths::normalize_relative(relative_path);
        let extension = Path::new(&normalized)
            .extension()
            .and_then(|e| e.to_str())
            .map(|s| s.to_lowercase())
            .ok_or_else(|| RouxError::InvalidParams("path must end in a registered extension".into()))?;
        let reader = codec::lookup(&extension)
            .ok_or_else(|| RouxError::InvalidParams(format!("no reader registered for extension '{extension}'")))?;
        if self.cache.get_by_path(&normalized).await?.is_some() {
            return Err(RouxError::NodeExists(format!("a node already exists at {normalized}")));
        }

        let absolute = paths::resolve_within_root(&self.root, Path::new(&normalized))?;
        if let Some(parent) = absolute.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let new_id = id::generate_id();
        let title = title.unwrap_or_else(|| paths::title_from_filename(&normalized));
        let frontmatter = codec::markdown::render_frontmatter(&new_id, &title, &tags, &BTreeMap::new())?;
        let file_contents = format!("---\n{frontmatter}\n---\n{content}");
        tokio::fs::write(&absolute, file_contents.as_bytes()).await?;
        let mtime = scanner::mtime(&absolute)?;

        let raw = tokio::fs::read(&absolute).await?;
        let parsed = reader.parse(&raw)?;
        let node = Node {
            id: new_id.clone(),
            title,
            content: Some(parsed.content),
            tags: parsed.tags,
            outgoing_links: parsed.raw_link_targets,
            properties: parsed.properties,
            source_ref: Some(SourceRef { kind: extension.clone(), absolute_path: absolute.clone(), last_modified: mtime }),
        };
        self.cache.upsert(&node, &extension, &normalized, systemtime_to_unix(mtime)).await?;
        self.resolve_links().await?;
        self.rebuild_graph().await?;
        self.cache.get(&new_id).await?.ok_or_else(|| RouxError::NotFound(new_id.clone()))
    }

    /// Update an existing real node's title, content, and/or tags (§4.8.4).
    #[tracing::instrument(skip(self, content))]
    pub async fn update(
        &self,
        id: &str,
        title: Option<String>,
        content: Option<String>,
        tags: Option<Vec<String>>,
    ) -> Result<Node, RouxError> {
        let _guard = self.write_lock.lock().await;
        let existing = self.cache.get(id).await?.ok_or_else(|| RouxError::NotFound(id.to_string()))?;
        if existing.is_ghost() {
            return Err(RouxError::InvalidParams(format!("{id} is a ghost node and cannot be updated")));
        }
        let source_ref = existing
            .source_ref
            .clone()
            .ok_or_else(|| RouxError::Cache(format!("node {id} is missing its source_ref")))?;
        // Round-tripped through the cache, `source_ref.absolute_path` actually holds
        // the relative path (DocumentCache is root-agnostic); resolve it here.
        let relative_path = existing
            .source_path_str()
            .ok_or_else(|| RouxError::Cache(format!("node {id} is missing a relative path")))?;
        let absolute = self.root.join(&relative_path);

        if let Some(new_title) = &title {
            if *new_title != existing.title {
                let has_incoming = self
                    .cache
                    .list_all()
                    .await?
                    .iter()
                    .any(|n| n.id != id && n.outgoing_links.iter().any(|l| l == id));
                if has_incoming {
                    return Err(RouxError::LinkIntegrity(format!(
                        "{id} has incoming links; renaming its title could break title-based resolution"
                    )));
                }
            }
        }

        let reader = codec::lookup(&source_ref.kind)
            .ok_or_else(|| RouxError::Cache(format!("no reader registered for '{}'", source_ref.kind)))?;
        let raw = tokio::fs::read(&absolute).await?;
        let parsed = reader.parse(&raw)?;

        let new_title = title.unwrap_or(existing.title.clone());
        let new_tags = tags.unwrap_or(existing.tags.clone());
        let new_content = content.unwrap_or_else(|| existing.content.clone().unwrap_or_default());

        let frontmatter = codec::markdown::render_frontmatter(id, &new_title, &new_tags, &parsed.properties)?;
        let file_contents = format!("---\n{frontmatter}\n---\n{new_content}");
        tokio::fs::write(&absolute, file_contents.as_bytes()).await?;
        let mtime = scanner::mtime(&absolute)?;

        let raw = tokio::fs::read(&absolute).await?;
        let parsed = reader.parse(&raw)?;

        let node = Node {
            id: id.to_string(),
            title: new_title,
            content: Some(parsed.content),
            tags: parsed.tags,
            outgoing_links: parsed.raw_link_targets,
            properties: parsed.properties,
            source_ref: Some(SourceRef {
                kind: source_ref.kind.clone(),
                absolute_path: absolute.clone(),
                last_modified: mtime,
            }),
        };
        self.cache.upsert(&node, &source_ref.kind, &relative_path, systemtime_to_unix(mtime)).await?;
        self.resolve_links().await?;
        self.rebuild_graph().await?;
        self.cache.get(id).await?.ok_or_else(|| RouxError::NotFound(id.to_string()))
    }

    /// Delete a node: its file (if real) plus its cache and vector records (§4.8.4).
    #[tracing::instrument(skip(self))]
    pub async fn delete(&self, id: &str) -> Result<bool, RouxError> {
        let _guard = self.write_lock.lock().await;
        let Some(existing) = self.cache.get(id).await? else {
            return Ok(false);
        };
        if !existing.is_ghost() {
            if let Some(relative_path) = existing.source_path_str() {
                let absolute = self.root.join(&relative_path);
                match tokio::fs::remove_file(&absolute).await {
                    Ok(()) => {}
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => return Err(e.into()),
                }
            }
        }
        self.cache.delete(id).await?;
        self.vectors.delete(id).await?;
        self.resolve_links().await?;
        self.rebuild_graph().await?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    async fn write_note(root: &Path, relative: &str, body: &str) {
        let path = root.join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, body).unwrap();
    }

    async fn open_coordinator(root: &Path) -> StoreCoordinator {
        StoreCoordinator::open(root.to_path_buf(), Config::default(), None).await.unwrap()
    }

    #[tokio::test]
    async fn sync_assigns_ids_and_resolves_dangling_links_as_ghosts() {
        let dir = tempdir().unwrap();
        write_note(dir.path(), "alpha.md", "---\ntitle: Alpha\n---\nSee [[Beta]].\n").await;
        let coordinator = open_coordinator(dir.path()).await;
        coordinator.sync().await.unwrap();

        let all = coordinator.cache().list_all().await.unwrap();
        let alpha = all.iter().find(|n| n.title == "Alpha").unwrap();
        assert!(id::is_valid_id(&alpha.id));
        let ghost = all.iter().find(|n| n.is_ghost()).unwrap();
        assert_eq!(ghost.title, "Beta");
        assert_eq!(alpha.outgoing_links, vec![ghost.id.clone()]);
    }

    #[tokio::test]
    async fn sync_promotes_ghost_when_real_node_adopts_its_title() {
        let dir = tempdir().unwrap();
        write_note(dir.path(), "alpha.md", "---\ntitle: Alpha\n---\nSee [[Beta]].\n").await;
        let coordinator = open_coordinator(dir.path()).await;
        coordinator.sync().await.unwrap();

        write_note(dir.path(), "beta.md", "---\ntitle: Beta\n---\nBody.\n").await;
        coordinator.sync().await.unwrap();

        let all = coordinator.cache().list_all().await.unwrap();
        assert!(all.iter().all(|n| !n.is_ghost()));
        let alpha = all.iter().find(|n| n.title == "Alpha").unwrap();
        let beta = all.iter().find(|n| n.title == "Beta").unwrap();
        assert_eq!(alpha.outgoing_links, vec![beta.id.clone()]);
    }

    #[tokio::test]
    async fn sync_twice_with_no_changes_is_stable() {
        let dir = tempdir().unwrap();
        write_note(dir.path(), "alpha.md", "---\ntitle: Alpha\n---\nNo links.\n").await;
        let coordinator = open_coordinator(dir.path()).await;
        coordinator.sync().await.unwrap();
        let first = coordinator.cache().list_all().await.unwrap();
        coordinator.sync().await.unwrap();
        let second = coordinator.cache().list_all().await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn deleting_file_removes_its_node_on_next_sync() {
        let dir = tempdir().unwrap();
        write_note(dir.path(), "alpha.md", "---\ntitle: Alpha\n---\nBody.\n").await;
        let coordinator = open_coordinator(dir.path()).await;
        coordinator.sync().await.unwrap();
        std::fs::remove_file(dir.path().join("alpha.md")).unwrap();
        coordinator.sync().await.unwrap();
        assert!(coordinator.cache().list_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn create_then_update_then_delete_round_trips() {
        let dir = tempdir().unwrap();
        let coordinator = open_coordinator(dir.path()).await;
        let created = coordinator
            .create("note.md", "hello", Some("Note".to_string()), vec!["a".to_string()])
            .await
            .unwrap();
        assert_eq!(created.title, "Note");

        let updated = coordinator
            .update(&created.id, None, Some("new body".to_string()), None)
            .await
            .unwrap();
        assert_eq!(updated.content.as_deref(), Some("new body"));

        assert!(coordinator.delete(&created.id).await.unwrap());
        assert!(coordinator.cache().get(&created.id).await.unwrap().is_none());
        assert!(!dir.path().join("note.md").exists());
    }

    #[tokio::test]
    async fn create_rejects_duplicate_path() {
        let dir = tempdir().unwrap();
        let coordinator = open_coordinator(dir.path()).await;
        coordinator.create("note.md", "a", None, vec![]).await.unwrap();
        assert!(coordinator.create("note.md", "b", None, vec![]).await.is_err());
    }

    #[tokio::test]
    async fn update_rejects_ghost_nodes() {
        let dir = tempdir().unwrap();
        write_note(dir.path(), "alpha.md", "---\ntitle: Alpha\n---\nSee [[Ghosty]].\n").await;
        let coordinator = open_coordinator(dir.path()).await;
        coordinator.sync().await.unwrap();
        let ghost = coordinator.cache().list_all().await.unwrap().into_iter().find(|n| n.is_ghost()).unwrap();
        assert!(coordinator.update(&ghost.id, Some("New".to_string()), None, None).await.is_err());
    }

    #[tokio::test]
    async fn reconcile_handles_rename_within_a_single_batch() {
        let dir = tempdir().unwrap();
        write_note(dir.path(), "alpha.md", "---\ntitle: Alpha\n---\nBody.\n").await;
        let coordinator = open_coordinator(dir.path()).await;
        coordinator.sync().await.unwrap();
        let original = coordinator.cache().get_by_path("alpha.md").await.unwrap().unwrap();

        std::fs::rename(dir.path().join("alpha.md"), dir.path().join("renamed.md")).unwrap();
        let batch = vec![
            FsEvent { relative_path: "alpha.md".to_string(), kind: EventKind::Unlink },
            FsEvent { relative_path: "renamed.md".to_string(), kind: EventKind::Add },
        ];
        coordinator.reconcile(batch).await.unwrap();

        let moved = coordinator.cache().get(&original.id).await.unwrap().unwrap();
        assert_eq!(moved.source_path_str(), Some("renamed.md".to_string()));
        assert!(coordinator.cache().get_by_path("alpha.md").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn reconcile_unlink_without_rename_enters_pending_unlinks() {
        let dir = tempdir().unwrap();
        write_note(dir.path(), "alpha.md", "---\ntitle: Alpha\n---\nBody.\n").await;
        let coordinator = open_coordinator(dir.path()).await;
        coordinator.sync().await.unwrap();
        let original = coordinator.cache().get_by_path("alpha.md").await.unwrap().unwrap();

        std::fs::remove_file(dir.path().join("alpha.md")).unwrap();
        let batch = vec![FsEvent { relative_path: "alpha.md".to_string(), kind: EventKind::Unlink }];
        coordinator.reconcile(batch).await.unwrap();

        assert!(coordinator.cache().get(&original.id).await.unwrap().is_none());
        assert!(coordinator.pending_unlinks.lock().contains_key(&original.id));
    }
}
