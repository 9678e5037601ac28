//! End-to-end scenarios over a real temp-directory source root, covering
//! resolution, ghost lifecycle, rename handling, duplicate ids, and fuzzy
//! vs. semantic name resolution.

use std::{path::PathBuf, sync::Arc};

use async_trait::async_trait;
use roux_core::{
    cache::{Inclusion, ListFilter},
    config::Config,
    coordinator::StoreCoordinator,
    embedder::Embedder,
    error::RouxError,
    graph::Direction,
    query::{QueryFacade, ResolveStrategy},
    watch::{EventKind, FsEvent},
};
use tempfile::TempDir;

fn write(root: &PathBuf, relative: &str, contents: &str) {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, contents).unwrap();
}

async fn open(root: PathBuf) -> StoreCoordinator {
    StoreCoordinator::open(root, Config::default(), None).await.unwrap()
}

/// A fixed-vector embedder used where a test only needs *some* embedding
/// to exist, not any particular semantic behavior.
struct ConstantEmbedder;

#[async_trait]
impl Embedder for ConstantEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>, RouxError> {
        Ok(vec![1.0, 0.0])
    }

    fn dimensions(&self) -> usize {
        2
    }

    fn model_id(&self) -> String {
        "constant-test-embedder".to_string()
    }
}

/// Scenario A — resolution and ghost creation.
#[tokio::test]
async fn scenario_a_resolution_and_ghost_creation() {
    let tempdir = TempDir::new().unwrap();
    let root = tempdir.path().to_path_buf();
    write(
        &root,
        "recipes/curry.md",
        "---\ntitle: Curry\n---\nServe with [[Basmati Rice]] and [[Mango Chutney]].\n",
    );
    write(&root, "recipes/basmati rice.md", "---\ntitle: Basmati Rice\n---\nRinse thoroughly.\n");

    let coordinator = Arc::new(open(root).await);
    coordinator.sync().await.unwrap();
    let facade = QueryFacade::new(coordinator.clone());

    let curry = coordinator
        .cache()
        .get_by_path("recipes/curry.md")
        .await
        .unwrap()
        .expect("curry node synced");
    let rice = coordinator
        .cache()
        .get_by_path("recipes/basmati rice.md")
        .await
        .unwrap()
        .expect("rice node synced");

    assert_eq!(curry.id.len(), 12);
    assert_eq!(rice.id.len(), 12);

    let ghost_id = roux_core::id::ghost_id_for_title("Mango Chutney");
    assert_eq!(curry.outgoing_links, vec![rice.id.clone(), ghost_id.clone()]);

    let neighbors = facade.get_neighbors(&curry.id, Direction::Out, 10).await.unwrap();
    let neighbor_ids: Vec<&str> = neighbors.iter().map(|n| n.id.as_str()).collect();
    assert!(neighbor_ids.contains(&rice.id.as_str()));
    assert!(neighbor_ids.contains(&ghost_id.as_str()));

    let (ghosts, total) = facade
        .list_nodes(
            &ListFilter { ghosts: Some(Inclusion::Only), ..Default::default() },
            roux_core::cache::Paging { limit: 10, offset: 0 },
        )
        .await
        .unwrap();
    assert_eq!(total, 1);
    assert_eq!(ghosts[0].id, ghost_id);
    assert_eq!(ghosts[0].title, "Mango Chutney");
}

/// Scenario B — ghost promotion: adding the real file for a ghost target
/// deletes the ghost and rewires incoming links to the new real node.
#[tokio::test]
async fn scenario_b_ghost_promotion() {
    let tempdir = TempDir::new().unwrap();
    let root = tempdir.path().to_path_buf();
    write(
        &root,
        "recipes/curry.md",
        "---\ntitle: Curry\n---\nServe with [[Basmati Rice]] and [[Mango Chutney]].\n",
    );
    write(&root, "recipes/basmati rice.md", "---\ntitle: Basmati Rice\n---\nRinse thoroughly.\n");

    let coordinator = open(root.clone()).await;
    coordinator.sync().await.unwrap();
    let curry_id = coordinator.cache().get_by_path("recipes/curry.md").await.unwrap().unwrap().id;
    let ghost_id = roux_core::id::ghost_id_for_title("Mango Chutney");

    write(&root, "recipes/mango chutney.md", "---\ntitle: Mango Chutney\n---\nSweet and tangy.\n");
    coordinator
        .reconcile(vec![FsEvent { relative_path: "recipes/mango chutney.md".to_string(), kind: EventKind::Add }])
        .await
        .unwrap();

    assert!(coordinator.cache().get(&ghost_id).await.unwrap().is_none());
    let curry = coordinator.cache().get(&curry_id).await.unwrap().unwrap();
    let chutney = coordinator.cache().get_by_path("recipes/mango chutney.md").await.unwrap().unwrap();
    assert!(curry.outgoing_links.contains(&chutney.id));
    assert!(!curry.outgoing_links.contains(&ghost_id));

    let facade = QueryFacade::new(Arc::new(coordinator));
    let path = facade.find_path(&curry_id, &chutney.id);
    assert_eq!(path, Some(vec![curry_id, chutney.id]));
}

/// Scenario C — a file moved between watch batches arrives as an unlink
/// and an add in the same batch; the node's identity must survive the move.
#[tokio::test]
async fn scenario_c_rename_across_batch() {
    let tempdir = TempDir::new().unwrap();
    let root = tempdir.path().to_path_buf();
    write(
        &root,
        "recipes/curry.md",
        "---\ntitle: Curry\n---\nServe with [[Basmati Rice]] and [[Mango Chutney]].\n",
    );
    write(&root, "recipes/basmati rice.md", "---\ntitle: Basmati Rice\n---\nRinse thoroughly.\n");

    let coordinator =
        StoreCoordinator::open(root.clone(), Config::default(), Some(Arc::new(ConstantEmbedder) as Arc<dyn Embedder>))
            .await
            .unwrap();
    coordinator.sync().await.unwrap();
    let rice = coordinator.cache().get_by_path("recipes/basmati rice.md").await.unwrap().unwrap();
    let rice_id = rice.id.clone();
    assert!(coordinator.vectors().has_embedding(&rice_id).await.unwrap());
    assert_eq!(coordinator.vectors().count().await.unwrap(), 2);

    std::fs::remove_file(root.join("recipes/basmati rice.md")).unwrap();
    write(
        &root,
        "pantry/basmati rice.md",
        &format!("---\nid: {rice_id}\ntitle: Basmati Rice\n---\nRinse thoroughly.\n"),
    );

    coordinator
        .reconcile(vec![
            FsEvent { relative_path: "recipes/basmati rice.md".to_string(), kind: EventKind::Unlink },
            FsEvent { relative_path: "pantry/basmati rice.md".to_string(), kind: EventKind::Add },
        ])
        .await
        .unwrap();

    let moved = coordinator.cache().get_by_path("pantry/basmati rice.md").await.unwrap();
    assert_eq!(moved.map(|n| n.id), Some(rice_id.clone()));
    assert!(coordinator.cache().get_by_path("recipes/basmati rice.md").await.unwrap().is_none());
    assert!(coordinator.vectors().has_embedding(&rice_id).await.unwrap());
    assert_eq!(coordinator.vectors().count().await.unwrap(), 2);

    let curry = coordinator.cache().get_by_path("recipes/curry.md").await.unwrap().unwrap();
    assert!(curry.outgoing_links.contains(&rice_id));
}

/// Scenario D — two files claiming the same frontmatter id: the first one
/// enumerated wins; the id still resolves afterward.
#[tokio::test]
async fn scenario_d_duplicate_id() {
    let tempdir = TempDir::new().unwrap();
    let root = tempdir.path().to_path_buf();
    write(&root, "a.md", "---\nid: ABCDEFGHJKLM\ntitle: First\n---\nOne.\n");
    write(&root, "b.md", "---\nid: ABCDEFGHJKLM\ntitle: Second\n---\nTwo.\n");

    let coordinator = open(root).await;
    coordinator.sync().await.unwrap();

    let facade = QueryFacade::new(Arc::new(coordinator));
    let exists = facade.nodes_exist(&["ABCDEFGHJKLM".to_string()]).await.unwrap();
    assert_eq!(exists.get("ABCDEFGHJKLM"), Some(&true));

    let (nodes, total) = facade
        .list_nodes(&ListFilter::default(), roux_core::cache::Paging { limit: 10, offset: 0 })
        .await
        .unwrap();
    assert_eq!(total, 1);
    assert_eq!(nodes[0].id, "ABCDEFGHJKLM");
}

/// Scenario E — bigram Dice fuzzy resolution catches typos but not
/// unrelated synonyms.
#[tokio::test]
async fn scenario_e_fuzzy_resolution() {
    let tempdir = TempDir::new().unwrap();
    let root = tempdir.path().to_path_buf();
    write(&root, "garlic.md", "---\ntitle: Garlic\n---\nPungent.\n");
    write(&root, "onion.md", "---\ntitle: Onion\n---\nAromatic.\n");
    write(&root, "chicken-thigh.md", "---\ntitle: Chicken Thigh\n---\nDark meat.\n");

    let coordinator = open(root).await;
    coordinator.sync().await.unwrap();
    let facade = QueryFacade::new(Arc::new(coordinator));

    let names = vec!["garlik".to_string(), "onyon".to_string(), "poultry leg".to_string()];
    let matches = facade.resolve_nodes(&names, ResolveStrategy::Fuzzy, 0.5).await.unwrap();

    assert_eq!(matches[0].matched.as_ref().map(|n| n.title.as_str()), Some("Garlic"));
    assert!(matches[0].score.unwrap() >= 0.5);
    assert_eq!(matches[1].matched.as_ref().map(|n| n.title.as_str()), Some("Onion"));
    assert!(matches[1].score.unwrap() >= 0.5);
    assert!(matches[2].matched.is_none());
}

/// A toy embedder that maps any text mentioning poultry-ish words to the
/// same basis vector as "Chicken Thigh", so a semantic query can find what
/// bigram similarity cannot.
struct SynonymEmbedder;

#[async_trait]
impl Embedder for SynonymEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, RouxError> {
        let lower = text.to_lowercase();
        let vector = if ["chicken", "poultry", "thigh", "leg"].iter().any(|w| lower.contains(w)) {
            [1.0, 0.0, 0.0]
        } else if lower.contains("garlic") {
            [0.0, 1.0, 0.0]
        } else if lower.contains("onion") {
            [0.0, 0.0, 1.0]
        } else {
            [0.0, 0.0, 0.0]
        };
        Ok(vector.to_vec())
    }

    fn dimensions(&self) -> usize {
        3
    }

    fn model_id(&self) -> String {
        "synonym-test-embedder".to_string()
    }
}

/// Scenario F — semantic resolution finds a synonym fuzzy matching cannot.
#[tokio::test]
async fn scenario_f_semantic_vs_fuzzy() {
    let tempdir = TempDir::new().unwrap();
    let root = tempdir.path().to_path_buf();
    write(&root, "garlic.md", "---\ntitle: Garlic\n---\nPungent.\n");
    write(&root, "onion.md", "---\ntitle: Onion\n---\nAromatic.\n");
    write(&root, "chicken-thigh.md", "---\ntitle: Chicken Thigh\n---\nDark meat.\n");

    let coordinator = open(root).await;
    coordinator.sync().await.unwrap();

    let coordinator = StoreCoordinator::open(
        coordinator.root().to_path_buf(),
        Config::default(),
        Some(Arc::new(SynonymEmbedder) as Arc<dyn Embedder>),
    )
    .await
    .unwrap();
    coordinator.sync().await.unwrap();

    let facade = QueryFacade::new(Arc::new(coordinator));
    let names = vec!["poultry leg".to_string()];
    let matches = facade.resolve_nodes(&names, ResolveStrategy::Semantic, 0.5).await.unwrap();
    assert_eq!(matches[0].matched.as_ref().map(|n| n.title.as_str()), Some("Chicken Thigh"));
}
