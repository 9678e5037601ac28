//! Query Façade (§4.9): the closed set of operations external callers use.
//! Thin translation layer over the [`StoreCoordinator`] plus response
//! shaping (content/neighbor caps) that is a rendering contract, not a
//! store invariant.

use std::{collections::BTreeMap, sync::Arc};

use rand::Rng;

use crate::{
    cache::{ListFilter, Paging, TagMode},
    coordinator::StoreCoordinator,
    error::RouxError,
    graph::{Direction, Metric},
    node::{Node, NodeSummary},
};

const MAX_CONTENT_CHARS: usize = 8000;
const TRUNCATION_SENTINEL: &str = "\n…[truncated]";
const MAX_EMBEDDED_NEIGHBORS: usize = 20;

fn cap_content(mut node: Node) -> Node {
    if let Some(content) = &node.content {
        if content.chars().count() > MAX_CONTENT_CHARS {
            let truncated: String = content.chars().take(MAX_CONTENT_CHARS).collect();
            node.content = Some(format!("{truncated}{TRUNCATION_SENTINEL}"));
        }
    }
    node
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

fn bigrams(s: &str) -> Vec<(char, char)> {
    let chars: Vec<char> = s.chars().collect();
    if chars.len() < 2 {
        return Vec::new();
    }
    chars.windows(2).map(|w| (w[0], w[1])).collect()
}

/// Bigram Dice similarity on whitespace-stripped, lowercased strings.
fn dice_coefficient(a: &str, b: &str) -> f32 {
    let normalize = |s: &str| s.chars().filter(|c| !c.is_whitespace()).collect::<String>().to_lowercase();
    let a = normalize(a);
    let b = normalize(b);
    let a_bigrams = bigrams(&a);
    let b_bigrams = bigrams(&b);
    if a_bigrams.is_empty() || b_bigrams.is_empty() {
        return if a == b { 1.0 } else { 0.0 };
    }
    let mut remaining: BTreeMap<(char, char), usize> = BTreeMap::new();
    for bg in &b_bigrams {
        *remaining.entry(*bg).or_insert(0) += 1;
    }
    let mut overlap = 0usize;
    for bg in &a_bigrams {
        if let Some(count) = remaining.get_mut(bg) {
            if *count > 0 {
                overlap += 1;
                *count -= 1;
            }
        }
    }
    (2.0 * overlap as f32) / (a_bigrams.len() + b_bigrams.len()) as f32
}

/// A node plus its (capped) local neighborhood, for `get_node(depth = 1)`.
#[derive(Debug, Clone)]
pub struct NodeView {
    pub node: Node,
    pub neighbors: Option<NeighborsResult>,
}

#[derive(Debug, Clone, Default)]
pub struct NeighborsResult {
    pub items: Vec<String>,
    pub total: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveStrategy {
    Exact,
    Fuzzy,
    Semantic,
}

#[derive(Debug, Clone)]
pub struct ResolveMatch {
    pub query: String,
    pub matched: Option<NodeSummary>,
    pub score: Option<f32>,
}

/// The closed operation set (§4.9). Every external caller goes through
/// here rather than reaching into the cache, graph, or vector index
/// directly, so caps and validation stay centralized.
pub struct QueryFacade {
    coordinator: Arc<StoreCoordinator>,
}

impl QueryFacade {
    pub fn new(coordinator: Arc<StoreCoordinator>) -> QueryFacade {
        QueryFacade { coordinator }
    }

    fn capped_neighbors(&self, id: &str, direction: Direction) -> NeighborsResult {
        let all = self.coordinator.graph().neighbors(id, direction, Some(usize::MAX));
        let total = all.len();
        let items = all.into_iter().take(MAX_EMBEDDED_NEIGHBORS).collect();
        NeighborsResult { items, total }
    }

    pub async fn search(&self, query: &str, limit: usize) -> Result<Vec<(NodeSummary, f64)>, RouxError> {
        let limit = limit.clamp(1, 50);
        let embedder = self
            .coordinator
            .embedder()
            .ok_or_else(|| RouxError::ProviderError("no embedder configured".into()))?;
        let query_vector = embedder.embed(query).await?;
        let hits = self.coordinator.vectors().search(&query_vector, limit).await?;
        let ids: Vec<String> = hits.iter().map(|(id, _)| id.clone()).collect();
        let nodes = self.coordinator.cache().get_many(&ids).await?;
        let by_id: BTreeMap<&str, &Node> = nodes.iter().map(|n| (n.id.as_str(), n)).collect();
        Ok(hits
            .into_iter()
            .filter_map(|(id, distance)| by_id.get(id.as_str()).map(|n| (NodeSummary::from(*n), distance)))
            .collect())
    }

    /// `depth = 0` returns the node alone; `depth = 1` also attaches its
    /// (capped) neighborhood. `not_found` is an absent `Option`, not an error.
    pub async fn get_node(&self, id: &str, depth: u8) -> Result<Option<NodeView>, RouxError> {
        let Some(node) = self.coordinator.cache().get(id).await? else {
            return Ok(None);
        };
        let neighbors = if depth >= 1 { Some(self.capped_neighbors(id, Direction::Both)) } else { None };
        Ok(Some(NodeView { node: cap_content(node), neighbors }))
    }

    pub async fn get_neighbors(&self, id: &str, direction: Direction, limit: usize) -> Result<Vec<NodeSummary>, RouxError> {
        let limit = limit.clamp(1, 50);
        let ids = self.coordinator.graph().neighbors(id, direction, Some(limit));
        let nodes = self.coordinator.cache().get_many(&ids).await?;
        Ok(nodes.iter().map(NodeSummary::from).collect())
    }

    pub fn find_path(&self, source: &str, target: &str) -> Option<Vec<String>> {
        self.coordinator.graph().find_path(source, target)
    }

    pub fn get_hubs(&self, metric: Metric, limit: usize) -> Vec<(String, usize)> {
        self.coordinator.graph().hubs(metric, limit)
    }

    pub async fn search_by_tags(&self, tags: &[String], mode: TagMode, limit: usize) -> Result<Vec<NodeSummary>, RouxError> {
        let nodes = self.coordinator.cache().search_by_tags(tags, mode, limit).await?;
        Ok(nodes.iter().map(NodeSummary::from).collect())
    }

    /// Excludes ghosts by default, since a ghost has no content worth surfacing.
    pub async fn random_node(&self, tags: Option<&[String]>) -> Result<Option<Node>, RouxError> {
        let candidates = match tags {
            Some(ts) if !ts.is_empty() => self.coordinator.cache().search_by_tags(ts, TagMode::Any, usize::MAX).await?,
            _ => self.coordinator.cache().list_all().await?,
        };
        let reals: Vec<Node> = candidates.into_iter().filter(|n| !n.is_ghost()).collect();
        if reals.is_empty() {
            return Ok(None);
        }
        let idx = rand::thread_rng().gen_range(0..reals.len());
        Ok(reals.into_iter().nth(idx))
    }

    pub async fn create_node(&self, relative_path: &str, content: &str, title: Option<String>, tags: Vec<String>) -> Result<Node, RouxError> {
        let node = self.coordinator.create(relative_path, content, title, tags).await?;
        Ok(cap_content(node))
    }

    pub async fn update_node(
        &self,
        id: &str,
        title: Option<String>,
        content: Option<String>,
        tags: Option<Vec<String>>,
    ) -> Result<Node, RouxError> {
        if title.is_none() && content.is_none() && tags.is_none() {
            return Err(RouxError::InvalidParams(
                "update_node requires at least one of title, content, or tags".into(),
            ));
        }
        let node = self.coordinator.update(id, title, content, tags).await?;
        Ok(cap_content(node))
    }

    pub async fn delete_node(&self, id: &str) -> Result<bool, RouxError> {
        self.coordinator.delete(id).await
    }

    pub async fn list_nodes(&self, filter: &ListFilter, paging: Paging) -> Result<(Vec<NodeSummary>, usize), RouxError> {
        self.coordinator.cache().list(filter, paging).await
    }

    /// `exact`: case-insensitive title equality, score 1 or absent.
    /// `fuzzy`: bigram Dice similarity on normalized titles, threshold default 0.7.
    /// `semantic`: embedder argmax cosine similarity; fails without an embedder.
    pub async fn resolve_nodes(&self, names: &[String], strategy: ResolveStrategy, threshold: f32) -> Result<Vec<ResolveMatch>, RouxError> {
        let threshold = threshold.clamp(0.0, 1.0);
        let all = self.coordinator.cache().list_all().await?;
        let reals: Vec<&Node> = all.iter().filter(|n| !n.is_ghost()).collect();

        match strategy {
            ResolveStrategy::Exact => Ok(names
                .iter()
                .map(|query| {
                    let found = reals.iter().find(|n| n.title.eq_ignore_ascii_case(query));
                    ResolveMatch {
                        query: query.clone(),
                        matched: found.map(|n| NodeSummary::from(*n)),
                        score: found.map(|_| 1.0),
                    }
                })
                .collect()),
            ResolveStrategy::Fuzzy => Ok(names
                .iter()
                .map(|query| {
                    let best = reals
                        .iter()
                        .map(|n| (*n, dice_coefficient(query, &n.title)))
                        .max_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
                    match best {
                        Some((n, score)) if score >= threshold => ResolveMatch {
                            query: query.clone(),
                            matched: Some(NodeSummary::from(n)),
                            score: Some(score),
                        },
                        _ => ResolveMatch { query: query.clone(), matched: None, score: None },
                    }
                })
                .collect()),
            ResolveStrategy::Semantic => {
                let embedder = self
                    .coordinator
                    .embedder()
                    .ok_or_else(|| RouxError::ProviderError("no embedder configured".into()))?;
                let titles: Vec<String> = reals.iter().map(|n| n.title.clone()).collect();
                let title_vectors = embedder.embed_batch(&titles).await?;

                let mut out = Vec::with_capacity(names.len());
                for query in names {
                    let query_vector = embedder.embed(query).await?;
                    let best = title_vectors
                        .iter()
                        .enumerate()
                        .map(|(idx, v)| (idx, cosine_similarity(&query_vector, v)))
                        .max_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
                    out.push(match best {
                        Some((idx, score)) if score >= threshold => ResolveMatch {
                            query: query.clone(),
                            matched: Some(NodeSummary::from(reals[idx])),
                            score: Some(score),
                        },
                        _ => ResolveMatch { query: query.clone(), matched: None, score: None },
                    });
                }
                Ok(out)
            }
        }
    }

    pub async fn nodes_exist(&self, ids: &[String]) -> Result<BTreeMap<String, bool>, RouxError> {
        self.coordinator.cache().nodes_exist(ids).await
    }
}
