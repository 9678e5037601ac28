//! Core data model: [`Node`], [`SourceRef`], [`VectorRecord`], [`CentralityRecord`] (§3.1).

use std::{collections::BTreeMap, path::PathBuf, time::SystemTime};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Where a node's content lives on disk. Absent for ghost nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRef {
    /// File extension (without leading dot) that produced this node.
    pub kind: String,
    pub absolute_path: PathBuf,
    pub last_modified: SystemTime,
}

/// The atomic unit of the graph (§3.1).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    pub title: String,
    /// Absent iff this node is a ghost.
    pub content: Option<String>,
    pub tags: Vec<String>,
    /// Resolved link targets; may reference ghosts.
    pub outgoing_links: Vec<String>,
    pub properties: BTreeMap<String, Value>,
    pub source_ref: Option<SourceRef>,
}

impl Node {
    pub fn is_ghost(&self) -> bool {
        self.content.is_none() && self.source_ref.is_none()
    }

    pub fn ghost(id: String, title: String) -> Node {
        Node {
            id,
            title,
            content: None,
            tags: Vec::new(),
            outgoing_links: Vec::new(),
            properties: BTreeMap::new(),
            source_ref: None,
        }
    }

    /// Relative path (forward-slash, lowercased) of this node's source, if any.
    pub fn source_path_str(&self) -> Option<String> {
        self.source_ref
            .as_ref()
            .map(|s| crate::paths::os_path_to_string(&s.absolute_path))
    }
}

/// One row of the vector index: `{ id, model_identifier, unit-norm f32 vector }` (§3.1).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorRecord {
    pub id: String,
    pub model: String,
    pub vector: Vec<f32>,
}

/// Transient, recomputed-on-rebuild centrality snapshot (§3.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CentralityRecord {
    pub in_degree: u32,
    pub out_degree: u32,
}

/// A lightweight projection of [`Node`] used by listing/paging operations,
/// so callers don't pay for full content on every row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSummary {
    pub id: String,
    pub title: String,
    pub tags: Vec<String>,
    pub is_ghost: bool,
}

impl From<&Node> for NodeSummary {
    fn from(n: &Node) -> Self {
        NodeSummary {
            id: n.id.clone(),
            title: n.title.clone(),
            tags: n.tags.clone(),
            is_ghost: n.is_ghost(),
        }
    }
}
