//! Graph Index (§4.4): an in-memory directed graph over node ids, rebuilt
//! wholesale from the Document Cache.

use std::collections::{BTreeMap, BinaryHeap, HashSet, VecDeque};

use petgraph::{graph::NodeIndex, Directed, Graph};

use crate::node::{CentralityRecord, Node};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    In,
    Out,
    Both,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
    InDegree,
    OutDegree,
}

/// The directed graph of node ids, derived from (but not authoritative
/// over) the document cache (§3.5).
#[derive(Debug, Clone, Default)]
pub struct GraphIndex {
    graph: Graph<String, (), Directed>,
    index_of: BTreeMap<String, NodeIndex>,
}

impl GraphIndex {
    /// Build from the cache's nodes: a graph node for every id, an edge for
    /// every `(source, target)` in `outgoing_links` whose target exists,
    /// deduplicated per source.
    pub fn from_nodes<'a>(nodes: impl IntoIterator<Item = &'a Node>) -> GraphIndex {
        let nodes: Vec<&Node> = nodes.into_iter().collect();
        let ids: HashSet<&str> = nodes.iter().map(|n| n.id.as_str()).collect();

        let mut graph = Graph::<String, (), Directed>::new();
        let mut index_of = BTreeMap::new();
        for node in &nodes {
            let idx = graph.add_node(node.id.clone());
            index_of.insert(node.id.clone(), idx);
        }
        for node in &nodes {
            let mut seen = HashSet::new();
            for target in &node.outgoing_links {
                if ids.contains(target.as_str()) && seen.insert(target.clone()) {
                    let source_idx = index_of[&node.id];
                    let target_idx = index_of[target];
                    graph.add_edge(source_idx, target_idx, ());
                }
            }
        }
        GraphIndex { graph, index_of }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index_of.contains_key(id)
    }

    pub fn neighbors(&self, id: &str, direction: Direction, limit: Option<usize>) -> Vec<String> {
        let Some(limit) = limit else {
            return Vec::new();
        };
        if limit == 0 {
            return Vec::new();
        }
        let Some(&idx) = self.index_of.get(id) else {
            return Vec::new();
        };
        let mut result = Vec::new();
        let mut push_dir = |dir: petgraph::Direction| {
            for neighbor in self.graph.neighbors_directed(idx, dir) {
                if result.len() >= limit {
                    break;
                }
                result.push(self.graph[neighbor].clone());
            }
        };
        match direction {
            Direction::Out => push_dir(petgraph::Direction::Outgoing),
            Direction::In => push_dir(petgraph::Direction::Incoming),
            Direction::Both => {
                push_dir(petgraph::Direction::Outgoing);
                if result.len() < limit {
                    push_dir(petgraph::Direction::Incoming);
                }
            }
        }
        result.truncate(limit);
        result
    }

    /// Bidirectional BFS. `source == target` returns `Some([source])`.
    pub fn find_path(&self, source: &str, target: &str) -> Option<Vec<String>> {
        if source == target {
            if self.index_of.contains_key(source) {
                return Some(vec![source.to_string()]);
            }
            return None;
        }
        let &start = self.index_of.get(source)?;
        let &goal = self.index_of.get(target)?;

        let mut fwd_visited: BTreeMap<NodeIndex, NodeIndex> = BTreeMap::new();
        let mut bwd_visited: BTreeMap<NodeIndex, NodeIndex> = BTreeMap::new();
        let mut fwd_queue = VecDeque::from([start]);
        let mut bwd_queue = VecDeque::from([goal]);
        fwd_visited.insert(start, start);
        bwd_visited.insert(goal, goal);

        let mut meeting = None;
        'search: while !fwd_queue.is_empty() || !bwd_queue.is_empty() {
            for _ in 0..fwd_queue.len() {
                let Some(cur) = fwd_queue.pop_front() else { break };
                for next in self.graph.neighbors_directed(cur, petgraph::Direction::Outgoing) {
                    if bwd_visited.contains_key(&next) {
                        fwd_visited.entry(next).or_insert(cur);
                        meeting = Some(next);
                        break 'search;
                    }
                    if fwd_visited.insert(next, cur).is_none() {
                        fwd_queue.push_back(next);
                    }
                }
            }
            for _ in 0..bwd_queue.len() {
                let Some(cur) = bwd_queue.pop_front() else { break };
                for prev in self.graph.neighbors_directed(cur, petgraph::Direction::Incoming) {
                    if fwd_visited.contains_key(&prev) {
                        bwd_visited.entry(prev).or_insert(cur);
                        meeting = Some(prev);
                        break 'search;
                    }
                    if bwd_visited.insert(prev, cur).is_none() {
                        bwd_queue.push_back(prev);
                    }
                }
            }
        }

        let meeting = meeting?;
        let mut forward_half = vec![meeting];
        let mut cur = meeting;
        while cur != start {
            cur = fwd_visited[&cur];
            forward_half.push(cur);
        }
        forward_half.reverse();

        let mut cur = meeting;
        while cur != goal {
            cur = bwd_visited[&cur];
            forward_half.push(cur);
        }

        Some(forward_half.into_iter().map(|idx| self.graph[idx].clone()).collect())
    }

    fn degree(&self, idx: NodeIndex, metric: Metric) -> usize {
        let dir = match metric {
            Metric::InDegree => petgraph::Direction::Incoming,
            Metric::OutDegree => petgraph::Direction::Outgoing,
        };
        self.graph.neighbors_directed(idx, dir).count()
    }

    /// Top-k by `metric`, ties broken by ascending id. Implemented with a
    /// k-sized heap so we never materialize a full sort for large graphs.
    pub fn hubs(&self, metric: Metric, limit: usize) -> Vec<(String, usize)> {
        if limit == 0 {
            return Vec::new();
        }
        // Min-heap keyed by (score, Reverse(id)) so the smallest-scoring
        // (and, on ties, lexicographically largest id) entry sits on top
        // and gets evicted first once we exceed `limit`.
        #[derive(Eq, PartialEq)]
        struct Entry(usize, std::cmp::Reverse<String>);
        impl Ord for Entry {
            fn cmp(&self, other: &Self) -> std::cmp::Ordering {
                self.0.cmp(&other.0).then_with(|| self.1.cmp(&other.1))
            }
        }
        impl PartialOrd for Entry {
            fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
                Some(self.cmp(other))
            }
        }
        let mut heap: BinaryHeap<std::cmp::Reverse<Entry>> = BinaryHeap::new();
        for (id, &idx) in &self.index_of {
            let score = self.degree(idx, metric);
            let entry = Entry(score, std::cmp::Reverse(id.clone()));
            if heap.len() < limit {
                heap.push(std::cmp::Reverse(entry));
            } else if let Some(std::cmp::Reverse(worst)) = heap.peek() {
                if entry > *worst {
                    heap.pop();
                    heap.push(std::cmp::Reverse(entry));
                }
            }
        }
        let mut out: Vec<(String, usize)> = heap
            .into_iter()
            .map(|std::cmp::Reverse(Entry(score, std::cmp::Reverse(id)))| (id, score))
            .collect();
        out.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        out
    }

    pub fn compute_centrality(&self) -> BTreeMap<String, CentralityRecord> {
        self.index_of
            .iter()
            .map(|(id, &idx)| {
                (
                    id.clone(),
                    CentralityRecord {
                        in_degree: self.degree(idx, Metric::InDegree) as u32,
                        out_degree: self.degree(idx, Metric::OutDegree) as u32,
                    },
                )
            })
            .collect()
    }
}
