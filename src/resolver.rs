//! Link Resolver (§4.3): turns raw wiki-link strings into stable node ids,
//! materializing ghost nodes for dangling references and pruning ghosts
//! that are no longer referenced.

use std::collections::{BTreeMap, BTreeSet};

use crate::{
    id::ghost_id_for_title,
    node::Node,
    paths::{normalize_relative, stem},
};

/// A real (non-ghost) node's resolution inputs.
#[derive(Debug, Clone)]
pub struct RealNodeInput {
    pub id: String,
    pub title: String,
    /// Normalized (lowercase, forward-slash) path relative to the source root.
    pub source_path: Option<String>,
    /// Raw `[[target]]` strings as extracted from the body, in
    /// first-occurrence order (original casing preserved).
    pub raw_targets: Vec<String>,
}

#[derive(Debug, Default)]
pub struct ResolverOutput {
    /// New `outgoing_links` per real node id.
    pub rewritten_links: BTreeMap<String, Vec<String>>,
    /// Ghost nodes that must exist after this pass (fresh or pre-existing).
    pub ghosts_needed: BTreeMap<String, Node>,
    /// Previously-materialized ghost ids no longer referenced by anything.
    pub ghost_ids_to_prune: Vec<String>,
    /// Advisory-only: titles/filenames that matched more than one real node.
    pub ambiguous_warnings: Vec<String>,
}

fn strip_fragment_and_ext(raw: &str) -> String {
    let without_fragment = raw.split('#').next().unwrap_or(raw);
    without_fragment
        .strip_suffix(".md")
        .unwrap_or(without_fragment)
        .to_string()
}

fn swap_space_dash(s: &str) -> String {
    s.chars()
        .map(|c| match c {
            ' ' => '-',
            '-' => ' ',
            other => other,
        })
        .collect()
}

/// Build a case-insensitive index from key -> (sorted ids, had_duplicate).
fn build_index<'a>(entries: impl Iterator<Item = (String, &'a str)>) -> BTreeMap<String, Vec<String>> {
    let mut index: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for (key, id) in entries {
        index.entry(key.to_lowercase()).or_default().insert(id.to_string());
    }
    index
        .into_iter()
        .map(|(k, set)| (k, set.into_iter().collect()))
        .collect()
}

pub fn resolve(reals: &[RealNodeInput], existing_ghosts: &[Node]) -> ResolverOutput {
    let mut out = ResolverOutput::default();

    let filename_index = build_index(
        reals
            .iter()
            .flat_map(|r| {
                let title_entry = (r.title.clone(), r.id.as_str());
                let stem_entry = r
                    .source_path
                    .as_ref()
                    .map(|p| (stem(p), r.id.as_str()));
                std::iter::once(title_entry).chain(stem_entry)
            }),
    );
    let path_index = build_index(
        reals
            .iter()
            .filter_map(|r| r.source_path.as_ref().map(|p| (p.clone(), r.id.as_str()))),
    );
    let title_to_real: BTreeMap<String, String> = reals
        .iter()
        .map(|r| (r.title.trim().to_lowercase(), r.id.clone()))
        .collect();

    let ghost_title_by_id: BTreeMap<String, String> =
        existing_ghosts.iter().map(|g| (g.id.clone(), g.title.clone())).collect();
    // Ghost ids whose title now matches a real node's title — redirect to the real id.
    let ghost_redirect: BTreeMap<String, String> = ghost_title_by_id
        .iter()
        .filter_map(|(ghost_id, title)| {
            title_to_real
                .get(&title.trim().to_lowercase())
                .map(|real_id| (ghost_id.clone(), real_id.clone()))
        })
        .collect();

    let known_ids: BTreeSet<&str> = reals.iter().map(|r| r.id.as_str()).collect();
    let known_ghost_ids: BTreeSet<&str> = existing_ghosts.iter().map(|g| g.id.as_str()).collect();

    let mut referenced_ghosts: BTreeSet<String> = BTreeSet::new();

    for real in reals {
        let mut rewritten = Vec::with_capacity(real.raw_targets.len());
        for raw in &real.raw_targets {
            if known_ids.contains(raw.as_str()) {
                rewritten.push(raw.clone());
                continue;
            }
            if known_ghost_ids.contains(raw.as_str()) {
                let resolved = ghost_redirect.get(raw.as_str()).cloned().unwrap_or_else(|| raw.clone());
                if !ghost_redirect.contains_key(raw.as_str()) {
                    referenced_ghosts.insert(raw.clone());
                }
                rewritten.push(resolved);
                continue;
            }

            if raw.contains('/') {
                let normalized = normalize_relative(raw);
                if let Some(ids) = path_index.get(&normalized) {
                    rewritten.push(ids[0].clone());
                    continue;
                }
            }

            let stripped = strip_fragment_and_ext(raw).to_lowercase();
            if let Some(ids) = filename_index.get(&stripped) {
                if ids.len() > 1 {
                    out.ambiguous_warnings.push(format!(
                        "link target '{raw}' matched {} nodes; using '{}'",
                        ids.len(),
                        ids[0]
                    ));
                }
                rewritten.push(ids[0].clone());
                continue;
            }

            let swapped = swap_space_dash(&stripped);
            if let Some(ids) = filename_index.get(&swapped) {
                if ids.len() > 1 {
                    out.ambiguous_warnings.push(format!(
                        "link target '{raw}' matched {} nodes (space/dash variant); using '{}'",
                        ids.len(),
                        ids[0]
                    ));
                }
                rewritten.push(ids[0].clone());
                continue;
            }

            let ghost_id = ghost_id_for_title(raw);
            referenced_ghosts.insert(ghost_id.clone());
            out.ghosts_needed
                .entry(ghost_id.clone())
                .or_insert_with(|| Node::ghost(ghost_id.clone(), raw.clone()));
            rewritten.push(ghost_id);
        }
        out.rewritten_links.insert(real.id.clone(), rewritten);
    }

    // Keep any pre-existing ghost that's still referenced (not redirected away).
    for ghost in existing_ghosts {
        if referenced_ghosts.contains(&ghost.id) && !ghost_redirect.contains_key(&ghost.id) {
            out.ghosts_needed.entry(ghost.id.clone()).or_insert_with(|| ghost.clone());
        }
    }

    for ghost in existing_ghosts {
        if !out.ghosts_needed.contains_key(&ghost.id) {
            out.ghost_ids_to_prune.push(ghost.id.clone());
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn real(id: &str, title: &str, path: &str, targets: &[&str]) -> RealNodeInput {
        RealNodeInput {
            id: id.to_string(),
            title: title.to_string(),
            source_path: Some(path.to_string()),
            raw_targets: targets.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn resolves_title_match() {
        let reals = vec![
            real("a00000000001", "Alpha", "alpha.md", &["Beta"]),
            real("b00000000002", "Beta", "beta.md", &[]),
        ];
        let out = resolve(&reals, &[]);
        assert_eq!(out.rewritten_links["a00000000001"], vec!["b00000000002".to_string()]);
        assert!(out.ghosts_needed.is_empty());
    }

    #[test]
    fn dangling_link_materializes_ghost() {
        let reals = vec![real("a00000000001", "Alpha", "alpha.md", &["Nonexistent"])];
        let out = resolve(&reals, &[]);
        let ghost_id = ghost_id_for_title("Nonexistent");
        assert_eq!(out.rewritten_links["a00000000001"], vec![ghost_id.clone()]);
        assert!(out.ghosts_needed.contains_key(&ghost_id));
    }

    #[test]
    fn ghost_is_pruned_once_unreferenced() {
        let existing_ghost = Node::ghost(ghost_id_for_title("Gone"), "Gone".to_string());
        let reals = vec![real("a00000000001", "Alpha", "alpha.md", &[])];
        let out = resolve(&reals, &[existing_ghost.clone()]);
        assert_eq!(out.ghost_ids_to_prune, vec![existing_ghost.id]);
    }

    #[test]
    fn ghost_promoted_when_real_node_adopts_its_title() {
        let existing_ghost = Node::ghost(ghost_id_for_title("Beta"), "Beta".to_string());
        let reals = vec![
            real("a00000000001", "Alpha", "alpha.md", &[existing_ghost.id.as_str()]),
            real("b00000000002", "Beta", "beta.md", &[]),
        ];
        let out = resolve(&reals, &[existing_ghost.clone()]);
        assert_eq!(out.rewritten_links["a00000000001"], vec!["b00000000002".to_string()]);
        assert!(!out.ghosts_needed.contains_key(&existing_ghost.id));
        assert_eq!(out.ghost_ids_to_prune, vec![existing_ghost.id]);
    }

    #[test]
    fn path_style_link_resolves_via_path_index() {
        let reals = vec![
            real("a00000000001", "Alpha", "notes/alpha.md", &["notes/beta.md"]),
            real("b00000000002", "Beta", "notes/beta.md", &[]),
        ];
        let out = resolve(&reals, &[]);
        assert_eq!(out.rewritten_links["a00000000001"], vec!["b00000000002".to_string()]);
    }

    #[test]
    fn space_dash_variant_is_tried() {
        let reals = vec![
            real("a00000000001", "Alpha", "alpha.md", &["my-page"]),
            real("b00000000002", "My Page", "my page.md", &[]),
        ];
        let out = resolve(&reals, &[]);
        assert_eq!(out.rewritten_links["a00000000001"], vec!["b00000000002".to_string()]);
    }

    #[test]
    fn ambiguous_filename_match_is_advisory_only() {
        let reals = vec![
            real("a00000000001", "Dup", "x/dup.md", &["dup"]),
            real("b00000000002", "Dup", "y/dup.md", &[]),
            real("c00000000003", "Other", "z/other.md", &[]),
        ];
        let out = resolve(&reals, &[]);
        assert!(!out.ambiguous_warnings.is_empty());
        assert_eq!(out.rewritten_links["a00000000001"], vec!["a00000000001".to_string()]);
    }
}
