//! Path normalization and source-root boundary enforcement (§3.2.7, §4.6).

use std::path::{Component, Path, PathBuf};

use path_clean::PathClean;

use crate::error::RouxError;

/// Utility to render an OS path as a forward-slash string, independent of
/// platform separator conventions.
pub fn os_path_to_string<P: AsRef<Path>>(os_path: P) -> String {
    os_path
        .as_ref()
        .components()
        .filter_map(|c| match c {
            Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
            Component::CurDir => Some(".".to_string()),
            Component::ParentDir => Some("..".to_string()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Normalize a relative path as stored in `outgoing_links` / the path index:
/// lowercase, forward slashes, no leading `./`.
pub fn normalize_relative(path: &str) -> String {
    let cleaned = os_path_to_string(Path::new(path).clean());
    cleaned.to_lowercase()
}

/// Resolve `candidate` (absolute or relative to `root`) and verify the
/// resolved path is strictly below `root`. Returns the resolved absolute
/// path on success.
pub fn resolve_within_root(root: &Path, candidate: &Path) -> Result<PathBuf, RouxError> {
    let joined = if candidate.is_absolute() {
        candidate.to_path_buf()
    } else {
        root.join(candidate)
    };
    let cleaned = joined.clean();
    let root_clean = root.clean();
    if !cleaned.starts_with(&root_clean) || cleaned == root_clean {
        return Err(RouxError::PathTraversal(format!(
            "{} does not resolve strictly below {}",
            candidate.display(),
            root.display()
        )));
    }
    Ok(cleaned)
}

/// Filename without extension, used by the link resolver's filename index.
pub fn stem(path: &str) -> String {
    Path::new(path)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Derive a display title from a bare filename stem when frontmatter omits
/// one (§6.3): split on `-`/`_`, title-case each word.
pub fn title_from_filename(path: &str) -> String {
    stem(path)
        .split(['-', '_'])
        .filter(|w| !w.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
