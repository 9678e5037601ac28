//! Format Reader Registry (§4.1).
//!
//! Maps lowercase file extensions to [`FormatReader`] implementations.
//! Registration is exclusive — attempting to register an extension twice
//! fails rather than silently overwriting the existing reader.

use std::{collections::BTreeMap, path::Path, sync::RwLock};

use once_cell::sync::Lazy;

use crate::error::RouxError;

pub mod markdown;

/// A file after format-specific extraction, before link resolution.
#[derive(Debug, Clone, Default)]
pub struct ParsedFile {
    pub id: Option<String>,
    pub title: Option<String>,
    pub tags: Vec<String>,
    pub properties: std::collections::BTreeMap<String, serde_json::Value>,
    pub content: String,
    /// Raw `[[target]]` strings as they appear in the source, in
    /// first-occurrence order, deduplicated.
    pub raw_link_targets: Vec<String>,
}

/// A parser for one file extension.
pub trait FormatReader: Send + Sync {
    /// Parse raw file bytes into a [`ParsedFile`].
    fn parse(&self, raw: &[u8]) -> Result<ParsedFile, RouxError>;

    /// Rewrite `raw` so that its `id` frontmatter field is `id`, preserving
    /// everything else verbatim. Used by the TOCTOU-guarded writeback (§4.8.1).
    fn write_id(&self, raw: &[u8], id: &str) -> Result<Vec<u8>, RouxError>;
}

type CodecMap = BTreeMap<String, &'static (dyn FormatReader + Send + Sync)>;

static REGISTRY: Lazy<RwLock<CodecMap>> = Lazy::new(|| {
    let mut map: CodecMap = BTreeMap::new();
    map.insert("md".to_string(), &markdown::MARKDOWN_READER as &_);
    map.insert("markdown".to_string(), &markdown::MARKDOWN_READER as &_);
    RwLock::new(map)
});

/// Register a reader for `extension` (without leading dot, compared
/// case-insensitively). Fails if the extension is already registered.
pub fn register(
    extension: &str,
    reader: &'static (dyn FormatReader + Send + Sync),
) -> Result<(), RouxError> {
    let key = extension.to_lowercase();
    let mut registry = REGISTRY.write().expect("codec registry lock poisoned");
    if registry.contains_key(&key) {
        return Err(RouxError::InvalidParams(format!(
            "a reader is already registered for extension '{key}'"
        )));
    }
    registry.insert(key, reader);
    Ok(())
}

/// Look up the reader registered for an extension, case-insensitively.
pub fn lookup(extension: &str) -> Option<&'static (dyn FormatReader + Send + Sync)> {
    let key = extension.to_lowercase();
    REGISTRY
        .read()
        .expect("codec registry lock poisoned")
        .get(&key)
        .copied()
}

/// All currently registered extensions, for the scanner's filter (§4.6).
pub fn registered_extensions() -> Vec<String> {
    REGISTRY
        .read()
        .expect("codec registry lock poisoned")
        .keys()
        .cloned()
        .collect()
}

/// Look up a reader by a file's extension (case-insensitive), returning
/// `None` if the file has no extension or none is registered.
pub fn lookup_for_path(path: &Path) -> Option<&'static (dyn FormatReader + Send + Sync)> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .and_then(lookup)
}
