//! Filesystem Scanner (§4.6): recursive enumeration of a source root,
//! honoring exclusion rules and the format reader registry's extension set.

use std::{
    path::{Path, PathBuf},
    time::SystemTime,
};

use walkdir::WalkDir;

use crate::{codec, error::RouxError};

/// One file discovered under a source root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedFile {
    pub absolute_path: PathBuf,
    /// Forward-slash relative path from the source root, original casing.
    pub relative_path: String,
    pub extension: String,
}

pub(crate) fn is_excluded(path: &Path, root: &Path, excluded_dirs: &[String]) -> bool {
    path.strip_prefix(root)
        .unwrap_or(path)
        .components()
        .any(|c| {
            let name = c.as_os_str().to_string_lossy();
            excluded_dirs.iter().any(|ex| ex.eq_ignore_ascii_case(&name))
        })
}

/// Recursively enumerate `root`, skipping excluded directories at any depth,
/// following no symlinks, and keeping only files whose extension is
/// registered in the format reader registry.
pub fn scan(root: &Path, excluded_dirs: &[String]) -> Result<Vec<ScannedFile>, RouxError> {
    let mut files = Vec::new();
    let walker = WalkDir::new(root).follow_links(false).into_iter();
    for entry in walker.filter_entry(|e| {
        if e.file_type().is_dir() && e.path() != root {
            !is_excluded(e.path(), root, excluded_dirs)
        } else {
            true
        }
    }) {
        let entry = entry.map_err(|e| RouxError::Io(format!("walking {}: {e}", root.display())))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        if is_excluded(path, root, excluded_dirs) {
            continue;
        }
        let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
            continue;
        };
        if codec::lookup(ext).is_none() {
            continue;
        }
        let relative = path
            .strip_prefix(root)
            .unwrap_or(path)
            .to_path_buf();
        files.push(ScannedFile {
            absolute_path: path.to_path_buf(),
            relative_path: crate::paths::os_path_to_string(&relative),
            extension: ext.to_lowercase(),
        });
    }
    Ok(files)
}

/// Read a file's modification time.
pub fn mtime(path: &Path) -> Result<SystemTime, RouxError> {
    Ok(std::fs::metadata(path)?.modified()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn excludes_configured_directories() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join(".roux")).unwrap();
        fs::write(dir.path().join(".roux/cache.db"), "").unwrap();
        fs::write(dir.path().join("note.md"), "# hi").unwrap();
        let excludes = vec![".roux".to_string()];
        let found = scan(dir.path(), &excludes).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].relative_path, "note.md");
    }

    #[test]
    fn filters_unregistered_extensions() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("note.md"), "# hi").unwrap();
        fs::write(dir.path().join("image.png"), []).unwrap();
        let found = scan(dir.path(), &[]).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].extension, "md");
    }

    #[test]
    fn recurses_nested_directories() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("notes/sub")).unwrap();
        fs::write(dir.path().join("notes/sub/deep.md"), "# deep").unwrap();
        let found = scan(dir.path(), &[]).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].relative_path, "notes/sub/deep.md");
    }

    #[test]
    fn exclusion_check_applies_at_any_depth() {
        let root = Path::new("/vault");
        let nested = Path::new("/vault/a/node_modules/b/file.md");
        assert!(is_excluded(nested, root, &["node_modules".to_string()]));
    }
}
