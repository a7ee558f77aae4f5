//! Ordered lookup-directory path resolution.
//!
//! An existing file is found by scanning the lookup directories in order; a
//! file that exists nowhere is anchored to the first directory.

use anyhow::{Context, Result};
use std::path::{Component, Path, PathBuf};

#[derive(Debug, Clone)]
pub struct PathResolver {
    lookup_dirs: Vec<PathBuf>,
}

impl PathResolver {
    /// Build from user-supplied directories (`~` and `$VAR` are expanded).
    /// An empty list means the current working directory.
    pub fn new(dirs: &[String], cwd: &Path) -> Result<Self> {
        let mut lookup_dirs = Vec::with_capacity(dirs.len().max(1));
        for raw in dirs {
            let expanded = shellexpand::full(raw)
                .with_context(|| format!("Failed to expand lookup dir: {raw}"))?;
            let p = PathBuf::from(expanded.as_ref());
            let abs = if p.is_absolute() { p } else { cwd.join(p) };
            lookup_dirs.push(canonical_or_lexical(&abs));
        }
        if lookup_dirs.is_empty() {
            lookup_dirs.push(canonical_or_lexical(cwd));
        }
        Ok(Self { lookup_dirs })
    }

    pub fn lookup_dirs(&self) -> &[PathBuf] {
        &self.lookup_dirs
    }

    /// Absolute path for `rel`: first existing hit, else under the first dir
    pub fn resolve(&self, rel: &str) -> PathBuf {
        self.resolve_existing(rel)
            .unwrap_or_else(|| normalize(&self.lookup_dirs[0].join(rel)))
    }

    /// Absolute path for `rel` only when it exists in some lookup dir
    pub fn resolve_existing(&self, rel: &str) -> Option<PathBuf> {
        let rel = Path::new(rel);
        if rel.is_absolute() {
            let p = normalize(rel);
            return p.exists().then_some(p);
        }
        self.lookup_dirs
            .iter()
            .map(|dir| normalize(&dir.join(rel)))
            .find(|p| p.exists())
    }
}

/// Canonicalize when possible (existing dirs), else normalize lexically
fn canonical_or_lexical(p: &Path) -> PathBuf {
    dunce::canonicalize(p).unwrap_or_else(|_| normalize(p))
}

/// Lexical normalization: drop `.`, fold `..` without touching the FS
pub fn normalize(p: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for c in p.components() {
        match c {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_existing_file_found_in_later_dir() {
        let tmp = TempDir::new().unwrap();
        let a = tmp.path().join("a");
        let b = tmp.path().join("b");
        fs::create_dir_all(&a).unwrap();
        fs::create_dir_all(b.join("src")).unwrap();
        fs::write(b.join("src/lib.rs"), "x").unwrap();

        let r = PathResolver::new(&["a".into(), "b".into()], tmp.path()).unwrap();
        let hit = r.resolve("src/lib.rs");
        assert!(hit.ends_with("b/src/lib.rs"));
        assert!(hit.exists());
    }

    #[test]
    fn test_new_file_anchors_to_first_dir() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("a")).unwrap();
        fs::create_dir_all(tmp.path().join("b")).unwrap();

        let r = PathResolver::new(&["a".into(), "b".into()], tmp.path()).unwrap();
        assert!(r.resolve("new/file.py").ends_with("a/new/file.py"));
        assert!(r.resolve_existing("new/file.py").is_none());
    }

    #[test]
    fn test_normalize_folds_dots() {
        assert_eq!(
            normalize(Path::new("/x/./y/../z.rs")),
            PathBuf::from("/x/z.rs")
        );
    }
}
