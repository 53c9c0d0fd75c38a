//! Extraction cache keyed by content hash.
//!
//! One `<hash>.json` file per entry. Entries are written to a temporary file
//! in the cache directory and renamed into place, so a reader never sees a
//! partial entry. An entry that fails to parse is treated as a miss.

use crate::sidecar::ExtractedGraph;
use crate::WeftError;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

#[derive(Debug, Clone)]
pub struct ExtractionCache {
    dir: PathBuf,
}

impl ExtractionCache {
    /// Open (and create) the cache directory.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, WeftError> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir).map_err(|e| WeftError::Io(e.to_string()))?;
        Ok(Self { dir })
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn entry_path(&self, hash: &str) -> Option<PathBuf> {
        if hash.is_empty() || !hash.chars().all(|c| c.is_ascii_alphanumeric()) {
            return None;
        }
        Some(self.dir.join(format!("{hash}.json")))
    }

    #[must_use]
    pub fn contains(&self, hash: &str) -> bool {
        self.entry_path(hash).is_some_and(|p| p.is_file())
    }

    #[must_use]
    pub fn get(&self, hash: &str) -> Option<ExtractedGraph> {
        let path = self.entry_path(hash)?;
        let text = std::fs::read_to_string(&path).ok()?;
        match serde_json::from_str(&text) {
            Ok(graph) => Some(graph),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "corrupt cache entry ignored");
                None
            }
        }
    }

    pub fn put(&self, hash: &str, graph: &ExtractedGraph) -> Result<(), WeftError> {
        let path = self
            .entry_path(hash)
            .ok_or_else(|| WeftError::InvalidConfig(format!("invalid cache key '{hash}'")))?;
        let json =
            serde_json::to_vec_pretty(graph).map_err(|e| WeftError::Serialization(e.to_string()))?;

        let mut tmp = NamedTempFile::new_in(&self.dir).map_err(|e| WeftError::Io(e.to_string()))?;
        tmp.write_all(&json).map_err(|e| WeftError::Io(e.to_string()))?;
        tmp.as_file()
            .sync_all()
            .map_err(|e| WeftError::Io(e.to_string()))?;
        tmp.persist(&path).map_err(|e| WeftError::Io(e.error.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sidecar::ExtractedEntity;
    use tempfile::tempdir;

    fn graph() -> ExtractedGraph {
        ExtractedGraph {
            entities: vec![ExtractedEntity {
                name: "Parser".into(),
                kind: "class".into(),
                description: None,
            }],
            relationships: Vec::new(),
        }
    }

    #[test]
    fn put_then_get() {
        let dir = tempdir().expect("tempdir");
        let cache = ExtractionCache::open(dir.path().join("cache")).expect("open");
        assert!(!cache.contains("abc123"));
        assert_eq!(cache.get("abc123"), None);

        cache.put("abc123", &graph()).expect("put");
        assert!(cache.contains("abc123"));
        assert_eq!(cache.get("abc123"), Some(graph()));
    }

    #[test]
    fn corrupt_entry_is_a_miss() {
        let dir = tempdir().expect("tempdir");
        let cache = ExtractionCache::open(dir.path()).expect("open");
        std::fs::write(dir.path().join("bad.json"), "{ truncated").expect("write");
        assert_eq!(cache.get("bad"), None);

        // overwriting repairs it
        cache.put("bad", &graph()).expect("put");
        assert_eq!(cache.get("bad"), Some(graph()));
    }

    #[test]
    fn path_like_keys_are_refused() {
        let dir = tempdir().expect("tempdir");
        let cache = ExtractionCache::open(dir.path()).expect("open");
        assert!(cache.put("../escape", &graph()).is_err());
        assert_eq!(cache.get("../escape"), None);
    }

    #[test]
    fn no_temp_files_left_behind() {
        let dir = tempdir().expect("tempdir");
        let cache = ExtractionCache::open(dir.path()).expect("open");
        cache.put("k1", &graph()).expect("put");
        cache.put("k1", &graph()).expect("overwrite");
        let names: Vec<_> = std::fs::read_dir(dir.path())
            .expect("read_dir")
            .filter_map(Result::ok)
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["k1.json".to_string()]);
    }
}
