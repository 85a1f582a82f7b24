//! Tile store backed by a directory tree.
//!
//! Layout: `<root>/manifest.json` and `<root>/<level>/<row>/<col>.<ext>`.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

use super::{BlockKey, Manifest, TileStore};
use crate::error::{RasterProcessorError, Result};

const MANIFEST_FILE: &str = "manifest.json";

/// Distinguishes concurrent temporary files within one process.
static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Stores each block as one file.
#[derive(Debug, Clone)]
pub struct DirectoryTileStore {
    root: PathBuf,
    extension: String,
}

impl DirectoryTileStore {
    /// Create (or reuse) a store at `root` whose blocks use `extension`.
    pub fn new(root: impl Into<PathBuf>, extension: &str) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)
            .map_err(|e| RasterProcessorError::io(format!("{}: {}", root.display(), e)))?;
        Ok(Self {
            root,
            extension: extension.trim_start_matches('.').to_string(),
        })
    }

    /// Open an existing store, taking the block extension from its manifest.
    pub fn open(root: impl Into<PathBuf>) -> Result<(Self, Manifest)> {
        let root = root.into();
        let manifest_path = root.join(MANIFEST_FILE);
        let text = fs::read_to_string(&manifest_path).map_err(|e| {
            RasterProcessorError::InvalidManifest(format!("{}: {}", manifest_path.display(), e))
        })?;
        let manifest: Manifest = serde_json::from_str(&text)?;
        let store = Self {
            root,
            extension: manifest.codec.extension().to_string(),
        };
        Ok((store, manifest))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of a block file.
    pub fn block_path(&self, key: &BlockKey) -> PathBuf {
        self.root
            .join(key.level.to_string())
            .join(key.row.to_string())
            .join(format!("{}.{}", key.col, self.extension))
    }
}

/// Write via a temporary file in the same directory, then rename.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| RasterProcessorError::io(format!("{} has no parent", path.display())))?;
    fs::create_dir_all(parent)
        .map_err(|e| RasterProcessorError::io(format!("{}: {}", parent.display(), e)))?;

    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("block");
    let temp_path = parent.join(format!(
        ".tmp-{}-{}-{}",
        std::process::id(),
        TEMP_COUNTER.fetch_add(1, Ordering::Relaxed),
        name
    ));

    let result = fs::write(&temp_path, bytes).and_then(|_| fs::rename(&temp_path, path));
    if let Err(e) = result {
        let _ = fs::remove_file(&temp_path);
        return Err(RasterProcessorError::io(format!("{}: {}", path.display(), e)));
    }
    Ok(())
}

impl TileStore for DirectoryTileStore {
    fn write_block(&self, key: &BlockKey, bytes: &[u8]) -> Result<()> {
        let path = self.block_path(key);
        debug!(block = %key, size = bytes.len(), "Writing block");
        write_atomic(&path, bytes)
    }

    fn read_block(&self, key: &BlockKey) -> Result<Option<Vec<u8>>> {
        let path = self.block_path(key);
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(RasterProcessorError::io(format!("{}: {}", path.display(), e))),
        }
    }

    fn has_block(&self, key: &BlockKey) -> Result<bool> {
        Ok(self.block_path(key).is_file())
    }

    fn write_manifest(&self, manifest: &Manifest) -> Result<()> {
        let json = serde_json::to_vec_pretty(manifest)
            .map_err(|e| RasterProcessorError::InvalidManifest(e.to_string()))?;
        write_atomic(&self.root.join(MANIFEST_FILE), &json)
    }

    fn read_manifest(&self) -> Result<Option<Manifest>> {
        let path = self.root.join(MANIFEST_FILE);
        match fs::read_to_string(&path) {
            Ok(text) => Ok(Some(serde_json::from_str(&text)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(RasterProcessorError::io(format!("{}: {}", path.display(), e))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_block_layout() {
        let temp = TempDir::new().unwrap();
        let store = DirectoryTileStore::new(temp.path(), ".png").unwrap();
        let key = BlockKey::new(2, 5, 7);
        store.write_block(&key, b"data").unwrap();

        let expected = temp.path().join("2").join("7").join("5.png");
        assert!(expected.is_file());
        assert_eq!(store.read_block(&key).unwrap(), Some(b"data".to_vec()));
        assert!(store.has_block(&key).unwrap());
        assert!(store.read_block(&BlockKey::new(2, 5, 8)).unwrap().is_none());
    }

    #[test]
    fn test_no_temp_files_left() {
        let temp = TempDir::new().unwrap();
        let store = DirectoryTileStore::new(temp.path(), "raw").unwrap();
        let key = BlockKey::new(0, 0, 0);
        store.write_block(&key, b"a").unwrap();
        store.write_block(&key, b"b").unwrap();

        let dir = temp.path().join("0").join("0");
        let names: Vec<String> = fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["0.raw".to_string()]);
        assert_eq!(store.read_block(&key).unwrap(), Some(b"b".to_vec()));
    }

    #[test]
    fn test_missing_manifest() {
        let temp = TempDir::new().unwrap();
        let store = DirectoryTileStore::new(temp.path(), "png").unwrap();
        assert!(store.read_manifest().unwrap().is_none());
        assert!(matches!(
            DirectoryTileStore::open(temp.path()),
            Err(RasterProcessorError::InvalidManifest(_))
        ));
    }
}
