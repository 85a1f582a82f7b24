//! In-memory tile store.

use std::collections::HashMap;
use std::sync::RwLock;

use super::{BlockKey, Manifest, TileStore};
use crate::error::{RasterProcessorError, Result};

/// Keeps blocks in a map; used by tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryTileStore {
    blocks: RwLock<HashMap<BlockKey, Vec<u8>>>,
    manifest: RwLock<Option<Manifest>>,
}

impl MemoryTileStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored blocks.
    pub fn len(&self) -> usize {
        self.blocks.read().map(|b| b.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All keys, sorted.
    pub fn keys(&self) -> Vec<BlockKey> {
        let mut keys: Vec<BlockKey> = self
            .blocks
            .read()
            .map(|b| b.keys().copied().collect())
            .unwrap_or_default();
        keys.sort();
        keys
    }

    /// Drop a block, as if it was never written.
    pub fn remove_block(&self, key: &BlockKey) -> Result<bool> {
        Ok(self.blocks.write().map_err(poisoned)?.remove(key).is_some())
    }
}

fn poisoned<T>(_: T) -> RasterProcessorError {
    RasterProcessorError::io("memory tile store lock poisoned")
}

impl TileStore for MemoryTileStore {
    fn write_block(&self, key: &BlockKey, bytes: &[u8]) -> Result<()> {
        self.blocks.write().map_err(poisoned)?.insert(*key, bytes.to_vec());
        Ok(())
    }

    fn read_block(&self, key: &BlockKey) -> Result<Option<Vec<u8>>> {
        Ok(self.blocks.read().map_err(poisoned)?.get(key).cloned())
    }

    fn has_block(&self, key: &BlockKey) -> Result<bool> {
        Ok(self.blocks.read().map_err(poisoned)?.contains_key(key))
    }

    fn write_manifest(&self, manifest: &Manifest) -> Result<()> {
        *self.manifest.write().map_err(poisoned)? = Some(manifest.clone());
        Ok(())
    }

    fn read_manifest(&self) -> Result<Option<Manifest>> {
        Ok(self.manifest.read().map_err(poisoned)?.clone())
    }
}
