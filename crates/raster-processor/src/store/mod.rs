//! Block storage for output pyramids.

pub mod codec;
pub mod directory;
pub mod manifest;
pub mod memory;

pub use codec::TileCodec;
pub use directory::DirectoryTileStore;
pub use manifest::{LevelInfo, Manifest, RunStatus};
pub use memory::MemoryTileStore;

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::Result;

/// Address of one stored block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlockKey {
    /// Pyramid level; 0 is full resolution.
    pub level: u32,
    pub col: u32,
    pub row: u32,
}

impl BlockKey {
    pub fn new(level: u32, col: u32, row: u32) -> Self {
        Self { level, col, row }
    }
}

impl fmt::Display for BlockKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.level, self.row, self.col)
    }
}

/// Persistent storage of encoded blocks plus a manifest.
///
/// Writing a block is idempotent: writing the same key twice leaves one
/// block with the second contents, and a reader never sees a partial block.
pub trait TileStore: Send + Sync {
    fn write_block(&self, key: &BlockKey, bytes: &[u8]) -> Result<()>;

    /// Encoded bytes of a block, or `None` if it was never written.
    fn read_block(&self, key: &BlockKey) -> Result<Option<Vec<u8>>>;

    fn has_block(&self, key: &BlockKey) -> Result<bool>;

    fn write_manifest(&self, manifest: &Manifest) -> Result<()>;

    fn read_manifest(&self) -> Result<Option<Manifest>>;
}
