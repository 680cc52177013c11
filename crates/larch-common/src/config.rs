//! Configuration structures for LarchDB.

use crate::page::PAGE_SIZE;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Storage configuration for the page store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Path of the data file.
    pub data_path: PathBuf,
    /// Buffer pool size in number of frames.
    pub buffer_pool_frames: usize,
    /// Enable fsync after page writes.
    pub fsync_enabled: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_path: PathBuf::from("./larch.db"),
            buffer_pool_frames: 1024, // 4 MB with 4 KB pages
            fsync_enabled: false,
        }
    }
}

impl StorageConfig {
    /// Returns the total buffer pool size in bytes.
    pub fn buffer_pool_size_bytes(&self) -> usize {
        self.buffer_pool_frames * PAGE_SIZE
    }
}

/// Configuration of a single B+ tree index.
///
/// `leaf_max_size` and `internal_max_size` bound the steady-state entry
/// count per node; small values are useful for exercising splits and
/// merges in tests.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Maximum number of key/record pairs in a leaf node.
    pub leaf_max_size: u16,
    /// Maximum number of children in an internal node.
    pub internal_max_size: u16,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            leaf_max_size: 128,
            internal_max_size: 128,
        }
    }
}
