//! Storage engine for LarchDB.
//!
//! This crate provides:
//! - Disk manager for page-level file I/O
//! - Page store combining the buffer pool with disk-backed pages
//! - Latch-aware page guards with scoped pin/unpin
//! - The concurrent B+ tree index

pub mod btree;
mod disk;
mod store;

pub use btree::{
    BPlusTree, HeaderPage, IndexKey, Int64Comparator, InternalNode, KeyComparator, LeafNode,
    NodeKind, TreeIterator,
};
pub use disk::DiskManager;
pub use store::{PageStore, ReadPageGuard, WritePageGuard};
