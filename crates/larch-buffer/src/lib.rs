//! Buffer pool management for LarchDB.
//!
//! A fixed set of frames caches pages for the storage layer. Each frame
//! carries the per-page latch (a reader-writer lock around the bytes), a
//! pin count, and dirty/referenced bits; the pool tracks residency in a
//! directory and reclaims frames with a second-chance sweep, pushing
//! dirty victims through a write-back hook supplied at construction.

mod frame;
mod pool;

pub use frame::{Frame, Page};
pub use pool::{BufferPool, PoolStats, WriteBack};
