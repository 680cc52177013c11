//! Record identifiers stored as index payloads.

use crate::page::PageId;
use serde::{Deserialize, Serialize};

/// Location of a record in heap storage: a page id plus a slot within it.
///
/// The index treats this as an opaque fixed-size payload; it occupies 8
/// bytes on a page (`page_id` then `slot`, both little-endian u32).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordId {
    /// Page holding the record.
    pub page_id: PageId,
    /// Slot number within the page.
    pub slot: u32,
}

impl RecordId {
    /// Creates a new record id.
    pub fn new(page_id: PageId, slot: u32) -> Self {
        Self { page_id, slot }
    }

    /// Packs the record id into a single u64.
    pub fn as_u64(&self) -> u64 {
        ((self.page_id.0 as u64) << 32) | (self.slot as u64)
    }

    /// Unpacks a record id from its u64 representation.
    pub fn from_u64(value: u64) -> Self {
        Self {
            page_id: PageId((value >> 32) as u32),
            slot: value as u32,
        }
    }
}

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.page_id, self.slot)
    }
}
