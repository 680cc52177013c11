//! Page identifiers for LarchDB storage.

use serde::{Deserialize, Serialize};

/// Page size in bytes (4 KB).
pub const PAGE_SIZE: usize = 4 * 1024;

/// Unique identifier for a page within the data file.
///
/// Page ids are dense integers handed out by the page store. The
/// distinguished value [`PageId::INVALID`] means "no page" and is used as
/// the sentinel for absent parents, empty trees and list terminators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PageId(pub u32);

/// The well-known page holding `(index_name, root_page_id)` records.
pub const HEADER_PAGE_ID: PageId = PageId(0);

impl PageId {
    /// Sentinel denoting "no page".
    pub const INVALID: PageId = PageId(u32::MAX);

    /// Returns true if this id refers to an actual page.
    pub fn is_valid(&self) -> bool {
        *self != Self::INVALID
    }
}

impl std::fmt::Display for PageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_valid() {
            write!(f, "{}", self.0)
        } else {
            write!(f, "invalid")
        }
    }
}
