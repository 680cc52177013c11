//! Error types for LarchDB.

use thiserror::Error;

/// Result type alias using LarchError.
pub type Result<T> = std::result::Result<T, LarchError>;

/// Errors that can occur in LarchDB operations.
///
/// Not-found lookups and duplicate-key inserts are normal return values
/// (`Option` / `bool`), not errors; the variants here cover resource
/// exhaustion, I/O failure and broken structural invariants.
#[derive(Debug, Error)]
pub enum LarchError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Buffer pool full, unable to allocate frame")]
    BufferPoolFull,

    #[error("Page not found: {page_id}")]
    PageNotFound { page_id: u32 },

    #[error("Invalid node type on page {page_id}: tag {tag}")]
    InvalidNodeType { page_id: u32, tag: u8 },

    #[error("Header page full, cannot register index")]
    HeaderFull,

    #[error("Index name too long: {0}")]
    IndexNameTooLong(String),

    #[error("B+ tree corrupted: {0}")]
    TreeCorrupted(String),

    #[error("Invalid parameter: {name} = {value}")]
    InvalidParameter { name: String, value: String },
}
