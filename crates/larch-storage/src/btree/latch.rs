//! Write-path latch bookkeeping for latch crabbing.

use crate::store::WritePageGuard;
use larch_common::page::PageId;
use larch_common::{LarchError, Result};
use parking_lot::RwLockWriteGuard;

/// State threaded through a write operation: the root latch, the ordered
/// queue of ancestor page latches, and pages queued for deferred deletion.
///
/// The queue is ordered root-side first. Releasing drops the root latch,
/// then the page latches front to back, matching the acquisition order
/// top-down. Deferred deletions are executed by the tree only after the
/// context has released every latch.
pub struct WriteContext<'a> {
    /// The index-wide root latch; None once released early.
    root: Option<RwLockWriteGuard<'a, PageId>>,
    /// Write guards on ancestors still latched, shallowest first.
    queue: Vec<WritePageGuard<'a>>,
    /// Pages to free once all latches are gone.
    deleted: Vec<PageId>,
}

impl<'a> WriteContext<'a> {
    /// Starts a write operation holding the root latch.
    pub fn new(root: RwLockWriteGuard<'a, PageId>) -> Self {
        Self {
            root: Some(root),
            queue: Vec::new(),
            deleted: Vec::new(),
        }
    }

    /// The root page id as of the held root latch, INVALID if the latch
    /// was already released.
    pub fn current_root(&self) -> PageId {
        self.root.as_deref().copied().unwrap_or(PageId::INVALID)
    }

    /// True while the root latch is held.
    pub fn holds_root(&self) -> bool {
        self.root.is_some()
    }

    /// Publishes a new root page id. Fails if the root latch was released,
    /// which would mean the descent wrongly proved a node safe.
    pub fn set_root_id(&mut self, root_id: PageId) -> Result<()> {
        match self.root.as_deref_mut() {
            Some(current) => {
                *current = root_id;
                Ok(())
            }
            None => Err(LarchError::TreeCorrupted(
                "root update attempted without the root latch".to_string(),
            )),
        }
    }

    /// Number of ancestor latches held.
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// True when no ancestor latches are held.
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Retains a newly latched ancestor.
    pub fn push(&mut self, guard: WritePageGuard<'a>) {
        self.queue.push(guard);
    }

    /// Hands back the deepest held ancestor.
    pub fn pop(&mut self) -> Option<WritePageGuard<'a>> {
        self.queue.pop()
    }

    /// Releases every held latch: root latch first, then ancestors
    /// top-down. Called when the descent reaches a safe node.
    pub fn release_ancestors(&mut self) {
        self.root = None;
        self.queue.clear();
    }

    /// Queues a page for deletion after all latches are released.
    pub fn defer_delete(&mut self, page_id: PageId) {
        self.deleted.push(page_id);
    }

    /// Releases everything still held and returns the pages queued for
    /// deletion.
    pub fn finish(self) -> Vec<PageId> {
        let WriteContext {
            root,
            queue,
            deleted,
        } = self;
        drop(root);
        drop(queue);
        deleted
    }
}
