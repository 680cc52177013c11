//! Forward iterator over the leaf chain.

use crate::btree::key::IndexKey;
use crate::btree::node::LeafNode;
use crate::store::{PageStore, ReadPageGuard};
use larch_common::types::RecordId;
use larch_common::Result;

/// Forward scan over `(key, record id)` pairs in key order.
///
/// Holds a read latch (and pin) on the current leaf between calls to
/// [`Iterator::next`]. When the scan crosses to the next leaf, the
/// current leaf is released *before* the next one is latched, so the
/// iterator never waits on a latch while holding one.
pub struct TreeIterator<'a> {
    store: &'a PageStore,
    leaf: Option<ReadPageGuard<'a>>,
    index: usize,
}

impl<'a> TreeIterator<'a> {
    pub(crate) fn new(store: &'a PageStore, leaf: Option<ReadPageGuard<'a>>, index: usize) -> Self {
        Self { store, leaf, index }
    }

    pub(crate) fn empty(store: &'a PageStore) -> Self {
        Self {
            store,
            leaf: None,
            index: 0,
        }
    }
}

impl<'a> Iterator for TreeIterator<'a> {
    type Item = Result<(IndexKey, RecordId)>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let (size, next_id) = {
                let guard = self.leaf.as_ref()?;
                let leaf = LeafNode::new(&guard.data()[..]);
                (leaf.size(), leaf.next_leaf_id())
            };

            if self.index < size {
                let guard = self.leaf.as_ref()?;
                let leaf = LeafNode::new(&guard.data()[..]);
                let item = (leaf.key_at(self.index), leaf.value_at(self.index));
                self.index += 1;
                return Some(Ok(item));
            }

            // Exhausted this leaf: release it, then follow the chain.
            self.leaf = None;
            if !next_id.is_valid() {
                return None;
            }
            match self.store.fetch_page_read(next_id) {
                Ok(guard) => {
                    self.leaf = Some(guard);
                    self.index = 0;
                }
                Err(e) => return Some(Err(e)),
            }
        }
    }
}
