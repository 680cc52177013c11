//! Concurrent B+ tree index over the page store.
//!
//! Concurrency follows latch crabbing. Readers take the root latch, latch
//! the root page, release the root latch, then hand-over-hand read
//! latches down to the leaf. Writers hold the root latch and every page
//! latch on the descent path in a [`WriteContext`], releasing all held
//! ancestors as soon as a newly latched child proves *safe* (no split or
//! merge can propagate above it). Latches are always acquired top-down,
//! and a sibling latch only under the parent's latch, so acquisition
//! order is acyclic.

use crate::btree::header::{HeaderPage, MAX_NAME_LEN};
use crate::btree::iterator::TreeIterator;
use crate::btree::key::{IndexKey, Int64Comparator, KeyComparator};
use crate::btree::latch::WriteContext;
use crate::btree::node::{
    node_kind, node_parent_id, node_size, set_node_parent_id, InternalNode, LeafNode, NodeKind,
    INTERNAL_CAPACITY, LEAF_CAPACITY,
};
use crate::store::{PageStore, ReadPageGuard, WritePageGuard};
use larch_common::config::IndexConfig;
use larch_common::page::{PageId, HEADER_PAGE_ID};
use larch_common::types::RecordId;
use larch_common::{LarchError, Result};
use parking_lot::RwLock;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::Arc;

/// Which mutation a write-path descent serves; determines node safety.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriteOp {
    Insert,
    Remove,
}

/// Where a read-path descent is headed.
#[derive(Clone, Copy)]
enum ReadTarget<'k> {
    Key(&'k IndexKey),
    Leftmost,
}

fn corrupted(msg: &str) -> LarchError {
    LarchError::TreeCorrupted(msg.to_string())
}

fn invalid_node(page_id: PageId, data: &[u8]) -> LarchError {
    LarchError::InvalidNodeType {
        page_id: page_id.0,
        tag: data[0],
    }
}

/// A concurrent B+ tree index mapping unique keys to record ids.
///
/// Nodes live as pages in the [`PageStore`]; the tree itself owns only
/// the index name, the comparator, the size parameters, and the root
/// page id behind the index-wide root latch.
pub struct BPlusTree<C: KeyComparator = Int64Comparator> {
    index_name: String,
    store: Arc<PageStore>,
    comparator: C,
    leaf_max_size: u16,
    internal_max_size: u16,
    /// Root latch: guards the identity of the root page.
    root_page_id: RwLock<PageId>,
}

impl<C: KeyComparator> BPlusTree<C> {
    /// Opens (registering if new) the index `name` on `store`.
    pub fn new(
        name: impl Into<String>,
        store: Arc<PageStore>,
        comparator: C,
        config: IndexConfig,
    ) -> Result<Self> {
        let index_name = name.into();
        if index_name.len() > MAX_NAME_LEN {
            return Err(LarchError::IndexNameTooLong(index_name));
        }

        let leaf_max = config.leaf_max_size as usize;
        if leaf_max < 2 || leaf_max > LEAF_CAPACITY {
            return Err(LarchError::InvalidParameter {
                name: "leaf_max_size".to_string(),
                value: config.leaf_max_size.to_string(),
            });
        }
        let internal_max = config.internal_max_size as usize;
        if internal_max < 3 || internal_max + 1 > INTERNAL_CAPACITY {
            return Err(LarchError::InvalidParameter {
                name: "internal_max_size".to_string(),
                value: config.internal_max_size.to_string(),
            });
        }

        let root = {
            let mut guard = store.fetch_page_write(HEADER_PAGE_ID)?;
            let existing = HeaderPage::new(&guard.data()[..]).get_record(&index_name);
            match existing {
                Some(root) => root,
                None => {
                    let mut header = HeaderPage::new(&mut guard.data_mut()[..]);
                    if !header.insert_record(&index_name, PageId::INVALID) {
                        return Err(LarchError::HeaderFull);
                    }
                    PageId::INVALID
                }
            }
        };

        Ok(Self {
            index_name,
            store,
            comparator,
            leaf_max_size: config.leaf_max_size,
            internal_max_size: config.internal_max_size,
            root_page_id: RwLock::new(root),
        })
    }

    /// The index name registered in the header page.
    pub fn name(&self) -> &str {
        &self.index_name
    }

    /// True when the tree holds no keys.
    pub fn is_empty(&self) -> bool {
        !self.root_page_id.read().is_valid()
    }

    /// Current root page id (INVALID when empty).
    pub fn get_root_page_id(&self) -> PageId {
        *self.root_page_id.read()
    }

    /// Point lookup. Returns the payload stored for `key`, if any.
    pub fn get(&self, key: &IndexKey) -> Result<Option<RecordId>> {
        let root_latch = self.root_page_id.read();
        let root_id = *root_latch;
        if !root_id.is_valid() {
            return Ok(None);
        }
        let guard = self.store.fetch_page_read(root_id)?;
        // The root page is latched; the root's identity can no longer
        // change under us.
        drop(root_latch);

        let leaf_guard = self.descend_read(guard, ReadTarget::Key(key))?;
        let leaf = LeafNode::new(&leaf_guard.data()[..]);
        Ok(leaf.lookup(key, &self.comparator))
    }

    /// Iterator over all entries in ascending key order.
    pub fn iter(&self) -> Result<TreeIterator<'_>> {
        let root_latch = self.root_page_id.read();
        let root_id = *root_latch;
        if !root_id.is_valid() {
            return Ok(TreeIterator::empty(&self.store));
        }
        let guard = self.store.fetch_page_read(root_id)?;
        drop(root_latch);

        let leaf = self.descend_read(guard, ReadTarget::Leftmost)?;
        Ok(TreeIterator::new(&self.store, Some(leaf), 0))
    }

    /// Iterator starting at the smallest key >= `key`.
    pub fn iter_from(&self, key: &IndexKey) -> Result<TreeIterator<'_>> {
        let root_latch = self.root_page_id.read();
        let root_id = *root_latch;
        if !root_id.is_valid() {
            return Ok(TreeIterator::empty(&self.store));
        }
        let guard = self.store.fetch_page_read(root_id)?;
        drop(root_latch);

        let leaf = self.descend_read(guard, ReadTarget::Key(key))?;
        let index = LeafNode::new(&leaf.data()[..]).key_index(key, &self.comparator);
        Ok(TreeIterator::new(&self.store, Some(leaf), index))
    }

    /// Hand-over-hand read descent: the child's latch is acquired before
    /// the parent's is released.
    fn descend_read<'a>(
        &'a self,
        mut guard: ReadPageGuard<'a>,
        target: ReadTarget<'_>,
    ) -> Result<ReadPageGuard<'a>> {
        loop {
            let child_id = {
                let data = &guard.data()[..];
                match node_kind(data) {
                    Some(NodeKind::Leaf) => return Ok(guard),
                    Some(NodeKind::Internal) => {
                        let node = InternalNode::new(data);
                        match target {
                            ReadTarget::Key(key) => node.child_for(key, &self.comparator),
                            ReadTarget::Leftmost => node.child_at(0),
                        }
                    }
                    None => return Err(invalid_node(guard.page_id(), data)),
                }
            };
            let child = self.store.fetch_page_read(child_id)?;
            guard = child;
        }
    }

    /// Inserts `(key, rid)`. Returns false iff the key already exists.
    pub fn insert(&self, key: &IndexKey, rid: RecordId) -> Result<bool> {
        let mut ctx = WriteContext::new(self.root_page_id.write());
        let result = self.insert_inner(&mut ctx, key, rid);
        for page_id in ctx.finish() {
            self.store.delete_page(page_id);
        }
        result
    }

    fn insert_inner<'a>(
        &'a self,
        ctx: &mut WriteContext<'a>,
        key: &IndexKey,
        rid: RecordId,
    ) -> Result<bool> {
        if !ctx.current_root().is_valid() {
            return self.start_new_tree(ctx, key, rid);
        }

        let mut leaf_guard = self.find_leaf_write(key, WriteOp::Insert, ctx)?;

        {
            let leaf = LeafNode::new(&leaf_guard.data()[..]);
            if leaf.lookup(key, &self.comparator).is_some() {
                return Ok(false);
            }
        }

        let must_split = {
            let mut leaf = LeafNode::new(&mut leaf_guard.data_mut()[..]);
            leaf.insert(key, rid, &self.comparator);
            leaf.size() == leaf.max_size()
        };
        if must_split {
            self.split_leaf(ctx, leaf_guard, key)?;
            // The cascade consumes every queued ancestor latch
            debug_assert!(ctx.is_empty());
        }
        Ok(true)
    }

    /// First insert into an empty tree: allocate a root leaf and publish
    /// its id under the held root latch.
    fn start_new_tree<'a>(
        &'a self,
        ctx: &mut WriteContext<'a>,
        key: &IndexKey,
        rid: RecordId,
    ) -> Result<bool> {
        let mut guard = self.store.new_page()?;
        let page_id = guard.page_id();
        {
            let mut leaf = LeafNode::new(&mut guard.data_mut()[..]);
            leaf.init(page_id, PageId::INVALID, self.leaf_max_size);
            leaf.insert(key, rid, &self.comparator);
        }
        drop(guard);

        ctx.set_root_id(page_id)?;
        self.update_header_root(page_id)?;
        Ok(true)
    }

    /// Removes `key`; silently a no-op when the key is absent.
    pub fn remove(&self, key: &IndexKey) -> Result<()> {
        let mut ctx = WriteContext::new(self.root_page_id.write());
        let result = self.remove_inner(&mut ctx, key);
        for page_id in ctx.finish() {
            self.store.delete_page(page_id);
        }
        result
    }

    fn remove_inner<'a>(&'a self, ctx: &mut WriteContext<'a>, key: &IndexKey) -> Result<()> {
        if !ctx.current_root().is_valid() {
            return Ok(());
        }

        let mut leaf_guard = self.find_leaf_write(key, WriteOp::Remove, ctx)?;

        {
            let leaf = LeafNode::new(&leaf_guard.data()[..]);
            if leaf.lookup(key, &self.comparator).is_none() {
                return Ok(());
            }
        }

        let underflow = {
            let mut leaf = LeafNode::new(&mut leaf_guard.data_mut()[..]);
            leaf.remove(key, &self.comparator);
            leaf.size() < leaf.min_size()
        };
        if underflow {
            self.coalesce_or_redistribute(ctx, leaf_guard)?;
        }
        Ok(())
    }

    /// Write-path descent: every page on the path is write-latched and
    /// queued; held ancestors are released whenever the newly latched
    /// node is safe for `op`.
    fn find_leaf_write<'a>(
        &'a self,
        key: &IndexKey,
        op: WriteOp,
        ctx: &mut WriteContext<'a>,
    ) -> Result<WritePageGuard<'a>> {
        let mut guard = self.store.fetch_page_write(ctx.current_root())?;
        loop {
            let (is_leaf, child_id) = {
                let data = &guard.data()[..];
                let kind = node_kind(data).ok_or_else(|| invalid_node(guard.page_id(), data))?;
                if self.is_safe(data, kind, op) {
                    ctx.release_ancestors();
                }
                match kind {
                    NodeKind::Leaf => (true, PageId::INVALID),
                    NodeKind::Internal => (
                        false,
                        InternalNode::new(data).child_for(key, &self.comparator),
                    ),
                }
            };
            if is_leaf {
                return Ok(guard);
            }
            let child = self.store.fetch_page_write(child_id)?;
            ctx.push(guard);
            guard = child;
        }
    }

    /// A node is safe when the current operation cannot propagate a
    /// structural change above it.
    fn is_safe(&self, data: &[u8], kind: NodeKind, op: WriteOp) -> bool {
        let size = node_size(data);
        let is_root = !node_parent_id(data).is_valid();
        match op {
            WriteOp::Insert => match kind {
                NodeKind::Leaf => size + 1 < self.leaf_max_size as usize,
                NodeKind::Internal => size < self.internal_max_size as usize,
            },
            WriteOp::Remove => {
                let min = match (kind, is_root) {
                    (NodeKind::Leaf, true) => 1,
                    (NodeKind::Internal, true) => 2,
                    (NodeKind::Leaf, false) => self.leaf_max_size as usize / 2,
                    (NodeKind::Internal, false) => (self.internal_max_size as usize + 1) / 2,
                };
                size > min
            }
        }
    }

    /// Splits a full leaf and propagates separators upward.
    fn split_leaf<'a>(
        &'a self,
        ctx: &mut WriteContext<'a>,
        mut leaf_guard: WritePageGuard<'a>,
        key: &IndexKey,
    ) -> Result<()> {
        // Every ancestor still latched is full and will split as well, so
        // the number of pages this cascade needs is known exactly.
        // Allocate them all before touching any node; failure then aborts
        // with only the fresh leaf insert to undo.
        let needed = if ctx.holds_root() {
            ctx.len() + 2
        } else {
            ctx.len()
        };
        let mut fresh: Vec<WritePageGuard<'a>> = Vec::with_capacity(needed);
        for _ in 0..needed {
            match self.store.new_page() {
                Ok(guard) => fresh.push(guard),
                Err(e) => {
                    {
                        let mut leaf = LeafNode::new(&mut leaf_guard.data_mut()[..]);
                        leaf.remove(key, &self.comparator);
                    }
                    for guard in &fresh {
                        ctx.defer_delete(guard.page_id());
                    }
                    drop(fresh);
                    return Err(e);
                }
            }
        }

        let mut right_guard = fresh
            .pop()
            .ok_or_else(|| corrupted("leaf split without a preallocated page"))?;
        let right_id = right_guard.page_id();
        let separator = {
            let mut right = LeafNode::new(&mut right_guard.data_mut()[..]);
            let mut leaf = LeafNode::new(&mut leaf_guard.data_mut()[..]);
            right.init(right_id, leaf.parent_id(), self.leaf_max_size);
            leaf.split_into(&mut right);
            right.set_next_leaf_id(leaf.next_leaf_id());
            leaf.set_next_leaf_id(right_id);
            right.key_at(0)
        };

        self.insert_into_parent(ctx, leaf_guard, separator, right_guard, &mut fresh)
    }

    /// Links a freshly split `(left, right)` pair into their parent,
    /// splitting ancestors as needed; grows a new root when the split
    /// reaches the top.
    fn insert_into_parent<'a>(
        &'a self,
        ctx: &mut WriteContext<'a>,
        left: WritePageGuard<'a>,
        key: IndexKey,
        right: WritePageGuard<'a>,
        fresh: &mut Vec<WritePageGuard<'a>>,
    ) -> Result<()> {
        let mut left = left;
        let mut right = right;
        let mut key = key;

        loop {
            let parent_id = node_parent_id(&left.data()[..]);

            if !parent_id.is_valid() {
                // The split reached the root: grow the tree upward.
                let mut root_guard = fresh
                    .pop()
                    .ok_or_else(|| corrupted("root split without a preallocated page"))?;
                let root_id = root_guard.page_id();
                {
                    let mut root = InternalNode::new(&mut root_guard.data_mut()[..]);
                    root.init(root_id, PageId::INVALID, self.internal_max_size);
                    root.populate_new_root(left.page_id(), &key, right.page_id());
                }
                set_node_parent_id(left.data_mut(), root_id);
                set_node_parent_id(right.data_mut(), root_id);
                drop(left);
                drop(right);
                drop(root_guard);

                ctx.set_root_id(root_id)?;
                self.update_header_root(root_id)?;
                debug_assert!(fresh.is_empty());
                return Ok(());
            }

            let mut parent_guard = ctx
                .pop()
                .ok_or_else(|| corrupted("parent latch not held during split"))?;
            debug_assert_eq!(parent_guard.page_id(), parent_id);

            let overflow = {
                let mut parent = InternalNode::new(&mut parent_guard.data_mut()[..]);
                if !parent.insert(&key, right.page_id(), &self.comparator) {
                    return Err(corrupted("internal node rejected separator insert"));
                }
                parent.size() > parent.max_size()
            };
            set_node_parent_id(right.data_mut(), parent_id);

            if !overflow {
                debug_assert!(fresh.is_empty());
                return Ok(());
            }

            // The parent overflowed its transient slot: split it too.
            let mut new_parent_guard = fresh
                .pop()
                .ok_or_else(|| corrupted("internal split without a preallocated page"))?;
            let new_parent_id = new_parent_guard.page_id();
            let promoted = {
                let mut new_parent = InternalNode::new(&mut new_parent_guard.data_mut()[..]);
                let mut parent = InternalNode::new(&mut parent_guard.data_mut()[..]);
                new_parent.init(new_parent_id, parent.parent_id(), self.internal_max_size);
                parent.split_into(&mut new_parent)
            };

            // Re-parent the children that moved into the new node. The
            // pair we are still latching is updated through the held
            // guards; latching it again would self-deadlock.
            let moved: Vec<PageId> = {
                let new_parent = InternalNode::new(&new_parent_guard.data()[..]);
                (0..new_parent.size()).map(|i| new_parent.child_at(i)).collect()
            };
            let left_id = left.page_id();
            let right_id = right.page_id();
            for child_id in moved {
                if child_id == left_id {
                    set_node_parent_id(left.data_mut(), new_parent_id);
                } else if child_id == right_id {
                    set_node_parent_id(right.data_mut(), new_parent_id);
                } else {
                    let mut child = self.store.fetch_page_write(child_id)?;
                    set_node_parent_id(child.data_mut(), new_parent_id);
                }
            }

            drop(left);
            drop(right);
            key = promoted;
            left = parent_guard;
            right = new_parent_guard;
        }
    }

    /// Restores the minimum-size invariant for an underfull node, walking
    /// up through the held ancestor latches as merges propagate.
    fn coalesce_or_redistribute<'a>(
        &'a self,
        ctx: &mut WriteContext<'a>,
        node: WritePageGuard<'a>,
    ) -> Result<()> {
        let mut node = node;
        loop {
            if !node_parent_id(&node.data()[..]).is_valid() {
                return self.adjust_root(ctx, node);
            }

            let mut parent_guard = ctx
                .pop()
                .ok_or_else(|| corrupted("parent latch not held during rebalance"))?;
            let node_id = node.page_id();
            let (node_index, sibling_id) = {
                let parent = InternalNode::new(&parent_guard.data()[..]);
                let index = parent
                    .index_of_child(node_id)
                    .ok_or_else(|| corrupted("page missing from its parent"))?;
                let sibling_index = if index == 0 { 1 } else { index - 1 };
                (index, parent.child_at(sibling_index))
            };

            // Sibling latch taken only while the parent latch is held.
            let mut sibling_guard = self.store.fetch_page_write(sibling_id)?;
            let kind = {
                let data = &node.data()[..];
                node_kind(data).ok_or_else(|| invalid_node(node_id, data))?
            };

            if self.try_redistribute(
                kind,
                node_index,
                &mut node,
                &mut sibling_guard,
                &mut parent_guard,
            )? {
                return Ok(());
            }

            self.merge(kind, node_index, node, sibling_guard, &mut parent_guard, ctx)?;

            let parent_underflow = {
                let parent = InternalNode::new(&parent_guard.data()[..]);
                parent.size() < parent.min_size()
            };
            if !parent_underflow {
                return Ok(());
            }
            node = parent_guard;
        }
    }

    /// Moves a single entry from a sibling with spare capacity and fixes
    /// the parent separator. Returns false when the sibling has nothing
    /// to spare.
    fn try_redistribute(
        &self,
        kind: NodeKind,
        node_index: usize,
        node: &mut WritePageGuard<'_>,
        sibling: &mut WritePageGuard<'_>,
        parent: &mut WritePageGuard<'_>,
    ) -> Result<bool> {
        let sibling_has_spare = {
            let size = node_size(&sibling.data()[..]);
            let min = match kind {
                NodeKind::Leaf => self.leaf_max_size as usize / 2,
                NodeKind::Internal => (self.internal_max_size as usize + 1) / 2,
            };
            size > min
        };
        if !sibling_has_spare {
            return Ok(false);
        }

        match (kind, node_index == 0) {
            (NodeKind::Leaf, true) => {
                // Sibling is the right neighbor.
                let new_separator = {
                    let mut n = LeafNode::new(&mut node.data_mut()[..]);
                    let mut s = LeafNode::new(&mut sibling.data_mut()[..]);
                    n.steal_first_from_right(&mut s);
                    s.key_at(0)
                };
                let mut p = InternalNode::new(&mut parent.data_mut()[..]);
                p.set_key_at(1, &new_separator);
            }
            (NodeKind::Leaf, false) => {
                let new_separator = {
                    let mut n = LeafNode::new(&mut node.data_mut()[..]);
                    let mut s = LeafNode::new(&mut sibling.data_mut()[..]);
                    n.steal_last_from_left(&mut s);
                    n.key_at(0)
                };
                let mut p = InternalNode::new(&mut parent.data_mut()[..]);
                p.set_key_at(node_index, &new_separator);
            }
            (NodeKind::Internal, true) => {
                let separator = InternalNode::new(&parent.data()[..]).key_at(1);
                let (new_separator, moved_child) = {
                    let mut n = InternalNode::new(&mut node.data_mut()[..]);
                    let mut s = InternalNode::new(&mut sibling.data_mut()[..]);
                    n.steal_first_from_right(&mut s, &separator)
                };
                {
                    let mut child = self.store.fetch_page_write(moved_child)?;
                    set_node_parent_id(child.data_mut(), node.page_id());
                }
                let mut p = InternalNode::new(&mut parent.data_mut()[..]);
                p.set_key_at(1, &new_separator);
            }
            (NodeKind::Internal, false) => {
                let separator = InternalNode::new(&parent.data()[..]).key_at(node_index);
                let (new_separator, moved_child) = {
                    let mut n = InternalNode::new(&mut node.data_mut()[..]);
                    let mut s = InternalNode::new(&mut sibling.data_mut()[..]);
                    n.steal_last_from_left(&mut s, &separator)
                };
                {
                    let mut child = self.store.fetch_page_write(moved_child)?;
                    set_node_parent_id(child.data_mut(), node.page_id());
                }
                let mut p = InternalNode::new(&mut parent.data_mut()[..]);
                p.set_key_at(node_index, &new_separator);
            }
        }
        Ok(true)
    }

    /// Folds the right-hand participant into the left-hand one, removes
    /// the emptied page's slot from the parent and queues the page for
    /// deferred deletion.
    fn merge<'a>(
        &'a self,
        kind: NodeKind,
        node_index: usize,
        node: WritePageGuard<'a>,
        sibling: WritePageGuard<'a>,
        parent: &mut WritePageGuard<'a>,
        ctx: &mut WriteContext<'a>,
    ) -> Result<()> {
        // Orient so the right-hand page folds into the left-hand
        // survivor; the leaf chain then splices without a left-neighbor
        // pointer.
        let (mut survivor, mut victim, victim_slot) = if node_index == 0 {
            (node, sibling, 1)
        } else {
            (sibling, node, node_index)
        };

        match kind {
            NodeKind::Leaf => {
                let mut left = LeafNode::new(&mut survivor.data_mut()[..]);
                let mut right = LeafNode::new(&mut victim.data_mut()[..]);
                left.merge_from_right(&mut right);
            }
            NodeKind::Internal => {
                let separator = InternalNode::new(&parent.data()[..]).key_at(victim_slot);
                let moved: Vec<PageId> = {
                    let right = InternalNode::new(&victim.data()[..]);
                    (0..right.size()).map(|i| right.child_at(i)).collect()
                };
                {
                    let mut left = InternalNode::new(&mut survivor.data_mut()[..]);
                    let mut right = InternalNode::new(&mut victim.data_mut()[..]);
                    left.merge_from_right(&mut right, &separator);
                }
                let survivor_id = survivor.page_id();
                for child_id in moved {
                    let mut child = self.store.fetch_page_write(child_id)?;
                    set_node_parent_id(child.data_mut(), survivor_id);
                }
            }
        }

        {
            let mut p = InternalNode::new(&mut parent.data_mut()[..]);
            p.remove_at(victim_slot);
        }

        let victim_id = victim.page_id();
        drop(victim);
        drop(survivor);
        ctx.defer_delete(victim_id);
        Ok(())
    }

    /// Handles underflow at the root: an empty leaf root empties the
    /// tree; an internal root with a single child hands the root role to
    /// that child.
    fn adjust_root<'a>(&'a self, ctx: &mut WriteContext<'a>, root: WritePageGuard<'a>) -> Result<()> {
        let mut root = root;
        let root_id = root.page_id();
        let (kind, size) = {
            let data = &root.data()[..];
            let kind = node_kind(data).ok_or_else(|| invalid_node(root_id, data))?;
            (kind, node_size(data))
        };

        match kind {
            NodeKind::Leaf => {
                if size == 0 {
                    drop(root);
                    ctx.defer_delete(root_id);
                    ctx.set_root_id(PageId::INVALID)?;
                    self.update_header_root(PageId::INVALID)?;
                }
            }
            NodeKind::Internal => {
                if size == 1 {
                    let child_id = {
                        let mut node = InternalNode::new(&mut root.data_mut()[..]);
                        node.remove_only_child()
                    };
                    {
                        let mut child = self.store.fetch_page_write(child_id)?;
                        set_node_parent_id(child.data_mut(), PageId::INVALID);
                    }
                    drop(root);
                    ctx.defer_delete(root_id);
                    ctx.set_root_id(child_id)?;
                    self.update_header_root(child_id)?;
                }
            }
        }
        Ok(())
    }

    /// Rewrites this index's root record in the header page. Called only
    /// with the root latch held.
    fn update_header_root(&self, root_id: PageId) -> Result<()> {
        let mut guard = self.store.fetch_page_write(HEADER_PAGE_ID)?;
        let mut header = HeaderPage::new(&mut guard.data_mut()[..]);
        if !header.update_record(&self.index_name, root_id) {
            return Err(corrupted("index missing from header page"));
        }
        Ok(())
    }

    /// Test helper: inserts one integer key per line from `path`,
    /// stopping at the first ill-formed line.
    pub fn insert_from_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = File::open(path)?;
        for line in BufReader::new(file).lines() {
            let line = line?;
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            let Ok(value) = trimmed.parse::<i64>() else {
                break;
            };
            self.insert(&IndexKey::from_i64(value), RecordId::from_u64(value as u64))?;
        }
        Ok(())
    }

    /// Test helper: removes one integer key per line from `path`,
    /// stopping at the first ill-formed line.
    pub fn remove_from_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = File::open(path)?;
        for line in BufReader::new(file).lines() {
            let line = line?;
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            let Ok(value) = trimmed.parse::<i64>() else {
                break;
            };
            self.remove(&IndexKey::from_i64(value))?;
        }
        Ok(())
    }

    pub(crate) fn store(&self) -> &PageStore {
        &self.store
    }
}
