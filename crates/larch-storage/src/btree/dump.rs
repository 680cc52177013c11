//! Debug rendering of the tree: Graphviz DOT output and a BFS text dump.

use crate::btree::key::KeyComparator;
use crate::btree::node::{node_kind, InternalNode, LeafNode, NodeKind};
use crate::btree::tree::BPlusTree;
use larch_common::page::PageId;
use larch_common::{LarchError, Result};
use std::collections::VecDeque;
use std::fmt::Write as _;
use std::path::Path;

impl<C: KeyComparator> BPlusTree<C> {
    /// Writes a Graphviz rendering of the whole tree to `path`.
    /// A warning is logged and nothing is written for an empty tree.
    pub fn draw(&self, path: impl AsRef<Path>) -> Result<()> {
        if self.is_empty() {
            tracing::warn!(index = self.name(), "drawing an empty tree");
            return Ok(());
        }
        let dot = self.to_dot()?;
        std::fs::write(path, dot)?;
        Ok(())
    }

    /// Renders the tree as a Graphviz digraph: one record-shaped node per
    /// page (page id, size bounds, keys), edges from parent slots to
    /// children, and sibling edges along the leaf chain.
    pub fn to_dot(&self) -> Result<String> {
        let mut out = String::new();
        let _ = writeln!(out, "digraph G {{");
        let root_id = self.get_root_page_id();
        if root_id.is_valid() {
            self.dot_node(root_id, &mut out)?;
        }
        let _ = writeln!(out, "}}");
        Ok(out)
    }

    fn dot_node(&self, page_id: PageId, out: &mut String) -> Result<()> {
        let guard = self.store().fetch_page_read(page_id)?;
        let data = &guard.data()[..];

        match node_kind(data) {
            Some(NodeKind::Leaf) => {
                let leaf = LeafNode::new(data);
                let _ = write!(
                    out,
                    "  LEAF_{}[shape=record color=green label=\"P={} size={}/{} min={}",
                    page_id,
                    page_id,
                    leaf.size(),
                    leaf.max_size(),
                    leaf.min_size()
                );
                for i in 0..leaf.size() {
                    let _ = write!(out, "|{}", leaf.key_at(i));
                }
                let _ = writeln!(out, "\"];");
                if leaf.next_leaf_id().is_valid() {
                    let _ = writeln!(
                        out,
                        "  LEAF_{} -> LEAF_{};\n  {{rank=same LEAF_{} LEAF_{}}};",
                        page_id,
                        leaf.next_leaf_id(),
                        page_id,
                        leaf.next_leaf_id()
                    );
                }
                Ok(())
            }
            Some(NodeKind::Internal) => {
                let node = InternalNode::new(data);
                let _ = write!(
                    out,
                    "  INT_{}[shape=record color=pink label=\"P={} size={}/{} min={}",
                    page_id,
                    page_id,
                    node.size(),
                    node.max_size(),
                    node.min_size()
                );
                for i in 0..node.size() {
                    if i > 0 {
                        let _ = write!(out, "|<p{}> {}", node.child_at(i), node.key_at(i));
                    } else {
                        let _ = write!(out, "|<p{}> ", node.child_at(i));
                    }
                }
                let _ = writeln!(out, "\"];");

                let children: Vec<PageId> = (0..node.size()).map(|i| node.child_at(i)).collect();
                drop(guard);

                for child_id in &children {
                    // The edge label prefix depends on the child's kind.
                    let prefix = {
                        let child = self.store().fetch_page_read(*child_id)?;
                        match node_kind(&child.data()[..]) {
                            Some(NodeKind::Leaf) => "LEAF",
                            _ => "INT",
                        }
                    };
                    let _ = writeln!(out, "  INT_{}:p{} -> {}_{};", page_id, child_id, prefix, child_id);
                    self.dot_node(*child_id, out)?;
                }
                Ok(())
            }
            None => Err(LarchError::InvalidNodeType {
                page_id: page_id.0,
                tag: data[0],
            }),
        }
    }

    /// Builds a human-readable breadth-first dump of the tree.
    pub fn dump(&self) -> Result<String> {
        let mut out = String::new();
        let root_id = self.get_root_page_id();
        if !root_id.is_valid() {
            let _ = writeln!(out, "(empty tree)");
            return Ok(out);
        }

        let mut queue = VecDeque::new();
        queue.push_back(root_id);
        while let Some(page_id) = queue.pop_front() {
            let guard = self.store().fetch_page_read(page_id)?;
            let data = &guard.data()[..];
            match node_kind(data) {
                Some(NodeKind::Leaf) => {
                    let leaf = LeafNode::new(data);
                    let _ = write!(
                        out,
                        "Leaf {} parent={} next={} size={}:",
                        page_id,
                        leaf.parent_id(),
                        leaf.next_leaf_id(),
                        leaf.size()
                    );
                    for i in 0..leaf.size() {
                        let _ = write!(out, " {}", leaf.key_at(i));
                    }
                    let _ = writeln!(out);
                }
                Some(NodeKind::Internal) => {
                    let node = InternalNode::new(data);
                    let _ = write!(
                        out,
                        "Internal {} parent={} size={}:",
                        page_id,
                        node.parent_id(),
                        node.size()
                    );
                    for i in 0..node.size() {
                        if i > 0 {
                            let _ = write!(out, " {}:{}", node.key_at(i), node.child_at(i));
                        } else {
                            let _ = write!(out, " _:{}", node.child_at(i));
                        }
                        queue.push_back(node.child_at(i));
                    }
                    let _ = writeln!(out);
                }
                None => {
                    return Err(LarchError::InvalidNodeType {
                        page_id: page_id.0,
                        tag: data[0],
                    })
                }
            }
        }
        Ok(out)
    }

    /// Prints the BFS dump to stdout. Logs a warning for an empty tree.
    pub fn print(&self) -> Result<()> {
        if self.is_empty() {
            tracing::warn!(index = self.name(), "printing an empty tree");
            return Ok(());
        }
        println!("{}", self.dump()?);
        Ok(())
    }
}
