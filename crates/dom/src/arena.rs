//! Arena-based DOM tree storage
//!
//! Nodes live in one `Vec` and refer to each other by index. Removing a node
//! from the tree only unlinks it; its slot stays allocated so outstanding
//! `NodeId`s never dangle.
//!
//! ## Memory Layout
//!
//! ```text
//! Arena: Vec<DomNode>
//!        [Node0][Node1][Node2]...
//!         ↑ 4-byte index, not 8-byte pointer
//! ```
//!
//! Every structural or attribute change made through the arena is appended to
//! a mutation journal. The owner drains it with [`DomArena::take_mutations`].

use crate::error::{DomError, Result};
use crate::types::{DomNode, MutationRecord, NodeId, NodeType};
use smallvec::smallvec;

/// Arena allocator for DOM nodes
#[derive(Debug, Default)]
pub struct DomArena {
    /// All nodes stored sequentially (cache-friendly)
    nodes: Vec<DomNode>,

    /// Root node ID (if set)
    root_id: Option<NodeId>,

    /// Changes since the last `take_mutations`
    journal: Vec<MutationRecord>,
}

impl DomArena {
    /// Create a new empty arena
    pub fn new() -> Self {
        Self::with_capacity(256)
    }

    /// Create arena with specific capacity
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            nodes: Vec::with_capacity(capacity),
            root_id: None,
            journal: Vec::new(),
        }
    }

    /// Create an arena holding an empty `#document` root
    pub fn document() -> Self {
        let mut arena = Self::new();
        let root = arena.create_node(NodeType::Document, "#document");
        arena.root_id = Some(root);
        arena
    }

    /// Add a node to the arena, returns its ID
    pub fn add_node(&mut self, mut node: DomNode) -> NodeId {
        let node_id = self.nodes.len() as NodeId;
        node.node_id = node_id;
        self.nodes.push(node);
        node_id
    }

    pub fn create_node(&mut self, node_type: NodeType, name: impl Into<String>) -> NodeId {
        self.add_node(DomNode::new(0, node_type, name))
    }

    /// Create a detached element
    pub fn create_element(&mut self, name: impl Into<String>) -> NodeId {
        self.create_node(NodeType::Element, name)
    }

    /// Create a detached text node
    pub fn create_text(&mut self, value: impl Into<String>) -> NodeId {
        let id = self.create_node(NodeType::Text, "#text");
        self.nodes[id as usize].node_value = value.into();
        id
    }

    /// Get node by ID (immutable)
    pub fn get(&self, node_id: NodeId) -> Result<&DomNode> {
        self.nodes
            .get(node_id as usize)
            .ok_or(DomError::NodeNotFound(node_id))
    }

    /// Get node by ID (mutable)
    ///
    /// Changes made through this reference bypass the mutation journal.
    pub fn get_mut(&mut self, node_id: NodeId) -> Result<&mut DomNode> {
        self.nodes
            .get_mut(node_id as usize)
            .ok_or(DomError::NodeNotFound(node_id))
    }

    /// Set root node
    pub fn set_root(&mut self, node_id: NodeId) -> Result<()> {
        // Verify node exists
        self.get(node_id)?;
        self.root_id = Some(node_id);
        Ok(())
    }

    /// Get root node ID
    pub fn root_id(&self) -> Option<NodeId> {
        self.root_id
    }

    /// First element child of the root (`<svg>` of a loaded file, `<html>` of a page)
    pub fn document_element(&self) -> Option<NodeId> {
        let root = self.get(self.root_id?).ok()?;
        root.children_ids
            .iter()
            .copied()
            .find(|&id| self.get(id).map(DomNode::is_element).unwrap_or(false))
    }

    /// Total number of allocated nodes, attached or not
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Check if arena is empty
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Iterator over all nodes
    pub fn iter(&self) -> impl Iterator<Item = &DomNode> {
        self.nodes.iter()
    }

    /// Get children of a node
    pub fn children(&self, node_id: NodeId) -> Result<Vec<&DomNode>> {
        let node = self.get(node_id)?;
        node.children_ids
            .iter()
            .map(|&child_id| self.get(child_id))
            .collect()
    }

    /// Get parent of a node
    pub fn parent(&self, node_id: NodeId) -> Result<Option<&DomNode>> {
        let node = self.get(node_id)?;
        match node.parent_id {
            Some(parent_id) => Ok(Some(self.get(parent_id)?)),
            None => Ok(None),
        }
    }

    /// True if `node_id` is `ancestor` or lies somewhere below it
    pub fn contains(&self, ancestor: NodeId, node_id: NodeId) -> bool {
        let mut current = Some(node_id);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.get(id).ok().and_then(|n| n.parent_id);
        }
        false
    }

    /// True if the node is reachable from the root
    pub fn is_connected(&self, node_id: NodeId) -> bool {
        self.root_id
            .is_some_and(|root| self.contains(root, node_id))
    }

    /// Traverse tree depth-first (iterative, no recursion)
    pub fn traverse_df<F>(&self, start_id: NodeId, mut visit: F) -> Result<()>
    where
        F: FnMut(&DomNode) -> Result<()>,
    {
        let mut stack = vec![start_id];

        while let Some(node_id) = stack.pop() {
            let node = self.get(node_id)?;
            visit(node)?;

            // Push children in reverse order (so they're visited left-to-right)
            for &child_id in node.children_ids.iter().rev() {
                stack.push(child_id);
            }
        }

        Ok(())
    }

    /// All nodes below `start_id` in document order, excluding `start_id`
    pub fn descendants(&self, start_id: NodeId) -> Result<Vec<NodeId>> {
        let mut ids = Vec::new();
        self.traverse_df(start_id, |node| {
            if node.node_id != start_id {
                ids.push(node.node_id);
            }
            Ok(())
        })?;
        Ok(ids)
    }

    /// Number of elements reachable from the root
    pub fn element_count(&self) -> usize {
        let Some(root) = self.root_id else {
            return 0;
        };
        let mut count = 0;
        // Root exists, so traversal cannot fail.
        let _ = self.traverse_df(root, |node| {
            if node.is_element() {
                count += 1;
            }
            Ok(())
        });
        count
    }

    /// Find connected nodes matching predicate
    pub fn find<F>(&self, predicate: F) -> Vec<NodeId>
    where
        F: Fn(&DomNode) -> bool,
    {
        let Some(root) = self.root_id else {
            return Vec::new();
        };
        let mut found = Vec::new();
        let _ = self.traverse_df(root, |node| {
            if predicate(node) {
                found.push(node.node_id);
            }
            Ok(())
        });
        found
    }

    /// Find first connected node matching predicate
    pub fn find_one<F>(&self, predicate: F) -> Option<NodeId>
    where
        F: Fn(&DomNode) -> bool,
    {
        self.find(predicate).into_iter().next()
    }

    /// Find all elements by tag name
    pub fn find_by_tag(&self, tag: &str) -> Vec<NodeId> {
        self.find(|node| node.is_element() && node.node_name.eq_ignore_ascii_case(tag))
    }

    /// Find element by ID attribute
    pub fn find_by_id(&self, id: &str) -> Option<NodeId> {
        self.find_one(|node| node.is_element() && node.attr("id") == Some(id))
    }

    // ------------------------------------------------------------------
    // Mutation
    // ------------------------------------------------------------------

    /// Append `child` as last child of `parent`, moving it if already attached
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> Result<()> {
        self.insert_child(parent, child, None)
    }

    /// Insert `child` as first child of `parent`, moving it if already attached
    pub fn prepend_child(&mut self, parent: NodeId, child: NodeId) -> Result<()> {
        self.insert_child(parent, child, Some(0))
    }

    fn insert_child(&mut self, parent: NodeId, child: NodeId, index: Option<usize>) -> Result<()> {
        self.get(parent)?;
        self.get(child)?;
        if self.contains(child, parent) {
            return Err(DomError::HierarchyRequest { parent, child });
        }
        self.detach(child)?;

        let parent_node = self.get_mut(parent)?;
        let len = parent_node.children_ids.len();
        parent_node.children_ids.insert(index.unwrap_or(len).min(len), child);
        self.get_mut(child)?.parent_id = Some(parent);

        self.journal.push(MutationRecord::ChildList {
            target: parent,
            added: smallvec![child],
            removed: smallvec![],
        });
        Ok(())
    }

    /// Remove `child` from `parent`. The node stays allocated and can be re-inserted.
    pub fn remove_child(&mut self, parent: NodeId, child: NodeId) -> Result<()> {
        let parent_node = self.get_mut(parent)?;
        let pos = parent_node
            .children_ids
            .iter()
            .position(|&id| id == child)
            .ok_or(DomError::NotAChild { parent, child })?;
        parent_node.children_ids.remove(pos);
        self.get_mut(child)?.parent_id = None;

        self.journal.push(MutationRecord::ChildList {
            target: parent,
            added: smallvec![],
            removed: smallvec![child],
        });
        Ok(())
    }

    /// Unlink a node from its parent. No-op for detached nodes.
    pub fn detach(&mut self, node_id: NodeId) -> Result<()> {
        match self.get(node_id)?.parent_id {
            Some(parent) => self.remove_child(parent, node_id),
            None => Ok(()),
        }
    }

    /// Set an attribute on an element, returning the previous value
    pub fn set_attribute(
        &mut self,
        node_id: NodeId,
        name: &str,
        value: impl Into<String>,
    ) -> Result<Option<String>> {
        let node = self.element_mut(node_id)?;
        let old_value = node.set_attr(name, value);
        self.journal.push(MutationRecord::Attributes {
            target: node_id,
            name: name.to_string(),
            old_value: old_value.clone(),
        });
        Ok(old_value)
    }

    /// Remove an attribute from an element, returning the removed value
    pub fn remove_attribute(&mut self, node_id: NodeId, name: &str) -> Result<Option<String>> {
        let node = self.element_mut(node_id)?;
        let old_value = node.remove_attr(name);
        if old_value.is_some() {
            self.journal.push(MutationRecord::Attributes {
                target: node_id,
                name: name.to_string(),
                old_value: old_value.clone(),
            });
        }
        Ok(old_value)
    }

    fn element_mut(&mut self, node_id: NodeId) -> Result<&mut DomNode> {
        let node = self.get_mut(node_id)?;
        if !node.is_element() {
            return Err(DomError::InvalidNodeType {
                expected: "Element".to_string(),
                actual: format!("{:?}", node.node_type),
            });
        }
        Ok(node)
    }

    /// Deep-copy a subtree of another arena into this one.
    ///
    /// The copy is detached; insert it with [`append_child`](Self::append_child)
    /// or [`prepend_child`](Self::prepend_child). Copying records no mutations.
    ///
    /// Slots are never reclaimed: a copy that is dropped or later detached stays
    /// in [`len`](Self::len) but not in [`element_count`](Self::element_count).
    pub fn import_subtree(&mut self, source: &DomArena, source_id: NodeId) -> Result<NodeId> {
        let mut stack: Vec<(NodeId, Option<NodeId>)> = vec![(source_id, None)];
        let mut top = None;

        while let Some((src_id, parent)) = stack.pop() {
            let src = source.get(src_id)?;
            let mut copy = DomNode::new(0, src.node_type, src.node_name.clone());
            copy.node_value = src.node_value.clone();
            copy.attributes = src.attributes.clone();
            copy.parent_id = parent;

            let id = self.add_node(copy);
            match parent {
                Some(parent_id) => self.get_mut(parent_id)?.children_ids.push(id),
                None => top = Some(id),
            }

            for &child_id in src.children_ids.iter().rev() {
                stack.push((child_id, Some(id)));
            }
        }

        top.ok_or(DomError::NodeNotFound(source_id))
    }

    /// Link a node under `parent` without journaling (used while building a tree)
    pub(crate) fn attach_unrecorded(&mut self, parent: NodeId, child: NodeId) -> Result<()> {
        self.get_mut(parent)?.children_ids.push(child);
        self.get_mut(child)?.parent_id = Some(parent);
        Ok(())
    }

    /// Drain the mutation journal
    pub fn take_mutations(&mut self) -> Vec<MutationRecord> {
        std::mem::take(&mut self.journal)
    }
}
