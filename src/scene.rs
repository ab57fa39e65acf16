//! Retained scene graph.
//!
//! The scene is a tree of nodes kept in an arena. Children are stored in paint order: the first
//! child is painted first (bottom), the last child is painted last (top). A node is visible only
//! when it and all of its ancestors are enabled.
//!
//! Node handles are plain IDs. Using a handle after its node was destroyed is a logic error and
//! panics.

use std::collections::HashMap;
use std::fmt::Write as _;

use anyhow::bail;
use rill_config::Color;
use smithay::utils::{Logical, Point, Size};

use crate::utils::id::IdCounter;

static NODE_ID_COUNTER: IdCounter = IdCounter::new();

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    /// Grouping node without content of its own.
    Tree,
    /// Solid color rectangle.
    Rect {
        size: Size<i32, Logical>,
        color: Color,
    },
}

#[derive(Debug)]
struct Node {
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    enabled: bool,
    /// Position relative to the parent.
    position: Point<i32, Logical>,
    kind: NodeKind,
    label: Option<String>,
}

#[derive(Debug)]
pub struct Scene {
    nodes: HashMap<NodeId, Node>,
    root: NodeId,
    /// Maximum number of live nodes, if limited.
    node_limit: Option<usize>,
}

impl NodeId {
    fn next() -> NodeId {
        NodeId(NODE_ID_COUNTER.next())
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl Scene {
    pub fn new() -> Self {
        let root = NodeId::next();
        let node = Node {
            parent: None,
            children: Vec::new(),
            enabled: true,
            position: Point::default(),
            kind: NodeKind::Tree,
            label: Some(String::from("root")),
        };

        Self {
            nodes: HashMap::from([(root, node)]),
            root,
            node_limit: None,
        }
    }

    /// Creates a scene that refuses to hold more than `limit` nodes, the root included.
    pub fn with_node_limit(limit: usize) -> Self {
        Self {
            node_limit: Some(limit),
            ..Self::new()
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Number of live nodes, the root included.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn create_tree(&mut self, parent: NodeId) -> anyhow::Result<NodeId> {
        self.insert(parent, NodeKind::Tree)
    }

    pub fn create_rect(
        &mut self,
        parent: NodeId,
        size: Size<i32, Logical>,
        color: Color,
    ) -> anyhow::Result<NodeId> {
        self.insert(parent, NodeKind::Rect { size, color })
    }

    fn insert(&mut self, parent: NodeId, kind: NodeKind) -> anyhow::Result<NodeId> {
        if let Some(limit) = self.node_limit {
            if self.nodes.len() >= limit {
                bail!("scene node limit of {limit} reached");
            }
        }

        let id = NodeId::next();
        self.node_mut(parent).children.push(id);
        self.nodes.insert(
            id,
            Node {
                parent: Some(parent),
                children: Vec::new(),
                enabled: true,
                position: Point::default(),
                kind,
                label: None,
            },
        );

        Ok(id)
    }

    /// Destroys the node together with all of its descendants.
    pub fn destroy(&mut self, id: NodeId) {
        assert_ne!(id, self.root, "the scene root cannot be destroyed");

        if let Some(parent) = self.node(id).parent {
            self.node_mut(parent).children.retain(|child| *child != id);
        }

        let mut queue = vec![id];
        while let Some(id) = queue.pop() {
            if let Some(node) = self.nodes.remove(&id) {
                queue.extend(node.children);
            }
        }
    }

    pub fn set_label(&mut self, id: NodeId, label: impl Into<String>) {
        self.node_mut(id).label = Some(label.into());
    }

    pub fn label(&self, id: NodeId) -> Option<&str> {
        self.node(id).label.as_deref()
    }

    pub fn set_enabled(&mut self, id: NodeId, enabled: bool) {
        self.node_mut(id).enabled = enabled;
    }

    pub fn is_enabled(&self, id: NodeId) -> bool {
        self.node(id).enabled
    }

    /// Whether the node and all of its ancestors are enabled.
    pub fn is_visible(&self, id: NodeId) -> bool {
        let mut current = Some(id);
        while let Some(id) = current {
            let node = self.node(id);
            if !node.enabled {
                return false;
            }
            current = node.parent;
        }
        true
    }

    pub fn set_position(&mut self, id: NodeId, position: Point<i32, Logical>) {
        self.node_mut(id).position = position;
    }

    pub fn position(&self, id: NodeId) -> Point<i32, Logical> {
        self.node(id).position
    }

    pub fn set_size(&mut self, id: NodeId, new_size: Size<i32, Logical>) {
        match &mut self.node_mut(id).kind {
            NodeKind::Rect { size, .. } => *size = new_size,
            NodeKind::Tree => panic!("cannot resize tree node {id:?}"),
        }
    }

    pub fn size(&self, id: NodeId) -> Option<Size<i32, Logical>> {
        match self.node(id).kind {
            NodeKind::Rect { size, .. } => Some(size),
            NodeKind::Tree => None,
        }
    }

    pub fn kind(&self, id: NodeId) -> &NodeKind {
        &self.node(id).kind
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).parent
    }

    /// Children of the node, bottom to top.
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.node(id).children
    }

    /// Moves the node under a new parent, on top of its new siblings.
    pub fn reparent(&mut self, id: NodeId, new_parent: NodeId) {
        let old_parent = self.node(id).parent.expect("root cannot be reparented");
        if old_parent == new_parent {
            return;
        }

        let mut ancestor = Some(new_parent);
        while let Some(node) = ancestor {
            assert_ne!(node, id, "cannot reparent a node under its own subtree");
            ancestor = self.node(node).parent;
        }

        self.node_mut(old_parent).children.retain(|child| *child != id);
        self.node_mut(new_parent).children.push(id);
        self.node_mut(id).parent = Some(new_parent);
    }

    pub fn raise_to_top(&mut self, id: NodeId) {
        let siblings = self.siblings_mut(id);
        siblings.retain(|child| *child != id);
        siblings.push(id);
    }

    pub fn lower_to_bottom(&mut self, id: NodeId) {
        let siblings = self.siblings_mut(id);
        siblings.retain(|child| *child != id);
        siblings.insert(0, id);
    }

    /// Moves the node directly below `sibling` in paint order.
    pub fn place_below(&mut self, id: NodeId, sibling: NodeId) {
        assert_ne!(id, sibling);
        assert_eq!(
            self.node(id).parent,
            self.node(sibling).parent,
            "nodes must share a parent"
        );

        let siblings = self.siblings_mut(id);
        siblings.retain(|child| *child != id);
        let Some(idx) = siblings.iter().position(|child| *child == sibling) else {
            unreachable!("sibling is missing from its parent");
        };
        siblings.insert(idx, id);
    }

    /// Renders the subtree as indented text, one node per line, bottom to top.
    pub fn dump(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.dump_node(&mut out, id, 0);
        out
    }

    fn dump_node(&self, out: &mut String, id: NodeId, depth: usize) {
        let node = self.node(id);

        let _ = write!(out, "{:1$}", "", depth * 2);
        match &node.kind {
            NodeKind::Tree => out.push_str(node.label.as_deref().unwrap_or("tree")),
            NodeKind::Rect { size, .. } => {
                out.push_str(node.label.as_deref().unwrap_or("rect"));
                let _ = write!(out, " {}x{}", size.w, size.h);
            }
        }
        if node.position != Point::default() {
            let _ = write!(out, " at {},{}", node.position.x, node.position.y);
        }
        if !node.enabled {
            out.push_str(" [disabled]");
        }
        out.push('\n');

        for child in &node.children {
            self.dump_node(out, *child, depth + 1);
        }
    }

    fn siblings_mut(&mut self, id: NodeId) -> &mut Vec<NodeId> {
        let parent = self
            .node(id)
            .parent
            .expect("root has no siblings to reorder against");
        &mut self.node_mut(parent).children
    }

    fn node(&self, id: NodeId) -> &Node {
        self.nodes
            .get(&id)
            .unwrap_or_else(|| panic!("scene node {id:?} does not exist"))
    }

    fn node_mut(&mut self, id: NodeId) -> &mut Node {
        self.nodes
            .get_mut(&id)
            .unwrap_or_else(|| panic!("scene node {id:?} does not exist"))
    }
}

impl Default for Scene {
    fn default() -> Self {
        Self::new()
    }
}
