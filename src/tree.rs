use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::FetchError;

/// Auxiliary payload attached to a node for rendering. Only `extant` is
/// interpreted; everything else is carried through untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeAttributes {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extant: Option<bool>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// A single entity of the classification tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub children: Vec<Node>,
    #[serde(default)]
    pub attributes: NodeAttributes,
}

impl Node {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            children: Vec::new(),
            attributes: NodeAttributes::default(),
        }
    }

    /// Append a child. Display order is insertion order.
    pub fn with_child(mut self, child: Node) -> Self {
        self.children.push(child);
        self
    }

    pub fn with_extant(mut self, extant: bool) -> Self {
        self.attributes.extant = Some(extant);
        self
    }

    pub fn is_extinct(&self) -> bool {
        self.attributes.extant == Some(false)
    }

    pub fn has_children(&self) -> bool {
        !self.children.is_empty()
    }

    /// Name as drawn: extinct taxa carry a dagger.
    pub fn display_name(&self) -> String {
        decorate_name(&self.name, self.attributes.extant)
    }

    /// Depth-first search for the subtree rooted at `id`.
    pub fn subtree(&self, id: &str) -> Option<&Node> {
        if self.id == id {
            return Some(self);
        }
        self.children.iter().find_map(|child| child.subtree(id))
    }
}

pub fn decorate_name(name: &str, extant: Option<bool>) -> String {
    if extant == Some(false) {
        format!("†{}", name)
    } else {
        name.to_string()
    }
}

#[derive(Debug, Clone)]
struct IndexEntry {
    parent: Option<String>,
    depth: usize,
    /// Child indices from the root down to this node
    path: Vec<usize>,
}

/// An immutable fetched tree: a root node plus all of its descendants.
///
/// Lookups go through an id index built once at construction. A new root is
/// never patched into an existing fragment; it replaces it.
#[derive(Debug, Clone)]
pub struct TreeFragment {
    root: Node,
    index: HashMap<String, IndexEntry>,
}

impl TreeFragment {
    pub fn new(root: Node) -> Result<Self, FetchError> {
        let mut index = HashMap::new();
        Self::index_nodes(&root, &mut index)?;
        Ok(Self { root, index })
    }

    /// Pre-order walk with an explicit stack; fragment depth is bounded
    /// only by the payload.
    fn index_nodes(root: &Node, index: &mut HashMap<String, IndexEntry>) -> Result<(), FetchError> {
        let mut stack: Vec<(&Node, Option<&str>, usize, Vec<usize>)> = vec![(root, None, 0, Vec::new())];
        while let Some((node, parent, depth, path)) = stack.pop() {
            if node.id.is_empty() {
                return Err(FetchError::ValidationFailure("node with empty id".to_string()));
            }
            for (i, child) in node.children.iter().enumerate().rev() {
                let mut child_path = path.clone();
                child_path.push(i);
                stack.push((child, Some(&node.id), depth + 1, child_path));
            }
            let entry = IndexEntry {
                parent: parent.map(str::to_string),
                depth,
                path,
            };
            if index.insert(node.id.clone(), entry).is_some() {
                return Err(FetchError::ValidationFailure(format!(
                    "duplicate node id '{}' in fragment",
                    node.id
                )));
            }
        }
        Ok(())
    }

    pub fn root(&self) -> &Node {
        &self.root
    }

    pub fn root_id(&self) -> &str {
        &self.root.id
    }

    /// Look up a node. Ids outside this fragment are an expected outcome.
    pub fn find_node(&self, id: &str) -> Option<&Node> {
        let entry = self.index.get(id)?;
        let mut node = &self.root;
        for &i in &entry.path {
            node = node.children.get(i)?;
        }
        Some(node)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn parent_of(&self, id: &str) -> Option<&Node> {
        let parent = self.index.get(id)?.parent.as_deref()?;
        self.find_node(parent)
    }

    pub fn depth_of(&self, id: &str) -> Option<usize> {
        self.index.get(id).map(|entry| entry.depth)
    }

    /// True when `id` is `ancestor_id` itself or lies somewhere below it.
    /// Unknown ids on either side yield false.
    pub fn is_descendant_or_self(&self, ancestor_id: &str, id: &str) -> bool {
        let (Some(ancestor), Some(entry)) = (self.index.get(ancestor_id), self.index.get(id)) else {
            return false;
        };
        entry.path.starts_with(&ancestor.path)
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Pre-order walk in display order
    pub fn iter(&self) -> PreOrder<'_> {
        PreOrder { stack: vec![&self.root] }
    }

    pub fn stats(&self) -> TreeStats {
        let mut stats = TreeStats::default();
        for node in self.iter() {
            stats.total_nodes += 1;
            if !node.has_children() {
                stats.leaves += 1;
            }
            if node.is_extinct() {
                stats.extinct += 1;
            }
        }
        stats.max_depth = self.index.values().map(|e| e.depth).max().unwrap_or(0);
        stats
    }
}

pub struct PreOrder<'a> {
    stack: Vec<&'a Node>,
}

impl<'a> Iterator for PreOrder<'a> {
    type Item = &'a Node;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        self.stack.extend(node.children.iter().rev());
        Some(node)
    }
}

/// Statistics about a fragment
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TreeStats {
    pub total_nodes: usize,
    pub leaves: usize,
    pub extinct: usize,
    pub max_depth: usize,
}
