//! Arena-backed document model.
//!
//! A [`Document`] owns the backing nested-list tree exactly as it was read
//! plus an arena of [`Node`]s describing it. Each node records its address
//! (the index path into the backing tree) and reads its value live from
//! there, so a write through one node is visible to every other node at
//! once. Deleted nodes leave a tombstone in the backing tree; addresses of
//! their siblings never shift until the tree is compacted on write, which
//! only ever happens on a copy.

pub mod classify;
mod mutate;
mod parse;

use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::info;

use crate::collection::{Collection, CollectionRef};
use crate::config::{LoadOptions, WriteOptions};
use crate::error::{Result, SkipError};
use crate::geometry::{AtValue, Point};
use crate::parser::{to_text, SExp};

pub use classify::{
    classify, CollectionRule, Dialect, EntityKind, GroupShape, NameFn, Naming, Scope,
};

/// Stable handle to a node in a document's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    pub fn index(&self) -> usize {
        self.0
    }
}

/// Stable handle to a collection in a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct CollectionId(pub(crate) usize);

/// The primary payload of a node.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// One scalar.
    Atom(SExp),
    /// Several scalars, or an inline value list.
    List(Vec<SExp>),
    /// Typed children, for nodes without scalars of their own.
    Nodes(Vec<NodeId>),
}

impl Value {
    pub fn as_atom(&self) -> Option<&SExp> {
        match self {
            Value::Atom(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<String> {
        self.as_atom().and_then(|a| a.as_text())
    }

    pub fn as_number(&self) -> Option<f64> {
        self.as_atom().and_then(|a| a.as_number())
    }

    pub fn as_list(&self) -> Option<&[SExp]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    /// `yes`/`true` and `no`/`false` symbols.
    pub fn as_bool(&self) -> Option<bool> {
        match self.as_atom()?.as_symbol()? {
            "yes" | "true" => Some(true),
            "no" | "false" => Some(false),
            _ => None,
        }
    }
}

impl From<SExp> for Value {
    fn from(atom: SExp) -> Self {
        Value::Atom(atom)
    }
}

impl From<Vec<SExp>> for Value {
    fn from(items: Vec<SExp>) -> Self {
        Value::List(items)
    }
}

/// One child as seen from outside: a typed node or a raw scalar.
#[derive(Debug, Clone, PartialEq)]
pub enum ChildRef {
    Node(NodeId),
    Scalar(SExp),
}

#[derive(Debug, Clone)]
pub(crate) enum Child {
    Node(NodeId),
    /// Index into the owner's raw list.
    Scalar(usize),
}

/// Where a node's value lives in the backing tree.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum ValueSlots {
    None,
    /// The raw value is itself a scalar.
    Leaf,
    /// `(tag (a b c))`: the body's only element, at this raw index, is the
    /// value list.
    Inline(usize),
    /// Raw list indices of the untyped scalars.
    Scalars(Vec<usize>),
}

/// How one child entity type is exposed on its owner.
#[derive(Debug, Clone, PartialEq)]
pub enum ChildGroup {
    Single(NodeId),
    Sequence(Vec<NodeId>),
    Collection(CollectionId),
}

/// One parenthesized entity.
#[derive(Debug, Clone)]
pub struct Node {
    entity_type: Option<String>,
    kind: EntityKind,
    address: Vec<usize>,
    parent: Option<NodeId>,
    body_start: usize,
    children: Vec<Child>,
    slots: ValueSlots,
    groups: Vec<(String, ChildGroup)>,
    member_of: Option<CollectionId>,
    positioned: bool,
    deleted: bool,
}

impl Node {
    fn new(address: Vec<usize>, parent: Option<NodeId>) -> Self {
        Self {
            entity_type: None,
            kind: EntityKind::Other,
            address,
            parent,
            body_start: 0,
            children: Vec::new(),
            slots: ValueSlots::None,
            groups: Vec::new(),
            member_of: None,
            positioned: false,
            deleted: false,
        }
    }

    pub fn entity_type(&self) -> Option<&str> {
        self.entity_type.as_deref()
    }

    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    pub fn address(&self) -> &[usize] {
        &self.address
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted
    }

    /// Whether the node has a usable `(at X Y ..)` attribute.
    pub fn is_positioned(&self) -> bool {
        self.positioned
    }

    pub fn member_of(&self) -> Option<CollectionId> {
        self.member_of
    }

    /// Child entity types, in the order they first appear.
    pub fn attributes(&self) -> impl Iterator<Item = &str> {
        self.groups.iter().map(|(name, _)| name.as_str())
    }

    fn group(&self, entity_type: &str) -> Option<&ChildGroup> {
        self.groups
            .iter()
            .find(|(name, _)| name == entity_type)
            .map(|(_, g)| g)
    }
}

/// A top-level entry that failed to parse and was left out of the arena.
/// Its raw content stays in the backing tree and is written back verbatim.
#[derive(Debug, Clone, Serialize)]
pub struct SkippedEntry {
    pub index: usize,
    pub message: String,
    pub raw: String,
}

/// Flat, serializable description of a node.
#[derive(Debug, Clone, Serialize)]
pub struct NodeSummary {
    pub id: NodeId,
    pub entity_type: Option<String>,
    pub address: Vec<usize>,
    pub value: Option<String>,
    pub position: Option<Point>,
    pub attributes: Vec<String>,
    pub children: usize,
}

/// A parsed nested-list document.
#[derive(Debug)]
pub struct Document {
    tree: SExp,
    nodes: Vec<Node>,
    collections: Vec<Collection>,
    root: NodeId,
    dialect: Dialect,
    options: LoadOptions,
    path: Option<PathBuf>,
    skipped: Vec<SkippedEntry>,
}

impl Document {
    /// Read and parse a file, picking the dialect from its extension.
    pub fn load(path: &Path) -> Result<Self> {
        Self::load_with(path, LoadOptions::for_path(path))
    }

    pub fn load_with(path: &Path, options: LoadOptions) -> Result<Self> {
        info!("Loading {}", path.display());
        let text = std::fs::read_to_string(path)?;
        let mut doc = Self::parse_str(&text, options)?;
        doc.path = Some(path.to_path_buf());
        Ok(doc)
    }

    pub fn parse_str(text: &str, options: LoadOptions) -> Result<Self> {
        let tree = SExp::parse_str(text)?;
        Self::from_tree(tree, options)
    }

    /// Re-read the file this document was loaded from, discarding every
    /// unsaved change.
    pub fn reload(&mut self) -> Result<()> {
        let path = self.path.clone().ok_or_else(|| {
            SkipError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "document was not loaded from a file",
            ))
        })?;
        *self = Self::load_with(&path, self.options.clone())?;
        Ok(())
    }

    pub fn to_text(&self, options: &WriteOptions) -> String {
        to_text(&self.tree, options)
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        self.write_with(path, &WriteOptions::default())
    }

    pub fn write_with(&self, path: &Path, options: &WriteOptions) -> Result<()> {
        info!("Writing {}", path.display());
        std::fs::write(path, self.to_text(options))?;
        Ok(())
    }

    /// Write back to the file the document was loaded from.
    pub fn overwrite(&self) -> Result<()> {
        match &self.path {
            Some(path) => self.write(path),
            None => Err(SkipError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "document was not loaded from a file",
            ))),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn dialect(&self) -> &Dialect {
        &self.dialect
    }

    /// Backing tree, tombstones included.
    pub fn tree(&self) -> &SExp {
        &self.tree
    }

    pub fn skipped(&self) -> &[SkippedEntry] {
        &self.skipped
    }

    /// # Panics
    ///
    /// If `id` was not handed out by this document (or by it before a
    /// `reload`). Use [`Document::get_node`] for ids of unknown origin.
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    pub fn get_node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0)
    }

    pub fn len(&self) -> usize {
        self.nodes.iter().filter(|n| !n.deleted).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn entity_type(&self, id: NodeId) -> Option<&str> {
        self.node(id).entity_type()
    }

    pub fn is_deleted(&self, id: NodeId) -> bool {
        self.node(id).deleted
    }

    pub(crate) fn live(&self, id: NodeId) -> Result<&Node> {
        let node = self.get_node(id).ok_or(SkipError::UnknownNode(id))?;
        if node.deleted {
            Err(SkipError::Deleted(id))
        } else {
            Ok(node)
        }
    }

    pub(crate) fn raw_at(&self, address: &[usize]) -> Option<&SExp> {
        let mut current = &self.tree;
        for &index in address {
            current = current.as_list()?.get(index)?;
        }
        Some(current)
    }

    pub(crate) fn raw_at_mut(&mut self, address: &[usize]) -> Option<&mut SExp> {
        let mut current = &mut self.tree;
        for &index in address {
            current = current.as_list_mut()?.get_mut(index)?;
        }
        Some(current)
    }

    /// Raw backing content of a live node.
    pub fn raw(&self, id: NodeId) -> Option<&SExp> {
        let node = self.node(id);
        if node.deleted {
            return None;
        }
        self.raw_at(&node.address)
    }

    /// The `index`-th scalar of the node's value.
    pub fn scalar(&self, id: NodeId, index: usize) -> Option<&SExp> {
        let node = self.node(id);
        let raw = self.raw(id)?;
        match &node.slots {
            ValueSlots::None => None,
            ValueSlots::Leaf => (index == 0).then_some(raw),
            ValueSlots::Inline(i) => raw.as_list()?.get(*i)?.as_list()?.get(index),
            ValueSlots::Scalars(slots) => raw.as_list()?.get(*slots.get(index)?),
        }
    }

    pub fn scalars(&self, id: NodeId) -> Vec<SExp> {
        (0..)
            .map_while(|i| self.scalar(id, i).cloned())
            .collect()
    }

    /// Current value, read from the backing tree.
    pub fn value(&self, id: NodeId) -> Option<Value> {
        let node = self.node(id);
        if node.deleted {
            return None;
        }
        match &node.slots {
            ValueSlots::Leaf => self.raw(id).cloned().map(Value::Atom),
            ValueSlots::Inline(i) => self
                .raw(id)?
                .as_list()?
                .get(*i)?
                .as_list()
                .map(|items| Value::List(items.to_vec())),
            ValueSlots::Scalars(slots) if slots.len() == 1 => {
                self.scalar(id, 0).cloned().map(Value::Atom)
            }
            ValueSlots::Scalars(slots) if !slots.is_empty() => Some(Value::List(self.scalars(id))),
            _ => {
                let children = self.child_nodes(id);
                if children.is_empty() {
                    None
                } else {
                    Some(Value::Nodes(children))
                }
            }
        }
    }

    pub fn text(&self, id: NodeId) -> Option<String> {
        self.scalar(id, 0).and_then(|s| s.as_text())
    }

    pub fn number(&self, id: NodeId) -> Option<f64> {
        self.scalar(id, 0).and_then(|s| s.as_number())
    }

    pub fn bool_value(&self, id: NodeId) -> Option<bool> {
        self.value(id).and_then(|v| v.as_bool())
    }

    /// Children in source order, typed nodes and raw scalars alike.
    pub fn children(&self, id: NodeId) -> Vec<ChildRef> {
        let node = self.node(id);
        let raw = self.raw(id).and_then(|r| r.as_list());
        node.children
            .iter()
            .filter_map(|child| match child {
                Child::Node(c) if !self.is_deleted(*c) => Some(ChildRef::Node(*c)),
                Child::Node(_) => None,
                Child::Scalar(i) => raw
                    .and_then(|items| items.get(*i))
                    .filter(|s| !s.is_tombstone())
                    .cloned()
                    .map(ChildRef::Scalar),
            })
            .collect()
    }

    /// Live typed children in source order.
    pub fn child_nodes(&self, id: NodeId) -> Vec<NodeId> {
        self.node(id)
            .children
            .iter()
            .filter_map(|child| match child {
                Child::Node(c) if !self.is_deleted(*c) => Some(*c),
                _ => None,
            })
            .collect()
    }

    pub fn group(&self, id: NodeId, entity_type: &str) -> Option<&ChildGroup> {
        self.node(id).group(entity_type)
    }

    /// The single child of this type. Absence is not an error: which
    /// optional children a node has depends on the data.
    pub fn child(&self, id: NodeId, entity_type: &str) -> Option<NodeId> {
        match self.group(id, entity_type)? {
            ChildGroup::Single(c) if !self.is_deleted(*c) => Some(*c),
            _ => None,
        }
    }

    /// Every live child of this type, whatever its group shape.
    pub fn children_of_type(&self, id: NodeId, entity_type: &str) -> Vec<NodeId> {
        let members = match self.group(id, entity_type) {
            None => return Vec::new(),
            Some(ChildGroup::Single(c)) => vec![*c],
            Some(ChildGroup::Sequence(v)) => v.clone(),
            Some(ChildGroup::Collection(cid)) => self.collection(*cid).elements().to_vec(),
        };
        members
            .into_iter()
            .filter(|c| !self.is_deleted(*c))
            .collect()
    }

    /// The dedicated collection for children of this type.
    pub fn collection_of(&self, id: NodeId, entity_type: &str) -> Result<CollectionId> {
        match self.group(id, entity_type) {
            Some(ChildGroup::Collection(cid)) => Ok(*cid),
            _ => Err(SkipError::unknown_attribute(self.entity_type(id), entity_type)),
        }
    }

    /// # Panics
    ///
    /// If `cid` does not come from this document.
    pub fn collection(&self, cid: CollectionId) -> &Collection {
        &self.collections[cid.0]
    }

    pub fn get_collection(&self, cid: CollectionId) -> Option<&Collection> {
        self.collections.get(cid.0)
    }

    pub(crate) fn collection_mut(&mut self, cid: CollectionId) -> &mut Collection {
        &mut self.collections[cid.0]
    }

    pub fn collection_ref(&self, cid: CollectionId) -> CollectionRef<'_> {
        CollectionRef::new(self, self.collection(cid))
    }

    /// Shorthand for `collection_of` followed by `collection_ref`.
    pub fn collection_at(&self, id: NodeId, entity_type: &str) -> Result<CollectionRef<'_>> {
        self.collection_of(id, entity_type)
            .map(|cid| self.collection_ref(cid))
    }

    /// The `(property "<key>" ...)` child of a node.
    ///
    /// The key is scalar 0 of the returned node and the property's value is
    /// scalar 1, so `value()` of the node reads both as a list; use
    /// `scalar(prop, 1)` for the value alone.
    pub fn property_node(&self, id: NodeId, key: &str) -> Option<NodeId> {
        self.children_of_type(id, "property")
            .into_iter()
            .find(|p| self.text(*p).as_deref() == Some(key))
    }

    /// Every live descendant of the given type, depth first, in source order.
    pub fn find_all(&self, id: NodeId, entity_type: &str) -> Vec<NodeId> {
        let mut found = Vec::new();
        let mut stack: Vec<NodeId> = self.child_nodes(id).into_iter().rev().collect();
        while let Some(current) = stack.pop() {
            if self.entity_type(current) == Some(entity_type) {
                found.push(current);
            }
            stack.extend(self.child_nodes(current).into_iter().rev());
        }
        found
    }

    /// Parent chain up to, not including, `id` itself.
    pub fn ancestors(&self, id: NodeId) -> Vec<NodeId> {
        let mut chain = Vec::new();
        let mut current = self.node(id).parent;
        while let Some(p) = current {
            chain.push(p);
            current = self.node(p).parent;
        }
        chain
    }

    /// Position and orientation from the node's `at` child. `None` when the
    /// node has no position; an error when the angle is not a right angle.
    pub fn at_value(&self, id: NodeId) -> Option<Result<AtValue>> {
        let at = self.child(id, "at")?;
        AtValue::from_values(&self.scalars(at))
    }

    /// Anchor point from `at`, whatever its angle.
    pub fn position(&self, id: NodeId) -> Option<Point> {
        let at = self.child(id, "at")?;
        let x = self.scalar(at, 0)?.as_number()?;
        let y = self.scalar(at, 1)?.as_number()?;
        Some(Point::new(x, y))
    }

    fn xy_of(&self, id: NodeId) -> Option<Point> {
        let x = self.scalar(id, 0)?.as_number()?;
        let y = self.scalar(id, 1)?.as_number()?;
        Some(Point::new(x, y))
    }

    /// Every point a node occupies: its `at` anchor, the `xy` entries of its
    /// `pts`, or its `start`/`end` pair.
    pub fn points_of(&self, id: NodeId) -> Vec<Point> {
        if let Some(p) = self.position(id) {
            return vec![p];
        }
        if let Some(pts) = self.child(id, "pts") {
            return self
                .children_of_type(pts, "xy")
                .into_iter()
                .filter_map(|xy| self.xy_of(xy))
                .collect();
        }
        ["start", "end"]
            .iter()
            .filter_map(|t| self.child(id, t))
            .filter_map(|c| self.xy_of(c))
            .collect()
    }

    pub fn summary(&self, id: NodeId) -> NodeSummary {
        let node = self.node(id);
        let value = match self.value(id) {
            Some(Value::Atom(a)) => Some(a.to_string()),
            Some(Value::List(items)) => Some(
                items
                    .iter()
                    .map(|i| i.to_string())
                    .collect::<Vec<_>>()
                    .join(" "),
            ),
            _ => None,
        };
        NodeSummary {
            id,
            entity_type: node.entity_type.clone(),
            address: node.address.clone(),
            value,
            position: self.points_of(id).first().copied(),
            attributes: node.attributes().map(|s| s.to_string()).collect(),
            children: self.child_nodes(id).len(),
        }
    }
}
