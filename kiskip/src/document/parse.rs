//! Building the arena from a backing tree.

use tracing::{debug, warn};

use crate::collection::Collection;
use crate::config::LoadOptions;
use crate::document::classify::{classify, Dialect, EntityKind, GroupShape, Naming};
use crate::document::{
    Child, ChildGroup, CollectionId, Document, Node, NodeId, SkippedEntry, ValueSlots,
};
use crate::error::{Result, SkipError};
use crate::parser::SExp;

/// What parsing needs to know about one raw value before recursing.
struct RawShape {
    is_list: bool,
    head: Option<String>,
    body_start: usize,
    /// Raw index of the inline value list, if the body is one.
    inline: Option<usize>,
    /// `(raw index, is a non-empty list)` for every live body entry.
    entries: Vec<(usize, bool)>,
}

impl RawShape {
    fn of(raw: &SExp) -> Self {
        let Some(items) = raw.as_list() else {
            return Self {
                is_list: false,
                head: None,
                body_start: 0,
                inline: None,
                entries: Vec::new(),
            };
        };
        let head = items
            .first()
            .and_then(|first| first.as_symbol())
            .map(str::to_string);
        let body_start = usize::from(head.is_some());
        let body: Vec<(usize, &SExp)> = items
            .iter()
            .enumerate()
            .skip(body_start)
            .filter(|(_, item)| !item.is_tombstone())
            .collect();

        // A lone untagged list in the body is the node's value, not a child.
        let inline = match body.as_slice() {
            [(index, SExp::List(inner))]
                if inner.first().map(|f| f.as_symbol().is_none()).unwrap_or(false) =>
            {
                Some(*index)
            }
            _ => None,
        };

        let entries = body
            .iter()
            .map(|(index, item)| (*index, item.as_list().map(|l| !l.is_empty()).unwrap_or(false)))
            .collect();

        Self {
            is_list: true,
            head,
            body_start,
            inline,
            entries,
        }
    }
}

impl Document {
    pub fn from_tree(tree: SExp, options: LoadOptions) -> Result<Self> {
        let dialect = Dialect::for_kind(options.dialect);
        Self::from_tree_with_dialect(tree, options, dialect)
    }

    /// Parse with a custom rule table.
    pub fn from_tree_with_dialect(tree: SExp, options: LoadOptions, dialect: Dialect) -> Result<Self> {
        let mut doc = Document {
            tree,
            nodes: Vec::new(),
            collections: Vec::new(),
            root: NodeId(0),
            dialect,
            options,
            path: None,
            skipped: Vec::new(),
        };
        doc.root = doc.parse_node(Vec::new(), None, 0)?;
        debug!(
            nodes = doc.nodes.len(),
            collections = doc.collections.len(),
            skipped = doc.skipped.len(),
            "Parsed document"
        );
        Ok(doc)
    }

    /// Parse the raw value at `address` and everything below it. Depth 0 is
    /// the document root, whose direct entries fail independently.
    pub(crate) fn parse_node(
        &mut self,
        address: Vec<usize>,
        parent: Option<NodeId>,
        depth: usize,
    ) -> Result<NodeId> {
        let entry_index = address.first().copied().unwrap_or(0);
        if depth > self.options.max_depth {
            return Err(SkipError::Parse {
                index: entry_index,
                message: format!("nesting deeper than {} levels", self.options.max_depth),
            });
        }
        let shape = self
            .raw_at(&address)
            .map(RawShape::of)
            .ok_or_else(|| SkipError::Parse {
                index: entry_index,
                message: format!("no value at address {:?}", address),
            })?;

        let owner_type = parent.and_then(|p| self.entity_type(p)).map(str::to_string);
        let id = NodeId(self.nodes.len());
        let mut node = Node::new(address.clone(), parent);
        node.kind = EntityKind::from_tag(owner_type.as_deref(), shape.head.as_deref());
        node.entity_type = shape.head.clone();
        node.body_start = shape.body_start;
        self.nodes.push(node);

        if !shape.is_list {
            self.nodes[id.0].slots = ValueSlots::Leaf;
            return Ok(id);
        }
        if let Some(index) = shape.inline {
            self.nodes[id.0].slots = ValueSlots::Inline(index);
            return Ok(id);
        }

        let mut children = Vec::with_capacity(shape.entries.len());
        let mut scalars = Vec::new();
        for &(index, nested) in &shape.entries {
            if !nested {
                children.push(Child::Scalar(index));
                scalars.push(index);
                continue;
            }
            let mut child_address = address.clone();
            child_address.push(index);
            if depth == 0 {
                if let Some(child) = self.parse_top_level(child_address, id) {
                    children.push(Child::Node(child));
                }
            } else {
                let child = self.parse_node(child_address, Some(id), depth + 1)?;
                children.push(Child::Node(child));
            }
        }

        let node = &mut self.nodes[id.0];
        node.children = children;
        node.slots = ValueSlots::Scalars(scalars);

        self.classify_children(id);
        self.bind_position(id)?;
        Ok(id)
    }

    /// Parse one top-level entry. On failure the partial arena is rolled
    /// back, the entry is logged and skipped, and its raw content stays in
    /// the backing tree untouched.
    fn parse_top_level(&mut self, address: Vec<usize>, root: NodeId) -> Option<NodeId> {
        let node_mark = self.nodes.len();
        let collection_mark = self.collections.len();
        let index = address.first().copied().unwrap_or(0);
        match self.parse_node(address, Some(root), 1) {
            Ok(id) => Some(id),
            Err(e) => {
                self.nodes.truncate(node_mark);
                self.collections.truncate(collection_mark);
                let raw = self
                    .raw_at(&[index])
                    .map(|r| r.to_string())
                    .unwrap_or_default();
                warn!(index, raw = %raw, "Skipping top-level entry: {}", e);
                self.skipped.push(SkippedEntry {
                    index,
                    message: e.to_string(),
                    raw,
                });
                None
            }
        }
    }

    /// Group the node's typed children by entity type and give each group
    /// its shape.
    fn classify_children(&mut self, id: NodeId) {
        let mut tally: Vec<(String, Vec<NodeId>)> = Vec::new();
        for child in &self.nodes[id.0].children {
            let Child::Node(c) = child else { continue };
            let Some(ty) = self.nodes[c.0].entity_type.as_deref() else {
                continue;
            };
            match tally.iter_mut().find(|(name, _)| name == ty) {
                Some((_, members)) => members.push(*c),
                None => tally.push((ty.to_string(), vec![*c])),
            }
        }

        let owner_is_root = self.nodes[id.0].parent.is_none();
        let owner_type = self.nodes[id.0].entity_type.clone();
        let mut groups = Vec::with_capacity(tally.len());
        for (ty, members) in tally {
            let rule = self
                .dialect
                .rule_for(owner_is_root, owner_type.as_deref(), &ty)
                .copied();
            let group = match classify(members.len(), rule.as_ref()) {
                GroupShape::Single => ChildGroup::Single(members[0]),
                GroupShape::Sequence => ChildGroup::Sequence(members),
                GroupShape::Collection => {
                    let naming = rule.map(|r| r.naming).unwrap_or(Naming::Unnamed);
                    ChildGroup::Collection(self.build_collection(id, &ty, naming, &members))
                }
            };
            groups.push((ty, group));
        }
        self.nodes[id.0].groups = groups;
    }

    /// Register a collection under `owner`. Elements whose name cannot be
    /// claimed stay reachable by index.
    pub(crate) fn build_collection(
        &mut self,
        owner: NodeId,
        entity_type: &str,
        naming: Naming,
        members: &[NodeId],
    ) -> CollectionId {
        let cid = CollectionId(self.collections.len());
        let mut collection = Collection::new(cid, owner, entity_type, naming);
        for &member in members {
            let name = naming.name_of(self, member);
            if let Err(e) = collection.append(member, name.as_deref()) {
                warn!(entity_type, "Keeping element without a name: {}", e);
                collection.push_unnamed(member);
            }
            self.nodes[member.0].member_of = Some(cid);
        }
        debug!(
            owner = ?self.nodes[owner.0].entity_type,
            entity_type,
            len = collection.len(),
            naming = ?naming,
            "Registered collection"
        );
        self.collections.push(collection);
        cid
    }

    /// Enable movement on nodes with a well-formed `(at X Y ..)` child.
    fn bind_position(&mut self, id: NodeId) -> Result<()> {
        let Some(at) = self.child(id, "at") else {
            return Ok(());
        };
        let numeric = |i| self.scalar(at, i).and_then(|s| s.as_number()).is_some();
        if !(numeric(0) && numeric(1)) {
            let node = &self.nodes[id.0];
            return Err(SkipError::Parse {
                index: node.address.first().copied().unwrap_or(0),
                message: format!(
                    "malformed position in '{}'",
                    node.entity_type.as_deref().unwrap_or("<untyped>")
                ),
            });
        }
        self.nodes[id.0].positioned = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DialectKind;
    use crate::document::Value;

    fn schematic(text: &str) -> Document {
        let options = LoadOptions {
            dialect: DialectKind::Schematic,
            ..LoadOptions::default()
        };
        Document::parse_str(text, options).unwrap()
    }

    #[test]
    fn test_malformed_top_level_entry_is_skipped() {
        let doc = schematic(
            "(kicad_sch (version 1) (junction (at left 2)) (wire (pts (xy 0 0) (xy 1 0))))",
        );
        assert_eq!(doc.skipped().len(), 1);
        assert_eq!(doc.skipped()[0].index, 2);
        assert!(doc.skipped()[0].raw.contains("left"));
        assert!(doc.child(doc.root(), "junction").is_none());
        assert_eq!(doc.collection_at(doc.root(), "wire").unwrap().len(), 1);
        // The raw entry survives a write.
        let text = doc.to_text(&crate::config::WriteOptions::compact());
        assert!(text.contains("(junction (at left 2))"));
    }

    #[test]
    fn test_nested_failure_takes_whole_entry() {
        let doc = schematic("(kicad_sch (symbol (property \"Reference\" \"R1\" (at x y))) (junction (at 1 1)))");
        assert_eq!(doc.skipped().len(), 1);
        assert!(doc.collection_at(doc.root(), "symbol").is_err());
        assert_eq!(doc.collection_at(doc.root(), "junction").unwrap().len(), 1);
    }

    #[test]
    fn test_depth_limit() {
        let options = LoadOptions {
            max_depth: 3,
            ..LoadOptions::default()
        };
        let doc = Document::parse_str("(root (a (b (c (d 1)))) (e 2))", options).unwrap();
        assert_eq!(doc.skipped().len(), 1);
        assert!(doc.child(doc.root(), "e").is_some());
    }

    #[test]
    fn test_dialect_collections() {
        let doc = schematic(
            "(kicad_sch (junction (at 1 1)) \
               (symbol (lib_id \"Device:R\") (at 0 0 0) \
                 (property \"Reference\" \"R1\" (at 0 0 0)) \
                 (property \"Value\" \"10k\" (at 0 0 0))))",
        );
        let root = doc.root();
        let junctions = doc.collection_at(root, "junction").unwrap();
        assert_eq!(junctions.len(), 1);
        let symbols = doc.collection_at(root, "symbol").unwrap();
        let r1 = symbols.get_by_name("R1").unwrap();
        assert_eq!(doc.node(r1).kind(), EntityKind::Symbol);
        let props = doc.collection_at(r1, "property").unwrap();
        assert_eq!(props.names().collect::<Vec<_>>(), vec!["Reference", "Value"]);
        let reference = props.get_by_name("reference").unwrap();
        assert_eq!(doc.scalar(reference, 1).unwrap().as_text().as_deref(), Some("R1"));
        assert_eq!(
            doc.value(reference),
            Some(Value::List(vec![SExp::string("Reference"), SExp::string("R1")]))
        );
    }

    #[test]
    fn test_generic_dialect_has_no_collections() {
        let doc = Document::parse_str(
            "(kicad_sch (junction (at 1 1)) (junction (at 2 2)))",
            LoadOptions::default(),
        )
        .unwrap();
        assert!(matches!(
            doc.group(doc.root(), "junction"),
            Some(ChildGroup::Sequence(v)) if v.len() == 2
        ));
    }

    #[test]
    fn test_empty_list_is_a_scalar_child() {
        let doc = Document::parse_str("(root (a ()))", LoadOptions::default()).unwrap();
        let a = doc.child(doc.root(), "a").unwrap();
        assert_eq!(doc.scalars(a), vec![SExp::List(Vec::new())]);
        assert!(doc.child_nodes(a).is_empty());
    }
}
