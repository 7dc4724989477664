//! Write-through mutation.
//!
//! Every setter edits the backing tree at the node's address immediately.
//! Name keys of the enclosing collections are refreshed afterwards; when a
//! new key cannot be claimed the edit is rolled back.

use tracing::debug;

use crate::document::classify::{classify, GroupShape, Naming};
use crate::document::{Child, ChildGroup, CollectionId, Document, NodeId, Value, ValueSlots};
use crate::error::{Result, SkipError};
use crate::geometry::{round_to, AtValue};
use crate::parser::{compact, SExp};

/// Children that must stay unique across a document.
const IDENTITY_FIELDS: [&str; 2] = ["uuid", "tstamp"];

/// Decimal places positions are rounded to after a move.
const POSITION_PLACES: i32 = 6;

/// Keep the written token's flavour: a bare symbol stays bare.
fn restyle(previous: Option<&SExp>, text: &str) -> SExp {
    match previous {
        Some(SExp::Symbol(_)) => SExp::symbol(text),
        _ => SExp::string(text),
    }
}

/// Saved state for undoing a single write.
struct Snapshot {
    id: NodeId,
    raw: SExp,
    slots: ValueSlots,
    children: Vec<Child>,
}

impl Document {
    fn snapshot(&self, id: NodeId) -> Result<Snapshot> {
        let node = self.live(id)?;
        let raw = self
            .raw_at(&node.address)
            .cloned()
            .ok_or(SkipError::Deleted(id))?;
        Ok(Snapshot {
            id,
            raw,
            slots: node.slots.clone(),
            children: node.children.clone(),
        })
    }

    fn restore(&mut self, snapshot: Snapshot) {
        let address = self.nodes[snapshot.id.0].address.clone();
        if let Some(slot) = self.raw_at_mut(&address) {
            *slot = snapshot.raw;
        }
        let node = &mut self.nodes[snapshot.id.0];
        node.slots = snapshot.slots;
        node.children = snapshot.children;
    }

    fn raw_list_mut(&mut self, id: NodeId) -> Result<&mut Vec<SExp>> {
        let address = self.live(id)?.address.clone();
        self.raw_at_mut(&address)
            .and_then(|r| r.as_list_mut())
            .ok_or_else(|| SkipError::ValueShape("node is not a list".to_string()))
    }

    fn has_typed_children(&self, id: NodeId) -> bool {
        !self.child_nodes(id).is_empty()
    }

    /// Run a raw edit, then refresh name keys; undo the edit if that fails.
    fn guarded<F>(&mut self, id: NodeId, edit: F) -> Result<()>
    where
        F: FnOnce(&mut Self) -> Result<()>,
    {
        let snapshot = self.snapshot(id)?;
        let result = edit(self).and_then(|_| self.refresh_keys(id));
        if result.is_err() {
            self.restore(snapshot);
        }
        result
    }

    /// Replace the node's value.
    ///
    /// An atom replaces the first scalar (or is appended when there is
    /// none). A list replaces the whole body of a node without typed
    /// children; with typed children it must match the number of scalars.
    pub fn set_value(&mut self, id: NodeId, value: impl Into<Value>) -> Result<()> {
        let value = value.into();
        self.guarded(id, |doc| doc.write_value(id, value))
    }

    fn write_value(&mut self, id: NodeId, value: Value) -> Result<()> {
        let slots = self.live(id)?.slots.clone();
        let typed = self.has_typed_children(id);
        match (slots, value) {
            (_, Value::Nodes(_)) => Err(SkipError::ValueShape(
                "typed children cannot be assigned as a value".to_string(),
            )),
            (ValueSlots::Leaf, Value::Atom(atom)) => {
                let address = self.nodes[id.0].address.clone();
                if let Some(slot) = self.raw_at_mut(&address) {
                    *slot = atom;
                }
                Ok(())
            }
            (ValueSlots::Leaf, Value::List(_)) => Err(SkipError::ValueShape(
                "a scalar leaf cannot hold a list".to_string(),
            )),
            (ValueSlots::Inline(index), Value::List(items)) => {
                self.raw_list_mut(id)?[index] = SExp::List(items);
                Ok(())
            }
            (ValueSlots::Inline(index), Value::Atom(atom)) => {
                self.raw_list_mut(id)?[index] = SExp::List(vec![atom]);
                Ok(())
            }
            (ValueSlots::Scalars(slots), Value::Atom(atom)) => self.write_scalar(id, &slots, 0, atom),
            (ValueSlots::Scalars(slots), Value::List(items)) if typed => {
                if items.len() != slots.len() {
                    return Err(SkipError::ValueShape(format!(
                        "node has {} scalars next to its children, got {} values",
                        slots.len(),
                        items.len()
                    )));
                }
                let list = self.raw_list_mut(id)?;
                for (slot, item) in slots.iter().zip(items) {
                    list[*slot] = item;
                }
                Ok(())
            }
            (ValueSlots::Scalars(_), Value::List(items)) => {
                let body_start = self.nodes[id.0].body_start;
                let list = self.raw_list_mut(id)?;
                list.truncate(body_start);
                list.extend(items);
                let indices: Vec<usize> = (body_start..list.len()).collect();
                let node = &mut self.nodes[id.0];
                node.children = indices.iter().map(|i| Child::Scalar(*i)).collect();
                node.slots = ValueSlots::Scalars(indices);
                Ok(())
            }
            (ValueSlots::None, _) => Err(SkipError::ValueShape(
                "node has no value slot".to_string(),
            )),
        }
    }

    /// Write scalar `index`, appending when it is one past the end.
    fn write_scalar(&mut self, id: NodeId, slots: &[usize], index: usize, atom: SExp) -> Result<()> {
        if let Some(slot) = slots.get(index) {
            self.raw_list_mut(id)?[*slot] = atom;
            return Ok(());
        }
        if index != slots.len() {
            return Err(SkipError::ValueShape(format!(
                "scalar {} is out of range, node has {}",
                index,
                slots.len()
            )));
        }
        let list = self.raw_list_mut(id)?;
        list.push(atom);
        let raw_index = list.len() - 1;
        let node = &mut self.nodes[id.0];
        node.children.push(Child::Scalar(raw_index));
        if let ValueSlots::Scalars(s) = &mut node.slots {
            s.push(raw_index);
        }
        Ok(())
    }

    /// Replace one scalar of the value, or append one at the end.
    pub fn set_scalar(&mut self, id: NodeId, index: usize, atom: SExp) -> Result<()> {
        self.guarded(id, |doc| {
            match doc.live(id)?.slots.clone() {
                ValueSlots::Scalars(slots) => doc.write_scalar(id, &slots, index, atom),
                ValueSlots::Leaf if index == 0 => doc.write_value(id, Value::Atom(atom)),
                ValueSlots::Inline(raw_index) => {
                    let inner = doc.raw_list_mut(id)?[raw_index]
                        .as_list_mut()
                        .ok_or_else(|| SkipError::ValueShape("inline value is not a list".to_string()))?;
                    match index.cmp(&inner.len()) {
                        std::cmp::Ordering::Less => inner[index] = atom,
                        std::cmp::Ordering::Equal => inner.push(atom),
                        std::cmp::Ordering::Greater => {
                            return Err(SkipError::ValueShape(format!(
                                "scalar {} is out of range",
                                index
                            )))
                        }
                    }
                    Ok(())
                }
                _ => Err(SkipError::ValueShape(format!("scalar {} is out of range", index))),
            }
        })
    }

    /// Set the first scalar as text, keeping a bare symbol bare.
    pub fn set_text(&mut self, id: NodeId, text: &str) -> Result<()> {
        let atom = restyle(self.scalar(id, 0), text);
        self.set_scalar(id, 0, atom)
    }

    /// Write a boolean in the style the node already uses (`yes`/`no`
    /// unless it holds `true`/`false`).
    pub fn set_bool(&mut self, id: NodeId, value: bool) -> Result<()> {
        let literal = matches!(
            self.scalar(id, 0).and_then(|s| s.as_symbol()),
            Some("true") | Some("false")
        );
        let word = match (literal, value) {
            (true, true) => "true",
            (true, false) => "false",
            (false, true) => "yes",
            (false, false) => "no",
        };
        self.set_scalar(id, 0, SExp::symbol(word))
    }

    /// Re-derive the name keys of the node and of its owner.
    fn refresh_keys(&mut self, id: NodeId) -> Result<()> {
        let mut targets = vec![id];
        if let Some(parent) = self.nodes[id.0].parent {
            targets.push(parent);
        }
        for target in targets {
            let Some(cid) = self.nodes[target.0].member_of else {
                continue;
            };
            if self.nodes[target.0].deleted {
                continue;
            }
            let naming = self.collection(cid).naming();
            if !naming.is_named() {
                continue;
            }
            let name = naming.name_of(self, target);
            self.collection_mut(cid).rekey(target, name.as_deref())?;
        }
        Ok(())
    }

    /// Rename an element by rewriting the field its key is derived from.
    /// Returns the new key.
    pub fn rename_element(&mut self, id: NodeId, raw: &str) -> Result<String> {
        let cid = self.live(id)?.member_of.ok_or_else(|| {
            SkipError::ValueShape("node is not part of a collection".to_string())
        })?;
        let field = match self.collection(cid).naming() {
            Naming::FirstValue => (id, 0),
            Naming::Property(key) => {
                let prop = self
                    .property_node(id, key)
                    .ok_or_else(|| SkipError::unknown_attribute(self.entity_type(id), key))?;
                (prop, 1)
            }
            Naming::Unnamed | Naming::Custom(_) => {
                return Err(SkipError::ValueShape(format!(
                    "names of the {} collection cannot be written back",
                    self.collection(cid).entity_type()
                )))
            }
        };
        let atom = restyle(self.scalar(field.0, field.1), raw);
        self.set_scalar(field.0, field.1, atom)?;
        self.collection(cid)
            .key_of(id)
            .map(str::to_string)
            .ok_or_else(|| SkipError::NameCollision(raw.to_string()))
    }

    /// Index-only add: the element's fields are not touched.
    pub fn collection_add(&mut self, cid: CollectionId, raw: &str, element: NodeId) -> Result<String> {
        self.live(element)?;
        let key = self.collection_mut(cid).add(raw, element)?;
        self.nodes[element.0].member_of = Some(cid);
        Ok(key)
    }

    /// Append `element`, deriving its key with the collection's naming.
    pub fn collection_append(&mut self, cid: CollectionId, element: NodeId) -> Result<Option<String>> {
        self.live(element)?;
        let name = self.collection(cid).naming().name_of(self, element);
        let key = self.collection_mut(cid).append(element, name.as_deref())?;
        self.nodes[element.0].member_of = Some(cid);
        Ok(key)
    }

    /// Drop an element from the collection. The node itself stays in the
    /// document.
    pub fn collection_remove(&mut self, cid: CollectionId, key: &str) -> Result<NodeId> {
        let element = self.collection_mut(cid).remove(key)?;
        self.nodes[element.0].member_of = None;
        Ok(element)
    }

    pub fn collection_rename(&mut self, cid: CollectionId, old_key: &str, new_key: &str) -> Result<String> {
        self.collection_mut(cid).rename(old_key, new_key)
    }

    /// Tombstone the node and everything below it, and unlink it from its
    /// owner's group.
    pub fn delete(&mut self, id: NodeId) -> Result<()> {
        let node = self.live(id)?;
        let parent = node.parent.ok_or_else(|| {
            SkipError::ValueShape("the document root cannot be deleted".to_string())
        })?;
        let address = node.address.clone();
        let entity_type = node.entity_type.clone();
        let member_of = node.member_of;

        if let Some(slot) = self.raw_at_mut(&address) {
            *slot = SExp::Tombstone;
        }
        if let Some(cid) = member_of {
            self.collection_mut(cid).remove_element(id);
        }

        let owner = &mut self.nodes[parent.0];
        owner
            .children
            .retain(|c| !matches!(c, Child::Node(n) if *n == id));
        if let Some(ty) = entity_type.as_deref() {
            if let Some(pos) = owner.groups.iter().position(|(name, _)| name == ty) {
                let emptied = match &mut owner.groups[pos].1 {
                    ChildGroup::Single(n) => *n == id,
                    ChildGroup::Sequence(members) => {
                        members.retain(|n| *n != id);
                        members.is_empty()
                    }
                    ChildGroup::Collection(_) => false,
                };
                if emptied {
                    owner.groups.remove(pos);
                }
            }
        }

        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            let node = &mut self.nodes[current.0];
            node.deleted = true;
            stack.extend(node.children.iter().filter_map(|c| match c {
                Child::Node(n) => Some(*n),
                Child::Scalar(_) => None,
            }));
        }
        debug!(?entity_type, ?address, "Deleted node");
        Ok(())
    }

    /// Deep-copy the node as a new last sibling with fresh identity fields,
    /// registered wherever its siblings of the same type live.
    pub fn clone_node(&mut self, id: NodeId) -> Result<NodeId> {
        let node = self.live(id)?;
        let parent = node.parent.ok_or_else(|| {
            SkipError::ValueShape("the document root cannot be cloned".to_string())
        })?;
        let raw = self
            .raw_at(&node.address)
            .cloned()
            .ok_or(SkipError::Deleted(id))?;
        self.insert_raw(parent, raw)
    }

    /// Instantiate a raw shape as a new top-level entry.
    pub fn new_from_template(&mut self, template: &SExp) -> Result<NodeId> {
        self.insert_raw(self.root, template.clone())
    }

    /// Instantiate a raw shape as the last child of `owner`.
    pub fn insert_from_template(&mut self, owner: NodeId, template: &SExp) -> Result<NodeId> {
        self.insert_raw(owner, template.clone())
    }

    fn insert_raw(&mut self, owner: NodeId, mut raw: SExp) -> Result<NodeId> {
        compact(&mut raw);
        let owner_address = self.live(owner)?.address.clone();
        let list = self.raw_list_mut(owner)?;
        list.push(raw);
        let mut address = owner_address;
        address.push(list.len() - 1);

        let node_mark = self.nodes.len();
        let collection_mark = self.collections.len();
        let depth = address.len();
        let result = self.parse_node(address, Some(owner), depth).and_then(|id| {
            self.regenerate_identity(id)?;
            self.register_child(owner, id)?;
            Ok(id)
        });
        match result {
            Ok(id) => {
                debug!(entity_type = ?self.entity_type(id), "Inserted node");
                Ok(id)
            }
            Err(e) => {
                self.nodes.truncate(node_mark);
                self.collections.truncate(collection_mark);
                self.raw_list_mut(owner)?.pop();
                Err(e)
            }
        }
    }

    fn regenerate_identity(&mut self, id: NodeId) -> Result<()> {
        for field in IDENTITY_FIELDS {
            for target in self.find_all(id, field) {
                let fresh = uuid::Uuid::new_v4().to_string();
                let atom = restyle(self.scalar(target, 0), &fresh);
                self.set_scalar(target, 0, atom)?;
            }
        }
        Ok(())
    }

    /// Add a freshly parsed child to its owner's groups. Nothing is changed
    /// when the child cannot be named.
    fn register_child(&mut self, owner: NodeId, child: NodeId) -> Result<()> {
        let Some(ty) = self.entity_type(child).map(str::to_string) else {
            self.nodes[owner.0].children.push(Child::Node(child));
            return Ok(());
        };
        let owner_is_root = self.nodes[owner.0].parent.is_none();
        let owner_type = self.nodes[owner.0].entity_type.clone();
        let rule = self
            .dialect
            .rule_for(owner_is_root, owner_type.as_deref(), &ty)
            .copied();
        let naming = rule.map(|r| r.naming).unwrap_or(Naming::Unnamed);
        let position = self.nodes[owner.0]
            .groups
            .iter()
            .position(|(name, _)| *name == ty);

        let group = match position.map(|p| self.nodes[owner.0].groups[p].1.clone()) {
            Some(ChildGroup::Collection(cid)) => {
                self.collection_append(cid, child)?;
                ChildGroup::Collection(cid)
            }
            Some(ChildGroup::Single(existing)) => match classify(2, rule.as_ref()) {
                GroupShape::Collection => ChildGroup::Collection(self.build_collection(
                    owner,
                    &ty,
                    naming,
                    &[existing, child],
                )),
                _ => ChildGroup::Sequence(vec![existing, child]),
            },
            Some(ChildGroup::Sequence(mut members)) => {
                members.push(child);
                ChildGroup::Sequence(members)
            }
            None => match classify(1, rule.as_ref()) {
                GroupShape::Collection => {
                    ChildGroup::Collection(self.build_collection(owner, &ty, naming, &[child]))
                }
                _ => ChildGroup::Single(child),
            },
        };

        let node = &mut self.nodes[owner.0];
        match position {
            Some(p) => node.groups[p].1 = group,
            None => node.groups.push((ty, group)),
        }
        node.children.push(Child::Node(child));
        Ok(())
    }

    fn shift_xy(&mut self, id: NodeId, dx: f64, dy: f64) -> Result<()> {
        let x = self.scalar(id, 0).and_then(|s| s.as_number());
        let y = self.scalar(id, 1).and_then(|s| s.as_number());
        let (Some(x), Some(y)) = (x, y) else {
            return Err(SkipError::ValueShape(format!(
                "'{}' does not hold a coordinate",
                self.entity_type(id).unwrap_or("<untyped>")
            )));
        };
        self.set_scalar(id, 0, SExp::Number(round_to(x + dx, POSITION_PLACES)))?;
        self.set_scalar(id, 1, SExp::Number(round_to(y + dy, POSITION_PLACES)))
    }

    /// Shift a node by `(dx, dy)`: its `at`, the points of its `pts`, or its
    /// `start`/`end` coordinates. In dialects with absolute child positions
    /// the positioned children move along.
    pub fn translate(&mut self, id: NodeId, dx: f64, dy: f64) -> Result<()> {
        self.live(id)?;
        let mut moved = false;
        if let Some(at) = self.child(id, "at") {
            self.shift_xy(at, dx, dy)?;
            moved = true;
        }
        if let Some(pts) = self.child(id, "pts") {
            for xy in self.children_of_type(pts, "xy") {
                self.shift_xy(xy, dx, dy)?;
            }
            moved = true;
        }
        if !moved {
            for ty in ["start", "mid", "end", "center"] {
                if let Some(c) = self.child(id, ty) {
                    self.shift_xy(c, dx, dy)?;
                    moved = true;
                }
            }
        }
        if !moved {
            return Err(SkipError::unknown_attribute(self.entity_type(id), "at"));
        }
        if self.dialect.absolute_child_positions() {
            for child in self.child_nodes(id) {
                if self.nodes[child.0].positioned {
                    self.translate(child, dx, dy)?;
                }
            }
        }
        Ok(())
    }

    /// Move the node's anchor to `(x, y)`, optionally setting its rotation.
    /// Children move by the same offset.
    pub fn move_to(&mut self, id: NodeId, x: f64, y: f64, rotation: Option<i64>) -> Result<()> {
        let current = self
            .position(id)
            .ok_or_else(|| SkipError::unknown_attribute(self.entity_type(id), "at"))?;
        if let Some(r) = rotation {
            AtValue::new(0.0, 0.0, r)?;
        }
        self.translate(id, x - current.x, y - current.y)?;
        if let Some(r) = rotation {
            let at = self
                .child(id, "at")
                .ok_or_else(|| SkipError::unknown_attribute(self.entity_type(id), "at"))?;
            self.set_scalar(at, 2, SExp::Number((r % 360) as f64))?;
        }
        Ok(())
    }

    /// Store a position into the node's `at` child.
    pub fn set_at_value(&mut self, id: NodeId, at: &AtValue) -> Result<()> {
        let target = self
            .child(id, "at")
            .ok_or_else(|| SkipError::unknown_attribute(self.entity_type(id), "at"))?;
        for (i, value) in at.to_values(true).into_iter().enumerate() {
            self.set_scalar(target, i, value)?;
        }
        Ok(())
    }

    fn current_at(&self, id: NodeId) -> Result<AtValue> {
        self.at_value(id)
            .unwrap_or_else(|| Err(SkipError::unknown_attribute(self.entity_type(id), "at")))
    }

    /// Quarter-turn the node's `at` about its local origin.
    pub fn rotate90(&mut self, id: NodeId) -> Result<()> {
        let mut at = self.current_at(id)?;
        at.rotate90();
        self.set_at_value(id, &at)
    }

    /// Quarter-turn the node's `at` until it reaches `degrees`. Returns the
    /// number of steps.
    pub fn rotate_to(&mut self, id: NodeId, degrees: i64) -> Result<u32> {
        let mut at = self.current_at(id)?;
        let steps = at.rotate_to(degrees)?;
        if steps > 0 {
            self.set_at_value(id, &at)?;
        }
        Ok(steps)
    }
}
