//! Ordered, optionally name-indexed groups of sibling nodes.
//!
//! A [`Collection`] owns only ids: the nodes themselves live in the
//! document arena. Spatial and connectivity queries need the arena too, so
//! they hang off the borrowed view [`CollectionRef`].

pub mod connectivity;
pub mod spatial;

use std::collections::BTreeMap;
use std::ops::Deref;

use tracing::{debug, warn};

use crate::document::{CollectionId, Document, Naming, NodeId};
use crate::error::{Result, SkipError};

/// Suffix attempts before a name is reported as a collision.
pub const MAX_NAME_ATTEMPTS: usize = 32;

/// Turn a raw identifying string into a name key.
///
/// `~` becomes `n`, leading non-word characters and brackets are dropped, a
/// leading digit gets an `n` prefix and every other run of invalid
/// characters collapses into one `_`.
pub fn sanitize_key(raw: &str) -> String {
    let is_word = |c: char| c.is_alphanumeric() || c == '_';
    let replaced = raw.replace('~', "n");
    let trimmed = replaced.trim_start_matches(|c: char| !is_word(c));
    let stripped: String = trimmed
        .chars()
        .filter(|c| !matches!(c, '(' | ')' | '{' | '}' | '[' | ']'))
        .collect();

    let mut key = String::with_capacity(stripped.len() + 1);
    if stripped.starts_with(|c: char| c.is_ascii_digit()) {
        key.push('n');
    }
    let mut in_run = false;
    for c in stripped.chars() {
        if is_word(c) {
            key.push(c);
            in_run = false;
        } else if !in_run {
            key.push('_');
            in_run = true;
        }
    }
    if key.is_empty() {
        key.push('_');
    }
    key
}

/// Same-typed children of one owner, in document order.
#[derive(Debug, Clone)]
pub struct Collection {
    id: CollectionId,
    owner: NodeId,
    entity_type: String,
    naming: Naming,
    elements: Vec<NodeId>,
    names: BTreeMap<String, NodeId>,
}

impl Collection {
    pub(crate) fn new(id: CollectionId, owner: NodeId, entity_type: &str, naming: Naming) -> Self {
        Self {
            id,
            owner,
            entity_type: entity_type.to_string(),
            naming,
            elements: Vec::new(),
            names: BTreeMap::new(),
        }
    }

    pub fn id(&self) -> CollectionId {
        self.id
    }

    /// Node the collection lives under.
    pub fn owner(&self) -> NodeId {
        self.owner
    }

    pub fn entity_type(&self) -> &str {
        &self.entity_type
    }

    pub fn naming(&self) -> Naming {
        self.naming
    }

    pub fn is_named(&self) -> bool {
        self.naming.is_named()
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<NodeId> {
        self.elements.get(index).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.elements.iter().copied()
    }

    pub fn elements(&self) -> &[NodeId] {
        &self.elements
    }

    pub fn contains(&self, element: NodeId) -> bool {
        self.elements.contains(&element)
    }

    /// Keys in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.names.keys().map(|k| k.as_str())
    }

    pub fn key_of(&self, element: NodeId) -> Option<&str> {
        self.names
            .iter()
            .find(|(_, e)| **e == element)
            .map(|(k, _)| k.as_str())
    }

    /// Exact key first, then the sanitized form, then a case-insensitive
    /// match if exactly one key qualifies.
    fn lookup(&self, key: &str) -> Option<NodeId> {
        if let Some(id) = self.names.get(key) {
            return Some(*id);
        }
        let sanitized = sanitize_key(key);
        if let Some(id) = self.names.get(&sanitized) {
            return Some(*id);
        }
        let wanted = sanitized.to_lowercase();
        let mut matches = self
            .names
            .iter()
            .filter(|(k, _)| k.to_lowercase() == wanted)
            .map(|(_, id)| *id);
        match (matches.next(), matches.next()) {
            (Some(id), None) => Some(id),
            _ => None,
        }
    }

    pub fn get_by_name(&self, key: &str) -> Result<NodeId> {
        self.lookup(key).ok_or_else(|| SkipError::UnknownElement {
            collection: self.entity_type.clone(),
            key: key.to_string(),
        })
    }

    pub fn contains_name(&self, key: &str) -> bool {
        self.lookup(key).is_some()
    }

    /// First free key derived from `base`, appending `_` on collision. A key
    /// already held by `element` counts as free.
    fn free_key(&self, base: &str, element: NodeId) -> Option<String> {
        let mut key = base.to_string();
        for _ in 0..MAX_NAME_ATTEMPTS {
            match self.names.get(&key) {
                None => return Some(key),
                Some(existing) if *existing == element => return Some(key),
                Some(_) => key.push('_'),
            }
        }
        None
    }

    fn claim_key(&self, raw: &str, element: NodeId) -> Result<String> {
        let base = sanitize_key(raw);
        let key = self
            .free_key(&base, element)
            .ok_or_else(|| SkipError::NameCollision(raw.to_string()))?;
        if key != base {
            warn!(
                collection = %self.entity_type,
                "Name '{}' already taken, using '{}'",
                base,
                key
            );
        }
        Ok(key)
    }

    /// Index `element` under a key derived from `raw`, appending it if it is
    /// not yet a member. Any previous key of the element is dropped.
    pub fn add(&mut self, raw: &str, element: NodeId) -> Result<String> {
        let key = self.claim_key(raw, element)?;
        self.names.retain(|_, e| *e != element);
        self.names.insert(key.clone(), element);
        if !self.elements.contains(&element) {
            self.elements.push(element);
        }
        Ok(key)
    }

    /// Drop the element named `key` from both the index and the sequence.
    pub fn remove(&mut self, key: &str) -> Result<NodeId> {
        let element = self.get_by_name(key)?;
        self.remove_element(element);
        Ok(element)
    }

    pub(crate) fn remove_element(&mut self, element: NodeId) -> bool {
        self.names.retain(|_, e| *e != element);
        let before = self.elements.len();
        self.elements.retain(|e| *e != element);
        before != self.elements.len()
    }

    /// Move an element to a new key. Nothing changes if the new key cannot
    /// be claimed.
    pub fn rename(&mut self, old_key: &str, new_raw: &str) -> Result<String> {
        let element = self.get_by_name(old_key)?;
        let key = self.claim_key(new_raw, element)?;
        self.names.retain(|_, e| *e != element);
        self.names.insert(key.clone(), element);
        debug!(collection = %self.entity_type, "Renamed '{}' to '{}'", old_key, key);
        Ok(key)
    }

    /// Grow the sequence; named collections also index the element under
    /// `raw_name` when one is given.
    pub fn append(&mut self, element: NodeId, raw_name: Option<&str>) -> Result<Option<String>> {
        match raw_name {
            Some(raw) if self.is_named() => self.add(raw, element).map(Some),
            _ => {
                self.push_unnamed(element);
                Ok(None)
            }
        }
    }

    pub(crate) fn push_unnamed(&mut self, element: NodeId) {
        if !self.elements.contains(&element) {
            self.elements.push(element);
        }
    }

    /// Bring the element's key in line with a freshly derived raw name. A
    /// collision-suffixed key is kept while another element still holds the
    /// bare name.
    pub(crate) fn rekey(&mut self, element: NodeId, raw_name: Option<&str>) -> Result<Option<String>> {
        let Some(raw) = raw_name else {
            self.names.retain(|_, e| *e != element);
            return Ok(None);
        };
        let base = sanitize_key(raw);
        let base_held_elsewhere = self.names.get(&base).is_some_and(|e| *e != element);
        if let Some(current) = self.key_of(element) {
            let suffixed = current
                .strip_prefix(base.as_str())
                .is_some_and(|rest| !rest.is_empty() && rest.chars().all(|c| c == '_'));
            if current == base || (suffixed && base_held_elsewhere) {
                return Ok(Some(current.to_string()));
            }
        }
        self.add(raw, element).map(Some)
    }
}

/// A collection together with the document it indexes into.
#[derive(Clone, Copy)]
pub struct CollectionRef<'a> {
    doc: &'a Document,
    collection: &'a Collection,
}

impl<'a> CollectionRef<'a> {
    pub(crate) fn new(doc: &'a Document, collection: &'a Collection) -> Self {
        Self { doc, collection }
    }

    pub fn document(&self) -> &'a Document {
        self.doc
    }

    pub fn collection(&self) -> &'a Collection {
        self.collection
    }

    /// Value of the first scalar of every element, for quick listings.
    pub fn labels(&self) -> Vec<Option<String>> {
        self.collection
            .iter()
            .map(|id| self.doc.scalar(id, 0).and_then(|s| s.as_text()))
            .collect()
    }
}

impl<'a> Deref for CollectionRef<'a> {
    type Target = Collection;

    fn deref(&self) -> &Collection {
        self.collection
    }
}

impl std::fmt::Debug for CollectionRef<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollectionRef")
            .field("entity_type", &self.collection.entity_type)
            .field("len", &self.collection.len())
            .finish()
    }
}
