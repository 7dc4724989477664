//! Entity kinds and the per-dialect rules that decide how repeated children
//! are exposed.
//!
//! Classification runs once per node, after its children have been parsed.
//! For every distinct child entity type the owner gets exactly one group:
//! a single attribute, a plain ordered sequence, or a dedicated collection
//! when the dialect registers one for that `(owner, child type)` pair.

use crate::config::DialectKind;
use crate::document::{Document, NodeId};

/// Closed set of entity kinds the consumer layers dispatch on. Anything the
/// dialects do not single out is `Other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Document,
    Symbol,
    LibSymbol,
    Property,
    Pin,
    Wire,
    Bus,
    Label,
    GlobalLabel,
    HierarchicalLabel,
    Junction,
    NoConnect,
    Text,
    Footprint,
    Segment,
    Via,
    Position,
    Points,
    Uuid,
    Other,
}

impl EntityKind {
    /// Resolve a kind from the entity tag and the tag of its owner.
    pub fn from_tag(owner: Option<&str>, tag: Option<&str>) -> Self {
        let Some(tag) = tag else {
            return EntityKind::Other;
        };
        match (owner, tag) {
            (_, "kicad_sch") | (_, "kicad_pcb") => EntityKind::Document,
            (Some("lib_symbols"), "symbol") => EntityKind::LibSymbol,
            (Some("symbol"), "symbol") => EntityKind::LibSymbol,
            (_, "symbol") => EntityKind::Symbol,
            (_, "property") => EntityKind::Property,
            (_, "pin") => EntityKind::Pin,
            (_, "wire") => EntityKind::Wire,
            (_, "bus") => EntityKind::Bus,
            (_, "label") => EntityKind::Label,
            (_, "global_label") => EntityKind::GlobalLabel,
            (_, "hierarchical_label") => EntityKind::HierarchicalLabel,
            (_, "junction") => EntityKind::Junction,
            (_, "no_connect") => EntityKind::NoConnect,
            (_, "text") => EntityKind::Text,
            (_, "footprint") | (_, "module") => EntityKind::Footprint,
            (_, "segment") => EntityKind::Segment,
            (_, "via") => EntityKind::Via,
            (_, "at") => EntityKind::Position,
            (_, "pts") => EntityKind::Points,
            (_, "uuid") => EntityKind::Uuid,
            _ => EntityKind::Other,
        }
    }
}

/// Where a collection rule applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// Direct children of the document root.
    Root,
    /// Children of any node with this entity type.
    Within(&'static str),
    /// Everywhere.
    Anywhere,
}

/// Derives a raw name for an element. The result is sanitized by the
/// collection before it becomes a key.
pub type NameFn = fn(&Document, NodeId) -> Option<String>;

/// How the elements of a collection get their name keys.
#[derive(Clone, Copy)]
pub enum Naming {
    /// Index access only.
    Unnamed,
    /// The element's first scalar value (`(property "Reference" ...)`).
    FirstValue,
    /// The value of the element's `(property "<key>" "<value>")` child.
    Property(&'static str),
    /// Arbitrary derivation. Renaming through the element is not supported.
    Custom(NameFn),
}

impl std::fmt::Debug for Naming {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Naming::Unnamed => write!(f, "Unnamed"),
            Naming::FirstValue => write!(f, "FirstValue"),
            Naming::Property(key) => write!(f, "Property({:?})", key),
            Naming::Custom(_) => write!(f, "Custom(..)"),
        }
    }
}

impl Naming {
    pub fn is_named(&self) -> bool {
        !matches!(self, Naming::Unnamed)
    }

    /// Raw identifying string of `element`, if it has one.
    pub fn name_of(&self, doc: &Document, element: NodeId) -> Option<String> {
        match self {
            Naming::Unnamed => None,
            Naming::FirstValue => doc.scalar(element, 0).and_then(|s| s.as_text()),
            Naming::Property(key) => doc
                .property_node(element, key)
                .and_then(|prop| doc.scalar(prop, 1))
                .and_then(|s| s.as_text()),
            Naming::Custom(f) => f(doc, element),
        }
    }
}

/// Registers a dedicated collection for `entity_type` children in `scope`.
#[derive(Debug, Clone, Copy)]
pub struct CollectionRule {
    pub scope: Scope,
    pub entity_type: &'static str,
    pub naming: Naming,
    /// Wrap even a single occurrence, so the collection's presence does not
    /// depend on how many elements a file happens to have.
    pub always: bool,
}

impl CollectionRule {
    pub const fn new(scope: Scope, entity_type: &'static str, naming: Naming) -> Self {
        Self {
            scope,
            entity_type,
            naming,
            always: true,
        }
    }

    fn applies(&self, owner_is_root: bool, owner_type: Option<&str>, child_type: &str) -> bool {
        if self.entity_type != child_type {
            return false;
        }
        match self.scope {
            Scope::Root => owner_is_root,
            Scope::Within(t) => owner_type == Some(t),
            Scope::Anywhere => true,
        }
    }
}

/// The shape a group of same-typed children takes on its owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupShape {
    Single,
    Sequence,
    Collection,
}

/// Rule table for one file type.
#[derive(Debug, Clone)]
pub struct Dialect {
    kind: DialectKind,
    rules: Vec<CollectionRule>,
    /// Child positions are sheet coordinates and move with their owner.
    /// Footprint children are placed relative to the footprint instead.
    absolute_child_positions: bool,
}

impl Dialect {
    pub fn generic() -> Self {
        Self {
            kind: DialectKind::Generic,
            rules: Vec::new(),
            absolute_child_positions: true,
        }
    }

    pub fn schematic() -> Self {
        use Naming::*;
        use Scope::*;
        Self {
            kind: DialectKind::Schematic,
            rules: vec![
                CollectionRule::new(Root, "symbol", Property("Reference")),
                CollectionRule::new(Root, "wire", Unnamed),
                CollectionRule::new(Root, "label", Unnamed),
                CollectionRule::new(Root, "global_label", Unnamed),
                CollectionRule::new(Root, "text", Unnamed),
                CollectionRule::new(Root, "junction", Unnamed),
                CollectionRule::new(Within("symbol"), "property", FirstValue),
                CollectionRule::new(Within("lib_symbols"), "symbol", FirstValue),
            ],
            absolute_child_positions: true,
        }
    }

    pub fn pcb() -> Self {
        use Naming::*;
        use Scope::*;
        Self {
            kind: DialectKind::Pcb,
            rules: vec![
                CollectionRule::new(Root, "footprint", Custom(footprint_reference)),
                CollectionRule::new(Root, "segment", Unnamed),
                CollectionRule::new(Root, "via", Unnamed),
                CollectionRule::new(Within("footprint"), "property", FirstValue),
            ],
            absolute_child_positions: false,
        }
    }

    pub fn for_kind(kind: DialectKind) -> Self {
        match kind {
            DialectKind::Generic => Self::generic(),
            DialectKind::Schematic => Self::schematic(),
            DialectKind::Pcb => Self::pcb(),
        }
    }

    /// Add a rule. Later rules do not override earlier ones.
    pub fn with_rule(mut self, rule: CollectionRule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn kind(&self) -> DialectKind {
        self.kind
    }

    pub fn absolute_child_positions(&self) -> bool {
        self.absolute_child_positions
    }

    pub fn rule_for(
        &self,
        owner_is_root: bool,
        owner_type: Option<&str>,
        child_type: &str,
    ) -> Option<&CollectionRule> {
        self.rules
            .iter()
            .find(|r| r.applies(owner_is_root, owner_type, child_type))
    }
}

/// Decide the group shape for `count` same-typed children.
pub fn classify(count: usize, rule: Option<&CollectionRule>) -> GroupShape {
    match rule {
        Some(rule) if count > 1 || rule.always => GroupShape::Collection,
        _ if count > 1 => GroupShape::Sequence,
        _ => GroupShape::Single,
    }
}

/// Footprints carry their reference either as `(property "Reference" ..)`
/// (KiCad 8) or as `(fp_text reference ..)` (older boards).
pub fn footprint_reference(doc: &Document, footprint: NodeId) -> Option<String> {
    if let Some(prop) = doc.property_node(footprint, "Reference") {
        return doc.scalar(prop, 1).and_then(|s| s.as_text());
    }
    doc.children_of_type(footprint, "fp_text")
        .into_iter()
        .find(|t| doc.scalar(*t, 0).and_then(|s| s.as_text()).as_deref() == Some("reference"))
        .and_then(|t| doc.scalar(t, 1))
        .and_then(|s| s.as_text())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_shapes() {
        let rule = CollectionRule::new(Scope::Root, "wire", Naming::Unnamed);
        let optional = CollectionRule {
            always: false,
            ..rule
        };
        assert_eq!(classify(1, None), GroupShape::Single);
        assert_eq!(classify(3, None), GroupShape::Sequence);
        assert_eq!(classify(1, Some(&rule)), GroupShape::Collection);
        assert_eq!(classify(1, Some(&optional)), GroupShape::Single);
        assert_eq!(classify(2, Some(&optional)), GroupShape::Collection);
    }

    #[test]
    fn test_rule_scopes() {
        let dialect = Dialect::schematic();
        assert!(dialect.rule_for(true, Some("kicad_sch"), "symbol").is_some());
        assert!(dialect.rule_for(false, Some("symbol"), "property").is_some());
        assert!(dialect.rule_for(false, Some("global_label"), "property").is_none());
        assert!(dialect.rule_for(false, Some("sheet"), "wire").is_none());
        assert!(Dialect::generic().rule_for(true, None, "symbol").is_none());
    }

    #[test]
    fn test_entity_kind() {
        assert_eq!(
            EntityKind::from_tag(Some("lib_symbols"), Some("symbol")),
            EntityKind::LibSymbol
        );
        assert_eq!(
            EntityKind::from_tag(Some("kicad_sch"), Some("symbol")),
            EntityKind::Symbol
        );
        assert_eq!(EntityKind::from_tag(None, Some("wire")), EntityKind::Wire);
        assert_eq!(EntityKind::from_tag(None, None), EntityKind::Other);
    }
}
