//! Canned raw shapes for new schematic elements.
//!
//! Identity fields hold placeholders; [`Document::new_from_template`]
//! replaces them with fresh uuids on instantiation.
//!
//! [`Document::new_from_template`]: crate::document::Document::new_from_template

use crate::error::Result;
use crate::parser::SExp;

const NIL_UUID: &str = "00000000-0000-0000-0000-000000000000";

/// Elements that can be created from scratch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateKind {
    Wire,
    Label,
    GlobalLabel,
    Text,
    Junction,
}

impl TemplateKind {
    pub fn entity_type(&self) -> &'static str {
        match self {
            TemplateKind::Wire => "wire",
            TemplateKind::Label => "label",
            TemplateKind::GlobalLabel => "global_label",
            TemplateKind::Text => "text",
            TemplateKind::Junction => "junction",
        }
    }

    fn source(&self) -> String {
        match self {
            TemplateKind::Wire => format!(
                "(wire (pts (xy 0 0) (xy 0 2.54)) \
                   (stroke (width 0) (type default)) \
                   (uuid \"{uuid}\"))",
                uuid = NIL_UUID
            ),
            TemplateKind::Label => format!(
                "(label \"LABEL\" (at 25.4 25.4 0) (fields_autoplaced) \
                   (effects (font (size 1.27 1.27)) (justify left bottom)) \
                   (uuid \"{uuid}\"))",
                uuid = NIL_UUID
            ),
            TemplateKind::GlobalLabel => format!(
                "(global_label \"GLABEL\" (shape input) (at 27.94 33.02 180) (fields_autoplaced) \
                   (effects (font (size 1.27 1.27)) (justify right)) \
                   (uuid \"{uuid}\") \
                   (property \"Intersheetrefs\" \"${{INTERSHEET_REFS}}\" (at 21.6891 33.02 0) \
                     (effects (font (size 1.27 1.27)) (justify right) hide)))",
                uuid = NIL_UUID
            ),
            TemplateKind::Text => format!(
                "(text \"hello\" (at 58.42 48.26 0) \
                   (effects (font (size 2 2) (thickness 0.4) bold) (justify left bottom)) \
                   (uuid \"{uuid}\"))",
                uuid = NIL_UUID
            ),
            TemplateKind::Junction => format!(
                "(junction (at 50.8 38.1) (diameter 0) (color 0 0 0 0) \
                   (uuid \"{uuid}\"))",
                uuid = NIL_UUID
            ),
        }
    }
}

/// Raw shape for `kind`, ready for `new_from_template`.
pub fn template(kind: TemplateKind) -> Result<SExp> {
    Ok(SExp::parse_str(&kind.source())?)
}
