use crate::document::NodeId;
use crate::parser::ParseError;

#[derive(Debug, thiserror::Error)]
pub enum SkipError {
    #[error("Syntax error: {0}")]
    Syntax(#[from] ParseError),
    #[error("Parse error in top-level entry {index}: {message}")]
    Parse { index: usize, message: String },
    #[error("Invalid rotation {0}: only 0, 90, 180 and 270 are allowed")]
    InvalidRotation(i64),
    #[error("Could not derive a unique name from '{0}'")]
    NameCollision(String),
    #[error("'{entity}' has no attribute '{attribute}'")]
    UnknownAttribute { entity: String, attribute: String },
    #[error("No element '{key}' in {collection} collection")]
    UnknownElement { collection: String, key: String },
    #[error("Shape error: {0}")]
    ValueShape(String),
    #[error("Node {0:?} has been deleted")]
    Deleted(NodeId),
    #[error("Node {0:?} does not belong to this document")]
    UnknownNode(NodeId),
    #[error("Invalid pattern: {0}")]
    Pattern(#[from] regex::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SkipError {
    pub(crate) fn unknown_attribute(entity: Option<&str>, attribute: &str) -> Self {
        SkipError::UnknownAttribute {
            entity: entity.unwrap_or("<untyped>").to_string(),
            attribute: attribute.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, SkipError>;
