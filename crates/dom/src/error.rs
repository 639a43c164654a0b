//! Error types for DOM operations
//!
//! Simple, flat error hierarchy. No over-engineering.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, DomError>;

#[derive(Debug, Error)]
pub enum DomError {
    #[error("Node not found: {0}")]
    NodeNotFound(u32),

    #[error("Invalid node type: expected {expected}, got {actual}")]
    InvalidNodeType { expected: String, actual: String },

    #[error("Node {child} is not a child of {parent}")]
    NotAChild { parent: u32, child: u32 },

    #[error("Cannot insert node {child} under {parent}: it would become its own ancestor")]
    HierarchyRequest { parent: u32, child: u32 },

    #[error("Parse error at position {position}: {message}")]
    ParseError { position: u64, message: String },

    #[error("Invalid selector '{selector}': {message}")]
    InvalidSelector { selector: String, message: String },
}
