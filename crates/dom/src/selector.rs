//! Minimal CSS selector matching
//!
//! Enough of the selector grammar to pick reference-bearing elements:
//!
//! ```text
//! selector  := compound (whitespace compound)*       descendant combinator only
//! compound  := (tag | '*')? ( '#' id | '.' class | '[' attr ( '=' value )? ']' )*
//! ```
//!
//! Tag names compare case-insensitively; everything else is exact.

use crate::arena::DomArena;
use crate::error::{DomError, Result};
use crate::types::{DomNode, NodeId};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Condition {
    Id(String),
    Class(String),
    Attr { name: String, value: Option<String> },
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
struct Compound {
    tag: Option<String>,
    conditions: Vec<Condition>,
}

impl Compound {
    fn matches(&self, node: &DomNode) -> bool {
        if !node.is_element() {
            return false;
        }
        if let Some(tag) = &self.tag {
            if !node.node_name.eq_ignore_ascii_case(tag) {
                return false;
            }
        }
        self.conditions.iter().all(|cond| match cond {
            Condition::Id(id) => node.attr("id") == Some(id.as_str()),
            Condition::Class(class) => node.classes().any(|c| c == class),
            Condition::Attr { name, value: None } => node.has_attr(name),
            Condition::Attr {
                name,
                value: Some(value),
            } => node.attr(name) == Some(value.as_str()),
        })
    }
}

/// A parsed descendant-combinator selector
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selector {
    source: String,
    compounds: Vec<Compound>,
}

impl Selector {
    pub fn parse(source: &str) -> Result<Self> {
        let invalid = |message: &str| DomError::InvalidSelector {
            selector: source.to_string(),
            message: message.to_string(),
        };

        let compounds = source
            .split_ascii_whitespace()
            .map(|part| parse_compound(part).map_err(|m| invalid(&m)))
            .collect::<Result<Vec<_>>>()?;

        if compounds.is_empty() {
            return Err(invalid("empty selector"));
        }

        Ok(Self {
            source: source.to_string(),
            compounds,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Does `node_id` match, considering its ancestors for the leading compounds?
    pub fn matches(&self, arena: &DomArena, node_id: NodeId) -> bool {
        let Some((last, rest)) = self.compounds.split_last() else {
            return false;
        };
        let Ok(node) = arena.get(node_id) else {
            return false;
        };
        if !last.matches(node) {
            return false;
        }

        // Right-to-left, greedily binding each compound to the nearest ancestor
        let mut pending = rest.iter().rev().peekable();
        let mut current = node.parent_id;
        while let Some(compound) = pending.peek() {
            let Some(id) = current else {
                return false;
            };
            let Ok(ancestor) = arena.get(id) else {
                return false;
            };
            if compound.matches(ancestor) {
                pending.next();
            }
            current = ancestor.parent_id;
        }
        true
    }

    /// Descendants of `context` that match, in document order (`querySelectorAll`)
    pub fn select_all(&self, arena: &DomArena, context: NodeId) -> Result<Vec<NodeId>> {
        Ok(arena
            .descendants(context)?
            .into_iter()
            .filter(|&id| self.matches(arena, id))
            .collect())
    }
}

fn parse_compound(part: &str) -> std::result::Result<Compound, String> {
    let mut compound = Compound::default();
    let mut rest = part;

    let tag_end = rest.find(['#', '.', '[']).unwrap_or(rest.len());
    let tag = &rest[..tag_end];
    if !tag.is_empty() && tag != "*" {
        if !tag.chars().all(is_name_char) {
            return Err(format!("invalid tag name '{tag}'"));
        }
        compound.tag = Some(tag.to_string());
    }
    rest = &rest[tag_end..];

    while let Some(marker) = rest.chars().next() {
        rest = &rest[marker.len_utf8()..];
        match marker {
            '#' | '.' => {
                let end = rest.find(['#', '.', '[']).unwrap_or(rest.len());
                let name = &rest[..end];
                if name.is_empty() || !name.chars().all(is_name_char) {
                    return Err(format!("invalid name after '{marker}'"));
                }
                compound.conditions.push(if marker == '#' {
                    Condition::Id(name.to_string())
                } else {
                    Condition::Class(name.to_string())
                });
                rest = &rest[end..];
            }
            '[' => {
                let end = rest.find(']').ok_or("unterminated attribute selector")?;
                let body = &rest[..end];
                let (name, value) = match body.split_once('=') {
                    Some((name, value)) => (
                        name,
                        Some(value.trim_matches(|c| c == '"' || c == '\'').to_string()),
                    ),
                    None => (body, None),
                };
                if name.is_empty() {
                    return Err("empty attribute name".to_string());
                }
                compound.conditions.push(Condition::Attr {
                    name: name.to_string(),
                    value,
                });
                rest = &rest[end + 1..];
            }
            other => return Err(format!("unexpected '{other}'")),
        }
    }

    Ok(compound)
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == ':'
}
