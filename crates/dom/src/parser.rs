//! Markup → arena
//!
//! Parses well-formed XML-style markup (SVG files, XHTML pages) into a
//! [`DomArena`] rooted at a `#document` node. Built on `quick-xml`'s pull
//! reader; no validation beyond well-formedness.

use quick_xml::escape::resolve_predefined_entity;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::arena::DomArena;
use crate::error::{DomError, Result};
use crate::types::{NodeId, NodeType};

/// Parse markup into a fresh arena. The mutation journal of the result is empty.
pub fn parse(markup: &str) -> Result<DomArena> {
    let mut reader = Reader::from_str(markup);
    let mut arena = DomArena::document();
    let root = arena.root_id().ok_or(DomError::NodeNotFound(0))?;
    let mut open: Vec<NodeId> = vec![root];

    loop {
        let position = reader.buffer_position() as u64;
        let event = reader.read_event().map_err(|e| DomError::ParseError {
            position: reader.error_position() as u64,
            message: e.to_string(),
        })?;
        let parent = *open.last().unwrap_or(&root);

        match event {
            Event::Start(elem) => {
                let id = create_element(&mut arena, &elem, position)?;
                arena.attach_unrecorded(parent, id)?;
                open.push(id);
            }
            Event::Empty(elem) => {
                let id = create_element(&mut arena, &elem, position)?;
                arena.attach_unrecorded(parent, id)?;
            }
            Event::End(_) => {
                if open.len() > 1 {
                    open.pop();
                }
            }
            Event::Text(text) => {
                let value = text.decode().map_err(|e| parse_error(position, e))?;
                append_text(&mut arena, parent, &value)?;
            }
            Event::GeneralRef(reference) => {
                let resolved = match reference
                    .resolve_char_ref()
                    .map_err(|e| parse_error(position, e))?
                {
                    Some(ch) => ch.to_string(),
                    None => {
                        let name = reference.decode().map_err(|e| parse_error(position, e))?;
                        match resolve_predefined_entity(&name) {
                            Some(value) => value.to_string(),
                            // Unknown entities survive verbatim
                            None => format!("&{name};"),
                        }
                    }
                };
                append_text(&mut arena, parent, &resolved)?;
            }
            Event::CData(data) => {
                let id = arena.create_node(NodeType::CdataSection, "#cdata-section");
                arena.get_mut(id)?.node_value = String::from_utf8_lossy(&data).into_owned();
                arena.attach_unrecorded(parent, id)?;
            }
            Event::Comment(comment) => {
                let id = arena.create_node(NodeType::Comment, "#comment");
                arena.get_mut(id)?.node_value = comment
                    .decode()
                    .map_err(|e| parse_error(position, e))?
                    .into_owned();
                arena.attach_unrecorded(parent, id)?;
            }
            Event::Eof => break,
            // Declarations, processing instructions and doctypes carry nothing we keep
            _ => {}
        }
    }

    if open.len() > 1 {
        let unclosed = arena.get(open[open.len() - 1])?.node_name.clone();
        return Err(DomError::ParseError {
            position: reader.buffer_position() as u64,
            message: format!("unclosed element <{unclosed}>"),
        });
    }

    Ok(arena)
}

fn create_element(arena: &mut DomArena, elem: &BytesStart<'_>, position: u64) -> Result<NodeId> {
    let name = String::from_utf8_lossy(elem.name().as_ref()).into_owned();
    let id = arena.create_element(name);
    let node = arena.get_mut(id)?;

    for attr in elem.html_attributes() {
        let attr = attr.map_err(|e| parse_error(position, e))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map_err(|e| parse_error(position, e))?
            .into_owned();
        node.set_attr(&key, value);
    }

    Ok(id)
}

/// Merge text into a trailing text sibling; whitespace-only runs between elements are dropped.
fn append_text(arena: &mut DomArena, parent: NodeId, value: &str) -> Result<()> {
    if let Some(&last) = arena.get(parent)?.children_ids.last() {
        let last = arena.get_mut(last)?;
        if last.is_text() {
            last.node_value.push_str(value);
            return Ok(());
        }
    }

    if value.trim().is_empty() {
        return Ok(());
    }

    let id = arena.create_text(value);
    arena.attach_unrecorded(parent, id)
}

fn parse_error(position: u64, err: impl std::fmt::Display) -> DomError {
    DomError::ParseError {
        position,
        message: err.to_string(),
    }
}
