//! DOM Serializer - Convert an arena (sub)tree back to markup

use quick_xml::escape::escape;

use crate::arena::DomArena;
use crate::error::Result;
use crate::types::*;

/// Serialize the whole document
pub fn serialize(arena: &DomArena) -> Result<String> {
    let mut output = String::with_capacity(4096);
    if let Some(root_id) = arena.root_id() {
        serialize_node(arena, root_id, &mut output)?;
    }
    Ok(output)
}

/// Serialize one node and everything below it
pub fn serialize_node(arena: &DomArena, node_id: NodeId, output: &mut String) -> Result<()> {
    let node = arena.get(node_id)?;

    match node.node_type {
        NodeType::Element => {
            output.push('<');
            output.push_str(&node.node_name);
            for (name, value) in &node.attributes {
                output.push(' ');
                output.push_str(name);
                output.push_str("=\"");
                output.push_str(&escape(value));
                output.push('"');
            }

            if node.children_ids.is_empty() {
                output.push_str("/>");
                return Ok(());
            }

            output.push('>');
            for &child_id in &node.children_ids {
                serialize_node(arena, child_id, output)?;
            }
            output.push_str("</");
            output.push_str(&node.node_name);
            output.push('>');
        }
        NodeType::Text => output.push_str(&escape(&node.node_value)),
        NodeType::CdataSection => {
            output.push_str("<![CDATA[");
            output.push_str(&node.node_value);
            output.push_str("]]>");
        }
        NodeType::Comment => {
            output.push_str("<!--");
            output.push_str(&node.node_value);
            output.push_str("-->");
        }
        NodeType::Document => {
            // For document nodes, just serialize children
            for &child_id in &node.children_ids {
                serialize_node(arena, child_id, output)?;
            }
        }
    }

    Ok(())
}
