//! Collision-free identifiers for merged documents
//!
//! Every identifier of a loaded file is prefixed with a token derived from the
//! file's path, so two files that both declare `id="star"` land in the host as
//! `a-star` and `b-star`. The derivation is a pure function of
//! `(fragment, address)`, which makes rewriting idempotent across scans.

use std::sync::LazyLock;

use ahash::AHashMap;
use dom::{DomArena, NodeId};
use regex::{Captures, Regex};
use url::Url;

use crate::address::FRAGMENT_DELIMITER;
use crate::attribute::ReferenceAttribute;

const FORMAT_SUFFIX: &str = ".svg";
const SEPARATOR: char = '-';

/// `url(#id)` functional values, optionally quoted
static URL_REFERENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"url\(\s*(['"]?)#([^'")\s]+)['"]?\s*\)"#).expect("static regex")
});

/// Path component of `address` reduced to an identifier-safe prefix.
///
/// `/icons/a.svg` → `icons-a`
pub fn path_prefix(address: &Url) -> String {
    let path = address.path();
    let path = path.strip_prefix('/').unwrap_or(path);
    let path = path.strip_suffix(FORMAT_SUFFIX).unwrap_or(path);
    path.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { SEPARATOR })
        .collect()
}

/// Local identifier for `fragment` from the document at `address`
pub fn derive_identifier(fragment: &str, address: &Url) -> String {
    format!(
        "{}{}{}",
        path_prefix(address),
        SEPARATOR,
        strip_delimiter(fragment)
    )
}

/// Drop the first fragment delimiter, wherever it is
pub fn strip_delimiter(fragment: &str) -> String {
    fragment.replacen(FRAGMENT_DELIMITER, "", 1)
}

/// Rewrite every identifier declared in `doc` and every same-document
/// reference to those identifiers. Returns the old → new mapping.
///
/// Declarations are collected in a first pass so that references appearing
/// before their target in document order are fixed up too.
pub fn rewrite_document(doc: &mut DomArena, address: &Url) -> AHashMap<String, String> {
    let Some(root) = doc.root_id() else {
        return AHashMap::new();
    };
    let Ok(nodes) = doc.descendants(root) else {
        return AHashMap::new();
    };

    let mut mapping = AHashMap::new();
    for &node_id in &nodes {
        let Some(old) = declared_id(doc, node_id) else {
            continue;
        };
        let new = derive_identifier(&old, address);
        if doc.set_attribute(node_id, "id", new.as_str()).is_ok() {
            mapping.insert(old, new);
        }
    }

    if mapping.is_empty() {
        return mapping;
    }

    for &node_id in &nodes {
        let updates: Vec<(String, String)> = match doc.get(node_id) {
            Ok(node) if node.is_element() => node
                .attributes
                .iter()
                .filter_map(|(name, value)| {
                    rewrite_value(name, value, &mapping).map(|v| (name.clone(), v))
                })
                .collect(),
            _ => continue,
        };
        for (name, value) in updates {
            if let Err(e) = doc.set_attribute(node_id, &name, value) {
                tracing::warn!("Failed to rewrite '{}' on node {}: {}", name, node_id, e);
            }
        }
    }

    mapping
}

fn declared_id(doc: &DomArena, node_id: NodeId) -> Option<String> {
    let node = doc.get(node_id).ok()?;
    match node.attr("id") {
        Some(id) if node.is_element() && !id.is_empty() => Some(id.to_string()),
        _ => None,
    }
}

/// New value for one attribute, or `None` when nothing in it points at a renamed id
fn rewrite_value(name: &str, value: &str, mapping: &AHashMap<String, String>) -> Option<String> {
    if name == "id" {
        return None;
    }

    if ReferenceAttribute::from_name(name).is_some() {
        let target = value.strip_prefix(FRAGMENT_DELIMITER)?;
        return mapping.get(target).map(|new| format!("#{new}"));
    }

    if !value.contains("url(") {
        return None;
    }
    let mut changed = false;
    let rewritten = URL_REFERENCE.replace_all(value, |caps: &Captures<'_>| {
        match mapping.get(&caps[2]) {
            Some(new) => {
                changed = true;
                format!("url({}#{}{})", &caps[1], new, &caps[1])
            }
            None => caps[0].to_string(),
        }
    });
    changed.then(|| rewritten.into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_derive_identifier() {
        let a = url("http://localhost/a.svg");
        assert_eq!(derive_identifier("star", &a), "a-star");
        assert_eq!(derive_identifier("#star", &a), "a-star");
        assert_eq!(
            derive_identifier("star", &url("http://localhost/static/icons.v2.svg")),
            "static-icons-v2-star"
        );
    }

    #[test]
    fn test_derive_identifier_is_deterministic_and_collision_free() {
        let a = url("http://localhost/a.svg");
        let b = url("http://localhost/b.svg");
        assert_eq!(derive_identifier("star", &a), derive_identifier("star", &a));
        assert_ne!(derive_identifier("star", &a), derive_identifier("star", &b));
    }

    #[test]
    fn test_rewrite_document_fixes_forward_and_backward_references() {
        let mut doc = dom::parse(
            r##"<svg>
                <path id="early" fill="url(#grad)"/>
                <linearGradient id="grad"/>
                <use href="#early"/>
                <rect style="fill: url('#grad'); stroke: url(#other)"/>
                <g/>
            </svg>"##,
        )
        .unwrap();

        let mapping = rewrite_document(&mut doc, &url("http://localhost/a.svg"));
        assert_eq!(mapping.len(), 2);
        assert_eq!(mapping.get("grad").map(String::as_str), Some("a-grad"));

        let early = doc.find_by_id("a-early").unwrap();
        assert_eq!(doc.get(early).unwrap().attr("fill"), Some("url(#a-grad)"));
        assert!(doc.find_by_id("a-grad").is_some());

        let use_el = doc.find_by_tag("use")[0];
        assert_eq!(doc.get(use_el).unwrap().attr("href"), Some("#a-early"));

        let rect = doc.find_by_tag("rect")[0];
        assert_eq!(
            doc.get(rect).unwrap().attr("style"),
            Some("fill: url('#a-grad'); stroke: url(#other)")
        );
    }

    #[test]
    fn test_document_without_identifiers_is_untouched() {
        let mut doc = dom::parse(r#"<svg><g id=""/><path d="M0 0"/></svg>"#).unwrap();
        let before = dom::serializer::serialize(&doc).unwrap();
        assert!(rewrite_document(&mut doc, &url("http://localhost/a.svg")).is_empty());
        assert_eq!(dom::serializer::serialize(&doc).unwrap(), before);
    }
}
