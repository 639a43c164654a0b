//! The reference-carrying attribute of a `<use>`-like element
//!
//! An element may carry the legacy namespaced form, the plain form, or both.
//! Reads prefer the plain form; writes go to every form that is present.

use dom::{DomArena, NodeId, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReferenceAttribute {
    Plain,
    XlinkNamespaced,
}

impl ReferenceAttribute {
    /// In read-precedence order
    pub const ALL: [ReferenceAttribute; 2] = [Self::Plain, Self::XlinkNamespaced];

    pub fn name(self) -> &'static str {
        match self {
            Self::Plain => "href",
            Self::XlinkNamespaced => "xlink:href",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|attr| attr.name() == name)
    }

    /// The element's reference: first non-empty value in precedence order
    pub fn read(doc: &DomArena, element: NodeId) -> Result<Option<String>> {
        let node = doc.get(element)?;
        Ok(Self::ALL
            .iter()
            .filter_map(|attr| node.attr(attr.name()))
            .find(|value| !value.is_empty())
            .map(str::to_string))
    }

    /// Overwrite every present form with `value`; returns how many were written
    pub fn write(doc: &mut DomArena, element: NodeId, value: &str) -> Result<usize> {
        let present: Vec<_> = {
            let node = doc.get(element)?;
            Self::ALL
                .into_iter()
                .filter(|attr| node.has_attr(attr.name()))
                .collect()
        };
        for attr in &present {
            doc.set_attribute(element, attr.name(), value)?;
        }
        Ok(present.len())
    }

    /// Every present form with its value, in precedence order
    pub fn snapshot(doc: &DomArena, element: NodeId) -> Result<Vec<(Self, String)>> {
        let node = doc.get(element)?;
        Ok(Self::ALL
            .into_iter()
            .filter_map(|attr| node.attr(attr.name()).map(|value| (attr, value.to_string())))
            .collect())
    }

    /// Put back the values taken by [`snapshot`](Self::snapshot), form by form
    pub fn restore(doc: &mut DomArena, element: NodeId, forms: &[(Self, String)]) -> Result<()> {
        for (attr, value) in forms {
            doc.set_attribute(element, attr.name(), value)?;
        }
        Ok(())
    }
}
