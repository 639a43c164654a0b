//! Reference parsing
//!
//! Splits a reference attribute value into the document address (the cache
//! key) and the fragment identifier, resolving relative addresses against the
//! host document's location.

use percent_encoding::percent_decode_str;
use url::{Origin, Url};

pub const FRAGMENT_DELIMITER: char = '#';

/// A parsed reference value.
///
/// `fragment` is percent-decoded, so it compares equal to the raw `id` it names.
///
/// `address` is `None` when the reference stays inside the current document,
/// is empty, or cannot be resolved. Those references are never touched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    pub address: Option<Url>,
    pub fragment: String,
}

impl Reference {
    fn local(fragment: &str) -> Self {
        Self {
            address: None,
            fragment: fragment.to_string(),
        }
    }

    pub fn is_local(&self) -> bool {
        self.address.is_none()
    }

    /// Cache key: the absolute address without fragment
    pub fn key(&self) -> Option<&str> {
        self.address.as_ref().map(Url::as_str)
    }

    pub fn origin(&self) -> Option<Origin> {
        self.address.as_ref().map(Url::origin)
    }
}

/// True for values the host already resolves on its own
pub fn is_local_value(value: &str) -> bool {
    let value = value.trim();
    value.is_empty() || value.starts_with(FRAGMENT_DELIMITER)
}

/// Parse `value` against `base`. Never fails: malformed input becomes a local reference.
pub fn resolve(value: &str, base: &Url) -> Reference {
    let value = value.trim();
    if is_local_value(value) {
        return Reference::local(value.trim_start_matches(FRAGMENT_DELIMITER));
    }

    match base.join(value) {
        Ok(mut address) => {
            let fragment = address
                .fragment()
                .map(|encoded| percent_decode_str(encoded).decode_utf8_lossy().into_owned())
                .unwrap_or_default();
            address.set_fragment(None);
            Reference {
                address: Some(address),
                fragment,
            }
        }
        Err(err) => {
            tracing::debug!("Unresolvable reference '{}': {}", value, err);
            Reference::local("")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("http://localhost/pages/index.html").unwrap()
    }

    #[test]
    fn test_relative_reference() {
        let reference = resolve("../icons/a.svg#star", &base());
        assert_eq!(reference.key(), Some("http://localhost/icons/a.svg"));
        assert_eq!(reference.fragment, "star");
        assert!(!reference.is_local());
    }

    #[test]
    fn test_same_address_different_fragment_share_key() {
        let star = resolve("a.svg#star", &base());
        let moon = resolve("/pages/a.svg#moon", &base());
        assert_eq!(star.key(), moon.key());
        assert_ne!(star.fragment, moon.fragment);
    }

    #[test]
    fn test_local_and_empty_references() {
        assert!(resolve("#star", &base()).is_local());
        assert_eq!(resolve("#star", &base()).fragment, "star");
        assert!(resolve("", &base()).is_local());
        assert!(resolve("   ", &base()).is_local());
    }

    #[test]
    fn test_malformed_reference_is_local() {
        let reference = resolve("http://[::1", &base());
        assert!(reference.is_local());
        assert_eq!(reference.fragment, "");
    }

    #[test]
    fn test_absolute_reference_keeps_origin() {
        let reference = resolve("https://cdn.example.com/sprite.svg#x", &base());
        assert_ne!(reference.origin(), Some(base().origin()));
        assert_eq!(reference.fragment, "x");
    }

    #[test]
    fn test_fragment_is_decoded() {
        assert_eq!(resolve("c.svg#étoile", &base()).fragment, "étoile");
        assert_eq!(resolve("c.svg#%C3%A9toile", &base()).fragment, "étoile");
        assert_eq!(resolve("c.svg#big star", &base()).fragment, "big star");
    }
}
