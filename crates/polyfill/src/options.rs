//! Resolver configuration
//!
//! Every field has a default; a partial JSON object merges over them.

use std::time::Duration;

use dom::{NodeId, Selector};
use serde::{Deserialize, Serialize};

use crate::error::{PolyfillError, Result};

pub const DEFAULT_NAMESPACE: &str = "external-svg-polyfill";
pub const DEFAULT_SELECTOR: &str = "svg use";

/// Which elements a scan considers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Target {
    Selector(String),
    Elements(Vec<NodeId>),
}

impl Default for Target {
    fn default() -> Self {
        Target::Selector(DEFAULT_SELECTOR.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Options {
    pub target: Target,
    /// Scan subtree root; body or document element when unset
    pub context: Option<NodeId>,
    /// Injection root; body or document element when unset
    pub root: Option<NodeId>,
    pub run: bool,
    pub prefix: bool,
    pub detect: bool,
    pub observe: bool,
    /// Only resolve references to a different origin
    pub crossdomain: bool,
    pub namespace: String,
    pub agents: Vec<String>,
    pub frame_interval_ms: u64,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            target: Target::default(),
            context: None,
            root: None,
            run: true,
            prefix: true,
            detect: true,
            observe: true,
            crossdomain: false,
            namespace: DEFAULT_NAMESPACE.to_string(),
            agents: vec![
                "(?i)msie|trident".to_string(),
                "(?i)edge/12".to_string(),
                "(?i)ucbrowser/11".to_string(),
            ],
            frame_interval_ms: 16,
        }
    }
}

impl Options {
    /// Merge a (possibly partial) JSON object over the defaults
    pub fn from_json(json: &str) -> Result<Self> {
        let options: Options = serde_json::from_str(json)?;
        options.validate()?;
        Ok(options)
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.namespace.is_empty() {
            return Err(PolyfillError::InvalidOption(
                "namespace must not be empty".to_string(),
            ));
        }
        if self.frame_interval_ms == 0 {
            return Err(PolyfillError::InvalidOption(
                "frame_interval_ms must be positive".to_string(),
            ));
        }
        if let Target::Selector(selector) = &self.target {
            Selector::parse(selector)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_merges_over_defaults() {
        let options = Options::from_json(r#"{"observe": false, "namespace": "sprites"}"#).unwrap();
        assert!(!options.observe);
        assert_eq!(options.namespace, "sprites");
        assert!(options.run);
        assert!(options.prefix);
        assert_eq!(options.target, Target::Selector("svg use".to_string()));
        assert_eq!(options.frame_interval(), Duration::from_millis(16));
    }

    #[test]
    fn test_target_accepts_selector_or_elements() {
        let options = Options::from_json(r#"{"target": "use.icon"}"#).unwrap();
        assert_eq!(options.target, Target::Selector("use.icon".to_string()));

        let options = Options::from_json(r#"{"target": [4, 7]}"#).unwrap();
        assert_eq!(options.target, Target::Elements(vec![4, 7]));
    }

    #[test]
    fn test_invalid_options_are_rejected() {
        assert!(matches!(
            Options::from_json(r#"{"namespace": ""}"#),
            Err(PolyfillError::InvalidOption(_))
        ));
        assert!(matches!(
            Options::from_json(r#"{"frame_interval_ms": 0}"#),
            Err(PolyfillError::InvalidOption(_))
        ));
        assert!(matches!(
            Options::from_json(r#"{"target": "svg > use"}"#),
            Err(PolyfillError::Dom(_))
        ));
        assert!(matches!(
            Options::from_json(r#"{"target": "use[href]é"}"#),
            Err(PolyfillError::Dom(_))
        ));
        assert!(matches!(
            Options::from_json("{not json"),
            Err(PolyfillError::Json(_))
        ));
    }
}
