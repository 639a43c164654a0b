//! Capability gate: does this host need external references resolved?

use regex::Regex;

/// True when any of `agents` matches `user_agent`. Invalid patterns are skipped.
pub fn detect(agents: &[String], user_agent: &str) -> bool {
    agents.iter().any(|pattern| match Regex::new(pattern) {
        Ok(re) => re.is_match(user_agent),
        Err(e) => {
            tracing::warn!("Ignoring invalid agent pattern '{}': {}", pattern, e);
            false
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::Options;

    #[test]
    fn test_default_agents() {
        let agents = Options::default().agents;
        assert!(detect(&agents, "Mozilla/5.0 (Windows NT 10.0; Trident/7.0; rv:11.0)"));
        assert!(detect(&agents, "Mozilla/5.0 ... Edge/12.10240"));
        assert!(detect(&agents, "Mozilla/5.0 (Linux; U; Android 8.1) UCBrowser/11.4"));
        assert!(!detect(&agents, "Mozilla/5.0 (X11; Linux x86_64) Firefox/121.0"));
    }

    #[test]
    fn test_invalid_pattern_is_ignored() {
        let agents = vec!["(unclosed".to_string(), "custom".to_string()];
        assert!(detect(&agents, "custom-agent"));
        assert!(!detect(&agents[..1], "(unclosed"));
    }
}
