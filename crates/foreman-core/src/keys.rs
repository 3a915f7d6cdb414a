//! Issue-key extraction from free text.
//!
//! Commit messages, PR titles, and branch names carry tracker keys like
//! `FOAM-12`. The heuristics in the stale-ticket check link entities to
//! tickets by scanning for these keys.

use regex::Regex;
use std::sync::OnceLock;

static KEY_RE: OnceLock<Regex> = OnceLock::new();

fn key_re() -> &'static Regex {
    KEY_RE.get_or_init(|| {
        Regex::new(r"\b[A-Z][A-Z0-9]+-\d+\b").expect("issue-key regex is valid")
    })
}

/// All distinct issue keys in `text`, in order of first appearance.
pub fn extract_keys(text: &str) -> Vec<String> {
    let mut keys = Vec::new();
    for m in key_re().find_iter(text) {
        let key = m.as_str().to_string();
        if !keys.contains(&key) {
            keys.push(key);
        }
    }
    keys
}

/// The first issue key in `text`, if any.
pub fn first_key(text: &str) -> Option<String> {
    key_re().find(text).map(|m| m.as_str().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_single_key() {
        assert_eq!(first_key("FOAM-12: fix login"), Some("FOAM-12".to_string()));
    }

    #[test]
    fn extracts_key_from_branch_name() {
        // Word boundaries treat '/' and '-' edges correctly
        assert_eq!(
            first_key("feature/FOAM-128-retry-logic"),
            Some("FOAM-128".to_string())
        );
    }

    #[test]
    fn dedups_repeated_keys_preserving_order() {
        let keys = extract_keys("FOAM-1 relates to ENG-2, see FOAM-1");
        assert_eq!(keys, vec!["FOAM-1".to_string(), "ENG-2".to_string()]);
    }

    #[test]
    fn ignores_lowercase_and_bare_numbers() {
        assert!(first_key("foam-12 fix issue 12").is_none());
    }

    #[test]
    fn no_key_returns_empty() {
        assert!(extract_keys("chore: bump deps").is_empty());
        assert!(first_key("").is_none());
    }
}
