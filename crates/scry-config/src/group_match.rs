//! Whitelist/blacklist path filtering.

use regex::Regex;

/// Compiled whitelist/blacklist regex groups.
///
/// A value matches when it hits the whitelist (or the whitelist is empty)
/// and misses the blacklist. Invalid patterns are dropped with a warning
/// rather than rejecting the whole configuration.
#[derive(Debug, Default)]
pub struct GroupMatch {
    whitelist: Vec<Regex>,
    blacklist: Vec<Regex>,
}

impl GroupMatch {
    pub fn new(whitelist: &[String], blacklist: &[String]) -> GroupMatch {
        GroupMatch {
            whitelist: compile(whitelist),
            blacklist: compile(blacklist),
        }
    }

    pub fn matches(&self, value: &str) -> bool {
        if !self.whitelist.is_empty() && !self.whitelist.iter().any(|re| re.is_match(value)) {
            return false;
        }
        !self.blacklist.iter().any(|re| re.is_match(value))
    }
}

fn compile(patterns: &[String]) -> Vec<Regex> {
    patterns
        .iter()
        .filter_map(|pattern| match Regex::new(pattern) {
            Ok(re) => Some(re),
            Err(err) => {
                tracing::warn!(
                    target: "scry.config",
                    pattern,
                    error = %err,
                    "ignoring invalid filter pattern"
                );
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn empty_groups_match_everything() {
        let group = GroupMatch::new(&[], &[]);
        assert!(group.matches("/any/path.cc"));
    }

    #[test]
    fn blacklist_wins() {
        let group = GroupMatch::new(&[], &strings(&["third_party/.*"]));
        assert!(group.matches("/src/a.cc"));
        assert!(!group.matches("third_party/lib/a.cc"));
    }

    #[test]
    fn whitelist_restricts() {
        let group = GroupMatch::new(&strings(&["src/.*"]), &strings(&["src/gen/.*"]));
        assert!(group.matches("src/a.cc"));
        assert!(!group.matches("docs/a.md"));
        assert!(!group.matches("src/gen/a.cc"));
    }

    #[test]
    fn invalid_patterns_are_skipped() {
        let group = GroupMatch::new(&strings(&["["]), &[]);
        assert!(group.matches("anything"));
    }
}
