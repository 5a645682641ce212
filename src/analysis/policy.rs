//! Exclusion-pattern policy over analysis results.
//!
//! The pattern names the branches considered compliant (historically
//! "excluded" from the violation report, hence the name). A module passes
//! when at least one branch containing its pinned commit matches the
//! pattern.

use regex::Regex;
use thiserror::Error;

use crate::analysis::ModuleAnalysis;

/// An exclusion pattern that does not compile.
#[derive(Debug, Error)]
#[error("invalid branch exclusion pattern '{pattern}': {source}")]
pub struct PatternError {
    pattern: String,
    #[source]
    source: regex::Error,
}

/// Compiled branch-exclusion policy. Stateless after construction.
#[derive(Debug)]
pub struct BranchPolicy {
    // None when no pattern is configured: everything complies.
    regex: Option<Regex>,
}

impl BranchPolicy {
    /// Compiles `pattern`, anchored to the full branch name; the author
    /// does not need to write `^` or `$` themselves. An empty pattern
    /// configures no exclusions and everything complies.
    pub fn new(pattern: &str) -> Result<Self, PatternError> {
        if pattern.is_empty() {
            return Ok(Self { regex: None });
        }

        let regex = Regex::new(&anchor_pattern(pattern)).map_err(|source| PatternError {
            pattern: pattern.to_string(),
            source,
        })?;
        Ok(Self { regex: Some(regex) })
    }

    /// Whether the module complies with the policy: trivially true with no
    /// pattern configured, otherwise true when any resolved branch matches.
    ///
    /// A module whose probe failed has an empty branch list and therefore
    /// never complies with a configured pattern; its `error` field tells
    /// "bad branch" apart from "could not be determined" downstream.
    pub fn matches(&self, analysis: &ModuleAnalysis) -> bool {
        match &self.regex {
            None => true,
            Some(regex) => analysis.branches.iter().any(|branch| regex.is_match(branch)),
        }
    }

    /// Keeps only the modules that do not comply: the CI-actionable set.
    pub fn filter_violations(&self, results: Vec<ModuleAnalysis>) -> Vec<ModuleAnalysis> {
        results
            .into_iter()
            .filter(|result| !self.matches(result))
            .collect()
    }
}

/// Anchors a user-supplied pattern to the full string, adding `^` and `$`
/// only when absent.
pub(crate) fn anchor_pattern(pattern: &str) -> String {
    let mut anchored = String::with_capacity(pattern.len() + 2);
    if !pattern.starts_with('^') {
        anchored.push('^');
    }
    anchored.push_str(pattern);
    if !pattern.ends_with('$') {
        anchored.push('$');
    }
    anchored
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::analysis::ProbeError;
    use crate::manifest::{ModuleRequire, SourceSpan};

    fn analysis(branches: &[&str]) -> ModuleAnalysis {
        ModuleAnalysis {
            require: ModuleRequire {
                path: "git.example.com/demo/demo".to_string(),
                version: "v1.0.0-20201130134442-10cb98267c6c".to_string(),
                indirect: false,
                span: SourceSpan::default(),
            },
            branches: branches.iter().map(ToString::to_string).collect(),
            error: None,
        }
    }

    #[test]
    fn anchors_are_added_only_when_missing() {
        assert_eq!(anchor_pattern("main"), "^main$");
        assert_eq!(anchor_pattern("^main"), "^main$");
        assert_eq!(anchor_pattern("main$"), "^main$");
        assert_eq!(anchor_pattern("(^main$|^release-.*$)"), "^(^main$|^release-.*$)$");
    }

    #[test]
    fn unanchored_pattern_behaves_anchored() {
        let policy = BranchPolicy::new("main").unwrap();
        assert!(policy.matches(&analysis(&["main"])));
        assert!(!policy.matches(&analysis(&["mainline"])));
        assert!(!policy.matches(&analysis(&["not-main"])));
    }

    #[test]
    fn empty_pattern_matches_everything() {
        let policy = BranchPolicy::new("").unwrap();
        assert!(policy.matches(&analysis(&["feat/x"])));
        assert!(policy.matches(&analysis(&[])));
        assert!(policy.filter_violations(vec![analysis(&[])]).is_empty());
    }

    #[test]
    fn any_compliant_branch_is_enough() {
        let policy = BranchPolicy::new("(^main$|^release-.*$)").unwrap();
        assert!(policy.matches(&analysis(&["main", "feat/x"])));
        assert!(policy.matches(&analysis(&["feat/x", "release-1.2"])));
        assert!(!policy.matches(&analysis(&["feat/test1", "feat/test2"])));
    }

    #[test]
    fn filter_keeps_only_violations() {
        let policy = BranchPolicy::new("(^main$|^release-.*$)").unwrap();
        let results = vec![
            analysis(&["feat/test1", "main"]),
            analysis(&["main"]),
            analysis(&["feat/test1", "feat/test2"]),
        ];

        let violations = policy.filter_violations(results);

        assert_eq!(violations.len(), 1);
        assert_eq!(
            violations[0].branches,
            vec!["feat/test1".to_string(), "feat/test2".to_string()]
        );
    }

    #[test]
    fn filter_is_idempotent() {
        let policy = BranchPolicy::new("main").unwrap();
        let results = vec![analysis(&["feat/a"]), analysis(&["feat/b"])];

        let once = policy.filter_violations(results);
        let branches: Vec<_> = once.iter().map(|r| r.branches.clone()).collect();
        let twice = policy.filter_violations(once);

        assert_eq!(twice.len(), 2);
        let again: Vec<_> = twice.iter().map(|r| r.branches.clone()).collect();
        assert_eq!(branches, again);
    }

    #[test]
    fn failed_probe_is_always_a_violation_under_a_pattern() {
        let policy = BranchPolicy::new("(^main$|^release-.*$)").unwrap();
        let mut failed = analysis(&[]);
        failed.error = Some(ProbeError::Cancelled);

        assert!(!policy.matches(&failed));
        let violations = policy.filter_violations(vec![failed]);
        assert_eq!(violations.len(), 1);
        assert!(violations[0].error.is_some());
    }

    #[test]
    fn invalid_pattern_is_a_hard_error() {
        let err = BranchPolicy::new("(").unwrap_err();
        assert!(err.to_string().contains("invalid branch exclusion pattern"));
    }
}
