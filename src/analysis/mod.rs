//! Branch-containment analysis of manifest dependencies.
//!
//! The pipeline: [`analyzer::analyze`] fans the selected requires out to a
//! [`probe::BranchProbe`] under bounded concurrency, producing one
//! [`ModuleAnalysis`] per input; [`policy::BranchPolicy`] then reduces the
//! aggregate to the modules violating the configured branch policy.

pub mod analyzer;
pub mod policy;
pub mod probe;

pub use analyzer::{analyze, AnalyzeOptions, DEFAULT_CONCURRENCY};
pub use policy::BranchPolicy;
pub use probe::{BranchProbe, GitCli, ProbeError, SystemGitCli};

use serde::{Serialize, Serializer};

use crate::manifest::ModuleRequire;

/// The branch-containment outcome for one required module.
///
/// `branches` empty with `error` set means the probe failed, which is not
/// the same thing as the commit being on no branch; downstream consumers
/// must keep the two apart.
#[derive(Serialize, Debug)]
pub struct ModuleAnalysis {
    /// The require directive this analysis belongs to.
    #[serde(flatten)]
    pub require: ModuleRequire,
    /// Remote branches containing the pinned commit, in the order git
    /// reported them.
    pub branches: Vec<String>,
    /// Why the probe failed, when it did.
    #[serde(serialize_with = "error_as_message", skip_serializing_if = "Option::is_none")]
    pub error: Option<ProbeError>,
}

fn error_as_message<S: Serializer>(
    error: &Option<ProbeError>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match error {
        Some(err) => serializer.serialize_str(&err.to_string()),
        None => serializer.serialize_none(),
    }
}

/// Reduces a pseudo-version to the commit it pins.
///
/// Pseudo-versions have the shape `vX.Y.Z-yyyymmddhhmmss-<commit>`, three
/// hyphen-delimited segments; anything else (a tagged release, a
/// `+incompatible` suffix, a hand-written ref) is passed through unchanged
/// and left for git to resolve.
pub fn commit_ref(version: &str) -> &str {
    let segments: Vec<&str> = version.split('-').collect();
    if segments.len() == 3 {
        segments[2]
    } else {
        version
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pseudo_version_reduces_to_commit() {
        assert_eq!(commit_ref("v1.0.0-20230101000000-deadbeef"), "deadbeef");
        assert_eq!(
            commit_ref("v0.0.0-20201130134442-10cb98267c6c"),
            "10cb98267c6c"
        );
    }

    #[test]
    fn other_version_shapes_pass_through() {
        assert_eq!(commit_ref("v1.7.0"), "v1.7.0");
        assert_eq!(commit_ref("v1.0.0-rc1"), "v1.0.0-rc1");
        assert_eq!(
            commit_ref("v1.0.0-rc1-beta-20230101000000-deadbeef"),
            "v1.0.0-rc1-beta-20230101000000-deadbeef"
        );
    }
}
