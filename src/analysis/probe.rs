//! Shallow-clone branch probe against one upstream repository.
//!
//! Each probe gets a private temporary directory, runs a blob-less
//! no-checkout clone of the repository, then asks git which remote
//! branches contain the pinned commit. The two git invocations sit behind
//! the [`GitCli`] trait so the orchestration is testable without a git
//! binary on the path.

use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, warn};

/// Failure of one probe. Recorded per module, never propagated across the
/// batch.
#[derive(Debug, Error)]
pub enum ProbeError {
    /// The private working directory could not be created.
    #[error("failed to create working directory: {0}")]
    Workdir(#[source] std::io::Error),
    /// The git binary could not be started.
    #[error("failed to run git {op}: {source}")]
    Spawn {
        /// Which git operation was being started.
        op: &'static str,
        /// The underlying spawn failure.
        #[source]
        source: std::io::Error,
    },
    /// git ran and exited unsuccessfully.
    #[error("git {op} failed ({status}): {stderr}")]
    Failed {
        /// Which git operation failed.
        op: &'static str,
        /// The child's exit status.
        status: std::process::ExitStatus,
        /// Captured stderr, trimmed.
        stderr: String,
    },
    /// The run deadline fired while this probe was still in flight.
    #[error("probe aborted: deadline exceeded")]
    Cancelled,
}

impl ProbeError {
    /// Whether this failure came from the run deadline rather than git.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// The two git operations a probe needs, as a narrow capability.
#[async_trait]
pub trait GitCli: Send + Sync {
    /// Clones `repo_url` into `workdir` without blobs or a checkout.
    async fn clone_no_checkout(&self, repo_url: &str, workdir: &Path) -> Result<(), ProbeError>;

    /// Returns the raw `git branch -r --contains` output for `commit_ref`
    /// inside a previously cloned `workdir`.
    async fn branches_containing(
        &self,
        workdir: &Path,
        commit_ref: &str,
    ) -> Result<String, ProbeError>;
}

/// [`GitCli`] backed by the real `git` binary.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemGitCli;

impl SystemGitCli {
    /// Creates the system git capability.
    pub fn new() -> Self {
        Self
    }

    async fn run_git(
        &self,
        op: &'static str,
        workdir: &Path,
        args: &[&str],
    ) -> Result<String, ProbeError> {
        debug!(workdir = %workdir.display(), "executing \"git {}\"", args.join(" "));

        let mut cmd = tokio::process::Command::new("git");
        cmd.args(args)
            .current_dir(workdir)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .env_clear()
            // Fail fast on missing credentials instead of hanging on a prompt.
            .env("GIT_TERMINAL_PROMPT", "false");

        // The environment is rebuilt from scratch; only the outbound proxy
        // settings and what git needs to run are passed through.
        for key in ["PATH", "HOME", "https_proxy", "http_proxy", "all_proxy"] {
            if let Ok(value) = std::env::var(key) {
                cmd.env(key, value);
            }
        }

        let output = cmd
            .output()
            .await
            .map_err(|source| ProbeError::Spawn { op, source })?;

        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        if !output.status.success() {
            return Err(ProbeError::Failed {
                op,
                status: output.status,
                stderr,
            });
        }
        if !stderr.is_empty() {
            debug!("git {op}: {stderr}");
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl GitCli for SystemGitCli {
    async fn clone_no_checkout(&self, repo_url: &str, workdir: &Path) -> Result<(), ProbeError> {
        self.run_git(
            "clone",
            workdir,
            &["clone", "--filter=blob:none", "--no-checkout", repo_url, "./"],
        )
        .await?;
        Ok(())
    }

    async fn branches_containing(
        &self,
        workdir: &Path,
        commit_ref: &str,
    ) -> Result<String, ProbeError> {
        self.run_git(
            "branch --contains",
            workdir,
            &["branch", "-q", "-r", "--contains", commit_ref],
        )
        .await
    }
}

/// Resolves which remote branches contain a commit, one cold clone per call.
pub struct BranchProbe<C> {
    git: C,
}

impl<C: GitCli> BranchProbe<C> {
    /// Wraps a git capability.
    pub fn new(git: C) -> Self {
        Self { git }
    }

    /// Clones `repo_url` into a fresh temporary directory and returns the
    /// remote branches containing `commit_ref`, in git's own order.
    ///
    /// On success the working directory is removed; on failure it is kept
    /// for post-mortem inspection and its path logged.
    pub async fn probe(&self, repo_url: &str, commit_ref: &str) -> Result<Vec<String>, ProbeError> {
        let workdir = tempfile::Builder::new()
            .prefix(&workdir_prefix(repo_url))
            .tempdir()
            .map_err(ProbeError::Workdir)?;

        match self.probe_in(workdir.path(), repo_url, commit_ref).await {
            Ok(branches) => Ok(branches),
            Err(err) => {
                let kept = workdir.keep();
                warn!(
                    workdir = %kept.display(),
                    "probe failed, keeping working directory"
                );
                Err(err)
            }
        }
    }

    async fn probe_in(
        &self,
        workdir: &Path,
        repo_url: &str,
        commit_ref: &str,
    ) -> Result<Vec<String>, ProbeError> {
        self.git.clone_no_checkout(repo_url, workdir).await?;
        let stdout = self.git.branches_containing(workdir, commit_ref).await?;
        Ok(parse_branch_output(&stdout))
    }
}

/// Derives a filesystem-safe temp-directory prefix from a repository URL.
fn workdir_prefix(repo_url: &str) -> String {
    repo_url
        .trim_start_matches("https://")
        .trim_start_matches("http://")
        .replace([':', '/'], "-")
}

/// Normalizes `git branch -r --contains` output into branch names:
/// lines trimmed, the symbolic `origin/HEAD` marker dropped, the `origin/`
/// remote prefix stripped, empty lines discarded.
fn parse_branch_output(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with("origin/HEAD"))
        .map(|line| line.strip_prefix("origin/").unwrap_or(line).to_string())
        .collect()
}
