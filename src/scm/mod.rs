//! Review-comment sinks for git hosting services.
//!
//! A sink replaces the comments this tool posted on an earlier run of the
//! same pull request: old comments are found by an HTML marker embedded in
//! every body, deleted, and the fresh set is posted anchored to the
//! current commit. The core analysis only hands a comment list across this
//! seam; everything HTTP lives behind it.

pub mod github;
pub mod gitlab;

pub use github::GithubSink;
pub use gitlab::GitlabSink;

use anyhow::Result;
use async_trait::async_trait;

/// One line-anchored review comment to post.
#[derive(Clone, Debug)]
pub struct ReviewComment {
    /// Comment body, without the marker.
    pub body: String,
    /// Repository-relative file path.
    pub path: String,
    /// 1-based line in the new side of the diff.
    pub line: usize,
}

impl ReviewComment {
    /// The body as posted, with the identifying marker prepended.
    pub fn marked_body(&self, comment_by: &str) -> String {
        format!("<!-- {} -->\n{}", comment_by, self.body)
    }
}

/// What one refresh run posts and how its comments are identified.
#[derive(Clone, Debug)]
pub struct RefreshOptions {
    /// Identity embedded in the marker, e.g. the tool name.
    pub comment_by: String,
    /// Commit the comments anchor to.
    pub commit_id: String,
    /// The comments to post.
    pub comments: Vec<ReviewComment>,
}

impl RefreshOptions {
    /// The HTML marker that identifies this tool's comments.
    pub fn marker(&self) -> String {
        format!("<!-- {} -->", self.comment_by)
    }
}

/// Posts review comments onto a pull/merge request, replacing the ones
/// from earlier runs.
#[async_trait]
pub trait ReviewCommentSink: Send + Sync {
    /// Deletes this tool's previous comments on `pr_id` of `repo`, then
    /// posts `opts.comments`.
    async fn refresh_review_comments(
        &self,
        repo: &str,
        pr_id: u64,
        opts: RefreshOptions,
    ) -> Result<()>;
}

/// Builds a sink for `server_type` (`github` or `gitlab`).
pub fn new_sink(
    server_type: &str,
    base_url: &str,
    token: &str,
) -> Result<Box<dyn ReviewCommentSink>> {
    match server_type {
        "github" => Ok(Box::new(GithubSink::new(token))),
        "gitlab" => Ok(Box::new(GitlabSink::new(base_url, token))),
        other => anyhow::bail!("unknown server type: {other}"),
    }
}
