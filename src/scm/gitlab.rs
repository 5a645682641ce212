//! GitLab review-comment sink, backed by the merge-request discussions
//! API.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::scm::{RefreshOptions, ReviewCommentSink};

const PAGE_SIZE: usize = 100;

#[derive(Deserialize)]
struct MergeRequest {
    diff_refs: DiffRefs,
}

#[derive(Deserialize)]
struct DiffRefs {
    base_sha: String,
    start_sha: String,
    head_sha: String,
}

#[derive(Deserialize)]
struct Discussion {
    id: String,
    notes: Vec<Note>,
}

#[derive(Deserialize)]
struct Note {
    id: u64,
    body: String,
}

#[derive(Serialize)]
struct CreateDiscussion<'a> {
    body: String,
    position: Position<'a>,
}

#[derive(Serialize)]
struct Position<'a> {
    position_type: &'static str,
    new_path: &'a str,
    new_line: usize,
    base_sha: &'a str,
    start_sha: &'a str,
    head_sha: &'a str,
}

/// Review-comment sink for GitLab.
pub struct GitlabSink {
    client: Client,
    token: String,
    base_url: String,
}

impl GitlabSink {
    /// Creates a sink against a GitLab instance, e.g.
    /// `https://gitlab.example.com`.
    pub fn new(base_url: &str, token: &str) -> Self {
        Self {
            client: Client::new(),
            token: token.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn request(&self, method: reqwest::Method, url: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, url)
            .header("PRIVATE-TOKEN", &self.token)
    }

    fn mr_url(&self, repo: &str, pr_id: u64) -> String {
        // The project is addressed by its URL-encoded full path.
        let project = repo.replace('/', "%2F");
        format!(
            "{}/api/v4/projects/{}/merge_requests/{}",
            self.base_url, project, pr_id
        )
    }

    async fn diff_refs(&self, repo: &str, pr_id: u64) -> Result<DiffRefs> {
        let response = self
            .request(reqwest::Method::GET, &self.mr_url(repo, pr_id))
            .send()
            .await
            .context("Failed to fetch merge request")?;
        let mr: MergeRequest = check(response)
            .await?
            .json()
            .await
            .context("Invalid merge request from GitLab")?;
        Ok(mr.diff_refs)
    }

    async fn list_discussions(&self, repo: &str, pr_id: u64) -> Result<Vec<Discussion>> {
        let mut discussions = Vec::new();

        for page in 1.. {
            let url = format!(
                "{}/discussions?per_page={PAGE_SIZE}&page={page}",
                self.mr_url(repo, pr_id)
            );
            let response = self
                .request(reqwest::Method::GET, &url)
                .send()
                .await
                .context("Failed to list merge request discussions")?;
            let batch: Vec<Discussion> = check(response)
                .await?
                .json()
                .await
                .context("Invalid discussion listing from GitLab")?;

            let last_page = batch.len() < PAGE_SIZE;
            discussions.extend(batch);
            if last_page {
                break;
            }
        }

        Ok(discussions)
    }
}

#[async_trait]
impl ReviewCommentSink for GitlabSink {
    async fn refresh_review_comments(
        &self,
        repo: &str,
        pr_id: u64,
        opts: RefreshOptions,
    ) -> Result<()> {
        let marker = opts.marker();

        for discussion in self.list_discussions(repo, pr_id).await? {
            for note in &discussion.notes {
                if !note.body.contains(&marker) {
                    continue;
                }
                debug!(discussion = %discussion.id, note = note.id, "deleting stale note");
                let url = format!(
                    "{}/discussions/{}/notes/{}",
                    self.mr_url(repo, pr_id),
                    discussion.id,
                    note.id
                );
                let response = self
                    .request(reqwest::Method::DELETE, &url)
                    .send()
                    .await
                    .context("Failed to delete discussion note")?;
                check(response).await?;
            }
        }

        if opts.comments.is_empty() {
            return Ok(());
        }

        // Positioned discussions need the merge request's diff refs in
        // addition to the head commit.
        let refs = self.diff_refs(repo, pr_id).await?;

        for comment in &opts.comments {
            let url = format!("{}/discussions", self.mr_url(repo, pr_id));
            let response = self
                .request(reqwest::Method::POST, &url)
                .json(&CreateDiscussion {
                    body: comment.marked_body(&opts.comment_by),
                    position: Position {
                        position_type: "text",
                        new_path: &comment.path,
                        new_line: comment.line,
                        base_sha: &refs.base_sha,
                        start_sha: &refs.start_sha,
                        head_sha: &refs.head_sha,
                    },
                })
                .send()
                .await
                .context("Failed to create discussion")?;
            check(response).await?;
        }

        Ok(())
    }
}

async fn check(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let text = response.text().await.unwrap_or_default();
    anyhow::bail!("GitLab API request failed: HTTP {status}: {text}")
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::scm::ReviewComment;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn refresh_deletes_marked_notes_and_posts_positioned_discussions() {
        let server = MockServer::start().await;
        let mr_path = "/api/v4/projects/lab%2Fhello-world/merge_requests/16";

        Mock::given(method("GET"))
            .and(path(format!("{mr_path}/discussions")))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"id": "d1", "notes": [
                    {"id": 10, "body": "<!-- gomod-branch-audit -->\nold"},
                    {"id": 11, "body": "human reply"}
                ]}
            ])))
            .mount(&server)
            .await;

        Mock::given(method("DELETE"))
            .and(path(format!("{mr_path}/discussions/d1/notes/10")))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path(mr_path))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "diff_refs": {"base_sha": "b", "start_sha": "s", "head_sha": "h"}
            })))
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path(format!("{mr_path}/discussions")))
            .and(body_partial_json(serde_json::json!({
                "position": {
                    "position_type": "text",
                    "new_path": "go.mod",
                    "new_line": 9,
                    "head_sha": "h"
                }
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({"id": "d2"})))
            .expect(1)
            .mount(&server)
            .await;

        let sink = GitlabSink::new(&server.uri(), "token");
        sink.refresh_review_comments(
            "lab/hello-world",
            16,
            RefreshOptions {
                comment_by: "gomod-branch-audit".to_string(),
                commit_id: "e838478".to_string(),
                comments: vec![ReviewComment {
                    body: "branch is feat/x for version: v1".to_string(),
                    path: "go.mod".to_string(),
                    line: 9,
                }],
            },
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn no_comments_skips_the_diff_ref_lookup() {
        let server = MockServer::start().await;
        let mr_path = "/api/v4/projects/lab%2Fhello-world/merge_requests/16";

        Mock::given(method("GET"))
            .and(path(format!("{mr_path}/discussions")))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
            .mount(&server)
            .await;

        let sink = GitlabSink::new(&server.uri(), "token");
        sink.refresh_review_comments(
            "lab/hello-world",
            16,
            RefreshOptions {
                comment_by: "gomod-branch-audit".to_string(),
                commit_id: String::new(),
                comments: Vec::new(),
            },
        )
        .await
        .unwrap();
    }
}
