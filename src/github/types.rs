use serde::Deserialize;

use crate::git::RepoRef;

/// A GitHub account as embedded in pull request and search payloads.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct User {
    pub login: String,
    /// Profile page, e.g. https://github.com/alice
    pub html_url: String,
}

/// The subset of a pull request (or search hit) the changelog needs.
/// Search results for issues carry the same fields.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PullRequest {
    pub number: u64,
    pub title: String,
    /// Canonical web URL, not the API URL
    pub html_url: String,
    pub user: User,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SearchPage {
    pub total_count: usize,
    pub items: Vec<PullRequest>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CommitResponse {
    pub commit: CommitDetail,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CommitDetail {
    pub committer: Signature,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Signature {
    pub date: String,
}

/// What kind of activity to summarize.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ActivityKind {
    /// Merged pull requests
    #[value(name = "pr")]
    PullRequests,
    /// Closed issues
    Issues,
}

impl ActivityKind {
    /// Search qualifiers selecting this kind of item closed after `since`.
    /// Issues have no base branch, so `branch` only narrows pull requests.
    pub fn qualifiers(self, since: &str, branch: &str) -> String {
        match self {
            ActivityKind::PullRequests => format!("is:pr is:merged merged:>={since} base:{branch}"),
            ActivityKind::Issues => format!("is:issue is:closed closed:>={since}"),
        }
    }

    pub fn section_title(self) -> &'static str {
        match self {
            ActivityKind::PullRequests => "Merged PRs",
            ActivityKind::Issues => "Closed Issues",
        }
    }
}

/// Parameters for an activity summary.
#[derive(Debug, Clone)]
pub struct ActivityQuery {
    pub repo: RepoRef,
    /// Tag the summary starts from
    pub since: String,
    pub kind: ActivityKind,
    /// Number of `#` for the top heading; sections use one more
    pub heading_level: u8,
    pub branch: String,
}
