pub mod activity;
pub mod types;

pub use activity::{fetch_activity_md, resolve_pr_entry};
pub use types::{ActivityKind, ActivityQuery, PullRequest};

use async_trait::async_trait;
use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::git::RepoRef;
use types::{CommitResponse, SearchPage};

const USER_AGENT: &str = "changelog-gen";
const PER_PAGE: usize = 100;
/// The search API never returns more than 1000 results.
const MAX_PAGES: usize = 10;

#[derive(Debug, Error)]
pub enum GitHubError {
    #[error("GitHub API request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("GitHub API request timed out: {0}")]
    Timeout(String),

    #[error("GitHub token not found")]
    MissingToken,

    #[error("GitHub resource not found: {0}")]
    NotFound(String),

    #[error("GitHub API rate limit exceeded for {0}")]
    RateLimited(String),

    #[error("GitHub API returned {status} for {resource}: {body}")]
    Status {
        status: StatusCode,
        resource: String,
        body: String,
    },
}

/// The GitHub calls the changelog pipeline depends on.
#[async_trait]
pub trait GitHubApi: Send + Sync {
    async fn pull_request(&self, repo: &RepoRef, number: u64) -> Result<PullRequest, GitHubError>;

    /// Committer date (ISO 8601) of the commit a ref points at.
    async fn commit_date(&self, repo: &RepoRef, reference: &str) -> Result<String, GitHubError>;

    /// Every issue search hit for `query`, oldest first.
    async fn search_issues(&self, query: &str) -> Result<Vec<PullRequest>, GitHubError>;
}

/// REST client for api.github.com (or an Enterprise equivalent).
pub struct GitHubClient {
    http: reqwest::Client,
    api_url: String,
    token: String,
}

impl GitHubClient {
    pub fn new(api_url: &str, token: &str, timeout: Duration) -> Result<Self, GitHubError> {
        if token.trim().is_empty() {
            return Err(GitHubError::MissingToken);
        }
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()?;
        Ok(Self {
            http,
            api_url: api_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
        })
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, GitHubError> {
        let url = format!("{}{}", self.api_url, path);
        debug!(%url, "GitHub API request");
        let response = self
            .http
            .get(&url)
            .bearer_auth(&self.token)
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", "2022-11-28")
            .query(query)
            .send()
            .await
            .map_err(|e| classify(e, path))?;

        let response = check_status(response, path).await?;
        response.json::<T>().await.map_err(|e| classify(e, path))
    }
}

#[async_trait]
impl GitHubApi for GitHubClient {
    #[instrument(skip(self, repo), fields(repo = %repo))]
    async fn pull_request(&self, repo: &RepoRef, number: u64) -> Result<PullRequest, GitHubError> {
        let path = format!("/repos/{}/{}/pulls/{}", repo.owner, repo.name, number);
        let pr: PullRequest = self.get_json(&path, &[]).await?;
        debug!(title = %pr.title, author = %pr.user.login, "received PR");
        Ok(pr)
    }

    #[instrument(skip(self, repo), fields(repo = %repo))]
    async fn commit_date(&self, repo: &RepoRef, reference: &str) -> Result<String, GitHubError> {
        let path = format!("/repos/{}/{}/commits/{}", repo.owner, repo.name, reference);
        let commit: CommitResponse = self.get_json(&path, &[]).await?;
        Ok(commit.commit.committer.date)
    }

    #[instrument(skip(self))]
    async fn search_issues(&self, query: &str) -> Result<Vec<PullRequest>, GitHubError> {
        let mut items = Vec::new();
        let mut total = 0;
        for page in 1..=MAX_PAGES {
            let params = [
                ("q", query.to_string()),
                ("sort", "created".to_string()),
                ("order", "asc".to_string()),
                ("per_page", PER_PAGE.to_string()),
                ("page", page.to_string()),
            ];
            let result: SearchPage = self.get_json("/search/issues", &params).await?;
            let received = result.items.len();
            total = result.total_count;
            items.extend(result.items);
            debug!(page, received, total = result.total_count, "search page");
            if received < PER_PAGE || items.len() >= result.total_count {
                break;
            }
        }
        if items.len() < total {
            warn!(fetched = items.len(), total, "search results truncated");
        }
        Ok(items)
    }
}

fn classify(err: reqwest::Error, resource: &str) -> GitHubError {
    if err.is_timeout() {
        GitHubError::Timeout(resource.to_string())
    } else {
        GitHubError::Request(err)
    }
}

async fn check_status(response: Response, resource: &str) -> Result<Response, GitHubError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let exhausted = response
        .headers()
        .get("x-ratelimit-remaining")
        .and_then(|v| v.to_str().ok())
        == Some("0");
    if status == StatusCode::TOO_MANY_REQUESTS
        || (status == StatusCode::FORBIDDEN && exhausted)
    {
        return Err(GitHubError::RateLimited(resource.to_string()));
    }
    if status == StatusCode::NOT_FOUND {
        return Err(GitHubError::NotFound(resource.to_string()));
    }

    let body = response.text().await.unwrap_or_default();
    Err(GitHubError::Status {
        status,
        resource: resource.to_string(),
        body,
    })
}


#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn repo() -> RepoRef {
        "org/repo".parse().unwrap()
    }

    fn client(server: &MockServer) -> GitHubClient {
        GitHubClient::new(&server.uri(), "secret", Duration::from_secs(5)).unwrap()
    }

    fn pr_json(number: u64, login: &str) -> serde_json::Value {
        json!({
            "number": number,
            "title": format!("PR {number}"),
            "html_url": format!("https://github.com/org/repo/pull/{number}"),
            "url": format!("https://api.github.com/repos/org/repo/pulls/{number}"),
            "user": {"login": login, "html_url": format!("https://github.com/{login}")}
        })
    }

    #[test]
    fn test_empty_token_rejected() {
        let err = GitHubClient::new("https://api.github.com", " ", Duration::from_secs(1));
        assert!(matches!(err, Err(GitHubError::MissingToken)));
    }

    #[tokio::test]
    async fn test_fetch_pull_request() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/org/repo/pulls/123"))
            .and(header("Authorization", "Bearer secret"))
            .and(header("User-Agent", USER_AGENT))
            .respond_with(ResponseTemplate::new(200).set_body_json(pr_json(123, "alice")))
            .mount(&server)
            .await;

        let pr = client(&server).pull_request(&repo(), 123).await.unwrap();
        assert_eq!(pr.number, 123);
        assert_eq!(pr.title, "PR 123");
        assert_eq!(pr.html_url, "https://github.com/org/repo/pull/123");
        assert_eq!(pr.user.html_url, "https://github.com/alice");
    }

    #[tokio::test]
    async fn test_missing_pull_request() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/org/repo/pulls/9"))
            .respond_with(ResponseTemplate::new(404).set_body_string(r#"{"message":"Not Found"}"#))
            .mount(&server)
            .await;

        let err = client(&server).pull_request(&repo(), 9).await.unwrap_err();
        assert!(matches!(err, GitHubError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_rate_limited() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/org/repo/pulls/1"))
            .respond_with(ResponseTemplate::new(403).insert_header("x-ratelimit-remaining", "0"))
            .mount(&server)
            .await;

        let err = client(&server).pull_request(&repo(), 1).await.unwrap_err();
        assert!(matches!(err, GitHubError::RateLimited(_)));
    }

    #[tokio::test]
    async fn test_bad_credentials() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(401).set_body_string("Bad credentials"))
            .mount(&server)
            .await;

        let err = client(&server).pull_request(&repo(), 1).await.unwrap_err();
        match err {
            GitHubError::Status { status, body, .. } => {
                assert_eq!(status, StatusCode::UNAUTHORIZED);
                assert_eq!(body, "Bad credentials");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_slow_response_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(pr_json(1, "alice"))
                    .set_delay(Duration::from_secs(2)),
            )
            .mount(&server)
            .await;

        let client = GitHubClient::new(&server.uri(), "secret", Duration::from_millis(200)).unwrap();
        let err = client.pull_request(&repo(), 1).await.unwrap_err();
        assert!(matches!(err, GitHubError::Timeout(_)));
    }

    #[tokio::test]
    async fn test_commit_date() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/org/repo/commits/v1.0.0"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "sha": "abc123",
                "commit": {"committer": {"name": "bot", "date": "2024-03-01T12:00:00Z"}}
            })))
            .mount(&server)
            .await;

        let date = client(&server).commit_date(&repo(), "v1.0.0").await.unwrap();
        assert_eq!(date, "2024-03-01T12:00:00Z");
    }

    #[tokio::test]
    async fn test_search_stops_at_total_count() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search/issues"))
            .and(query_param("q", "repo:org/repo is:pr"))
            .and(query_param("page", "1"))
            .and(query_param("order", "asc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "total_count": 2,
                "incomplete_results": false,
                "items": [pr_json(1, "alice"), pr_json(2, "bob")]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let items = client(&server).search_issues("repo:org/repo is:pr").await.unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[1].user.login, "bob");
    }

    #[tokio::test]
    async fn test_search_is_capped_at_max_pages() {
        let server = MockServer::start().await;
        let page: Vec<_> = (1..=PER_PAGE as u64).map(|n| pr_json(n, "alice")).collect();
        Mock::given(method("GET"))
            .and(path("/search/issues"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "total_count": 5000,
                "incomplete_results": false,
                "items": page
            })))
            .expect(MAX_PAGES as u64)
            .mount(&server)
            .await;

        let items = client(&server).search_issues("repo:org/repo is:pr").await.unwrap();
        assert_eq!(items.len(), PER_PAGE * MAX_PAGES);
    }
}
