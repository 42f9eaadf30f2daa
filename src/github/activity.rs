use tracing::{debug, info, instrument};

use super::types::{ActivityQuery, PullRequest};
use super::{GitHubApi, GitHubError};
use crate::git::RepoRef;

/// Format a PR as a changelog list line:
/// `- <title> [<number>](<url>) [@<login>](<profile-url>)`
pub fn format_pr_entry(pr: &PullRequest) -> String {
    format!(
        "- {} [{}]({}) [@{}]({})",
        pr.title, pr.number, pr.html_url, pr.user.login, pr.user.html_url
    )
}

/// Look up PR `number` and format it as a changelog entry.
pub async fn resolve_pr_entry(
    api: &dyn GitHubApi,
    repo: &RepoRef,
    number: u64,
) -> Result<String, GitHubError> {
    let pr = api.pull_request(repo, number).await?;
    Ok(format_pr_entry(&pr))
}

/// Summarize activity since `query.since` as a markdown block.
///
/// Returns `None` when nothing matched, so callers can substitute their
/// own "nothing to report" text.
#[instrument(skip_all, fields(repo = %query.repo, since = %query.since, branch = %query.branch))]
pub async fn fetch_activity_md(
    api: &dyn GitHubApi,
    query: &ActivityQuery,
    web_url: &str,
) -> Result<Option<String>, GitHubError> {
    let since_date = api.commit_date(&query.repo, &query.since).await?;
    debug!(%since_date, "resolved tag date");

    let search = format!(
        "repo:{} {}",
        query.repo,
        query.kind.qualifiers(&since_date, &query.branch)
    );
    let items = api.search_issues(&search).await?;
    info!(found = items.len(), "fetched activity");

    if items.is_empty() {
        return Ok(None);
    }
    Ok(Some(render_activity(query, web_url, &items)))
}

fn render_activity(query: &ActivityQuery, web_url: &str, items: &[PullRequest]) -> String {
    let heading = "#".repeat(usize::from(query.heading_level));
    let mut md = String::new();
    md.push_str(&format!("{heading} New Version\n\n"));
    md.push_str(&format!(
        "([full changelog]({}/{}/compare/{}...{}))\n\n",
        web_url, query.repo, query.since, query.branch
    ));
    md.push_str(&format!("{heading}# {}\n\n", query.kind.section_title()));
    for item in items {
        md.push_str(&format!(
            "- {} [#{}]({}) ([@{}]({}))\n",
            item.title, item.number, item.html_url, item.user.login, item.user.html_url
        ));
    }
    md
}
