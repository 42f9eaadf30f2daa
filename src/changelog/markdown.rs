//! Rewrites generated activity markdown into the house changelog style.
//!
//! The input is expected to contain, in order:
//! - a link labelled `full changelog` pointing at a compare view
//! - a heading whose text is `Merged PRs`
//! - one list line per PR, each ending in an `[@login](profile)` attribution
//!
//! Lines attributed to the backport bot are swapped for an entry built
//! from the PR they backport (`Backport PR #<n>` in the title).

use regex::Regex;
use std::sync::LazyLock;

use crate::git::RepoRef;
use crate::github::{resolve_pr_entry, ActivityKind, GitHubApi, GitHubError};

pub const FULL_CHANGELOG_LABEL: &str = "full changelog";
pub const FULL_CHANGELOG_HOUSE_LABEL: &str = "Full Changelog";
pub const MERGED_PRS_HEADING: &str = "Merged PRs";
pub const NO_MERGED_PRS: &str = "## New Version\n\nNo merged PRs";
pub const NO_CLOSED_ISSUES: &str = "## New Version\n\nNo closed issues";

static FULL_CHANGELOG_LINK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"\[{}\](\()", regex::escape(FULL_CHANGELOG_LABEL))).unwrap()
});

static MERGED_PRS_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"^\s*#{{1,6}}\s+{}\s*$", regex::escape(MERGED_PRS_HEADING))).unwrap()
});

static BACKPORT_PR: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"Backport PR #(\d+)").unwrap());

/// A line in the PR block that should be replaced by the original PR's entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backport {
    /// Index into the markdown's lines
    pub line: usize,
    pub original: u64,
}

/// Entry used when there is no activity of `kind` to report.
pub fn empty_entry(kind: ActivityKind) -> &'static str {
    match kind {
        ActivityKind::PullRequests => NO_MERGED_PRS,
        ActivityKind::Issues => NO_CLOSED_ISSUES,
    }
}

/// Capitalize the `full changelog` link label, keeping the link target.
/// Applying it more than once changes nothing further.
pub fn rewrite_full_changelog_label(md: &str) -> String {
    FULL_CHANGELOG_LINK
        .replace_all(md, format!("[{FULL_CHANGELOG_HOUSE_LABEL}]$1").as_str())
        .into_owned()
}

/// Index of the `Merged PRs` heading, if there is one.
pub fn merged_prs_start(lines: &[&str]) -> Option<usize> {
    lines.iter().position(|line| MERGED_PRS_LINE.is_match(line))
}

/// Find the backport-bot lines from the `Merged PRs` heading to the end.
/// Bot lines without a `Backport PR #<n>` reference are left alone.
pub fn find_backports(lines: &[&str], bot: &str) -> Vec<Backport> {
    let Some(start) = merged_prs_start(lines) else {
        return Vec::new();
    };
    let attribution = format!("[@{bot}]");

    lines
        .iter()
        .enumerate()
        .skip(start + 1)
        .filter(|(_, line)| line.contains(&attribution))
        .filter_map(|(index, line)| {
            let number = BACKPORT_PR.captures(line)?.get(1)?.as_str().parse().ok()?;
            Some(Backport {
                line: index,
                original: number,
            })
        })
        .collect()
}

/// Run the full rewrite: relabel the compare link, re-attribute backports
/// through the GitHub API, and trim surrounding whitespace.
pub async fn post_process(
    md: &str,
    bot: &str,
    repo: &RepoRef,
    api: &dyn GitHubApi,
) -> Result<String, GitHubError> {
    let relabeled = rewrite_full_changelog_label(md);
    let mut lines: Vec<String> = relabeled.lines().map(str::to_string).collect();

    let backports = {
        let borrowed: Vec<&str> = lines.iter().map(String::as_str).collect();
        find_backports(&borrowed, bot)
    };
    for backport in backports {
        tracing::debug!(line = backport.line, original = backport.original, "re-attributing backport");
        lines[backport.line] = resolve_pr_entry(api, repo, backport.original).await?;
    }

    Ok(lines.join("\n").trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_BACKPORT_BOT;
    use crate::github::fake::FakeGitHub;
    use pretty_assertions::assert_eq;

    const BACKPORT_FIXTURE: &str = include_str!("../../tests/fixtures/backport_activity.md");

    fn repo() -> RepoRef {
        "org/repo".parse().unwrap()
    }

    #[test]
    fn test_empty_entry_matches_kind() {
        assert_eq!(empty_entry(ActivityKind::PullRequests), "## New Version\n\nNo merged PRs");
        assert_eq!(empty_entry(ActivityKind::Issues), "## New Version\n\nNo closed issues");
    }

    #[test]
    fn test_label_rewrite_keeps_target() {
        let md = "([full changelog](https://github.com/org/repo/compare/v1.0.0...main))";
        assert_eq!(
            rewrite_full_changelog_label(md),
            "([Full Changelog](https://github.com/org/repo/compare/v1.0.0...main))"
        );
    }

    #[test]
    fn test_label_rewrite_is_idempotent() {
        let once = rewrite_full_changelog_label(BACKPORT_FIXTURE);
        let twice = rewrite_full_changelog_label(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_label_rewrite_ignores_prose() {
        let md = "See the full changelog below";
        assert_eq!(rewrite_full_changelog_label(md), md);
    }

    #[test]
    fn test_merged_prs_heading_allows_leading_whitespace() {
        let lines = ["## New Version", "", "   ### Merged PRs", "- entry"];
        assert_eq!(merged_prs_start(&lines), Some(2));
        assert_eq!(merged_prs_start(&["## Merged PRs are below"]), None);
    }

    #[test]
    fn test_find_backports_in_fixture() {
        let lines: Vec<&str> = BACKPORT_FIXTURE.lines().collect();
        let found = find_backports(&lines, DEFAULT_BACKPORT_BOT);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].original, 123);
        assert!(lines[found[0].line].starts_with("- Backport PR #123"));
    }

    #[test]
    fn test_bot_lines_before_section_are_ignored() {
        let lines = [
            "[@meeseeksmachine](x) Backport PR #5",
            "### Merged PRs",
            "- Backport PR #6 [9](u) [@meeseeksmachine](p)",
        ];
        let found = find_backports(&lines, "meeseeksmachine");
        assert_eq!(found, vec![Backport { line: 2, original: 6 }]);
    }

    #[test]
    fn test_bot_line_without_reference_is_ignored() {
        let lines = ["### Merged PRs", "- Bump deps [3](u) [@meeseeksmachine](p)"];
        assert!(find_backports(&lines, "meeseeksmachine").is_empty());
    }

    #[test]
    fn test_no_section_means_no_backports() {
        let lines = ["- Backport PR #6 [9](u) [@meeseeksmachine](p)"];
        assert!(find_backports(&lines, "meeseeksmachine").is_empty());
    }

    #[tokio::test]
    async fn test_post_process_replaces_only_backport_line() {
        let api = FakeGitHub::default().with_pull(123, "Fix widget layout", "carol");
        let output = post_process(BACKPORT_FIXTURE, DEFAULT_BACKPORT_BOT, &repo(), &api)
            .await
            .unwrap();

        let expected: Vec<String> = rewrite_full_changelog_label(BACKPORT_FIXTURE)
            .trim()
            .lines()
            .map(|line| {
                if line.contains("Backport PR #123") {
                    "- Fix widget layout [123](https://github.com/org/repo/pull/123) [@carol](https://github.com/carol)".to_string()
                } else {
                    line.to_string()
                }
            })
            .collect();
        assert_eq!(output, expected.join("\n"));
        assert_eq!(api.calls(), vec!["pull 123".to_string()]);
    }

    #[tokio::test]
    async fn test_post_process_without_backports() {
        let md = "## New Version\n\n[full changelog](url)\n\n### Merged PRs\n\n- Fix bug [1](u) [@alice](au)\n";
        let api = FakeGitHub::default();
        let output = post_process(md, DEFAULT_BACKPORT_BOT, &repo(), &api).await.unwrap();
        assert_eq!(
            output,
            "## New Version\n\n[Full Changelog](url)\n\n### Merged PRs\n\n- Fix bug [1](u) [@alice](au)"
        );
        assert!(api.calls().is_empty());
    }

    #[tokio::test]
    async fn test_post_process_fails_when_original_pr_missing() {
        let api = FakeGitHub::default();
        let err = post_process(BACKPORT_FIXTURE, DEFAULT_BACKPORT_BOT, &repo(), &api)
            .await
            .unwrap_err();
        assert!(matches!(err, GitHubError::NotFound(_)));
    }
}
