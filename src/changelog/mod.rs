pub mod markdown;

pub use markdown::NO_MERGED_PRS;

use thiserror::Error;
use tracing::{info, info_span, Instrument};

use crate::command::CommandRunner;
use crate::config::Config;
use crate::git::{self, GitError};
use crate::github::{fetch_activity_md, ActivityQuery, GitHubApi, GitHubError};
use crate::output::{self, OutputError};

#[derive(Debug, Error)]
pub enum ChangelogError {
    #[error(transparent)]
    Git(#[from] GitError),

    #[error(transparent)]
    GitHub(#[from] GitHubError),

    #[error(transparent)]
    Output(#[from] OutputError),
}

/// Builds one changelog entry for `config.target`.
///
/// Steps run strictly in order and the first failure aborts the run:
/// mirror + tag lookup, activity fetch, markdown rewrite, then optional
/// RST conversion.
pub struct Generator<'a> {
    config: &'a Config,
    runner: &'a dyn CommandRunner,
    github: &'a dyn GitHubApi,
}

impl<'a> Generator<'a> {
    pub fn new(config: &'a Config, runner: &'a dyn CommandRunner, github: &'a dyn GitHubApi) -> Self {
        Self {
            config,
            runner,
            github,
        }
    }

    /// Markdown changelog entry, before any format conversion.
    pub async fn generate(&self) -> Result<String, ChangelogError> {
        let resolution = git::resolve_latest_tag(self.runner, self.config)
            .instrument(info_span!("resolve_tag"))
            .await?;
        info!(
            "Getting changes to {} since {} on branch {}...",
            self.config.target, resolution.tag, resolution.branch
        );

        let query = ActivityQuery {
            repo: self.config.target.clone(),
            since: resolution.tag,
            kind: self.config.kind,
            heading_level: self.config.heading_level,
            branch: resolution.branch,
        };
        let Some(activity) = fetch_activity_md(self.github, &query, &self.config.web_url).await? else {
            info!(kind = ?self.config.kind, "no activity found");
            return Ok(markdown::empty_entry(self.config.kind).to_string());
        };

        let entry = markdown::post_process(
            &activity,
            &self.config.backport_bot,
            &self.config.target,
            self.github,
        )
        .instrument(info_span!("post_process"))
        .await?;
        Ok(entry)
    }

    /// The final text: markdown, or its RST conversion when requested.
    pub async fn render(&self) -> Result<String, ChangelogError> {
        let entry = self.generate().await?;
        if !self.config.convert_to_rst {
            return Ok(entry);
        }
        info!("converting changelog to reStructuredText");
        Ok(output::convert_to_rst(self.runner, &entry).await?)
    }
}
