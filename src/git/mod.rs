pub mod types;

pub use types::{RepoRef, TagResolution};

use std::path::Path;
use thiserror::Error;
use tracing::{debug, info, instrument};

use crate::command::{CommandError, CommandRunner};
use crate::config::Config;

#[derive(Debug, Error)]
pub enum GitError {
    #[error("Invalid repository \"{0}\", expected owner/repo")]
    InvalidRepo(String),

    #[error("No tags found on branch {branch}")]
    NoTags { branch: String },

    #[error("Could not determine the default branch")]
    NoBranch,

    #[error(transparent)]
    Command(#[from] CommandError),

    #[error("Failed to manage temporary clone directory: {0}")]
    TempDir(#[from] std::io::Error),
}

/// Mirror the target repository into a throwaway directory and find the
/// most recent tag merged into the working branch.
///
/// The working branch is `config.branch` when set, otherwise whatever the
/// clone checks out by default. Tags are listed newest first by creation
/// date and the first one wins. The clone is removed before returning.
#[instrument(skip_all, fields(repo = %config.target))]
pub async fn resolve_latest_tag(
    runner: &dyn CommandRunner,
    config: &Config,
) -> Result<TagResolution, GitError> {
    let workdir = tempfile::Builder::new()
        .prefix("changelog-gen-")
        .tempdir()?;
    let checkout = workdir.path().join("repo");
    let checkout_arg = checkout.to_string_lossy();
    let clone_url = format!("{}/{}", config.web_url, config.target);

    runner
        .run(
            "git",
            &["clone", "--filter=blob:none", "--no-checkout", &clone_url, &checkout_arg],
            None,
        )
        .await?;

    let branch = match &config.branch {
        Some(branch) => branch.clone(),
        None => default_branch(runner, &checkout).await?,
    };
    debug!(%branch, "using branch");

    runner
        .run("git", &["fetch", "origin", &branch, "--tags"], Some(checkout.as_path()))
        .await?;

    let remote_ref = format!("origin/{branch}");
    let listing = runner
        .run(
            "git",
            &["--no-pager", "tag", "--sort=-creatordate", "--merged", &remote_ref],
            Some(checkout.as_path()),
        )
        .await?;

    let tag = select_latest_tag(&listing)
        .ok_or_else(|| GitError::NoTags {
            branch: branch.clone(),
        })?
        .to_string();

    workdir.close()?;

    let branch = short_branch(&branch).to_string();
    info!(%tag, %branch, "resolved latest tag");
    Ok(TagResolution { branch, tag })
}

async fn default_branch(runner: &dyn CommandRunner, checkout: &Path) -> Result<String, GitError> {
    let current = runner
        .run("git", &["branch", "--show-current"], Some(checkout))
        .await?;
    if current.is_empty() {
        return Err(GitError::NoBranch);
    }
    Ok(current)
}

/// Pick the most recent tag from a `--sort=-creatordate` listing.
pub fn select_latest_tag(listing: &str) -> Option<&str> {
    listing.lines().map(str::trim).find(|line| !line.is_empty())
}

fn short_branch(branch: &str) -> &str {
    branch.rsplit('/').next().unwrap_or(branch)
}
