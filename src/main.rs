mod changelog;
mod command;
mod config;
mod git;
mod github;
mod output;

use clap::Parser;
use std::path::PathBuf;
use tracing::{debug, info, info_span};
use tracing_subscriber::EnvFilter;

use crate::config::{Config, Overrides, Settings};

/// changelog-gen: build a markdown changelog entry from the pull requests
/// merged into a GitHub repository since its latest tag.
#[derive(Parser, Debug)]
#[command(name = "changelog-gen", version, about)]
struct Cli {
    /// Target repository (e.g., jupyterlab/jupyterlab)
    target: git::RepoRef,

    /// Branch to generate the changelog for; empty means the default branch
    #[arg(long, env = "INPUT_BRANCH")]
    branch: Option<String>,

    /// Convert the output to reStructuredText when exactly "true"
    #[arg(long, env = "INPUT_CONVERT_TO_RST")]
    convert_to_rst: Option<String>,

    /// GitHub token used for API calls
    #[arg(long, env = "GITHUB_ACCESS_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// File the changelog is written to
    #[arg(short, long, default_value = config::DEFAULT_OUTPUT)]
    output: PathBuf,

    /// Only print the changelog; don't write a file
    #[arg(long)]
    no_write: bool,

    /// Optional settings file
    #[arg(long, default_value = config::DEFAULT_SETTINGS_FILE)]
    config: PathBuf,

    /// Kind of activity to summarize
    #[arg(long, value_enum, default_value_t = github::ActivityKind::PullRequests)]
    kind: github::ActivityKind,

    /// Don't echo external commands
    #[arg(short, long)]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let _main_span = info_span!("changelog", repo = %cli.target).entered();

    info!(
        target_repo = %cli.target,
        branch = cli.branch.as_deref().unwrap_or(""),
        convert_to_rst = cli.convert_to_rst.as_deref().unwrap_or(""),
        "generating changelog"
    );

    info!("loading configuration");
    let settings = Settings::load(&cli.config)?;
    let config = Config::resolve(
        cli.target,
        Overrides {
            branch: cli.branch,
            convert_to_rst: cli.convert_to_rst,
            token: cli.token,
            output: Some(cli.output),
            no_write: cli.no_write,
            kind: Some(cli.kind),
            quiet: cli.quiet,
        },
        settings,
    )?;
    debug!(api_url = %config.api_url, backport_bot = %config.backport_bot, "resolved configuration");

    let runner = command::SystemRunner::new(config.quiet, config.command_timeout);
    let client = github::GitHubClient::new(&config.api_url, &config.token, config.http_timeout)?;

    let text = changelog::Generator::new(&config, &runner, &client)
        .render()
        .await?;

    output::emit(&text, config.output.as_deref())?;
    info!("done");

    Ok(())
}
