use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::git::RepoRef;
use crate::github::ActivityKind;

/// Account whose backport PRs get re-attributed to the original PR.
pub const DEFAULT_BACKPORT_BOT: &str = "meeseeksmachine";
pub const DEFAULT_API_URL: &str = "https://api.github.com";
pub const DEFAULT_WEB_URL: &str = "https://github.com";
pub const DEFAULT_OUTPUT: &str = "changelog.md";
pub const DEFAULT_SETTINGS_FILE: &str = ".changelog-gen.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("GitHub token not provided (set GITHUB_ACCESS_TOKEN or [github].token)")]
    MissingToken,

    #[error("Heading level must be between 1 and 5, got {0}")]
    InvalidHeadingLevel(u8),
}

/// Settings read from `.changelog-gen.toml`.
/// All fields are optional; the tool works with zero config.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub github: GitHubSettings,

    #[serde(default)]
    pub changelog: ChangelogSettings,

    #[serde(default)]
    pub timeouts: TimeoutSettings,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GitHubSettings {
    /// REST API root, e.g. a GitHub Enterprise `https://ghe.example.com/api/v3`
    pub api_url: Option<String>,
    /// Web root used for clone URLs and compare links
    pub web_url: Option<String>,
    pub token: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChangelogSettings {
    pub backport_bot: Option<String>,
    pub heading_level: Option<u8>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TimeoutSettings {
    pub command_secs: Option<u64>,
    pub http_secs: Option<u64>,
}

impl Settings {
    /// Load settings from `path`. Returns defaults if the file doesn't exist.
    pub fn load(path: &Path) -> Result<Settings, ConfigError> {
        if path.exists() {
            Self::load_from(path)
        } else {
            Ok(Settings::default())
        }
    }

    pub fn load_from(path: &Path) -> Result<Settings, ConfigError> {
        let contents = fs::read_to_string(path)?;
        let settings = toml::from_str(&contents)?;
        Ok(settings)
    }
}

/// Values supplied on the command line or through the environment.
/// Anything left `None` falls back to [`Settings`], then to defaults.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub branch: Option<String>,
    pub convert_to_rst: Option<String>,
    pub token: Option<String>,
    pub output: Option<PathBuf>,
    /// Print only; skip writing the changelog file
    pub no_write: bool,
    pub kind: Option<ActivityKind>,
    pub quiet: bool,
}

/// Fully resolved configuration handed to the pipeline.
#[derive(Debug, Clone)]
pub struct Config {
    pub target: RepoRef,
    /// `None` means "use the repository's default branch".
    pub branch: Option<String>,
    pub convert_to_rst: bool,
    pub kind: ActivityKind,
    pub token: String,
    /// Where to persist the changelog; `None` prints only.
    pub output: Option<PathBuf>,
    pub quiet: bool,
    pub api_url: String,
    pub web_url: String,
    pub backport_bot: String,
    pub heading_level: u8,
    pub command_timeout: Duration,
    pub http_timeout: Duration,
}

impl Config {
    /// Merge CLI/env overrides on top of file settings.
    pub fn resolve(
        target: RepoRef,
        overrides: Overrides,
        settings: Settings,
    ) -> Result<Config, ConfigError> {
        let token = overrides
            .token
            .filter(|t| !t.trim().is_empty())
            .or(settings.github.token)
            .ok_or(ConfigError::MissingToken)?;

        let heading_level = settings.changelog.heading_level.unwrap_or(2);
        if !(1..=5).contains(&heading_level) {
            return Err(ConfigError::InvalidHeadingLevel(heading_level));
        }

        Ok(Config {
            target,
            branch: overrides.branch.filter(|b| !b.trim().is_empty()),
            convert_to_rst: overrides.convert_to_rst.as_deref() == Some("true"),
            kind: overrides.kind.unwrap_or(ActivityKind::PullRequests),
            token,
            output: (!overrides.no_write).then(|| {
                overrides
                    .output
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT))
            }),
            quiet: overrides.quiet,
            api_url: trim_url(settings.github.api_url, DEFAULT_API_URL),
            web_url: trim_url(settings.github.web_url, DEFAULT_WEB_URL),
            backport_bot: settings
                .changelog
                .backport_bot
                .unwrap_or_else(|| DEFAULT_BACKPORT_BOT.to_string()),
            heading_level,
            command_timeout: Duration::from_secs(settings.timeouts.command_secs.unwrap_or(120)),
            http_timeout: Duration::from_secs(settings.timeouts.http_secs.unwrap_or(30)),
        })
    }
}

fn trim_url(value: Option<String>, default: &str) -> String {
    value
        .unwrap_or_else(|| default.to_string())
        .trim_end_matches('/')
        .to_string()
}

#[cfg(test)]
pub(crate) fn test_config() -> Config {
    Config::resolve(
        "org/repo".parse().unwrap(),
        Overrides {
            token: Some("test-token".to_string()),
            ..Overrides::default()
        },
        Settings::default(),
    )
    .unwrap()
}
