use std::fmt;
use std::str::FromStr;

use super::GitError;

/// A GitHub repository, parsed from `owner/repo`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoRef {
    pub owner: String,
    pub name: String,
}

impl FromStr for RepoRef {
    type Err = GitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || GitError::InvalidRepo(s.to_string());
        let (owner, name) = s.trim().split_once('/').ok_or_else(invalid)?;
        let valid = |part: &str| {
            !part.is_empty()
                && part
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        };
        if !valid(owner) || !valid(name) {
            return Err(invalid());
        }
        Ok(RepoRef {
            owner: owner.to_string(),
            name: name.to_string(),
        })
    }
}

impl fmt::Display for RepoRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// Outcome of mirroring the repository: the branch to report on and the
/// most recent tag merged into it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagResolution {
    /// Branch name with any remote prefix stripped (`origin/main` -> `main`)
    pub branch: String,
    pub tag: String,
}
