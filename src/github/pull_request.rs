use std::fmt;
use std::str::FromStr;

use url::Url;

use super::PullRequestNumber;

/// The only host pull request URLs are accepted from.
const GITHUB_HOST: &str = "github.com";

/// Identifies a single pull request on GitHub.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct PullRequestRef {
    pub owner: String,
    pub repo: String,
    pub number: PullRequestNumber,
}

impl PullRequestRef {
    pub fn new(
        owner: impl Into<String>,
        repo: impl Into<String>,
        number: PullRequestNumber,
    ) -> Self {
        PullRequestRef {
            owner: owner.into(),
            repo: repo.into(),
            number,
        }
    }

    /// Parses a URL like `https://github.com/acme/foo/pull/123`.
    ///
    /// Trailing segments such as `/files` or `/commits` are allowed, matching
    /// what people copy out of their browser.
    pub fn from_url(url: &str) -> Result<Self, ParsePullRequestUrlError> {
        let parsed =
            Url::parse(url).map_err(|e| ParsePullRequestUrlError::InvalidUrl(e.to_string()))?;

        let host = parsed.host_str().unwrap_or_default();
        if host != GITHUB_HOST {
            return Err(ParsePullRequestUrlError::UnsupportedHost(host.to_string()));
        }

        let path = parsed.path();
        let parts: Vec<&str> = path.trim_matches('/').split('/').collect();
        let [owner, repo, "pull", number, ..] = parts.as_slice() else {
            return Err(ParsePullRequestUrlError::UnsupportedPath(path.to_string()));
        };
        if owner.is_empty() || repo.is_empty() {
            return Err(ParsePullRequestUrlError::UnsupportedPath(path.to_string()));
        }

        let number = number
            .parse::<PullRequestNumber>()
            .map_err(|_| ParsePullRequestUrlError::InvalidNumber(number.to_string()))?;
        if number == 0 {
            return Err(ParsePullRequestUrlError::InvalidNumber(number.to_string()));
        }

        Ok(PullRequestRef::new(*owner, *repo, number))
    }

    /// Checks the invariants a reference must hold before any API call is made.
    pub fn validate(&self) -> Result<(), String> {
        if self.owner.is_empty() {
            return Err(format!("{self:?}: owner must not be empty"));
        }
        if self.repo.is_empty() {
            return Err(format!("{self:?}: repository must not be empty"));
        }
        if self.number == 0 {
            return Err(format!("{self:?}: pull request number must be positive"));
        }
        Ok(())
    }
}

/// Displays the canonical URL of the pull request.
impl fmt::Display for PullRequestRef {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "https://{GITHUB_HOST}/{}/{}/pull/{}",
            self.owner, self.repo, self.number
        )
    }
}

impl FromStr for PullRequestRef {
    type Err = ParsePullRequestUrlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PullRequestRef::from_url(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsePullRequestUrlError {
    InvalidUrl(String),
    UnsupportedHost(String),
    UnsupportedPath(String),
    InvalidNumber(String),
}

impl std::error::Error for ParsePullRequestUrlError {}

impl fmt::Display for ParsePullRequestUrlError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ParsePullRequestUrlError::InvalidUrl(e) => write!(f, "invalid URL: {e}"),
            ParsePullRequestUrlError::UnsupportedHost(host) => {
                write!(f, "unsupported host: `{host}`, expected `{GITHUB_HOST}`")
            }
            ParsePullRequestUrlError::UnsupportedPath(path) => write!(
                f,
                "unsupported URL path: `{path}`, expected `/<owner>/<repo>/pull/<number>`"
            ),
            ParsePullRequestUrlError::InvalidNumber(number) => {
                write!(f, "invalid pull request number: `{number}`")
            }
        }
    }
}
