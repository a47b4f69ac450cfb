//! Expands team review requests into individual reviewers.
//!
//! When a pull request has one or more teams requested as reviewers, this
//! collects the members of every such team, deduplicates them, and requests
//! a random proportion of them as individual reviewers. The same
//! [`Assigner`] backs both the `assign` command and the webhook server.
//!
//! Nothing is cached between runs: every assignment starts from the teams
//! currently on the pull request. Two runs racing on the same pull request
//! are not coordinated; whichever reviewer request GitHub receives last is
//! the one that sticks.

use crate::config::AssignConfig;
use crate::github::PullRequestRef;
use crate::sample::sample;
use async_trait::async_trait;
use itertools::Itertools;
use std::fmt;
use std::sync::Arc;
use tracing as log;

/// The GitHub operations needed to perform an assignment.
///
/// Implementations must be usable from many requests at once.
#[async_trait]
pub trait ReviewerRepository: Send + Sync {
    /// Slugs of the teams currently requested to review `pr`.
    async fn team_reviewers(&self, pr: &PullRequestRef) -> anyhow::Result<Vec<String>>;

    /// Logins of every member of `org/team`, across all pages.
    async fn team_members(&self, org: &str, team: &str) -> anyhow::Result<Vec<String>>;

    /// Requests `reviewers` as individual reviewers on `pr`.
    async fn request_reviewers(
        &self,
        pr: &PullRequestRef,
        reviewers: &[String],
    ) -> anyhow::Result<()>;
}

/// The phase of an assignment that talked to GitHub.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssignStep {
    TeamReviewers,
    TeamMembers(String),
    RequestReviewers,
}

impl fmt::Display for AssignStep {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            AssignStep::TeamReviewers => write!(f, "retrieving current team reviewers"),
            AssignStep::TeamMembers(team) => write!(f, "retrieving users in team `{team}`"),
            AssignStep::RequestReviewers => write!(f, "requesting reviewers"),
        }
    }
}

#[derive(Debug)]
pub enum AssignError {
    /// The pull request reference is malformed.
    InvalidReference(String),
    /// No teams are requested as reviewers, so there is nobody to pick from.
    ///
    /// This is an expected outcome, not a failure.
    NoTeamsAssigned,
    /// A GitHub API call failed.
    Upstream {
        step: AssignStep,
        source: anyhow::Error,
    },
}

impl AssignError {
    pub fn is_no_teams(&self) -> bool {
        matches!(self, AssignError::NoTeamsAssigned)
    }
}

impl std::error::Error for AssignError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AssignError::Upstream { source, .. } => Some(&**source),
            _ => None,
        }
    }
}

impl fmt::Display for AssignError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            AssignError::InvalidReference(msg) => write!(f, "invalid pull request: {msg}"),
            AssignError::NoTeamsAssigned => {
                write!(f, "no teams are currently assigned as reviewers")
            }
            AssignError::Upstream { step, .. } => write!(f, "{step}"),
        }
    }
}

/// The result of a successful assignment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    pub pull_request: PullRequestRef,
    /// Every distinct member of the requested teams, sorted.
    pub candidates: Vec<String>,
    /// The members that were requested as reviewers.
    pub reviewers: Vec<String>,
}

/// Performs assignments against a shared [`ReviewerRepository`].
#[derive(Clone)]
pub struct Assigner {
    repo: Arc<dyn ReviewerRepository>,
    config: AssignConfig,
}

impl Assigner {
    pub fn new(repo: Arc<dyn ReviewerRepository>, config: AssignConfig) -> Self {
        Assigner { repo, config }
    }

    /// Runs one full assignment cycle for `pr`.
    ///
    /// Any failure while collecting team members aborts the whole cycle
    /// before a reviewer request is made. Nothing is retried.
    pub async fn assign(&self, pr: &PullRequestRef) -> Result<Assignment, AssignError> {
        pr.validate().map_err(AssignError::InvalidReference)?;

        log::debug!("retrieving team reviewers for {pr}");
        let teams = self
            .repo
            .team_reviewers(pr)
            .await
            .map_err(|source| AssignError::Upstream {
                step: AssignStep::TeamReviewers,
                source,
            })?;
        log::debug!("retrieved team reviewers for {pr}: {}", teams.iter().format(","));

        if teams.is_empty() {
            return Err(AssignError::NoTeamsAssigned);
        }

        let mut individuals = Vec::new();
        for team in &teams {
            let members = self
                .repo
                .team_members(&pr.owner, team)
                .await
                .map_err(|source| AssignError::Upstream {
                    step: AssignStep::TeamMembers(team.clone()),
                    source,
                })?;
            log::debug!("retrieved members of team {team}: {}", members.iter().format(","));
            individuals.extend(members);
        }
        let candidates = candidate_pool(individuals);

        let reviewers = sample(&candidates, self.config.proportion);
        log::debug!(
            "individuals being assigned to {pr}: {} (proportion {})",
            reviewers.iter().format(","),
            self.config.proportion
        );

        if reviewers.is_empty() {
            log::info!("no reviewers selected for {pr} from {} candidates", candidates.len());
        } else if self.config.dry_run {
            log::info!(
                "dry run, not requesting {} on {pr}",
                reviewers.iter().format(",")
            );
        } else {
            self.repo
                .request_reviewers(pr, &reviewers)
                .await
                .map_err(|source| AssignError::Upstream {
                    step: AssignStep::RequestReviewers,
                    source,
                })?;
            log::info!("requested {} on {pr}", reviewers.iter().format(","));
        }

        Ok(Assignment {
            pull_request: pr.clone(),
            candidates,
            reviewers,
        })
    }
}

/// Sorts and deduplicates usernames.
///
/// Usernames are compared exactly, so `Alice` and `alice` stay distinct.
fn candidate_pool(mut individuals: Vec<String>) -> Vec<String> {
    individuals.sort();
    individuals.dedup();
    individuals
}
