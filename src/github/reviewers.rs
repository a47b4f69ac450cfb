use anyhow::Context;
use async_trait::async_trait;

use super::{GithubClient, PullRequestRef};
use crate::assign::ReviewerRepository;

#[derive(Debug, serde::Deserialize)]
pub struct User {
    pub login: String,
}

#[derive(Debug, serde::Deserialize)]
pub struct Team {
    pub slug: String,
}

/// Pending review requests on a pull request.
///
/// <https://docs.github.com/en/rest/pulls/review-requests#get-all-requested-reviewers-for-a-pull-request>
#[derive(Debug, serde::Deserialize)]
pub struct RequestedReviewers {
    #[serde(default)]
    pub users: Vec<User>,
    #[serde(default)]
    pub teams: Vec<Team>,
}

impl GithubClient {
    fn requested_reviewers_url(&self, pr: &PullRequestRef) -> String {
        format!(
            "{}/repos/{}/{}/pulls/{}/requested_reviewers",
            self.api_url, pr.owner, pr.repo, pr.number
        )
    }

    pub async fn requested_reviewers(
        &self,
        pr: &PullRequestRef,
    ) -> anyhow::Result<RequestedReviewers> {
        let url = self.requested_reviewers_url(pr);
        self.json(self.get(&url))
            .await
            .with_context(|| format!("failed to list requested reviewers {url}"))
    }

    /// Lists members of a team with any role, following pagination.
    ///
    /// <https://docs.github.com/en/rest/teams/members#list-team-members>
    pub async fn team_member_logins(&self, org: &str, team: &str) -> anyhow::Result<Vec<String>> {
        let url = format!(
            "{}/orgs/{org}/teams/{team}/members?role=all&per_page=100",
            self.api_url
        );
        let members: Vec<User> = self
            .json_paged(&url)
            .await
            .with_context(|| format!("failed to list members of {org}/{team}"))?;
        Ok(members.into_iter().map(|m| m.login).collect())
    }

    /// <https://docs.github.com/en/rest/pulls/review-requests#request-reviewers-for-a-pull-request>
    pub async fn add_requested_reviewers(
        &self,
        pr: &PullRequestRef,
        reviewers: &[String],
    ) -> anyhow::Result<()> {
        #[derive(serde::Serialize)]
        struct ReviewersRequest<'a> {
            reviewers: &'a [String],
        }

        let url = self.requested_reviewers_url(pr);
        let _: serde_json::Value = self
            .json(self.post(&url).json(&ReviewersRequest { reviewers }))
            .await
            .with_context(|| format!("failed to request reviewers {url}"))?;
        Ok(())
    }
}

#[async_trait]
impl ReviewerRepository for GithubClient {
    async fn team_reviewers(&self, pr: &PullRequestRef) -> anyhow::Result<Vec<String>> {
        let requested = self.requested_reviewers(pr).await?;
        Ok(requested.teams.into_iter().map(|t| t.slug).collect())
    }

    async fn team_members(&self, org: &str, team: &str) -> anyhow::Result<Vec<String>> {
        self.team_member_logins(org, team).await
    }

    async fn request_reviewers(
        &self,
        pr: &PullRequestRef,
        reviewers: &[String],
    ) -> anyhow::Result<()> {
        self.add_requested_reviewers(pr, reviewers).await
    }
}
