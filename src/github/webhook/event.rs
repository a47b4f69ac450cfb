use crate::github::{PullRequestNumber, PullRequestRef};

/// An event triggered by a webhook.
#[derive(Debug)]
pub enum Event {
    /// Activity on a pull request.
    PullRequest(PullRequestEvent),
    /// Any other event. The payload was well-formed JSON but is not
    /// inspected further.
    Other,
}

/// <https://docs.github.com/en/webhooks/webhook-events-and-payloads#pull_request>
#[derive(Debug, serde::Deserialize)]
pub struct PullRequestEvent {
    pub action: PullRequestAction,
    pub pull_request: PullRequest,
    pub repository: Repository,
}

impl PullRequestEvent {
    /// The pull request this event is about.
    pub fn pull_request_ref(&self) -> PullRequestRef {
        PullRequestRef::new(
            &self.repository.owner.login,
            &self.repository.name,
            self.pull_request.number,
        )
    }
}

#[derive(PartialEq, Eq, Debug, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PullRequestAction {
    Opened,
    Edited,
    Closed,
    Reopened,
    Assigned,
    Unassigned,
    Labeled,
    Unlabeled,
    ReviewRequested,
    ReviewRequestRemoved,
    ReadyForReview,
    ConvertedToDraft,
    Synchronize,
    /// Actions added by GitHub after this list was written.
    #[serde(other)]
    Unknown,
}

#[derive(Debug, serde::Deserialize)]
pub struct PullRequest {
    pub number: PullRequestNumber,
}

#[derive(Debug, serde::Deserialize)]
pub struct Repository {
    pub name: String,
    pub owner: Owner,
}

#[derive(Debug, serde::Deserialize)]
pub struct Owner {
    pub login: String,
}
