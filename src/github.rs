pub(crate) mod client;
mod pull_request;
mod reviewers;
pub mod webhook;

pub use client::{GithubClient, token_from_env};
pub use pull_request::{ParsePullRequestUrlError, PullRequestRef};
pub use reviewers::{RequestedReviewers, Team, User};
pub use webhook::webhook;

pub type PullRequestNumber = u64;
