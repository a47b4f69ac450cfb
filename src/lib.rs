#![allow(clippy::new_without_default)]

pub mod assign;
pub mod config;
pub mod github;
pub mod handlers;
pub mod logger;
pub mod sample;
pub mod server;

pub use assign::{AssignError, Assigner, Assignment, ReviewerRepository};
pub use github::PullRequestRef;
