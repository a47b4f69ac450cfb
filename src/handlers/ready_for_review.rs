use crate::assign::AssignError;
use crate::github::PullRequestRef;
use crate::github::webhook::event::{PullRequestAction, PullRequestEvent};
use crate::handlers::Context;
use tracing as log;

pub(crate) struct ReadyForReviewInput {
    pr: PullRequestRef,
}

pub(crate) fn parse_input(event: &PullRequestEvent) -> Result<Option<ReadyForReviewInput>, String> {
    if event.action != PullRequestAction::ReadyForReview {
        log::debug!("untargeted action {:?}", event.action);
        return Ok(None);
    }

    let pr = event.pull_request_ref();
    pr.validate()?;
    Ok(Some(ReadyForReviewInput { pr }))
}

pub(crate) async fn handle_input(
    ctx: &Context,
    ReadyForReviewInput { pr }: ReadyForReviewInput,
) -> anyhow::Result<()> {
    let result = tokio::select! {
        biased;
        () = ctx.abort.cancelled() => anyhow::bail!("abandoned assignment for {pr} at shutdown"),
        result = ctx.assigner.assign(&pr) => result,
    };
    match result {
        Ok(assignment) => {
            log::info!(
                "assigned {} of {} candidates on {pr}",
                assignment.reviewers.len(),
                assignment.candidates.len()
            );
            Ok(())
        }
        Err(AssignError::NoTeamsAssigned) => {
            log::info!("no teams are currently assigned as reviewers on {pr}");
            Ok(())
        }
        Err(e) => Err(anyhow::Error::new(e).context(format!("handling pull request {pr}"))),
    }
}
