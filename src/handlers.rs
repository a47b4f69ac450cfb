use crate::assign::Assigner;
use crate::github::webhook::event::Event;
use secrecy::SecretString;
use std::fmt;
use tokio_util::sync::CancellationToken;
use tracing as log;

mod ready_for_review;

#[derive(Debug)]
pub enum HandlerError {
    /// The delivery itself is unusable; reported back to the sender.
    Message(String),
    Other(anyhow::Error),
}

impl std::error::Error for HandlerError {}

impl fmt::Display for HandlerError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            HandlerError::Message(msg) => write!(f, "{}", msg),
            HandlerError::Other(_) => write!(f, "An internal error occurred."),
        }
    }
}

/// Dispatches a parsed webhook event.
///
/// Returns `Ok(false)` when nothing was interested in the event.
pub async fn handle(ctx: &Context, event: &Event) -> Result<bool, HandlerError> {
    match event {
        Event::PullRequest(event) => match ready_for_review::parse_input(event) {
            Err(msg) => Err(HandlerError::Message(msg)),
            Ok(Some(input)) => ready_for_review::handle_input(ctx, input)
                .await
                .map(|()| true)
                .map_err(HandlerError::Other),
            Ok(None) => Ok(false),
        },
        Event::Other => {
            log::debug!("untargeted event");
            Ok(false)
        }
    }
}

/// Shared, read-only state for every webhook delivery.
pub struct Context {
    pub assigner: Assigner,
    /// `None` disables signature validation.
    pub webhook_secret: Option<SecretString>,
    /// Cancelled once the shutdown deadline passes; assignments still running
    /// then are abandoned.
    pub abort: CancellationToken,
}
