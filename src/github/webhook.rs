use std::{fmt, sync::Arc};

use anyhow::Context as _;
use axum::{
    extract::{State, rejection::BytesRejection},
    response::IntoResponse,
};
use bytes::Bytes;
use hmac::{Hmac, Mac};
use hyper::{HeaderMap, StatusCode};
use secrecy::ExposeSecret;
use sha2::Sha256;
use tracing as log;

use crate::handlers::{self, HandlerError};

pub mod event;

use event::{Event, PullRequestEvent};

/// The name of a webhook event, from the `X-GitHub-Event` header.
#[derive(Debug, PartialEq, Eq)]
pub enum EventName {
    /// Pull request activity.
    ///
    /// <https://docs.github.com/en/webhooks/webhook-events-and-payloads#pull_request>
    PullRequest,
    /// Sent once when the webhook is created.
    ///
    /// <https://docs.github.com/en/webhooks/webhook-events-and-payloads#ping>
    Ping,
    /// All other unhandled webhooks.
    Other,
}

impl std::str::FromStr for EventName {
    type Err = std::convert::Infallible;
    fn from_str(s: &str) -> Result<EventName, Self::Err> {
        Ok(match s {
            "pull_request" => EventName::PullRequest,
            "ping" => EventName::Ping,
            _ => EventName::Other,
        })
    }
}

impl fmt::Display for EventName {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}",
            match self {
                EventName::PullRequest => "pull_request",
                EventName::Ping => "ping",
                EventName::Other => "other",
            }
        )
    }
}

pub fn deserialize_payload<T: serde::de::DeserializeOwned>(v: &str) -> anyhow::Result<T> {
    let mut deserializer = serde_json::Deserializer::from_str(v);
    let res: Result<T, _> = serde_path_to_error::deserialize(&mut deserializer);
    match res {
        Ok(r) => Ok(r),
        Err(e) => {
            let ctx = format!("at {}", e.path());
            Err(e.into_inner()).context(ctx)
        }
    }
}

/// Decodes a webhook body according to its event name.
///
/// Events other than `pull_request` still have to be valid JSON, but their
/// contents are otherwise ignored.
pub fn parse_event(event: &EventName, payload: &str) -> anyhow::Result<Event> {
    match event {
        EventName::PullRequest => {
            let payload = deserialize_payload::<PullRequestEvent>(payload)
                .context("failed to deserialize PullRequestEvent")?;
            Ok(Event::PullRequest(payload))
        }
        EventName::Ping | EventName::Other => {
            deserialize_payload::<serde_json::Value>(payload)
                .with_context(|| format!("failed to deserialize {event} event"))?;
            Ok(Event::Other)
        }
    }
}

/// Receives GitHub webhook deliveries.
///
/// Responds with 400 when the delivery cannot be authenticated or parsed,
/// 500 when handling a valid delivery failed, and 200 otherwise (including
/// deliveries that are intentionally ignored).
pub async fn webhook(
    headers: HeaderMap,
    State(ctx): State<Arc<handlers::Context>>,
    body: Result<Bytes, BytesRejection>,
) -> axum::response::Response {
    let body = match body {
        Ok(body) => body,
        Err(err) => {
            log::error!("failed to read request body: {err}");
            return (StatusCode::BAD_REQUEST, "Failed to read request body").into_response();
        }
    };

    // Extract X-GitHub-Event header
    let Some(ev) = headers.get("X-GitHub-Event") else {
        log::error!("X-GitHub-Event header must be set");
        return (StatusCode::BAD_REQUEST, "X-GitHub-Event header must be set").into_response();
    };
    let Ok(ev) = ev.to_str() else {
        log::error!("X-GitHub-Event header must be UTF-8 encoded");
        return (
            StatusCode::BAD_REQUEST,
            "X-GitHub-Event header must be UTF-8 encoded",
        )
            .into_response();
    };
    let Ok(event) = ev.parse::<EventName>();

    log::debug!("event={event}");

    if let Some(secret) = &ctx.webhook_secret {
        // Extract X-Hub-Signature-256 header
        let Some(sig) = headers.get("X-Hub-Signature-256") else {
            log::error!("X-Hub-Signature-256 header must be set");
            return (
                StatusCode::BAD_REQUEST,
                "X-Hub-Signature-256 header must be set",
            )
                .into_response();
        };
        let Ok(signature) = sig.to_str() else {
            log::error!("X-Hub-Signature-256 header must be UTF-8 encoded");
            return (
                StatusCode::BAD_REQUEST,
                "X-Hub-Signature-256 header must be UTF-8 encoded",
            )
                .into_response();
        };

        log::debug!("signature={signature}");

        // Check signature on body
        if let Err(err) = check_payload_signed(signature, &body, secret.expose_secret().as_bytes())
        {
            log::error!("check_payload_signed: {err}");
            return (StatusCode::BAD_REQUEST, "Wrong signature").into_response();
        }
    }

    let Ok(payload) = str::from_utf8(&body) else {
        log::error!("payload not utf-8");
        return (StatusCode::BAD_REQUEST, "Payload must be UTF-8").into_response();
    };

    let event = match parse_event(&event, payload) {
        Ok(event) => event,
        Err(err) => {
            log::error!("{err:?}");
            return (StatusCode::BAD_REQUEST, "Failed to parse payload").into_response();
        }
    };

    match handlers::handle(&ctx, &event).await {
        Ok(true) => ("processed request",).into_response(),
        Ok(false) => ("ignored request",).into_response(),
        Err(HandlerError::Message(msg)) => {
            log::info!("rejected delivery: {msg}");
            (StatusCode::BAD_REQUEST, msg).into_response()
        }
        Err(HandlerError::Other(err)) => {
            log::error!("handling event failed: {err:?}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "request failed, error logged",
            )
                .into_response()
        }
    }
}

#[derive(Debug)]
pub struct SignedPayloadError;

impl fmt::Display for SignedPayloadError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "failed to validate payload")
    }
}

impl std::error::Error for SignedPayloadError {}

/// Checks an `X-Hub-Signature-256` value (`sha256=<hex>`) against the
/// HMAC-SHA256 of `payload` keyed with `secret`.
///
/// The comparison runs in constant time.
pub fn check_payload_signed(
    signature: &str,
    payload: &[u8],
    secret: &[u8],
) -> Result<(), SignedPayloadError> {
    let signature = signature
        .strip_prefix("sha256=")
        .ok_or(SignedPayloadError)?;
    let signature = match hex::decode(signature) {
        Ok(e) => e,
        Err(e) => {
            log::trace!("hex decode failed for {signature:?}: {e:?}");
            return Err(SignedPayloadError);
        }
    };

    let mut mac = Hmac::<Sha256>::new_from_slice(secret).map_err(|_| SignedPayloadError)?;
    mac.update(payload);
    mac.verify_slice(&signature).map_err(|_| SignedPayloadError)
}

/// Produces the `X-Hub-Signature-256` value GitHub would send for `payload`.
pub fn sign(secret: &[u8], payload: &[u8]) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret).expect("HMAC can take key of any size");
    mac.update(payload);
    format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
}
