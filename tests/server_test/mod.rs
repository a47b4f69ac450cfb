//! Tests that exercise the webhook behavior of the server.
//!
//! These tests drive the webhook router with deliveries signed the way GitHub
//! signs them, and then observe its response and the API calls it made. The
//! router runs in-process, talking to a fake API server.
//!
//! The [`TestBuilder`] is used for configuring the API handlers, and
//! [`ServerTestCtx`] provides access to the router.
//!
//! At the end of the test, you should call `ctx.events.assert_eq()` to
//! validate that the correct HTTP actions were actually performed. If you are
//! uncertain about what to put in there, just start with an empty list, and
//! the error will tell you what to add.

use super::common::{Events, HttpServerHandle, Method::*, Response, TestBuilder};
use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use secrecy::SecretString;
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};
use team_reviewers::Assigner;
use team_reviewers::config::AssignConfig;
use team_reviewers::github::webhook::sign;
use team_reviewers::handlers::Context;
use team_reviewers::server::{self, WEBHOOK_PATH};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

const WEBHOOK_SECRET: &str = "secret";

/// A context used for running a test.
struct ServerTestCtx {
    app: Router,
    state: Arc<Context>,
    #[allow(dead_code)] // held for drop
    api_server: HttpServerHandle,
    events: Events,
}

fn build(builder: TestBuilder, webhook_secret: Option<&str>) -> ServerTestCtx {
    let events = Events::new();
    let api_server = builder.start(events.clone());
    let state = Arc::new(Context {
        assigner: Assigner::new(
            Arc::new(api_server.github_client()),
            AssignConfig::default(),
        ),
        webhook_secret: webhook_secret.map(|s| SecretString::from(s.to_string())),
        abort: CancellationToken::new(),
    });
    ServerTestCtx {
        app: server::app(state.clone()),
        state,
        api_server,
        events,
    }
}

/// API handlers for `acme/foo#123` requesting review from `acme/core`.
fn core_team() -> TestBuilder {
    TestBuilder::default()
        .api_handler(
            GET,
            "repos/acme/foo/pulls/123/requested_reviewers",
            |_req| Response::json(json!({ "users": [], "teams": [{ "slug": "core" }] })),
        )
        .api_handler(GET, "orgs/acme/teams/core/members", |_req| {
            Response::json(json!([
                { "login": "alice" },
                { "login": "bob" },
                { "login": "carol" },
            ]))
        })
        .api_handler(
            POST,
            "repos/acme/foo/pulls/123/requested_reviewers",
            |req| {
                let body = req.json();
                let reviewers = body["reviewers"].as_array().unwrap();
                assert_eq!(reviewers.len(), 1, "{body}");
                assert!(
                    ["alice", "bob", "carol"].contains(&reviewers[0].as_str().unwrap()),
                    "{body}"
                );
                Response::json(json!({ "number": 123 })).code(201)
            },
        )
}

fn pull_request_payload(action: &str) -> Vec<u8> {
    json!({
        "action": action,
        "number": 123,
        "pull_request": { "number": 123, "draft": false },
        "repository": {
            "name": "foo",
            "full_name": "acme/foo",
            "owner": { "login": "acme" },
        },
        "sender": { "login": "octocat" },
    })
    .to_string()
    .into_bytes()
}

fn delivery(event: &str, payload: Vec<u8>) -> Request<Body> {
    let signature = sign(WEBHOOK_SECRET.as_bytes(), &payload);
    Request::post(WEBHOOK_PATH)
        .header("X-GitHub-Event", event)
        .header("X-Hub-Signature-256", signature)
        .header("Content-Type", "application/json")
        .body(Body::from(payload))
        .unwrap()
}

impl ServerTestCtx {
    async fn send(&self, req: Request<Body>) -> (StatusCode, String) {
        let response = self.app.clone().oneshot(req).await.unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }
}

#[tokio::test]
async fn ready_for_review_assigns() {
    let ctx = build(core_team(), Some(WEBHOOK_SECRET));
    let (status, body) = ctx
        .send(delivery(
            "pull_request",
            pull_request_payload("ready_for_review"),
        ))
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body, "processed request");
    ctx.events.assert_eq(&[
        (GET, "/repos/acme/foo/pulls/123/requested_reviewers"),
        (GET, "/orgs/acme/teams/core/members"),
        (POST, "/repos/acme/foo/pulls/123/requested_reviewers"),
    ]);
}

#[tokio::test]
async fn other_actions_are_ignored() {
    let ctx = build(core_team(), Some(WEBHOOK_SECRET));
    for action in ["opened", "synchronize", "closed", "review_requested"] {
        let (status, body) = ctx
            .send(delivery("pull_request", pull_request_payload(action)))
            .await;
        assert_eq!(status, StatusCode::OK, "{action}: {body}");
        assert_eq!(body, "ignored request");
    }
    ctx.events.assert_eq(&[]);
}

#[tokio::test]
async fn other_events_are_ignored() {
    let ctx = build(core_team(), Some(WEBHOOK_SECRET));
    let (status, _) = ctx
        .send(delivery(
            "ping",
            br#"{"zen": "Approachable is better than simple."}"#.to_vec(),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = ctx
        .send(delivery("issues", br#"{"action": "opened"}"#.to_vec()))
        .await;
    assert_eq!(status, StatusCode::OK);
    ctx.events.assert_eq(&[]);
}

#[tokio::test]
async fn bad_signature() {
    let ctx = build(core_team(), Some(WEBHOOK_SECRET));
    let payload = pull_request_payload("ready_for_review");

    let mut req = delivery("pull_request", payload.clone());
    let forged = sign(b"not the secret", &payload);
    req.headers_mut()
        .insert("x-hub-signature-256", forged.parse().unwrap());
    let (status, body) = ctx.send(req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, "Wrong signature");

    let mut req = delivery("pull_request", payload);
    req.headers_mut().remove("x-hub-signature-256");
    let (status, _) = ctx.send(req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    ctx.events.assert_eq(&[]);
}

#[tokio::test]
async fn tampered_body() {
    let ctx = build(core_team(), Some(WEBHOOK_SECRET));
    let signature = sign(
        WEBHOOK_SECRET.as_bytes(),
        &pull_request_payload("opened"),
    );
    let req = Request::post(WEBHOOK_PATH)
        .header("X-GitHub-Event", "pull_request")
        .header("X-Hub-Signature-256", signature)
        .body(Body::from(pull_request_payload("ready_for_review")))
        .unwrap();
    let (status, _) = ctx.send(req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    ctx.events.assert_eq(&[]);
}

#[tokio::test]
async fn insecure_skips_validation() {
    let ctx = build(core_team(), None);
    let req = Request::post(WEBHOOK_PATH)
        .header("X-GitHub-Event", "pull_request")
        .body(Body::from(pull_request_payload("ready_for_review")))
        .unwrap();
    let (status, body) = ctx.send(req).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    ctx.events.assert_eq(&[
        (GET, "/repos/acme/foo/pulls/123/requested_reviewers"),
        (GET, "/orgs/acme/teams/core/members"),
        (POST, "/repos/acme/foo/pulls/123/requested_reviewers"),
    ]);
}

#[tokio::test]
async fn malformed_deliveries() {
    let ctx = build(core_team(), Some(WEBHOOK_SECRET));

    let (status, body) = ctx
        .send(delivery("pull_request", b"{not json".to_vec()))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, "Failed to parse payload");

    let (status, _) = ctx
        .send(delivery("pull_request", br#"{"action": "ready_for_review"}"#.to_vec()))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let mut req = delivery("pull_request", pull_request_payload("ready_for_review"));
    req.headers_mut().remove("x-github-event");
    let (status, _) = ctx.send(req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    ctx.events.assert_eq(&[]);
}

#[tokio::test]
async fn oversized_body() {
    let ctx = build(core_team(), Some(WEBHOOK_SECRET));
    let (status, body) = ctx
        .send(delivery("pull_request", vec![b' '; 5 * 1024 * 1024 + 1]))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, "Failed to read request body");
    ctx.events.assert_eq(&[]);
}

#[tokio::test]
async fn invalid_reference_is_rejected() {
    let ctx = build(core_team(), Some(WEBHOOK_SECRET));
    let payload = json!({
        "action": "ready_for_review",
        "pull_request": { "number": 0 },
        "repository": { "name": "foo", "full_name": "acme/foo", "owner": { "login": "acme" } },
    })
    .to_string()
    .into_bytes();
    let (status, _) = ctx.send(delivery("pull_request", payload)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    ctx.events.assert_eq(&[]);
}

#[tokio::test]
async fn no_teams_requested() {
    let builder = TestBuilder::default().api_handler(
        GET,
        "repos/acme/foo/pulls/123/requested_reviewers",
        |_req| Response::json(json!({ "users": [{ "login": "octocat" }], "teams": [] })),
    );
    let ctx = build(builder, Some(WEBHOOK_SECRET));
    let (status, _) = ctx
        .send(delivery(
            "pull_request",
            pull_request_payload("ready_for_review"),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    ctx.events
        .assert_eq(&[(GET, "/repos/acme/foo/pulls/123/requested_reviewers")]);
}

#[tokio::test]
async fn upstream_failure() {
    let builder = TestBuilder::default()
        .api_handler(
            GET,
            "repos/acme/foo/pulls/123/requested_reviewers",
            |_req| Response::json(json!({ "teams": [{ "slug": "core" }, { "slug": "docs" }] })),
        )
        .api_handler(GET, "orgs/acme/teams/core/members", |_req| {
            Response::json(json!({ "message": "Server Error" })).code(500)
        });
    let ctx = build(builder, Some(WEBHOOK_SECRET));
    let (status, body) = ctx
        .send(delivery(
            "pull_request",
            pull_request_payload("ready_for_review"),
        ))
        .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body, "request failed, error logged");
    // Nothing after the failed lookup, and certainly no review request.
    ctx.events.assert_eq(&[
        (GET, "/repos/acme/foo/pulls/123/requested_reviewers"),
        (GET, "/orgs/acme/teams/core/members"),
    ]);
}

#[tokio::test]
async fn routing() {
    let ctx = build(core_team(), Some(WEBHOOK_SECRET));

    let req = Request::get(WEBHOOK_PATH).body(Body::empty()).unwrap();
    let (status, _) = ctx.send(req).await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);

    let req = Request::post("/github-hook").body(Body::empty()).unwrap();
    let (status, _) = ctx.send(req).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let response = ctx
        .app
        .clone()
        .oneshot(delivery("ping", b"{}".to_vec()))
        .await
        .unwrap();
    assert!(response.headers().contains_key("x-request-id"));
}

#[tokio::test]
async fn no_assignment_after_abort() {
    let ctx = build(core_team(), Some(WEBHOOK_SECRET));
    ctx.state.abort.cancel();
    let (status, _) = ctx
        .send(delivery(
            "pull_request",
            pull_request_payload("ready_for_review"),
        ))
        .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    ctx.events.assert_eq(&[]);
}

/// A slow member lookup, so a delivery is still in flight at shutdown.
fn slow_core_team(delay: Duration) -> TestBuilder {
    core_team().api_handler(GET, "orgs/acme/teams/core/members", move |_req| {
        std::thread::sleep(delay);
        Response::json(json!([{ "login": "alice" }, { "login": "bob" }]))
    })
}

async fn spawn_server(
    ctx: &ServerTestCtx,
    grace: Duration,
) -> (
    std::net::SocketAddr,
    tokio::sync::oneshot::Sender<()>,
    tokio::task::JoinHandle<anyhow::Result<()>>,
) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = tokio::sync::oneshot::channel::<()>();
    let shutdown = async move {
        let _ = rx.await;
    };
    let handle = tokio::spawn(server::run(listener, ctx.state.clone(), shutdown, grace));
    (addr, tx, handle)
}

fn post_delivery(
    addr: std::net::SocketAddr,
) -> impl Future<Output = reqwest::Result<reqwest::Response>> {
    let payload = pull_request_payload("ready_for_review");
    reqwest::Client::new()
        .post(format!("http://{addr}{WEBHOOK_PATH}"))
        .header("X-GitHub-Event", "pull_request")
        .header("X-Hub-Signature-256", sign(WEBHOOK_SECRET.as_bytes(), &payload))
        .body(payload)
        .send()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn graceful_shutdown_finishes_in_flight() {
    let ctx = build(
        slow_core_team(Duration::from_millis(500)),
        Some(WEBHOOK_SECRET),
    );
    let (addr, stop, server) = spawn_server(&ctx, Duration::from_secs(10)).await;

    let delivery = tokio::spawn(post_delivery(addr));
    tokio::time::sleep(Duration::from_millis(200)).await;
    stop.send(()).unwrap();

    let response = delivery.await.unwrap().unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    server.await.unwrap().unwrap();

    // Not accepting anymore.
    assert!(
        reqwest::Client::new()
            .post(format!("http://{addr}{WEBHOOK_PATH}"))
            .send()
            .await
            .is_err()
    );
    ctx.events.assert_eq(&[
        (GET, "/repos/acme/foo/pulls/123/requested_reviewers"),
        (GET, "/orgs/acme/teams/core/members"),
        (POST, "/repos/acme/foo/pulls/123/requested_reviewers"),
    ]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn shutdown_deadline_abandons_stragglers() {
    let ctx = build(slow_core_team(Duration::from_secs(2)), Some(WEBHOOK_SECRET));
    let (addr, stop, server) = spawn_server(&ctx, Duration::from_millis(200)).await;

    let _delivery = tokio::spawn(post_delivery(addr));
    tokio::time::sleep(Duration::from_millis(200)).await;

    let started = Instant::now();
    stop.send(()).unwrap();
    server.await.unwrap().unwrap();
    assert!(started.elapsed() < Duration::from_secs(1));
    assert!(ctx.state.abort.is_cancelled());

    // Give the member lookup time to answer; the abandoned assignment must
    // not go on to request reviewers.
    tokio::time::sleep(Duration::from_secs(3)).await;
    ctx.events.assert_eq(&[
        (GET, "/repos/acme/foo/pulls/123/requested_reviewers"),
        (GET, "/orgs/acme/teams/core/members"),
    ]);
}
