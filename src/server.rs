//! The webhook HTTP server.

use crate::config::ServerConfig;
use crate::handlers::Context;
use anyhow::Context as _;
use axum::body::Body;
use axum::extract::DefaultBodyLimit;
use axum::http::Request;
use axum::{Router, routing::post};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use tracing as log;

/// The path GitHub is configured to deliver webhooks to.
pub const WEBHOOK_PATH: &str = "/assign";

/// Deliveries larger than this are rejected before any processing.
const MAX_PAYLOAD_SIZE: usize = 5 * 1024 * 1024;

/// Builds the router serving [`WEBHOOK_PATH`].
pub fn app(ctx: Arc<Context>) -> Router {
    Router::new()
        .route(WEBHOOK_PATH, post(crate::github::webhook))
        .layer(DefaultBodyLimit::max(MAX_PAYLOAD_SIZE))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                .layer(
                    TraceLayer::new_for_http().make_span_with(|req: &Request<Body>| {
                        let request_id = req
                            .headers()
                            .get("x-request-id")
                            .and_then(|id| id.to_str().ok())
                            .unwrap_or_default();
                        log::info_span!(
                            "request",
                            request_id = %request_id,
                            method = %req.method(),
                            uri = %req.uri(),
                        )
                    }),
                )
                .layer(PropagateRequestIdLayer::x_request_id())
                .layer(CatchPanicLayer::new()),
        )
        .with_state(ctx)
}

/// Binds to the configured address and serves until `shutdown` resolves.
pub async fn serve<F>(config: &ServerConfig, ctx: Arc<Context>, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = config.addr();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to listen on {addr}"))?;
    run(listener, ctx, shutdown, config.shutdown_grace).await
}

/// Serves [`app`] on `listener` until `shutdown` resolves.
///
/// Once shutdown starts no new connections are accepted. Requests already in
/// flight get up to `grace` to finish. After that `ctx.abort` is cancelled,
/// which stops any assignment still running before it requests reviewers.
pub async fn run<F>(
    listener: TcpListener,
    ctx: Arc<Context>,
    shutdown: F,
    grace: Duration,
) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = listener.local_addr().context("listener has no local address")?;
    log::info!("serving webhooks on http://{addr}{WEBHOOK_PATH}");

    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        shutdown.await;
        trigger.cancel();
    });

    let abort = ctx.abort.clone();
    let server = axum::serve(listener, app(ctx))
        .with_graceful_shutdown(token.clone().cancelled_owned())
        .into_future();
    tokio::pin!(server);

    tokio::select! {
        res = &mut server => return res.context("server failed"),
        () = token.cancelled() => {}
    }

    log::info!(
        "shutting down, waiting up to {}s for in-flight requests",
        grace.as_secs()
    );
    match tokio::time::timeout(grace, &mut server).await {
        Ok(res) => res.context("server failed while shutting down")?,
        Err(_) => {
            log::warn!("shutdown deadline elapsed, abandoning requests still in flight");
            abort.cancel();
        }
    }
    log::info!("server stopped");
    Ok(())
}

/// Resolves on Ctrl-C, or SIGTERM on unix.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::error!("failed to listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                log::error!("failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
    log::info!("received shutdown signal");
}
