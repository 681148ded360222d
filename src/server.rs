//! HTTP surface.
//!
//! | Route | Handler |
//! |---|---|
//! | `POST /api/build` | `request_build`: 200 building, 202 queued, 409 conflict, 400 malformed JSON |
//! | `GET /api/build/status` | `build_status` |
//! | `OPTIONS /api/build` | answered by the CORS layer, 200 |
//! | `GET /*` | published site, when `server.serve_site` is on |
//!
//! Every response carries `Access-Control-Allow-Origin: *` because the CMS
//! editor runs on a different origin than the API. The CORS layer answers
//! any `OPTIONS` request itself, so no route handles preflight.

use crate::coordinator::BuildCoordinator;
use crate::output;
use crate::types::{BuildAcceptance, BuildRequest, BuildState};
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use std::net::SocketAddr;
use std::path::PathBuf;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

#[derive(Clone)]
pub struct AppState {
    pub coordinator: BuildCoordinator,
}

/// Build the router. `site_dir` is served as a fallback when given.
pub fn router(coordinator: BuildCoordinator, site_dir: Option<PathBuf>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    let api = Router::new()
        .route("/api/build", post(request_build))
        .route("/api/build/status", get(build_status))
        .with_state(AppState { coordinator });

    let app = match site_dir {
        Some(dir) => api.fallback_service(ServeDir::new(dir)),
        None => api,
    };

    app.layer(cors).layer(TraceLayer::new_for_http())
}

/// Parse a build request body. An empty body is an empty request, so a
/// plain "rebuild" POST works without a JSON content type.
fn parse_request(body: &[u8]) -> Result<BuildRequest, serde_json::Error> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(BuildRequest::default());
    }
    serde_json::from_slice(body)
}

async fn request_build(State(state): State<AppState>, body: Bytes) -> Response {
    let request = match parse_request(&body) {
        Ok(request) => request,
        Err(e) => {
            warn!(error = %e, "rejecting malformed build request");
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "status": "error", "message": e.to_string() })),
            )
                .into_response();
        }
    };

    match state.coordinator.request_build(request) {
        BuildAcceptance::Building { timestamp } => (
            StatusCode::OK,
            Json(json!({ "status": "building", "timestamp": timestamp })),
        )
            .into_response(),
        BuildAcceptance::Queued { queue_length } => (
            StatusCode::ACCEPTED,
            Json(json!({ "status": "queued", "queueLength": queue_length })),
        )
            .into_response(),
        BuildAcceptance::Conflict => (
            StatusCode::CONFLICT,
            Json(json!({ "status": "conflict" })),
        )
            .into_response(),
    }
}

async fn build_status(State(state): State<AppState>) -> Json<BuildState> {
    Json(state.coordinator.status())
}

/// Bind and serve until SIGINT/SIGTERM, then wait for any running build.
pub async fn serve(
    addr: SocketAddr,
    coordinator: BuildCoordinator,
    site_dir: Option<PathBuf>,
) -> std::io::Result<()> {
    let app = router(coordinator.clone(), site_dir);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let status = coordinator.status();
    if status.in_progress {
        info!(status = %output::format_status_line(&status), "waiting for running build");
        coordinator.wait_idle().await;
    }
    info!(status = %output::format_status_line(&coordinator.status()), "shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received");
}
