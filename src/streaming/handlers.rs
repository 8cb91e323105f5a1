use super::encode::CONTENT_TYPE;
use super::server::ServerState;
use super::session::{StreamMode, StreamSession};
use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use std::convert::Infallible;
use tracing::{error, info};

/// Annotated stream: detection, overlays and event recording
pub async fn annotated_stream_handler(
    State(state): State<ServerState>,
    Path(camera_id): Path<String>,
) -> Response {
    info!("Client connected to stream for camera {}", camera_id);
    let session = state.pipeline.open_stream(&camera_id, StreamMode::Annotated);
    multipart_response(session)
}

/// Raw stream without detection, for diagnostics
pub async fn raw_stream_handler(
    State(state): State<ServerState>,
    Path(camera_id): Path<String>,
) -> Response {
    info!("Client connected to raw stream for camera {}", camera_id);
    let session = state.pipeline.open_stream(&camera_id, StreamMode::Raw);
    multipart_response(session)
}

/// Wrap a session into a streaming body. Hyper drops the body when the
/// client goes away, which drops the session and releases its reader.
fn multipart_response(mut session: StreamSession) -> Response {
    let stream = async_stream::stream! {
        while let Some(part) = session.next_part().await {
            yield Ok::<_, Infallible>(part);
        }
    };

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, CONTENT_TYPE)
        .header(header::CACHE_CONTROL, "no-cache, no-store, must-revalidate")
        .header(header::PRAGMA, "no-cache")
        .header(header::EXPIRES, "0")
        .body(Body::from_stream(stream))
        .unwrap_or_else(|e| {
            error!("Failed to build stream response: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        })
}

/// Handler for health check endpoint
pub async fn health_handler(State(state): State<ServerState>) -> impl IntoResponse {
    let stats = state.pipeline.stats();
    let status = if state.pipeline.shutdown_coordinator().is_shutdown() {
        "shutting_down"
    } else {
        "healthy"
    };

    let mut health_info = serde_json::json!({
        "status": status,
        "pipeline": stats,
    });
    if let Some(components) = &state.components {
        health_info["components"] = serde_json::json!(components.snapshot().await);
    }

    (StatusCode::OK, axum::Json(health_info))
}
