// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! HTTP API.
//!
//! Endpoints:
//!   POST   /api/cameras                        → register a camera
//!   GET    /api/cameras                         → list registered cameras
//!   DELETE /api/cameras/{id}                    → deregister a camera
//!   GET    /api/cameras/{id}/frame/latest       → latest frame, JPEG
//!   POST   /api/ingest/push/{id}                → push a frame (multipart)
//!   GET    /metrics                              → Prometheus exposition
//!   GET    /healthz                              → liveness probe

use std::io::Cursor;
use std::sync::Arc;

use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use image::ImageFormat;
use tower_http::cors::CorsLayer;
use tracing::warn;

use crate::camera::CameraSpec;
use crate::error::{IngestError, Result};
use crate::metrics::MetricsRegistry;
use crate::motion::MotionHandle;
use crate::registry::{CameraRegistry, CameraSummary};

/// Shared state passed to all handlers.
pub struct AppState {
    pub registry: Arc<CameraRegistry>,
    pub metrics: Arc<MetricsRegistry>,
    pub motion: MotionHandle,
}

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/cameras", get(handle_list_cameras).post(handle_register_camera))
        .route("/api/cameras/{id}", delete(handle_deregister_camera))
        .route("/api/cameras/{id}/frame/latest", get(handle_latest_frame))
        .route("/api/ingest/push/{id}", post(handle_push_frame))
        .route("/metrics", get(handle_metrics))
        .route("/healthz", get(handle_healthz))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn start_server(state: Arc<AppState>, bind_addr: &str) -> Result<()> {
    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(bind_addr)
        .await
        .map_err(|e| IngestError::Config(format!("failed to bind {bind_addr}: {e}")))?;
    tracing::info!(bind_addr, "HTTP API listening");
    axum::serve(listener, app).await.map_err(IngestError::Io)
}

async fn handle_register_camera(
    State(state): State<Arc<AppState>>,
    Json(spec): Json<CameraSpec>,
) -> impl IntoResponse {
    match state.registry.register(spec).await {
        Ok(summary) => (StatusCode::CREATED, Json(summary)).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn handle_list_cameras(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let cameras: Vec<CameraSummary> = state.registry.list().await;
    (StatusCode::OK, Json(serde_json::json!({ "cameras": cameras, "total": cameras.len() })))
}

async fn handle_deregister_camera(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.registry.deregister(&id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => e.into_response(),
    }
}

async fn handle_latest_frame(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let camera = match state.registry.get(&id).await {
        Ok(c) => c,
        Err(e) => return e.into_response(),
    };
    let Some(frame) = camera.buffer.latest() else {
        return IngestError::NoFrameYet { id }.into_response();
    };

    let img = match image::RgbImage::from_raw(
        frame.image.width,
        frame.image.height,
        frame.image.pixels.clone(),
    ) {
        Some(img) => img,
        None => return IngestError::BadFrame("stored frame has inconsistent dimensions".into()).into_response(),
    };

    let mut buf = Cursor::new(Vec::new());
    if let Err(e) = image::DynamicImage::ImageRgb8(img).write_to(&mut buf, ImageFormat::Jpeg) {
        warn!(camera_id = %id, error = %e, "jpeg re-encode failed");
        return IngestError::BadFrame(e.to_string()).into_response();
    }

    (StatusCode::OK, [("content-type", "image/jpeg")], buf.into_inner()).into_response()
}

async fn handle_push_frame(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    mut multipart: Multipart,
) -> impl IntoResponse {
    let camera = match state.registry.get(&id).await {
        Ok(c) => c,
        Err(e) => return e.into_response(),
    };

    let mut bytes: Option<Vec<u8>> = None;
    let mut timestamp: Option<f64> = None;

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(f)) => f,
            Ok(None) => break,
            Err(e) => return IngestError::Validation(e.to_string()).into_response(),
        };
        match field.name() {
            Some("frame_file") => match field.bytes().await {
                Ok(b) => bytes = Some(b.to_vec()),
                Err(e) => return IngestError::Validation(e.to_string()).into_response(),
            },
            Some("timestamp") => match field.text().await {
                Ok(t) => {
                    timestamp = t.trim().parse::<f64>().ok();
                }
                Err(e) => return IngestError::Validation(e.to_string()).into_response(),
            },
            _ => {}
        }
    }

    let Some(bytes) = bytes else {
        return IngestError::Validation("multipart field 'frame_file' is required".into()).into_response();
    };

    let publisher = match state.registry.publisher(&id).await {
        Ok(p) => p,
        Err(e) => return e.into_response(),
    };

    match crate::push_sink::ingest_push(&camera, &bytes, timestamp, &state.metrics, &publisher, &state.motion) {
        Ok(seq) => (StatusCode::ACCEPTED, Json(serde_json::json!({ "seq": seq }))).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn handle_metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    (StatusCode::OK, [("content-type", "text/plain; version=0.0.4")], state.metrics.render())
}

async fn handle_healthz() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({"status": "ok"})))
}
