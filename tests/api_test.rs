// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! End-to-end HTTP API tests driven through the router directly (no socket
//! bind), exercising registration, listing, push ingestion, and the latest
//! frame endpoint against a fake RTSP session factory.

use std::sync::Arc;

use camera_ingest::api::{build_router, AppState};
use camera_ingest::camera::session::fake::{FakeSessionFactory, Scripted};
use camera_ingest::event_bus::EventBus;
use camera_ingest::metrics::MetricsRegistry;
use camera_ingest::motion::{self, MotionConfig};
use camera_ingest::registry::CameraRegistry;
use http_body_util::BodyExt;
use tower::ServiceExt;

fn test_state() -> Arc<AppState> {
    let metrics = Arc::new(MetricsRegistry::new());
    let bus = Arc::new(EventBus::new("redis://127.0.0.1:9", metrics.clone()).unwrap());
    let cancel = tokio_util::sync::CancellationToken::new();
    let (publisher, _h) = bus.spawn_publisher("_motion".to_string(), 16, cancel);
    let motion = motion::spawn(
        MotionConfig { threshold: 25, area_min_fraction: 0.005, cooldown_secs: 2.0 },
        metrics.clone(),
        publisher,
    );
    let factory = Arc::new(FakeSessionFactory::new(vec![Scripted::Frames(vec![])]));
    let default_motion = MotionConfig { threshold: 25, area_min_fraction: 0.005, cooldown_secs: 2.0 };
    let registry =
        Arc::new(CameraRegistry::new(100, factory, metrics.clone(), bus, 64, motion.clone(), default_motion));
    Arc::new(AppState { registry, metrics, motion })
}

fn png_bytes() -> Vec<u8> {
    let img = image::RgbImage::from_pixel(4, 4, image::Rgb([20, 20, 20]));
    let mut buf = std::io::Cursor::new(Vec::new());
    image::DynamicImage::ImageRgb8(img).write_to(&mut buf, image::ImageFormat::Png).unwrap();
    buf.into_inner()
}

#[tokio::test]
async fn register_list_and_deregister_camera() {
    let state = test_state();
    let app = build_router(state);

    let register = axum::http::Request::builder()
        .method("POST")
        .uri("/api/cameras")
        .header("content-type", "application/json")
        .body(axum::body::Body::from(
            serde_json::json!({"id": "cam1", "source_type": "http_push"}).to_string(),
        ))
        .unwrap();
    let resp = app.clone().oneshot(register).await.unwrap();
    assert_eq!(resp.status(), axum::http::StatusCode::CREATED);

    let list = axum::http::Request::builder().uri("/api/cameras").body(axum::body::Body::empty()).unwrap();
    let resp = app.clone().oneshot(list).await.unwrap();
    assert_eq!(resp.status(), axum::http::StatusCode::OK);
    let body = resp.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["total"], 1);

    let delete = axum::http::Request::builder()
        .method("DELETE")
        .uri("/api/cameras/cam1")
        .body(axum::body::Body::empty())
        .unwrap();
    let resp = app.clone().oneshot(delete).await.unwrap();
    assert_eq!(resp.status(), axum::http::StatusCode::NO_CONTENT);

    let delete_again = axum::http::Request::builder()
        .method("DELETE")
        .uri("/api/cameras/cam1")
        .body(axum::body::Body::empty())
        .unwrap();
    let resp = app.oneshot(delete_again).await.unwrap();
    assert_eq!(resp.status(), axum::http::StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn duplicate_registration_returns_conflict() {
    let state = test_state();
    let app = build_router(state);

    let body = serde_json::json!({"id": "cam2", "source_type": "http_push"}).to_string();
    let make_req = || {
        axum::http::Request::builder()
            .method("POST")
            .uri("/api/cameras")
            .header("content-type", "application/json")
            .body(axum::body::Body::from(body.clone()))
            .unwrap()
    };

    let first = app.clone().oneshot(make_req()).await.unwrap();
    assert_eq!(first.status(), axum::http::StatusCode::CREATED);
    let second = app.oneshot(make_req()).await.unwrap();
    assert_eq!(second.status(), axum::http::StatusCode::CONFLICT);
}

#[tokio::test]
async fn latest_frame_is_404_before_any_push() {
    let state = test_state();
    let app = build_router(state);

    let register = axum::http::Request::builder()
        .method("POST")
        .uri("/api/cameras")
        .header("content-type", "application/json")
        .body(axum::body::Body::from(
            serde_json::json!({"id": "cam3", "source_type": "http_push"}).to_string(),
        ))
        .unwrap();
    app.clone().oneshot(register).await.unwrap();

    let latest = axum::http::Request::builder()
        .uri("/api/cameras/cam3/frame/latest")
        .body(axum::body::Body::empty())
        .unwrap();
    let resp = app.oneshot(latest).await.unwrap();
    assert_eq!(resp.status(), axum::http::StatusCode::CONFLICT);
}

#[tokio::test]
async fn push_then_read_latest_frame_round_trips() {
    let state = test_state();
    let app = build_router(state);

    let register = axum::http::Request::builder()
        .method("POST")
        .uri("/api/cameras")
        .header("content-type", "application/json")
        .body(axum::body::Body::from(
            serde_json::json!({"id": "cam4", "source_type": "http_push"}).to_string(),
        ))
        .unwrap();
    app.clone().oneshot(register).await.unwrap();

    let boundary = "X-TEST-BOUNDARY";
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
    body.extend_from_slice(b"Content-Disposition: form-data; name=\"frame_file\"; filename=\"f.png\"\r\n");
    body.extend_from_slice(b"Content-Type: image/png\r\n\r\n");
    body.extend_from_slice(&png_bytes());
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());

    let push = axum::http::Request::builder()
        .method("POST")
        .uri("/api/ingest/push/cam4")
        .header("content-type", format!("multipart/form-data; boundary={boundary}"))
        .body(axum::body::Body::from(body))
        .unwrap();
    let resp = app.clone().oneshot(push).await.unwrap();
    assert_eq!(resp.status(), axum::http::StatusCode::ACCEPTED);

    let list = axum::http::Request::builder().uri("/api/cameras").body(axum::body::Body::empty()).unwrap();
    let resp = app.clone().oneshot(list).await.unwrap();
    let body = resp.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    let cam4 = &json["cameras"][0];
    assert_eq!(cam4["id"], "cam4");
    assert_eq!(cam4["fill"], 1);
    assert!(cam4["last_frame_at"].is_number());

    let latest = axum::http::Request::builder()
        .uri("/api/cameras/cam4/frame/latest")
        .body(axum::body::Body::empty())
        .unwrap();
    let resp = app.oneshot(latest).await.unwrap();
    assert_eq!(resp.status(), axum::http::StatusCode::OK);
    assert_eq!(resp.headers().get("content-type").unwrap(), "image/jpeg");
}

#[tokio::test]
async fn metrics_and_healthz_endpoints_respond() {
    let state = test_state();
    let app = build_router(state);

    let metrics = axum::http::Request::builder().uri("/metrics").body(axum::body::Body::empty()).unwrap();
    let resp = app.clone().oneshot(metrics).await.unwrap();
    assert_eq!(resp.status(), axum::http::StatusCode::OK);

    let healthz = axum::http::Request::builder().uri("/healthz").body(axum::body::Body::empty()).unwrap();
    let resp = app.oneshot(healthz).await.unwrap();
    assert_eq!(resp.status(), axum::http::StatusCode::OK);
}
