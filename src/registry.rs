// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! Camera Registry — the single coordinator for camera lifecycle.
//!
//! One `RwLock`-guarded map from id to entry, with `register`/`deregister`/
//! `list` as the only ways in or out. Registering an `rtsp` camera spawns
//! its [`RtspWorker`]; deregistering cancels the worker and waits briefly
//! for it to acknowledge before abandoning it.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::camera::session::SessionFactory;
use crate::camera::worker::RtspWorker;
use crate::camera::{Camera, CameraSpec, SourceType};
use crate::config::BUFFER_SIZE_RANGE;
use crate::error::{IngestError, Result};
use crate::event_bus::{EventBus, EventPublisher};
use crate::metrics::MetricsRegistry;
use crate::motion::{MotionConfig, MotionHandle};

/// How long `deregister` waits for a worker to exit cleanly before aborting
/// it. Matches the two-second cancellation acknowledgment budget.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Snapshot of one camera's public state, as returned by `list`/`register`.
#[derive(Debug, Clone, serde::Serialize)]
pub struct CameraSummary {
    pub id: String,
    pub source_type: String,
    pub state: String,
    pub last_frame_at: Option<f64>,
    pub fill: usize,
    pub buffer_capacity: usize,
}

/// A registered camera plus the bookkeeping needed to stop it. Every camera
/// gets a publish task (cancelled together with `publish_cancel`); `worker`
/// additionally holds the RTSP ingestion task, present only for `rtsp`
/// cameras.
struct CameraEntry {
    camera: Arc<Camera>,
    publisher: EventPublisher,
    publish_cancel: CancellationToken,
    worker: Option<JoinHandle<()>>,
}

pub struct CameraRegistry {
    cameras: RwLock<HashMap<String, CameraEntry>>,
    default_buffer_size: usize,
    factory: Arc<dyn SessionFactory>,
    metrics: Arc<MetricsRegistry>,
    bus: Arc<EventBus>,
    publish_queue_size: usize,
    motion: MotionHandle,
    default_motion: MotionConfig,
}

impl CameraRegistry {
    pub fn new(
        default_buffer_size: usize,
        factory: Arc<dyn SessionFactory>,
        metrics: Arc<MetricsRegistry>,
        bus: Arc<EventBus>,
        publish_queue_size: usize,
        motion: MotionHandle,
        default_motion: MotionConfig,
    ) -> Self {
        Self {
            cameras: RwLock::new(HashMap::new()),
            default_buffer_size,
            factory,
            metrics,
            bus,
            publish_queue_size,
            motion,
            default_motion,
        }
    }

    pub async fn register(&self, spec: CameraSpec) -> Result<CameraSummary> {
        if spec.id.trim().is_empty() {
            return Err(IngestError::Validation("id must not be empty".into()));
        }
        let source_type = SourceType::parse(&spec.source_type)?;
        let buffer_size = spec.buffer_size.unwrap_or(self.default_buffer_size);
        if !BUFFER_SIZE_RANGE.contains(&buffer_size) {
            return Err(IngestError::Validation(format!(
                "buffer_size must be in {}..={}",
                BUFFER_SIZE_RANGE.start(),
                BUFFER_SIZE_RANGE.end()
            )));
        }
        if source_type == SourceType::Rtsp && spec.source_url.as_deref().unwrap_or("").trim().is_empty() {
            return Err(IngestError::Validation("source_url is required for rtsp cameras".into()));
        }

        let mut guard = self.cameras.write().await;
        if guard.contains_key(&spec.id) {
            return Err(IngestError::Conflict { id: spec.id });
        }

        let camera = Arc::new(Camera::new(spec.id.clone(), source_type, spec.source_url.clone(), buffer_size));

        let publish_cancel = CancellationToken::new();
        let (publisher, _publish_task) =
            self.bus.spawn_publisher(spec.id.clone(), self.publish_queue_size, publish_cancel.clone());

        let worker = if source_type == SourceType::Rtsp {
            // Share one token: deregistering a camera stops its publisher and
            // its RTSP worker together.
            let rtsp_worker = RtspWorker::new(
                spec.id.clone(),
                spec.source_url.clone().unwrap_or_default(),
                camera.clone(),
                self.factory.clone(),
                self.metrics.clone(),
                publisher.clone(),
                self.motion.clone(),
                publish_cancel.clone(),
            );
            Some(tokio::spawn(rtsp_worker.run()))
        } else {
            None
        };

        if spec.motion_threshold.is_some() || spec.motion_area_min.is_some() || spec.motion_cooldown_secs.is_some() {
            let override_config = MotionConfig {
                threshold: spec.motion_threshold.unwrap_or(self.default_motion.threshold),
                area_min_fraction: spec.motion_area_min.unwrap_or(self.default_motion.area_min_fraction),
                cooldown_secs: spec.motion_cooldown_secs.unwrap_or(self.default_motion.cooldown_secs),
            };
            self.motion.configure(spec.id.clone(), override_config).await;
        }

        self.metrics.set_camera_state(&spec.id, camera.state());
        let summary = summarize(&spec.id, &camera);
        guard.insert(spec.id.clone(), CameraEntry { camera, publisher, publish_cancel, worker });
        Ok(summary)
    }

    /// The standing event publisher for a registered camera, used by the
    /// push-frame HTTP handler as well as the RTSP worker.
    pub async fn publisher(&self, id: &str) -> Result<EventPublisher> {
        let guard = self.cameras.read().await;
        guard.get(id).map(|e| e.publisher.clone()).ok_or_else(|| IngestError::NotFound { id: id.to_string() })
    }

    pub async fn list(&self) -> Vec<CameraSummary> {
        let guard = self.cameras.read().await;
        guard.iter().map(|(id, entry)| summarize(id, &entry.camera)).collect()
    }

    pub async fn get(&self, id: &str) -> Result<Arc<Camera>> {
        let guard = self.cameras.read().await;
        guard.get(id).map(|e| e.camera.clone()).ok_or_else(|| IngestError::NotFound { id: id.to_string() })
    }

    pub async fn deregister(&self, id: &str) -> Result<()> {
        let removed = {
            let mut guard = self.cameras.write().await;
            guard.remove(id)
        };
        let Some(entry) = removed else {
            return Err(IngestError::NotFound { id: id.to_string() });
        };

        entry.publish_cancel.cancel();
        if let Some(handle) = entry.worker {
            if tokio::time::timeout(SHUTDOWN_GRACE, handle).await.is_err() {
                warn!(camera_id = id, "worker did not stop within grace period, abandoning");
            }
        }

        self.metrics.remove_camera(id);
        info!(camera_id = id, "camera deregistered");
        Ok(())
    }
}

fn summarize(id: &str, camera: &Camera) -> CameraSummary {
    CameraSummary {
        id: id.to_string(),
        source_type: camera.source_type.to_string(),
        state: camera.state().to_string(),
        last_frame_at: camera.last_frame_at(),
        fill: camera.buffer.fill(),
        buffer_capacity: camera.buffer.capacity(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::session::fake::{FakeSessionFactory, Scripted};
    use crate::frame::DecodedImage;

    fn test_registry(factory: Arc<dyn SessionFactory>) -> CameraRegistry {
        let metrics = Arc::new(MetricsRegistry::new());
        let bus = Arc::new(EventBus::new("redis://127.0.0.1:9", metrics.clone()).unwrap());
        let motion = crate::motion::spawn(
            crate::motion::MotionConfig { threshold: 25, area_min_fraction: 0.005, cooldown_secs: 2.0 },
            metrics.clone(),
            {
                let cancel = CancellationToken::new();
                bus.spawn_publisher("_motion".to_string(), 16, cancel).0
            },
        );
        let default_motion = MotionConfig { threshold: 25, area_min_fraction: 0.005, cooldown_secs: 2.0 };
        CameraRegistry::new(100, factory, metrics, bus, 64, motion, default_motion)
    }

    fn spec(id: &str, source_type: &str, source_url: Option<&str>, buffer_size: Option<usize>) -> CameraSpec {
        CameraSpec {
            id: id.into(),
            source_type: source_type.into(),
            source_url: source_url.map(String::from),
            buffer_size,
            motion_threshold: None,
            motion_area_min: None,
            motion_cooldown_secs: None,
        }
    }

    #[tokio::test]
    async fn register_rejects_duplicate_id() {
        let factory = Arc::new(FakeSessionFactory::new(vec![Scripted::Frames(vec![])]));
        let registry = test_registry(factory);
        registry.register(spec("cam1", "http_push", None, None)).await.unwrap();
        let err = registry.register(spec("cam1", "http_push", None, None)).await.unwrap_err();
        assert!(matches!(err, IngestError::Conflict { .. }));
    }

    #[tokio::test]
    async fn register_rtsp_without_url_is_rejected() {
        let factory = Arc::new(FakeSessionFactory::new(vec![Scripted::Frames(vec![])]));
        let registry = test_registry(factory);
        let err = registry.register(spec("cam2", "rtsp", None, None)).await.unwrap_err();
        assert!(matches!(err, IngestError::Validation(_)));
    }

    #[tokio::test]
    async fn deregister_unknown_camera_returns_not_found() {
        let factory = Arc::new(FakeSessionFactory::new(vec![Scripted::Frames(vec![])]));
        let registry = test_registry(factory);
        let err = registry.deregister("missing").await.unwrap_err();
        assert!(matches!(err, IngestError::NotFound { .. }));
    }

    #[tokio::test]
    async fn rtsp_worker_ingests_frames_into_buffer() {
        let image = DecodedImage::new(2, 2, 1, vec![0, 0, 0, 0]);
        let factory = Arc::new(FakeSessionFactory::new(vec![Scripted::Frames(vec![image.clone(), image])]));
        let registry = test_registry(factory);
        registry
            .register(spec("cam3", "rtsp", Some("rtsp://example.invalid/stream"), Some(10)))
            .await
            .unwrap();

        let camera = registry.get("cam3").await.unwrap();
        for _ in 0..50 {
            if camera.buffer.fill() >= 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(camera.buffer.fill(), 2);
        assert!(camera.last_frame_at().is_some());

        registry.deregister("cam3").await.unwrap();
    }

    #[tokio::test]
    async fn per_camera_motion_override_is_accepted_at_registration() {
        let factory = Arc::new(FakeSessionFactory::new(vec![Scripted::Frames(vec![])]));
        let registry = test_registry(factory);
        let mut with_override = spec("cam4", "http_push", None, None);
        with_override.motion_threshold = Some(5);
        with_override.motion_cooldown_secs = Some(0.1);
        registry.register(with_override).await.unwrap();
        // No crash and the camera is registered; the effect of the override
        // (a lower threshold / shorter cooldown) is exercised in motion.rs's
        // own unit tests, which drive `process` directly.
        assert!(registry.get("cam4").await.is_ok());
    }
}
