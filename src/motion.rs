// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! Motion detection stage.
//!
//! Runs independently of the Ring Buffer and the Event Bus: a frame that
//! fails to make it into the motion stage (because its bounded input queue
//! is full) is still appended to the Ring Buffer and still published as
//! `frame.ingested` — only the motion-detection side effect is lost, and
//! only for that one frame.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::debug;

use crate::event_bus::{Event, EventPublisher};
use crate::frame::DecodedImage;
use crate::metrics::MetricsRegistry;

/// Input queue depth per camera; overflow silently drops the incoming frame
/// (the motion stage falls behind, nothing else does).
pub const DEFAULT_QUEUE_DEPTH: usize = 64;

struct Job {
    camera_id: String,
    image: DecodedImage,
    timestamp: f64,
}

enum Message {
    Frame(Job),
    Configure { camera_id: String, config: MotionConfig },
}

/// Per-camera reference state kept privately by the motion stage; never
/// visible outside this module.
struct CameraMotionState {
    previous_gray: Option<Vec<u8>>,
    width: u32,
    height: u32,
    last_event_at: Option<f64>,
}

/// Handle used by ingestion paths (RTSP worker, push sink) to hand frames to
/// the motion stage without blocking.
#[derive(Clone)]
pub struct MotionHandle {
    tx: mpsc::Sender<Message>,
}

impl MotionHandle {
    /// Enqueue a frame for motion analysis. Never blocks; drops the frame if
    /// the stage is backed up.
    pub fn submit(&self, camera_id: String, image: DecodedImage, timestamp: f64) {
        if self.tx.try_send(Message::Frame(Job { camera_id, image, timestamp })).is_err() {
            debug!("motion stage queue full, dropping frame");
        }
    }

    /// Install a per-camera override of the process-wide [`MotionConfig`].
    /// Awaits the send since this runs once at registration time, not on the
    /// hot ingest path.
    pub async fn configure(&self, camera_id: String, config: MotionConfig) {
        let _ = self.tx.send(Message::Configure { camera_id, config }).await;
    }
}

/// Tunables for motion detection. Resolved once at startup from
/// [`crate::config::Config`] as the process-wide default; `POST
/// /api/cameras` may override any field per camera via [`MotionHandle::configure`].
#[derive(Debug, Clone, Copy)]
pub struct MotionConfig {
    /// Per-pixel grayscale absolute-difference threshold.
    pub threshold: u8,
    /// Minimum fraction of pixels that must exceed `threshold` to emit
    /// `motion.detected`.
    pub area_min_fraction: f64,
    /// Minimum time between consecutive `motion.detected` events for the
    /// same camera.
    pub cooldown_secs: f64,
}

/// Spawns the motion-detection task and returns a handle to feed it frames.
pub fn spawn(config: MotionConfig, metrics: Arc<MetricsRegistry>, events: EventPublisher) -> MotionHandle {
    let (tx, rx) = mpsc::channel(DEFAULT_QUEUE_DEPTH);
    tokio::spawn(run(rx, config, metrics, events));
    MotionHandle { tx }
}

async fn run(
    mut rx: mpsc::Receiver<Message>,
    default_config: MotionConfig,
    metrics: Arc<MetricsRegistry>,
    events: EventPublisher,
) {
    let state: Mutex<HashMap<String, CameraMotionState>> = Mutex::new(HashMap::new());
    let overrides: Mutex<HashMap<String, MotionConfig>> = Mutex::new(HashMap::new());
    while let Some(message) = rx.recv().await {
        match message {
            Message::Frame(job) => {
                let config = overrides.lock().get(&job.camera_id).copied().unwrap_or(default_config);
                process(&state, &config, &metrics, &events, job);
            }
            Message::Configure { camera_id, config } => {
                overrides.lock().insert(camera_id, config);
            }
        }
    }
}

fn process(
    state: &Mutex<HashMap<String, CameraMotionState>>,
    config: &MotionConfig,
    metrics: &Arc<MetricsRegistry>,
    events: &EventPublisher,
    job: Job,
) {
    let gray = to_grayscale(&job.image);
    let mut guard = state.lock();
    let entry = guard.entry(job.camera_id.clone()).or_insert_with(|| CameraMotionState {
        previous_gray: None,
        width: job.image.width,
        height: job.image.height,
        last_event_at: None,
    });

    if entry.width != job.image.width || entry.height != job.image.height {
        // Dimension change: reset the reference frame without emitting.
        entry.width = job.image.width;
        entry.height = job.image.height;
        entry.previous_gray = Some(gray);
        return;
    }

    let Some(previous) = entry.previous_gray.replace(gray.clone()) else {
        // First frame for this camera: store as reference, no comparison yet.
        return;
    };

    let changed = previous
        .iter()
        .zip(gray.iter())
        .filter(|(a, b)| a.abs_diff(**b) > config.threshold)
        .count();
    let total = job.image.pixel_count().max(1);
    let fraction = changed as f64 / total as f64;

    if fraction < config.area_min_fraction {
        return;
    }

    if let Some(last) = entry.last_event_at {
        if job.timestamp - last < config.cooldown_secs {
            return;
        }
    }
    entry.last_event_at = Some(job.timestamp);
    drop(guard);

    metrics.motion_events_total.with_label_values(&[&job.camera_id]).inc();
    events.publish(Event::MotionDetected {
        camera_id: job.camera_id,
        timestamp: job.timestamp,
        area: changed as u64,
    });
}

fn to_grayscale(image: &DecodedImage) -> Vec<u8> {
    if image.channels == 1 {
        return image.pixels.clone();
    }
    let channels = image.channels as usize;
    image
        .pixels
        .chunks(channels)
        .map(|px| {
            let r = px[0] as u32;
            let g = *px.get(1).unwrap_or(&px[0]) as u32;
            let b = *px.get(2).unwrap_or(&px[0]) as u32;
            ((r * 299 + g * 587 + b * 114) / 1000) as u8
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::MetricsRegistry;

    fn image(w: u32, h: u32, fill: u8) -> DecodedImage {
        DecodedImage::new(w, h, 1, vec![fill; (w * h) as usize])
    }

    fn test_publisher() -> (EventPublisher, Arc<MetricsRegistry>) {
        let metrics = Arc::new(MetricsRegistry::new());
        let bus = crate::event_bus::EventBus::new("redis://127.0.0.1:9", metrics.clone()).unwrap();
        let cancel = tokio_util::sync::CancellationToken::new();
        let (publisher, _handle) = bus.spawn_publisher("cam1".to_string(), 16, cancel);
        (publisher, metrics)
    }

    #[test]
    fn first_frame_stores_reference_without_emitting() {
        let state: Mutex<HashMap<String, CameraMotionState>> = Mutex::new(HashMap::new());
        let (events, metrics) = test_publisher();
        let cfg = MotionConfig { threshold: 25, area_min_fraction: 0.005, cooldown_secs: 2.0 };
        process(&state, &cfg, &metrics, &events, Job { camera_id: "cam1".into(), image: image(4, 4, 10), timestamp: 0.0 });
        assert_eq!(metrics.motion_events_total.with_label_values(&["cam1"]).get(), 0);
    }

    #[test]
    fn large_change_emits_motion_event() {
        let state: Mutex<HashMap<String, CameraMotionState>> = Mutex::new(HashMap::new());
        let (events, metrics) = test_publisher();
        let cfg = MotionConfig { threshold: 25, area_min_fraction: 0.005, cooldown_secs: 2.0 };
        process(&state, &cfg, &metrics, &events, Job { camera_id: "cam1".into(), image: image(4, 4, 10), timestamp: 0.0 });
        process(&state, &cfg, &metrics, &events, Job { camera_id: "cam1".into(), image: image(4, 4, 250), timestamp: 1.0 });
        assert_eq!(metrics.motion_events_total.with_label_values(&["cam1"]).get(), 1);
    }

    #[test]
    fn cooldown_suppresses_second_event() {
        let state: Mutex<HashMap<String, CameraMotionState>> = Mutex::new(HashMap::new());
        let (events, metrics) = test_publisher();
        let cfg = MotionConfig { threshold: 25, area_min_fraction: 0.005, cooldown_secs: 2.0 };
        process(&state, &cfg, &metrics, &events, Job { camera_id: "cam1".into(), image: image(4, 4, 10), timestamp: 0.0 });
        process(&state, &cfg, &metrics, &events, Job { camera_id: "cam1".into(), image: image(4, 4, 250), timestamp: 1.0 });
        process(&state, &cfg, &metrics, &events, Job { camera_id: "cam1".into(), image: image(4, 4, 10), timestamp: 1.5 });
        assert_eq!(metrics.motion_events_total.with_label_values(&["cam1"]).get(), 1);
    }

    #[test]
    fn dimension_change_resets_without_emitting() {
        let state: Mutex<HashMap<String, CameraMotionState>> = Mutex::new(HashMap::new());
        let (events, metrics) = test_publisher();
        let cfg = MotionConfig { threshold: 25, area_min_fraction: 0.005, cooldown_secs: 2.0 };
        process(&state, &cfg, &metrics, &events, Job { camera_id: "cam1".into(), image: image(4, 4, 10), timestamp: 0.0 });
        process(&state, &cfg, &metrics, &events, Job { camera_id: "cam1".into(), image: image(8, 8, 250), timestamp: 1.0 });
        assert_eq!(metrics.motion_events_total.with_label_values(&["cam1"]).get(), 0);
    }

    #[tokio::test]
    async fn per_camera_override_lowers_effective_threshold() {
        let (events, metrics) = test_publisher();
        // Process-wide default is insensitive (huge threshold); cam1 is
        // overridden to the sensitive default used elsewhere in this file.
        let handle = spawn(
            MotionConfig { threshold: 250, area_min_fraction: 0.005, cooldown_secs: 2.0 },
            metrics.clone(),
            events,
        );
        handle
            .configure("cam1".to_string(), MotionConfig { threshold: 25, area_min_fraction: 0.005, cooldown_secs: 2.0 })
            .await;
        handle.submit("cam1".to_string(), image(4, 4, 10), 0.0);
        // Give the override time to land before the first frame is processed.
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        handle.submit("cam1".to_string(), image(4, 4, 250), 1.0);
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert_eq!(metrics.motion_events_total.with_label_values(&["cam1"]).get(), 1);
    }
}
