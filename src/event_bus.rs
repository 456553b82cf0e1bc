// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! Event Bus Adapter — publishes lifecycle and frame events to an external
//! pub/sub channel `camera:{camera_id}` per camera.
//!
//! Publishing is fire-and-forget from the caller's perspective: `publish`
//! enqueues onto a bounded per-camera queue and returns immediately. A
//! dedicated task per camera drains the queue and sends to Redis; under no
//! circumstance does a slow or unreachable bus stall the caller. On overflow
//! the *oldest* pending event is dropped, which is why this uses a small
//! hand-rolled deque instead of `tokio::sync::mpsc` (whose `try_send` only
//! ever rejects the newest item).

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::metrics::MetricsRegistry;

/// A lifecycle or frame event published to a camera's pub/sub channel.
#[derive(Debug, Clone)]
pub enum Event {
    CameraConnected { camera_id: String, timestamp: f64 },
    CameraDisconnected { camera_id: String, reason: String, timestamp: f64 },
    FrameIngested { camera_id: String, timestamp: f64, source: String, seq: u64 },
    MotionDetected { camera_id: String, timestamp: f64, area: u64 },
}

impl Event {
    pub fn camera_id(&self) -> &str {
        match self {
            Event::CameraConnected { camera_id, .. }
            | Event::CameraDisconnected { camera_id, .. }
            | Event::FrameIngested { camera_id, .. }
            | Event::MotionDetected { camera_id, .. } => camera_id,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Event::CameraConnected { .. } => "camera.connected",
            Event::CameraDisconnected { .. } => "camera.disconnected",
            Event::FrameIngested { .. } => "frame.ingested",
            Event::MotionDetected { .. } => "motion.detected",
        }
    }

    fn to_json(&self) -> serde_json::Value {
        #[derive(Serialize)]
        #[serde(untagged)]
        enum Payload<'a> {
            Connected { camera_id: &'a str, timestamp: f64 },
            Disconnected { camera_id: &'a str, reason: &'a str, timestamp: f64 },
            FrameIngested { camera_id: &'a str, timestamp: f64, source: &'a str, seq: u64 },
            MotionDetected { camera_id: &'a str, timestamp: f64, area: u64 },
        }

        let payload = match self {
            Event::CameraConnected { camera_id, timestamp } => {
                Payload::Connected { camera_id, timestamp: *timestamp }
            }
            Event::CameraDisconnected { camera_id, reason, timestamp } => {
                Payload::Disconnected { camera_id, reason, timestamp: *timestamp }
            }
            Event::FrameIngested { camera_id, timestamp, source, seq } => {
                Payload::FrameIngested { camera_id, timestamp: *timestamp, source, seq: *seq }
            }
            Event::MotionDetected { camera_id, timestamp, area } => {
                Payload::MotionDetected { camera_id, timestamp: *timestamp, area: *area }
            }
        };
        serde_json::to_value(payload).unwrap_or(serde_json::json!({}))
    }
}

/// Bounded drop-oldest queue shared between the enqueuing caller and the
/// per-camera publish task.
struct PendingQueue {
    items: Mutex<VecDeque<Event>>,
    capacity: usize,
    notify: Notify,
}

impl PendingQueue {
    fn new(capacity: usize) -> Self {
        Self { items: Mutex::new(VecDeque::with_capacity(capacity)), capacity, notify: Notify::new() }
    }

    /// Never blocks. Returns the dropped event, if any, so the caller can
    /// count it.
    fn push(&self, event: Event) -> Option<Event> {
        let mut guard = self.items.lock();
        let dropped = if guard.len() >= self.capacity { guard.pop_front() } else { None };
        guard.push_back(event);
        drop(guard);
        self.notify.notify_one();
        dropped
    }

    fn drain(&self) -> Vec<Event> {
        let mut guard = self.items.lock();
        guard.drain(..).collect()
    }
}

/// Per-camera publish handle. Cloning is cheap (shares the queue via `Arc`).
#[derive(Clone)]
pub struct EventPublisher {
    camera_id: String,
    queue: Arc<PendingQueue>,
    metrics: Arc<MetricsRegistry>,
}

impl EventPublisher {
    /// Enqueue `event` for publication. Fire-and-forget; never blocks.
    pub fn publish(&self, event: Event) {
        let type_name = event.type_name();
        if let Some(dropped) = self.queue.push(event) {
            debug!(camera_id = %self.camera_id, r#type = dropped.type_name(), "event queue full, dropped oldest");
            self.metrics
                .events_dropped_total
                .with_label_values(&[&self.camera_id, dropped.type_name()])
                .inc();
        }
        let _ = type_name;
    }
}

/// Publishes structured events to Redis pub/sub, one task per camera.
pub struct EventBus {
    client: redis::Client,
    metrics: Arc<MetricsRegistry>,
}

impl EventBus {
    pub fn new(redis_url: &str, metrics: Arc<MetricsRegistry>) -> crate::error::Result<Self> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| crate::error::IngestError::Config(format!("invalid REDIS_URL: {e}")))?;
        Ok(Self { client, metrics })
    }

    /// Spawn the publish task for one camera and return a handle callers use
    /// to enqueue events. The task exits when `cancel` is triggered and the
    /// queue has been drained (best-effort, bounded by the caller's wait).
    pub fn spawn_publisher(
        &self,
        camera_id: String,
        queue_capacity: usize,
        cancel: CancellationToken,
    ) -> (EventPublisher, tokio::task::JoinHandle<()>) {
        let queue = Arc::new(PendingQueue::new(queue_capacity));
        let publisher =
            EventPublisher { camera_id: camera_id.clone(), queue: queue.clone(), metrics: self.metrics.clone() };

        let client = self.client.clone();
        let metrics = self.metrics.clone();
        let handle = tokio::spawn(async move {
            publish_loop(camera_id, client, queue, metrics, cancel).await;
        });

        (publisher, handle)
    }
}

async fn publish_loop(
    camera_id: String,
    client: redis::Client,
    queue: Arc<PendingQueue>,
    metrics: Arc<MetricsRegistry>,
    cancel: CancellationToken,
) {
    let channel = format!("camera:{camera_id}");
    let mut conn: Option<redis::aio::ConnectionManager> = None;

    loop {
        tokio::select! {
            _ = queue.notify.notified() => {}
            _ = cancel.cancelled() => {
                // Drain whatever is left, best-effort, then exit.
                flush(&camera_id, &channel, &client, &mut conn, &queue, &metrics).await;
                return;
            }
        }
        flush(&camera_id, &channel, &client, &mut conn, &queue, &metrics).await;
    }
}

async fn flush(
    camera_id: &str,
    channel: &str,
    client: &redis::Client,
    conn: &mut Option<redis::aio::ConnectionManager>,
    queue: &Arc<PendingQueue>,
    metrics: &Arc<MetricsRegistry>,
) {
    for event in queue.drain() {
        let type_name = event.type_name();
        if conn.is_none() {
            match client.get_connection_manager().await {
                Ok(c) => *conn = Some(c),
                Err(e) => {
                    warn!(camera_id, error = %e, "bus unavailable, dropping event");
                    metrics.events_dropped_total.with_label_values(&[camera_id, type_name]).inc();
                    continue;
                }
            }
        }

        let payload = serde_json::to_string(&event.to_json()).unwrap_or_default();
        let result: redis::RedisResult<i64> = match conn.as_mut() {
            Some(c) => redis::cmd("PUBLISH").arg(channel).arg(&payload).query_async(c).await,
            None => continue,
        };

        match result {
            Ok(_) => {
                metrics.events_published_total.with_label_values(&[camera_id, type_name]).inc();
            }
            Err(e) => {
                warn!(camera_id, error = %e, "publish failed, dropping event and resetting connection");
                *conn = None;
                metrics.events_dropped_total.with_label_values(&[camera_id, type_name]).inc();
            }
        }
    }
}

/// Timestamp helper shared by ingestion paths that need "now" in the same
/// units as [`crate::frame::Frame::timestamp`] (seconds, f64).
pub fn now_secs() -> f64 {
    Utc::now().timestamp_millis() as f64 / 1000.0
}
