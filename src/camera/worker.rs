// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! RTSP ingestion worker.
//!
//! Drives one camera through `Connecting → Connected → Disconnected →
//! Connecting`, with full-jitter exponential backoff between reconnect
//! attempts. Every suspension point (the backoff sleep, the next-frame
//! await) also races a [`CancellationToken`] so a stop request is honored
//! within the two-second acknowledgment budget instead of waiting out a
//! backoff or a stalled source.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::camera::session::SessionFactory;
use crate::camera::{Camera, CameraState};
use crate::event_bus::{now_secs, Event, EventPublisher};
use crate::frame::{Frame, FrameSource};
use crate::metrics::MetricsRegistry;
use crate::motion::MotionHandle;

const BACKOFF_BASE: Duration = Duration::from_secs(1);
const BACKOFF_CAP: Duration = Duration::from_secs(30);
const BACKOFF_FACTOR: u32 = 2;
const MAX_CONSECUTIVE_DECODE_FAILURES: u64 = 10;

/// Computes the next full-jitter backoff delay given the number of
/// consecutive failed attempts (1-indexed).
pub fn backoff_delay(attempt: u32) -> Duration {
    let exp = BACKOFF_FACTOR.saturating_pow(attempt.saturating_sub(1).min(16));
    let capped = BACKOFF_BASE.saturating_mul(exp).min(BACKOFF_CAP);
    let jittered_millis = rand::thread_rng().gen_range(0..=capped.as_millis().max(1) as u64);
    Duration::from_millis(jittered_millis)
}

pub struct RtspWorker {
    camera_id: String,
    url: String,
    camera: Arc<Camera>,
    factory: Arc<dyn SessionFactory>,
    metrics: Arc<MetricsRegistry>,
    events: EventPublisher,
    motion: MotionHandle,
    cancel: CancellationToken,
}

impl RtspWorker {
    pub fn new(
        camera_id: String,
        url: String,
        camera: Arc<Camera>,
        factory: Arc<dyn SessionFactory>,
        metrics: Arc<MetricsRegistry>,
        events: EventPublisher,
        motion: MotionHandle,
        cancel: CancellationToken,
    ) -> Self {
        Self { camera_id, url, camera, factory, metrics, events, motion, cancel }
    }

    pub async fn run(mut self) {
        let mut attempt: u32 = 0;

        'reconnect: loop {
            if self.cancel.is_cancelled() {
                break;
            }

            self.camera.set_state(CameraState::Connecting);
            self.metrics.set_camera_state(&self.camera_id, CameraState::Connecting);
            debug!(camera_id = %self.camera_id, attempt, "connecting");

            let session = tokio::select! {
                r = self.factory.connect(&self.url) => r,
                _ = self.cancel.cancelled() => break 'reconnect,
            };

            let mut session = match session {
                Ok(s) => s,
                Err(e) => {
                    attempt += 1;
                    self.metrics.rtsp_reconnects_total.with_label_values(&[&self.camera_id]).inc();
                    warn!(camera_id = %self.camera_id, attempt, error = %e, "connect failed");
                    self.enter_disconnected(&e.to_string());
                    if !self.sleep_backoff(attempt).await {
                        break 'reconnect;
                    }
                    continue 'reconnect;
                }
            };

            attempt = 0;
            self.camera.set_state(CameraState::Connected);
            self.metrics.set_camera_state(&self.camera_id, CameraState::Connected);
            self.camera.reset_decode_failures();
            self.events.publish(Event::CameraConnected { camera_id: self.camera_id.clone(), timestamp: now_secs() });
            info!(camera_id = %self.camera_id, "connected");

            loop {
                let frame = tokio::select! {
                    r = session.next_frame() => r,
                    _ = self.cancel.cancelled() => break 'reconnect,
                };

                match frame {
                    Ok(Some(image)) => {
                        self.camera.reset_decode_failures();
                        let seq = self.camera.next_seq();
                        let ts = now_secs();
                        let frame = Frame { image: image.clone(), timestamp: ts, source: FrameSource::Rtsp, seq };
                        self.camera.buffer.append(frame);
                        self.camera.set_last_frame_at(ts);
                        self.metrics
                            .frames_ingested_total
                            .with_label_values(&[&self.camera_id, "rtsp"])
                            .inc();
                        self.metrics
                            .ring_buffer_fill
                            .with_label_values(&[&self.camera_id])
                            .set(self.camera.buffer.fill() as i64);
                        self.metrics
                            .frame_ingest_latency_seconds
                            .with_label_values(&[&self.camera_id])
                            .observe((now_secs() - ts).max(0.0));
                        self.events.publish(Event::FrameIngested {
                            camera_id: self.camera_id.clone(),
                            timestamp: ts,
                            source: "rtsp".into(),
                            seq,
                        });
                        self.motion.submit(self.camera_id.clone(), image, ts);
                    }
                    Ok(None) => {
                        warn!(camera_id = %self.camera_id, "session ended (eos)");
                        self.enter_disconnected("stream ended");
                        attempt += 1;
                        if !self.sleep_backoff(attempt).await {
                            break 'reconnect;
                        }
                        continue 'reconnect;
                    }
                    Err(e) => {
                        let failures = self.camera.record_decode_failure();
                        self.metrics.decode_errors_total.with_label_values(&[&self.camera_id]).inc();
                        warn!(camera_id = %self.camera_id, error = %e, failures, "decode error");
                        if failures >= MAX_CONSECUTIVE_DECODE_FAILURES {
                            warn!(camera_id = %self.camera_id, "too many consecutive decode failures, reconnecting");
                            self.enter_disconnected(&e.to_string());
                            attempt += 1;
                            if !self.sleep_backoff(attempt).await {
                                break 'reconnect;
                            }
                            continue 'reconnect;
                        }
                    }
                }
            }
        }

        self.camera.set_state(CameraState::Stopped);
        self.metrics.set_camera_state(&self.camera_id, CameraState::Stopped);
        info!(camera_id = %self.camera_id, "worker stopped");
    }

    fn enter_disconnected(&self, reason: &str) {
        self.camera.set_state(CameraState::Disconnected);
        self.metrics.set_camera_state(&self.camera_id, CameraState::Disconnected);
        self.events.publish(Event::CameraDisconnected {
            camera_id: self.camera_id.clone(),
            reason: reason.to_string(),
            timestamp: now_secs(),
        });
    }

    /// Sleeps for the computed backoff delay, honoring cancellation. Returns
    /// `false` if the worker was cancelled mid-sleep.
    async fn sleep_backoff(&self, attempt: u32) -> bool {
        let delay = backoff_delay(attempt);
        debug!(camera_id = %self.camera_id, attempt, ?delay, "backing off before reconnect");
        tokio::select! {
            _ = tokio::time::sleep(delay) => true,
            _ = self.cancel.cancelled() => false,
        }
    }
}
