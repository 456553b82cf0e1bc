// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! Process-wide metrics registry, constructed once at startup and shared via
//! `Arc` — not an ambient singleton, matching the Registry/ChunkPool
//! construction style used everywhere else in this service.

use prometheus::{
    HistogramVec, IntCounterVec, IntGaugeVec, Opts, Registry, TextEncoder,
};

use crate::camera::CameraState;

pub struct MetricsRegistry {
    registry: Registry,
    pub frames_ingested_total: IntCounterVec,
    pub decode_errors_total: IntCounterVec,
    pub motion_events_total: IntCounterVec,
    pub events_published_total: IntCounterVec,
    pub events_dropped_total: IntCounterVec,
    pub rtsp_reconnects_total: IntCounterVec,
    pub camera_state: IntGaugeVec,
    pub ring_buffer_fill: IntGaugeVec,
    pub frame_ingest_latency_seconds: HistogramVec,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        let registry = Registry::new();

        let frames_ingested_total = IntCounterVec::new(
            Opts::new("frames_ingested_total", "Frames appended to a camera's ring buffer"),
            &["camera_id", "source"],
        )
        .unwrap();
        let decode_errors_total = IntCounterVec::new(
            Opts::new("decode_errors_total", "Frame decode failures"),
            &["camera_id"],
        )
        .unwrap();
        let motion_events_total = IntCounterVec::new(
            Opts::new("motion_events_total", "motion.detected events emitted"),
            &["camera_id"],
        )
        .unwrap();
        let events_published_total = IntCounterVec::new(
            Opts::new("events_published_total", "Events successfully published to the bus"),
            &["camera_id", "type"],
        )
        .unwrap();
        let events_dropped_total = IntCounterVec::new(
            Opts::new("events_dropped_total", "Events dropped due to a full publish queue"),
            &["camera_id", "type"],
        )
        .unwrap();
        let rtsp_reconnects_total = IntCounterVec::new(
            Opts::new("rtsp_reconnects_total", "RTSP reconnect attempts"),
            &["camera_id"],
        )
        .unwrap();
        let camera_state = IntGaugeVec::new(
            Opts::new("camera_state", "Current lifecycle state, encoded as an integer"),
            &["camera_id"],
        )
        .unwrap();
        let ring_buffer_fill = IntGaugeVec::new(
            Opts::new("ring_buffer_fill", "Frames currently held in a camera's ring buffer"),
            &["camera_id"],
        )
        .unwrap();
        let frame_ingest_latency_seconds = HistogramVec::new(
            prometheus::HistogramOpts::new(
                "frame_ingest_latency_seconds",
                "Capture timestamp to ring-buffer-append latency",
            ),
            &["camera_id"],
        )
        .unwrap();

        registry.register(Box::new(frames_ingested_total.clone())).unwrap();
        registry.register(Box::new(decode_errors_total.clone())).unwrap();
        registry.register(Box::new(motion_events_total.clone())).unwrap();
        registry.register(Box::new(events_published_total.clone())).unwrap();
        registry.register(Box::new(events_dropped_total.clone())).unwrap();
        registry.register(Box::new(rtsp_reconnects_total.clone())).unwrap();
        registry.register(Box::new(camera_state.clone())).unwrap();
        registry.register(Box::new(ring_buffer_fill.clone())).unwrap();
        registry.register(Box::new(frame_ingest_latency_seconds.clone())).unwrap();

        MetricsRegistry {
            registry,
            frames_ingested_total,
            decode_errors_total,
            motion_events_total,
            events_published_total,
            events_dropped_total,
            rtsp_reconnects_total,
            camera_state,
            ring_buffer_fill,
            frame_ingest_latency_seconds,
        }
    }

    /// Encode all registered metrics in Prometheus text exposition format.
    pub fn render(&self) -> String {
        let encoder = TextEncoder::new();
        let families = self.registry.gather();
        encoder.encode_to_string(&families).unwrap_or_default()
    }

    pub fn set_camera_state(&self, camera_id: &str, state: CameraState) {
        self.camera_state.with_label_values(&[camera_id]).set(state.as_gauge_value());
    }

    /// Remove all series for a camera that has been deregistered so stale
    /// labels don't linger forever in the exposition output.
    pub fn remove_camera(&self, camera_id: &str) {
        let _ = self.frames_ingested_total.remove_label_values(&[camera_id, "rtsp"]);
        let _ = self.frames_ingested_total.remove_label_values(&[camera_id, "http_push"]);
        let _ = self.decode_errors_total.remove_label_values(&[camera_id]);
        let _ = self.motion_events_total.remove_label_values(&[camera_id]);
        let _ = self.rtsp_reconnects_total.remove_label_values(&[camera_id]);
        let _ = self.camera_state.remove_label_values(&[camera_id]);
        let _ = self.ring_buffer_fill.remove_label_values(&[camera_id]);
        for ty in ["camera.connected", "camera.disconnected", "frame.ingested", "motion.detected"] {
            let _ = self.events_published_total.remove_label_values(&[camera_id, ty]);
            let _ = self.events_dropped_total.remove_label_values(&[camera_id, ty]);
        }
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_includes_registered_families() {
        let m = MetricsRegistry::new();
        m.frames_ingested_total.with_label_values(&["cam1", "rtsp"]).inc();
        let text = m.render();
        assert!(text.contains("frames_ingested_total"));
        assert!(text.contains("cam1"));
    }

    #[test]
    fn camera_state_gauge_reflects_enum() {
        let m = MetricsRegistry::new();
        m.set_camera_state("cam1", CameraState::Connected);
        let text = m.render();
        assert!(text.contains("camera_state"));
    }
}
