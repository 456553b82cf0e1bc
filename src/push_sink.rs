// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! `http_push` ingestion path: decodes a pushed JPEG/PNG frame and feeds it
//! through the same Ring Buffer / Motion Stage / Event Bus pipeline the RTSP
//! worker uses.

use std::sync::Arc;

use image::GenericImageView;

use crate::camera::{Camera, SourceType};
use crate::error::{IngestError, Result};
use crate::event_bus::{now_secs, Event, EventPublisher};
use crate::frame::{DecodedImage, Frame, FrameSource};
use crate::metrics::MetricsRegistry;
use crate::motion::MotionHandle;

/// Decode `bytes` (JPEG or PNG, sniffed by content) and append the result to
/// `camera`'s ring buffer, dispatching to motion detection and the event
/// bus. `timestamp` defaults to the current time when `None`.
pub fn ingest_push(
    camera: &Arc<Camera>,
    bytes: &[u8],
    timestamp: Option<f64>,
    metrics: &MetricsRegistry,
    events: &EventPublisher,
    motion: &MotionHandle,
) -> Result<u64> {
    if camera.source_type != SourceType::HttpPush {
        return Err(IngestError::WrongSourceType { id: camera.id.clone() });
    }

    let decoded = image::load_from_memory(bytes).map_err(|e| {
        metrics.decode_errors_total.with_label_values(&[&camera.id]).inc();
        IngestError::BadFrame(e.to_string())
    })?;

    let (width, height) = decoded.dimensions();
    let rgb = decoded.to_rgb8();
    let image = DecodedImage::new(width, height, 3, rgb.into_raw());

    let seq = camera.next_seq();
    let ts = timestamp.unwrap_or_else(now_secs);
    let frame = Frame { image: image.clone(), timestamp: ts, source: FrameSource::HttpPush, seq };
    camera.buffer.append(frame);
    camera.set_last_frame_at(ts);

    metrics.frames_ingested_total.with_label_values(&[&camera.id, "http_push"]).inc();
    metrics.ring_buffer_fill.with_label_values(&[&camera.id]).set(camera.buffer.fill() as i64);
    metrics
        .frame_ingest_latency_seconds
        .with_label_values(&[&camera.id])
        .observe((now_secs() - ts).max(0.0));

    events.publish(Event::FrameIngested {
        camera_id: camera.id.clone(),
        timestamp: ts,
        source: "http_push".into(),
        seq,
    });
    motion.submit(camera.id.clone(), image, ts);

    Ok(seq)
}
