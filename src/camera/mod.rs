// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! Camera records and the RTSP ingestion worker.
//!
//! [`CameraState`] tracks where a camera sits in its lifecycle; an
//! `http_push` camera enters the registry already [`CameraState::Connected`]
//! and never leaves it until deregistered, while an `rtsp` camera is driven
//! through `Connecting`/`Connected`/`Disconnected` by [`worker::RtspWorker`].

pub mod session;
pub mod worker;

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::{IngestError, Result};
use crate::ring_buffer::RingBuffer;

/// Lifecycle state of one camera, as exposed on `GET /api/cameras` and the
/// `camera_state` gauge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CameraState {
    Registering,
    Connecting,
    Connected,
    Disconnected,
    Stopped,
}

impl CameraState {
    /// Integer encoding for the `camera_state` Prometheus gauge. Ordered by
    /// how "healthy" the state is; not meant to be compared for anything but
    /// dashboarding.
    pub fn as_gauge_value(&self) -> i64 {
        match self {
            CameraState::Registering => 0,
            CameraState::Connecting => 1,
            CameraState::Disconnected => 2,
            CameraState::Connected => 3,
            CameraState::Stopped => 4,
        }
    }
}

impl fmt::Display for CameraState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CameraState::Registering => write!(f, "registering"),
            CameraState::Connecting => write!(f, "connecting"),
            CameraState::Connected => write!(f, "connected"),
            CameraState::Disconnected => write!(f, "disconnected"),
            CameraState::Stopped => write!(f, "stopped"),
        }
    }
}

/// How a camera's frames arrive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    Rtsp,
    HttpPush,
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceType::Rtsp => write!(f, "rtsp"),
            SourceType::HttpPush => write!(f, "http_push"),
        }
    }
}

impl SourceType {
    pub fn parse(raw: &str) -> Result<Self> {
        match raw {
            "rtsp" => Ok(SourceType::Rtsp),
            "http_push" => Ok(SourceType::HttpPush),
            other => Err(IngestError::Validation(format!(
                "source_type must be 'rtsp' or 'http_push', got '{other}'"
            ))),
        }
    }
}

/// Request body for `POST /api/cameras`.
#[derive(Debug, Deserialize)]
pub struct CameraSpec {
    pub id: String,
    pub source_type: String,
    #[serde(default)]
    pub source_url: Option<String>,
    #[serde(default)]
    pub buffer_size: Option<usize>,
    /// Per-camera override of the process-wide motion threshold.
    #[serde(default)]
    pub motion_threshold: Option<u8>,
    /// Per-camera override of the process-wide minimum motion area fraction.
    #[serde(default)]
    pub motion_area_min: Option<f64>,
    /// Per-camera override of the process-wide motion cooldown, in seconds.
    #[serde(default)]
    pub motion_cooldown_secs: Option<f64>,
}

/// A registered camera: its identity, its ring buffer, and (for RTSP
/// cameras) the handle needed to stop its worker.
pub struct Camera {
    pub id: String,
    pub source_type: SourceType,
    pub source_url: Option<String>,
    pub buffer: Arc<RingBuffer>,
    state: std::sync::atomic::AtomicU8,
    seq_counter: AtomicU64,
    consecutive_decode_failures: AtomicU64,
    /// Capture timestamp of the most recently appended frame, if any.
    last_frame_at: Mutex<Option<f64>>,
}

impl Camera {
    pub fn new(id: String, source_type: SourceType, source_url: Option<String>, buffer_size: usize) -> Self {
        let initial = match source_type {
            SourceType::HttpPush => CameraState::Connected,
            SourceType::Rtsp => CameraState::Registering,
        };
        Self {
            id,
            source_type,
            source_url,
            buffer: Arc::new(RingBuffer::new(buffer_size)),
            state: std::sync::atomic::AtomicU8::new(encode_state(initial)),
            seq_counter: AtomicU64::new(0),
            consecutive_decode_failures: AtomicU64::new(0),
            last_frame_at: Mutex::new(None),
        }
    }

    pub fn state(&self) -> CameraState {
        decode_state(self.state.load(Ordering::Acquire))
    }

    pub fn set_state(&self, state: CameraState) {
        self.state.store(encode_state(state), Ordering::Release);
    }

    /// Atomically assign the next sequence number for an appended frame.
    pub fn next_seq(&self) -> u64 {
        self.seq_counter.fetch_add(1, Ordering::Relaxed)
    }

    pub fn record_decode_failure(&self) -> u64 {
        self.consecutive_decode_failures.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn reset_decode_failures(&self) {
        self.consecutive_decode_failures.store(0, Ordering::Relaxed);
    }

    /// Timestamp of the most recently appended frame, if any have arrived.
    pub fn last_frame_at(&self) -> Option<f64> {
        *self.last_frame_at.lock()
    }

    /// Record the capture timestamp of a frame just appended to the buffer.
    pub fn set_last_frame_at(&self, timestamp: f64) {
        *self.last_frame_at.lock() = Some(timestamp);
    }
}

fn encode_state(state: CameraState) -> u8 {
    state.as_gauge_value() as u8
}

fn decode_state(v: u8) -> CameraState {
    match v {
        0 => CameraState::Registering,
        1 => CameraState::Connecting,
        2 => CameraState::Disconnected,
        3 => CameraState::Connected,
        _ => CameraState::Stopped,
    }
}
