// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! The normalized frame representation shared by every ingestion path.
//!
//! A [`Frame`] is the unit the Ring Buffer, Motion Stage, and Event Bus all
//! operate on. Once built it is immutable and handed around as `Arc<Frame>`
//! so that readers never alias a producer's scratch buffer.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Where a frame originated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameSource {
    Rtsp,
    HttpPush,
}

impl fmt::Display for FrameSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameSource::Rtsp => write!(f, "rtsp"),
            FrameSource::HttpPush => write!(f, "http_push"),
        }
    }
}

/// A decoded image: row-major pixel matrix, width × height × channels.
///
/// Channels are always 8-bit and either 1 (grayscale) or 3 (RGB) wide; the
/// decode paths in [`crate::push_sink`] and the RTSP session backend only
/// ever produce 3-channel RGB images, but the motion stage stores a
/// 1-channel grayscale derivative internally using the same type.
#[derive(Debug, Clone)]
pub struct DecodedImage {
    pub width: u32,
    pub height: u32,
    pub channels: u8,
    pub pixels: Vec<u8>,
}

impl DecodedImage {
    pub fn new(width: u32, height: u32, channels: u8, pixels: Vec<u8>) -> Self {
        debug_assert_eq!(pixels.len(), width as usize * height as usize * channels as usize);
        Self { width, height, channels, pixels }
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

/// One normalized frame in a camera's history.
#[derive(Debug, Clone)]
pub struct Frame {
    pub image: DecodedImage,
    /// Capture timestamp in seconds. Monotonic per camera except across an
    /// RTSP reconnect, where a gap is allowed.
    pub timestamp: f64,
    pub source: FrameSource,
    /// Monotonic per camera, starting at 0.
    pub seq: u64,
}
