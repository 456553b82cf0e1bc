// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! RTSP session abstraction.
//!
//! [`RtspWorker`](super::worker::RtspWorker) depends only on the
//! [`SessionFactory`]/[`RtspSession`] traits, not on GStreamer directly, so
//! its reconnect state machine can be driven deterministically in tests with
//! [`FakeSessionFactory`] instead of a live RTSP source.

use async_trait::async_trait;
use gstreamer as gst;
use gstreamer::prelude::*;
use gstreamer_app as gst_app;
use tokio::sync::mpsc;

use crate::error::{IngestError, Result};
use crate::frame::DecodedImage;

/// One connected RTSP stream. Dropping it must tear down any underlying
/// pipeline/socket.
#[async_trait]
pub trait RtspSession: Send {
    /// Wait for the next decoded frame. `Ok(None)` means the session ended
    /// cleanly (EOS); `Err` means it failed and should be reconnected.
    async fn next_frame(&mut self) -> Result<Option<DecodedImage>>;
}

/// Opens [`RtspSession`]s for a given URL. Implemented once for production
/// (GStreamer) and once for tests ([`FakeSessionFactory`]).
#[async_trait]
pub trait SessionFactory: Send + Sync {
    async fn connect(&self, url: &str) -> Result<Box<dyn RtspSession>>;
}

/// GStreamer-backed production implementation: `rtspsrc ! decodebin !
/// videoconvert ! appsink`, decoding to raw RGB frames instead of remuxing
/// to MPEG-TS.
pub struct GstreamerSessionFactory;

#[async_trait]
impl SessionFactory for GstreamerSessionFactory {
    async fn connect(&self, url: &str) -> Result<Box<dyn RtspSession>> {
        gst::init().map_err(|e| IngestError::BadFrame(format!("gst::init: {e}")))?;

        let pipeline_str = format!(
            "rtspsrc location={url} latency=200 protocols=tcp ! \
             decodebin ! videoconvert ! video/x-raw,format=RGB ! \
             appsink name=sink emit-signals=true max-buffers=4 drop=true sync=false"
        );

        let pipeline = gst::parse::launch(&pipeline_str)
            .map_err(|e| IngestError::BadFrame(format!("parse_launch: {e}")))?
            .downcast::<gst::Pipeline>()
            .map_err(|_| IngestError::BadFrame("not a pipeline".into()))?;

        let appsink: gst_app::AppSink = pipeline
            .by_name("sink")
            .ok_or_else(|| IngestError::BadFrame("appsink not found".into()))?
            .downcast::<gst_app::AppSink>()
            .map_err(|_| IngestError::BadFrame("cast to AppSink failed".into()))?;

        let (tx, rx) = mpsc::channel::<DecodedImage>(4);
        appsink.set_callbacks(
            gst_app::AppSinkCallbacks::builder()
                .new_sample(move |sink| {
                    let sample = sink.pull_sample().map_err(|_| gst::FlowError::Error)?;
                    let buf = sample.buffer().ok_or(gst::FlowError::Error)?;
                    let caps = sample.caps().ok_or(gst::FlowError::Error)?;
                    let info =
                        gstreamer_video::VideoInfo::from_caps(caps).map_err(|_| gst::FlowError::Error)?;
                    let map = buf.map_readable().map_err(|_| gst::FlowError::Error)?;
                    let image = DecodedImage::new(
                        info.width(),
                        info.height(),
                        3,
                        map.as_slice().to_vec(),
                    );
                    let _ = tx.try_send(image);
                    Ok(gst::FlowSuccess::Ok)
                })
                .build(),
        );

        pipeline
            .set_state(gst::State::Playing)
            .map_err(|e| IngestError::BadFrame(format!("set_state Playing: {e}")))?;

        Ok(Box::new(GstreamerSession { pipeline, rx }))
    }
}

struct GstreamerSession {
    pipeline: gst::Pipeline,
    rx: mpsc::Receiver<DecodedImage>,
}

#[async_trait]
impl RtspSession for GstreamerSession {
    async fn next_frame(&mut self) -> Result<Option<DecodedImage>> {
        Ok(self.rx.recv().await)
    }
}

impl Drop for GstreamerSession {
    fn drop(&mut self) {
        let _ = self.pipeline.set_state(gst::State::Null);
    }
}

#[cfg(any(test, feature = "test-support"))]
pub mod fake {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::sync::Mutex as AsyncMutex;

    /// A scripted outcome for one `connect()` call.
    pub enum Scripted {
        /// Connect succeeds and yields these frames, then ends cleanly (EOS).
        Frames(Vec<DecodedImage>),
        /// Connect itself fails.
        ConnectError,
        /// Connect succeeds but the session errors after yielding `usize`
        /// frames.
        FailAfter(Vec<DecodedImage>),
    }

    /// Replays a fixed script of connect outcomes, one per call, for
    /// deterministic state-machine tests. The last entry repeats once
    /// exhausted.
    pub struct FakeSessionFactory {
        script: Vec<Arc<Scripted>>,
        cursor: AtomicUsize,
    }

    impl FakeSessionFactory {
        pub fn new(script: Vec<Scripted>) -> Self {
            Self { script: script.into_iter().map(Arc::new).collect(), cursor: AtomicUsize::new(0) }
        }
    }

    #[async_trait]
    impl SessionFactory for FakeSessionFactory {
        async fn connect(&self, _url: &str) -> Result<Box<dyn RtspSession>> {
            let i = self.cursor.fetch_add(1, Ordering::SeqCst).min(self.script.len() - 1);
            match self.script[i].as_ref() {
                Scripted::ConnectError => Err(IngestError::BadFrame("fake connect failure".into())),
                Scripted::Frames(frames) => Ok(Box::new(FakeSession {
                    remaining: AsyncMutex::new(frames.clone()),
                    fail_at_end: false,
                })),
                Scripted::FailAfter(frames) => Ok(Box::new(FakeSession {
                    remaining: AsyncMutex::new(frames.clone()),
                    fail_at_end: true,
                })),
            }
        }
    }

    struct FakeSession {
        remaining: AsyncMutex<Vec<DecodedImage>>,
        fail_at_end: bool,
    }

    #[async_trait]
    impl RtspSession for FakeSession {
        async fn next_frame(&mut self) -> Result<Option<DecodedImage>> {
            let mut guard = self.remaining.lock().await;
            if guard.is_empty() {
                return if self.fail_at_end {
                    Err(IngestError::BadFrame("fake session failure".into()))
                } else {
                    Ok(None)
                };
            }
            Ok(Some(guard.remove(0)))
        }
    }
}
