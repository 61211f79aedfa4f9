//! muttercast-pipeline — local frame reception for muttercast.
//!
//! Owns the GStreamer pipeline that pulls raw video buffers off the
//! compositor's PipeWire stream and converts them for the host:
//!
//! ```text
//! pipewiresrc path=<node id>
//!       │
//!   video/x-raw
//!       │
//!     queue
//!       │
//!    appsink  ──new_sample──▶ decode ──▶ PipelineEvent::Frame ──▶ session worker
//!       │
//!  (bus watch) ──EOS/error──▶ PipelineEvent::Closed ───────────▶ session worker
//! ```
//!
//! The appsink runs bounded with drop-oldest overflow so a stalled consumer
//! sheds frames instead of backing up into the compositor.

mod format;

pub use format::{decode, map_format, FrameDescriptor, Timestamps};

use std::collections::HashSet;

use futures_util::StreamExt;
use gstreamer as gst;
use gstreamer::prelude::*;
use gstreamer_app::{AppSink, AppSinkCallbacks};
use gstreamer_video as gst_video;
use muttercast_core::{DecodeError, NormalizedFrame, SessionConfig, TransportError};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Bound on frames queued in the appsink before the oldest is dropped.
const MAX_QUEUED_BUFFERS: u32 = 8;

// ── Events & seam traits ──────────────────────────────────────────────────────

/// Events a pipeline delivers to its owning session worker.
#[derive(Debug)]
pub enum PipelineEvent {
    /// One decoded frame.
    Frame(NormalizedFrame),
    /// End of stream or fatal pipeline error; both end the session.
    Closed(Option<TransportError>),
}

/// Factory seam for the lifecycle controller; implemented by
/// [`GstTransport`] and by test mocks.
pub trait TransportBackend: Send + 'static {
    type Pipeline: TransportPipeline;

    /// Construct a receive pipeline bound to `node_id`, delivering events
    /// into `events`. Must be called within the session's runtime so the
    /// bus watch task can be spawned.
    fn attach(
        &mut self,
        node_id: u32,
        config: &SessionConfig,
        events: mpsc::Sender<PipelineEvent>,
    ) -> Result<Self::Pipeline, TransportError>;
}

/// A constructed pipeline, exclusively owned by one session.
pub trait TransportPipeline {
    fn start(&mut self) -> Result<(), TransportError>;

    /// Transition to null. Safe to call after an async pipeline error.
    fn stop(&mut self);
}

// ── GstTransport ──────────────────────────────────────────────────────────────

/// Builds `pipewiresrc` receive pipelines.
#[derive(Debug, Clone, Copy, Default)]
pub struct GstTransport;

impl TransportBackend for GstTransport {
    type Pipeline = GstPipeline;

    fn attach(
        &mut self,
        node_id: u32,
        config: &SessionConfig,
        events: mpsc::Sender<PipelineEvent>,
    ) -> Result<GstPipeline, TransportError> {
        gst::init().map_err(|e| TransportError::Construct { reason: e.to_string() })?;

        let sync = config.sync_to_clock;
        let mut description = format!(
            "pipewiresrc path={node_id} always-copy=true client-name=muttercast do-timestamp=true \
             ! video/x-raw"
        );
        if config.framerate_hint > 0 {
            description.push_str(&format!(
                " ! videorate ! video/x-raw,framerate={}/1",
                config.framerate_hint
            ));
        }
        description.push_str(&format!(
            " ! queue \
             ! appsink name=sink max-buffers={MAX_QUEUED_BUFFERS} drop=true sync={sync} emit-signals=false"
        ));
        debug!("gstreamer pipeline: {}", description);

        let pipeline = gst::parse::launch(&description)
            .map_err(|e| TransportError::Construct { reason: e.to_string() })?
            .downcast::<gst::Pipeline>()
            .map_err(|_| TransportError::Construct { reason: "not a pipeline".into() })?;

        let appsink = pipeline
            .by_name("sink")
            .and_then(|element| element.downcast::<AppSink>().ok())
            .ok_or_else(|| TransportError::Construct { reason: "no appsink".into() })?;

        let mut timestamps = Timestamps::new(config.timestamp_mode);
        let mut unsupported_seen: HashSet<String> = HashSet::new();
        let frame_tx = events.clone();

        appsink.set_callbacks(
            AppSinkCallbacks::builder()
                .new_sample(move |sink| {
                    let sample = sink.pull_sample().map_err(|_| gst::FlowError::Eos)?;
                    let Some(buffer) = sample.buffer() else {
                        return Ok(gst::FlowSuccess::Ok);
                    };
                    // Some compositors deliver transient empty buffers; skip
                    // them without raising an error.
                    if buffer.size() == 0 {
                        return Ok(gst::FlowSuccess::Ok);
                    }
                    let Some(caps) = sample.caps() else {
                        return Ok(gst::FlowSuccess::Ok);
                    };
                    let Ok(video_info) = gst_video::VideoInfo::from_caps(caps) else {
                        warn!("sample without parseable video caps skipped");
                        return Ok(gst::FlowSuccess::Ok);
                    };
                    let Ok(map) = buffer.map_readable() else {
                        return Ok(gst::FlowSuccess::Ok);
                    };

                    let timestamp = timestamps.next(buffer.pts().map(|t| t.nseconds()));
                    let descriptor = FrameDescriptor::from_video_info(&video_info, map.as_slice());

                    match decode(&descriptor, timestamp) {
                        Ok(frame) => {
                            if frame_tx.blocking_send(PipelineEvent::Frame(frame)).is_err() {
                                return Err(gst::FlowError::Flushing);
                            }
                        }
                        Err(DecodeError::UnsupportedFormat { format }) => {
                            if unsupported_seen.insert(format.clone()) {
                                error!("unsupported video format: {}", format);
                            }
                        }
                        Err(DecodeError::Malformed { reason }) => {
                            debug!("malformed frame dropped: {}", reason);
                        }
                    }
                    Ok(gst::FlowSuccess::Ok)
                })
                .build(),
        );

        let bus = pipeline
            .bus()
            .ok_or_else(|| TransportError::Construct { reason: "pipeline has no bus".into() })?;
        let mut messages = bus.stream();
        let bus_task = tokio::spawn(async move {
            while let Some(message) = messages.next().await {
                match message.view() {
                    gst::MessageView::Eos(_) => {
                        info!("pipeline end of stream");
                        let _ = events.send(PipelineEvent::Closed(None)).await;
                        break;
                    }
                    gst::MessageView::Error(e) => {
                        error!("pipeline error: {}", e.error());
                        let _ = events
                            .send(PipelineEvent::Closed(Some(TransportError::Runtime {
                                reason: e.error().to_string(),
                            })))
                            .await;
                        break;
                    }
                    _ => {}
                }
            }
        });

        Ok(GstPipeline { pipeline, bus_task })
    }
}

// ── GstPipeline ───────────────────────────────────────────────────────────────

/// A running (or stopped) receive pipeline.
pub struct GstPipeline {
    pipeline: gst::Pipeline,
    bus_task: tokio::task::JoinHandle<()>,
}

impl TransportPipeline for GstPipeline {
    fn start(&mut self) -> Result<(), TransportError> {
        self.pipeline
            .set_state(gst::State::Playing)
            .map(|_| ())
            .map_err(|e| TransportError::StateChange { reason: e.to_string() })
    }

    fn stop(&mut self) {
        if let Err(e) = self.pipeline.set_state(gst::State::Null) {
            warn!("pipeline shutdown: {}", e);
        }
        self.bus_task.abort();
    }
}

impl Drop for GstPipeline {
    fn drop(&mut self) {
        self.stop();
    }
}
