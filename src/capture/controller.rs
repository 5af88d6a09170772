use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::Local;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use crate::audio::graph::{AudioGraph, CaptureSink};
use crate::capture::clip::{clip_path, suggested_filename, ClipHandle};
use crate::capture::format::{negotiate, preference_order, OutputFormat};
use crate::capture::recorder::{write_staging, CapturedAudio, EncoderBackend, Recorder, RecorderEvent, RecorderSpec};
use crate::clock::Clock;
use crate::config::{CaptureConfig, CANVAS_HEIGHT, CANVAS_WIDTH, ENCODER_FPS};
use crate::error::{ReelError, Result, RuntimeCaptureError, StateError};
use crate::render::frame::Frame;
use crate::trim::TrimWindow;

/// Capture lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    Idle,
    Recording,
    Finalizing,
    Ready,
    Failed,
}

impl fmt::Display for CaptureState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Recording => "recording",
            Self::Finalizing => "finalizing",
            Self::Ready => "ready",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Why the last attempt ended in `Failed`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureFailure {
    /// User-facing message
    pub message: String,
    /// Whether offering a retry makes sense
    pub recoverable: bool,
}

/// Everything owned by one recording attempt
struct RecordingSession {
    format: &'static OutputFormat,
    recorder: Box<dyn Recorder>,
    events: mpsc::UnboundedReceiver<RecorderEvent>,
    /// Encoded data in arrival order
    chunks: Vec<Vec<u8>>,
    sink: CaptureSink,
    audio: CapturedAudio,
    title: String,
    start_offset: f64,
    cap_seconds: f64,
    started_at: f64,
    elapsed: f64,
    /// Latest render surface; repeated for slots the live loop missed
    last_frame: Vec<u8>,
    /// Frame slots handed to the encoder so far
    frames_encoded: u64,
    pushes_deferred: u64,
    finalize: Option<oneshot::Receiver<Result<ClipHandle>>>,
}

impl RecordingSession {
    /// Hand the latest frame to the encoder until `due` slots are filled.
    ///
    /// Without `wait` a full encoder queue leaves the remaining slots for the
    /// next call.
    fn fill_slots(&mut self, due: u64, wait: bool) -> Result<()> {
        while self.frames_encoded < due {
            if wait {
                self.recorder.push_frame_blocking(&self.last_frame)?;
            } else if !self.recorder.push_frame(&self.last_frame)? {
                self.pushes_deferred += 1;
                break;
            }
            self.frames_encoded += 1;
        }
        Ok(())
    }
}

/// Frame slots covering `elapsed` seconds at the encoder rate
fn slots_due(elapsed: f64) -> u64 {
    (elapsed.max(0.0) * ENCODER_FPS as f64 + 1e-6).floor() as u64
}

/// What draining the event channel asks the controller to do next
enum Step {
    Continue,
    Finalize,
    Fail(ReelError),
}

/// Turns the live render and the capture sink into a finished clip.
///
/// Transitions: `Idle -> Recording -> Finalizing -> Ready`, with any failure
/// landing in `Failed`. `start()` is accepted from `Idle` and `Failed`;
/// `discard()` returns `Ready` and `Failed` to `Idle`.
pub struct CaptureController {
    config: CaptureConfig,
    backend: Arc<dyn EncoderBackend>,
    clock: Arc<dyn Clock>,
    state: CaptureState,
    session: Option<RecordingSession>,
    clip: Option<ClipHandle>,
    last_error: Option<CaptureFailure>,
}

impl CaptureController {
    pub fn new(config: CaptureConfig, backend: Arc<dyn EncoderBackend>, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            backend,
            clock,
            state: CaptureState::Idle,
            session: None,
            clip: None,
            last_error: None,
        }
    }

    pub fn state(&self) -> CaptureState {
        self.state
    }

    pub fn is_recording(&self) -> bool {
        self.state == CaptureState::Recording
    }

    /// Recording or finalizing; the trim window stays locked
    pub fn is_active(&self) -> bool {
        matches!(self.state, CaptureState::Recording | CaptureState::Finalizing)
    }

    /// The finished clip, present only in `Ready`
    pub fn clip(&self) -> Option<&ClipHandle> {
        self.clip.as_ref()
    }

    /// User-facing message for the failure that put the controller in `Failed`
    pub fn last_error(&self) -> Option<&CaptureFailure> {
        self.last_error.as_ref()
    }

    /// Seconds recorded so far, as of the last poll
    pub fn elapsed(&self) -> f64 {
        self.session.as_ref().map_or(0.0, |s| s.elapsed)
    }

    pub fn format(&self) -> Option<&'static OutputFormat> {
        self.session.as_ref().map(|s| s.format).or(self.clip.as_ref().map(|c| c.format))
    }

    /// Begin recording `trim` from the graph.
    ///
    /// Requires an open graph. On any failure the controller ends in `Failed`
    /// and the error is returned.
    pub fn start(&mut self, graph: &mut AudioGraph, trim: TrimWindow, title: &str) -> Result<()> {
        match self.state {
            CaptureState::Idle => {}
            CaptureState::Failed => {
                debug!("Retrying capture after failure");
                self.last_error = None;
                self.state = CaptureState::Idle;
            }
            state => {
                return Err(StateError::Capture { operation: "start", state: state.to_string() }.into());
            }
        }

        // Capability checks come first so a failed attempt never touches playback
        if let Err(e) = graph.capture_sink() {
            return Err(self.fail(e));
        }

        let candidates = preference_order(&self.config.preferred_formats);
        let format = match negotiate(&candidates, self.backend.as_ref()) {
            Ok(format) => format,
            Err(e) => return Err(self.fail(e.into())),
        };

        if let Err(e) = graph.seek(trim.start_offset).and_then(|_| graph.play()) {
            graph.pause();
            return Err(self.fail(e));
        }

        let sink = match graph.capture_sink() {
            Ok(sink) => sink,
            Err(e) => {
                graph.pause();
                return Err(self.fail(e));
            }
        };

        let spec = RecorderSpec {
            width: CANVAS_WIDTH,
            height: CANVAS_HEIGHT,
            fps: ENCODER_FPS,
            crf: self.config.crf(),
        };
        let handle = match self.backend.create_recorder(format, &spec) {
            Ok(handle) => handle,
            Err(e) => {
                graph.pause();
                return Err(self.fail(e));
            }
        };

        let audio = CapturedAudio::new(sink.sample_rate, sink.channels);
        self.session = Some(RecordingSession {
            format,
            recorder: handle.recorder,
            events: handle.events,
            chunks: Vec::new(),
            sink,
            audio,
            title: title.to_string(),
            start_offset: trim.start_offset,
            cap_seconds: trim.cap_seconds,
            started_at: self.clock.now(),
            elapsed: 0.0,
            last_frame: vec![0; spec.frame_len()],
            frames_encoded: 0,
            pushes_deferred: 0,
            finalize: None,
        });
        self.state = CaptureState::Recording;
        info!("Recording started at {:.2}s as {}", trim.start_offset, format.label);
        Ok(())
    }

    /// Duration poll; stops the recording once the cap is reached.
    ///
    /// Returns the elapsed time while recording.
    pub fn poll_elapsed(&mut self, graph: &mut AudioGraph) -> Option<f64> {
        if self.state != CaptureState::Recording {
            return None;
        }
        let now = self.clock.now();
        let session = self.session.as_mut()?;
        session.elapsed = now - session.started_at;
        let (elapsed, cap) = (session.elapsed, session.cap_seconds);

        if elapsed >= cap {
            info!("Recording reached the {:.0}s cap", cap);
            self.stop(graph);
        }
        Some(elapsed)
    }

    /// Feed the current render surface to the encoder.
    ///
    /// Every frame slot up to the elapsed time gets a frame, so late ticks and
    /// a backed-up encoder never shorten the video timeline.
    pub fn capture_video(&mut self, frame: &Frame, graph: &mut AudioGraph) {
        if self.state != CaptureState::Recording {
            return;
        }
        let now = self.clock.now();
        let Some(session) = self.session.as_mut() else {
            return;
        };

        session.last_frame.clear();
        session.last_frame.extend_from_slice(frame.as_rgb_bytes());
        let due = slots_due(now - session.started_at);
        if let Err(e) = session.fill_slots(due, false) {
            graph.pause();
            self.fail(e);
        }
    }

    /// Pull newly played PCM from the capture sink
    pub fn capture_audio(&mut self, graph: &AudioGraph) {
        if self.state != CaptureState::Recording {
            return;
        }
        if let Some(session) = self.session.as_mut() {
            let samples = graph.pull_capture(&mut session.sink);
            session.audio.samples.extend_from_slice(&samples);
        }
    }

    /// The track finished before the cap; same as a manual stop
    pub fn on_track_ended(&mut self, graph: &mut AudioGraph) {
        if self.stop(graph) {
            info!("Track ended during recording");
        }
    }

    /// Stop recording, fill any frame slots still owed, and start flushing.
    /// Returns false (and does nothing) outside `Recording`.
    pub fn stop(&mut self, graph: &mut AudioGraph) -> bool {
        if self.state != CaptureState::Recording {
            debug!("stop() ignored while {}", self.state);
            return false;
        }
        self.capture_audio(graph);

        let now = self.clock.now();
        let flushed = match self.session.as_mut() {
            Some(session) => {
                session.elapsed = now - session.started_at;
                let flushed = session.fill_slots(slots_due(session.elapsed), true);
                if flushed.is_ok() {
                    session.recorder.stop();
                    info!(
                        "Recording stopped after {:.2}s ({} frames, {} pushes deferred)",
                        session.elapsed, session.frames_encoded, session.pushes_deferred
                    );
                }
                flushed
            }
            None => Ok(()),
        };

        if let Err(e) = flushed {
            graph.pause();
            self.fail(e);
            return true;
        }
        self.state = CaptureState::Finalizing;
        true
    }

    /// Drain encoder events and advance finalization. Returns the new state
    /// when it changed.
    pub fn pump(&mut self, graph: &mut AudioGraph) -> Option<CaptureState> {
        let before = self.state;

        let step = match self.session.as_mut() {
            Some(session) if self.state == CaptureState::Recording || session.finalize.is_none() => {
                drain_events(session, self.state)
            }
            _ => Step::Continue,
        };

        match step {
            Step::Continue => {}
            Step::Finalize => self.begin_finalize(),
            Step::Fail(e) => {
                graph.pause();
                self.fail(e);
            }
        }

        if self.state == CaptureState::Finalizing {
            self.poll_finalize(graph);
        }

        (self.state != before).then_some(self.state)
    }

    /// Release a finished clip (or clear a failure) and return to `Idle`.
    ///
    /// A no-op when already idle; rejected while recording or finalizing.
    pub fn discard(&mut self) -> Result<()> {
        match self.state {
            CaptureState::Idle => Ok(()),
            CaptureState::Ready => {
                if let Some(clip) = self.clip.take() {
                    clip.release();
                }
                self.state = CaptureState::Idle;
                info!("Clip discarded");
                Ok(())
            }
            CaptureState::Failed => {
                self.last_error = None;
                self.state = CaptureState::Idle;
                Ok(())
            }
            state @ (CaptureState::Recording | CaptureState::Finalizing) => {
                warn!("discard() rejected while {}", state);
                Err(StateError::Capture { operation: "discard", state: state.to_string() }.into())
            }
        }
    }

    /// Tear down any in-flight recording; a finished clip is kept
    pub fn abort(&mut self) {
        if self.release_session() {
            info!("Recording aborted");
        }
        if self.is_active() {
            self.state = CaptureState::Idle;
        }
    }

    fn begin_finalize(&mut self) {
        let Some(session) = self.session.as_mut() else {
            return;
        };

        let job = FinalizeJob {
            backend: Arc::clone(&self.backend),
            format: session.format,
            chunks: std::mem::take(&mut session.chunks),
            audio: std::mem::take(&mut session.audio),
            output_dir: self.config.output_dir.clone(),
            title: session.title.clone(),
            frames: session.frames_encoded,
        };

        let (sender, receiver) = oneshot::channel();
        let task = move || {
            let result = job.run();
            if let Err(Ok(orphan)) = sender.send(result) {
                // Controller went away mid-finalize
                orphan.release();
            }
        };

        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn_blocking(task);
            }
            Err(_) => task(),
        }
        session.finalize = Some(receiver);
        debug!("Finalizing clip");
    }

    fn poll_finalize(&mut self, graph: &mut AudioGraph) {
        let Some(receiver) = self.session.as_mut().and_then(|s| s.finalize.as_mut()) else {
            return;
        };

        let outcome = match receiver.try_recv() {
            Ok(result) => result,
            Err(oneshot::error::TryRecvError::Empty) => return,
            Err(oneshot::error::TryRecvError::Closed) => Err(RuntimeCaptureError::Finalize {
                reason: "finalize task ended without a result".to_string(),
            }
            .into()),
        };

        let start_offset = self.session.as_ref().map_or(0.0, |s| s.start_offset);
        graph.pause();
        if let Err(e) = graph.seek(start_offset) {
            warn!("Could not rewind to the trim start: {}", e);
        }

        match outcome {
            Ok(clip) => {
                info!(
                    "Clip ready: {:?} ({:.1}s, {} bytes)",
                    clip.path, clip.duration, clip.size_bytes
                );
                self.session = None;
                self.clip = Some(clip);
                self.state = CaptureState::Ready;
            }
            Err(e) => {
                self.fail(e);
            }
        }
    }

    /// Release everything from the current attempt and enter `Failed`
    fn fail(&mut self, e: ReelError) -> ReelError {
        error!("Capture failed: {}", e);
        self.release_session();
        self.last_error = Some(CaptureFailure { message: e.user_message(), recoverable: e.is_recoverable() });
        self.state = CaptureState::Failed;
        e
    }

    fn release_session(&mut self) -> bool {
        match self.session.take() {
            Some(mut session) => {
                session.recorder.abort();
                debug!("Released {} buffered chunks", session.chunks.len());
                true
            }
            None => false,
        }
    }
}

impl Drop for CaptureController {
    fn drop(&mut self) {
        self.abort();
    }
}

fn drain_events(session: &mut RecordingSession, state: CaptureState) -> Step {
    loop {
        match session.events.try_recv() {
            Ok(RecorderEvent::DataAvailable(chunk)) => {
                if !chunk.is_empty() {
                    session.chunks.push(chunk);
                }
            }
            Ok(RecorderEvent::Stopped) if state == CaptureState::Finalizing => return Step::Finalize,
            Ok(RecorderEvent::Stopped) => {
                return Step::Fail(RuntimeCaptureError::Encoder {
                    reason: "encoder stopped unexpectedly".to_string(),
                }
                .into())
            }
            Ok(RecorderEvent::Error(e)) => return Step::Fail(e.into()),
            Err(mpsc::error::TryRecvError::Empty) => return Step::Continue,
            Err(mpsc::error::TryRecvError::Disconnected) => {
                return Step::Fail(RuntimeCaptureError::ChannelClosed.into())
            }
        }
    }
}

/// Blocking part of finalization: stage, mux, describe the result
struct FinalizeJob {
    backend: Arc<dyn EncoderBackend>,
    format: &'static OutputFormat,
    chunks: Vec<Vec<u8>>,
    audio: CapturedAudio,
    output_dir: PathBuf,
    title: String,
    frames: u64,
}

impl FinalizeJob {
    fn run(self) -> Result<ClipHandle> {
        if self.chunks.is_empty() {
            return Err(RuntimeCaptureError::Finalize { reason: "the encoder produced no data".to_string() }.into());
        }

        let created_at = Local::now();
        let output = clip_path(&self.output_dir, &self.title, self.format, &created_at);
        let stem = output
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "clip".to_string());

        let inputs = write_staging(&self.chunks, &self.audio, &self.output_dir, &stem, self.format)?;
        let muxed = self.backend.mux(self.format, &inputs, &output);
        inputs.remove();
        if let Err(e) = muxed {
            let _ = std::fs::remove_file(&output);
            return Err(e);
        }

        // The mux ends with the shorter stream
        let video_duration = self.frames as f64 / ENCODER_FPS as f64;
        let audio_duration = self.audio.duration();
        let duration = if audio_duration > 0.0 { video_duration.min(audio_duration) } else { video_duration };

        Ok(ClipHandle {
            size_bytes: std::fs::metadata(&output)?.len(),
            suggested_filename: suggested_filename(&self.title, self.format),
            path: output,
            format: self.format,
            duration,
            created_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::backend::UnavailableBackend;
    use crate::audio::graph::tests::{open_graph, tone};
    use crate::audio::graph::UserGesture;
    use crate::audio::types::PlaybackEvent;
    use crate::capture::recorder::tests::MemoryBackend;
    use crate::clock::ManualClock;
    use crate::config::{AudioConfig, CAP_SECONDS, POLL_INTERVAL};
    use crate::error::{EncodingUnsupportedError, InitializationError};
    use std::path::Path;
    use std::time::Duration;

    const TICK: f64 = 1.0 / ENCODER_FPS as f64;

    fn controller(backend: &MemoryBackend, clock: &ManualClock, dir: &Path) -> CaptureController {
        let config = CaptureConfig {
            output_dir: dir.to_path_buf(),
            ..CaptureConfig::default()
        };
        CaptureController::new(config, Arc::new(backend.clone()), Arc::new(clock.clone()))
    }

    fn trim(start: f64) -> TrimWindow {
        TrimWindow { start_offset: start, cap_seconds: CAP_SECONDS }
    }

    /// Drive the live loop for up to `seconds` of clock time, the way the editor session does
    fn run_live(
        controller: &mut CaptureController,
        graph: &mut AudioGraph,
        clock: &ManualClock,
        seconds: f64,
    ) {
        let surface = Frame::new_black(4, 4);
        let poll_every = (POLL_INTERVAL.as_secs_f64() / TICK).round() as usize;
        let ticks = (seconds / TICK).ceil() as usize;

        for tick in 1..=ticks {
            clock.advance(TICK);
            if graph.poll() == Some(PlaybackEvent::Ended) {
                controller.on_track_ended(graph);
            }
            controller.capture_audio(graph);
            controller.capture_video(&surface, graph);
            if tick % poll_every == 0 {
                controller.poll_elapsed(graph);
            }
            controller.pump(graph);
            if !controller.is_recording() {
                break;
            }
        }
    }

    async fn settle(controller: &mut CaptureController, graph: &mut AudioGraph) {
        for _ in 0..500 {
            controller.pump(graph);
            if controller.state() != CaptureState::Finalizing {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    fn files_in(dir: &Path) -> Vec<PathBuf> {
        std::fs::read_dir(dir)
            .map(|entries| entries.filter_map(|e| e.ok()).map(|e| e.path()).collect())
            .unwrap_or_default()
    }

    #[tokio::test]
    async fn test_full_recording_is_capped() {
        let dir = tempfile::tempdir().unwrap();
        let clock = ManualClock::new();
        let backend = MemoryBackend::supporting(&["webm-vp9"]);
        let mut graph = open_graph(&clock, 90.0);
        let mut capture = controller(&backend, &clock, dir.path());

        capture.start(&mut graph, trim(10.0), "Night Drive (Remix)").unwrap();
        assert_eq!(capture.state(), CaptureState::Recording);
        assert!(graph.is_playing());

        run_live(&mut capture, &mut graph, &clock, 45.0);
        assert_eq!(capture.state(), CaptureState::Finalizing);
        let slack = POLL_INTERVAL.as_secs_f64() + 1e-6;
        assert!(capture.elapsed() >= CAP_SECONDS);
        assert!(capture.elapsed() <= CAP_SECONDS + slack, "overshoot: {}", capture.elapsed());

        settle(&mut capture, &mut graph).await;
        assert_eq!(capture.state(), CaptureState::Ready);

        let clip = capture.clip().unwrap();
        assert!(clip.duration <= CAP_SECONDS + slack);
        assert_eq!(clip.suggested_filename, "night_drive_remix_reel.webm");
        assert!(clip.path.exists());

        // At most one frame per encoder tick made it into the clip
        let frames = clip.size_bytes / 4;
        assert!(frames as f64 <= (CAP_SECONDS + slack) * ENCODER_FPS as f64 + 1.0);

        // Ready pauses playback and rewinds to the trim start
        assert!(!graph.is_playing());
        assert_eq!(graph.cursor(), 10.0);

        // Only the clip is left behind; staging files are gone
        assert_eq!(files_in(dir.path()), vec![clip.path.clone()]);
    }

    #[tokio::test]
    async fn test_backed_up_encoder_keeps_video_timeline() {
        let dir = tempfile::tempdir().unwrap();
        let clock = ManualClock::new();
        let backend = MemoryBackend {
            refuse_every_other: true,
            ..MemoryBackend::supporting(&["mp4-h264"])
        };
        let mut graph = open_graph(&clock, 90.0);
        let mut capture = controller(&backend, &clock, dir.path());

        capture.start(&mut graph, trim(0.0), "Busy").unwrap();
        run_live(&mut capture, &mut graph, &clock, 45.0);
        let elapsed = capture.elapsed();
        settle(&mut capture, &mut graph).await;

        let clip = capture.clip().unwrap();
        let frames = clip.size_bytes / 4;
        assert_eq!(frames, slots_due(elapsed));
        let video = frames as f64 / ENCODER_FPS as f64;
        assert!((video - elapsed).abs() <= TICK + 1e-6, "video {:.2}s vs elapsed {:.2}s", video, elapsed);
        assert!((clip.duration - video).abs() <= TICK + 1e-6, "reported {:.2}s", clip.duration);
        assert!(clip.duration >= CAP_SECONDS - TICK);
    }

    #[tokio::test]
    async fn test_skipped_ticks_repeat_the_last_frame() {
        let dir = tempfile::tempdir().unwrap();
        let clock = ManualClock::new();
        let backend = MemoryBackend::supporting(&["mp4-h264"]);
        let mut graph = open_graph(&clock, 60.0);
        let mut capture = controller(&backend, &clock, dir.path());
        let surface = Frame::new_black(4, 4);

        capture.start(&mut graph, trim(0.0), "Gaps").unwrap();
        // One sample tick per 0.2s instead of every 1/30s
        for _ in 0..10 {
            clock.advance(0.2);
            capture.capture_audio(&graph);
            capture.capture_video(&surface, &mut graph);
            capture.pump(&mut graph);
        }
        clock.advance(0.1);
        capture.stop(&mut graph);
        settle(&mut capture, &mut graph).await;

        let clip = capture.clip().unwrap();
        assert_eq!(clip.size_bytes / 4, slots_due(2.1));
        assert!((clip.duration - 2.1).abs() <= TICK + 1e-6);
    }

    #[tokio::test]
    async fn test_chunks_concatenated_in_arrival_order() {
        let dir = tempfile::tempdir().unwrap();
        let clock = ManualClock::new();
        let backend = MemoryBackend::supporting(&["mp4-h264"]);
        let mut graph = open_graph(&clock, 60.0);
        let mut capture = controller(&backend, &clock, dir.path());

        capture.start(&mut graph, trim(0.0), "Order").unwrap();
        run_live(&mut capture, &mut graph, &clock, 1.0);
        assert!(capture.stop(&mut graph));
        settle(&mut capture, &mut graph).await;

        let bytes = std::fs::read(&capture.clip().unwrap().path).unwrap();
        let indices: Vec<u32> = bytes
            .chunks_exact(4)
            .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        assert_eq!(indices, (0..indices.len() as u32).collect::<Vec<_>>());
        assert!(indices.len() >= 29);
    }

    #[tokio::test]
    async fn test_natural_end_behaves_like_stop() {
        let dir = tempfile::tempdir().unwrap();
        let clock = ManualClock::new();
        let backend = MemoryBackend::supporting(&["webm-vp8"]);
        let mut graph = open_graph(&clock, 25.0);
        let mut capture = controller(&backend, &clock, dir.path());

        capture.start(&mut graph, trim(0.0), "Short").unwrap();
        run_live(&mut capture, &mut graph, &clock, 40.0);
        assert_eq!(capture.state(), CaptureState::Finalizing);
        assert!(capture.elapsed() >= 25.0 && capture.elapsed() <= 25.0 + TICK + 1e-6);

        settle(&mut capture, &mut graph).await;
        let clip = capture.clip().unwrap();
        assert!((clip.duration - 25.0).abs() <= TICK + 1e-6, "duration {}", clip.duration);
        assert_eq!(graph.cursor(), 0.0);
    }

    #[tokio::test]
    async fn test_start_rejected_outside_idle_or_failed() {
        let dir = tempfile::tempdir().unwrap();
        let clock = ManualClock::new();
        let backend = MemoryBackend::supporting(&["mp4-h264"]);
        let mut graph = open_graph(&clock, 60.0);
        let mut capture = controller(&backend, &clock, dir.path());

        capture.start(&mut graph, trim(0.0), "Song").unwrap();
        let rejected = |r: Result<()>| matches!(r, Err(ReelError::State(StateError::Capture { operation: "start", .. })));

        assert!(rejected(capture.start(&mut graph, trim(0.0), "Song")));
        assert_eq!(capture.state(), CaptureState::Recording);

        run_live(&mut capture, &mut graph, &clock, 0.5);
        capture.stop(&mut graph);
        assert!(rejected(capture.start(&mut graph, trim(0.0), "Song")));

        settle(&mut capture, &mut graph).await;
        assert_eq!(capture.state(), CaptureState::Ready);
        assert!(rejected(capture.start(&mut graph, trim(0.0), "Song")));
        assert_eq!(backend.recorders_created(), 1);
    }

    #[test]
    fn test_stop_when_idle_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let clock = ManualClock::new();
        let backend = MemoryBackend::supporting(&["mp4-h264"]);
        let mut graph = open_graph(&clock, 60.0);
        let mut capture = controller(&backend, &clock, dir.path());

        assert!(!capture.stop(&mut graph));
        assert_eq!(capture.state(), CaptureState::Idle);
        assert_eq!(capture.pump(&mut graph), None);
        assert_eq!(capture.poll_elapsed(&mut graph), None);
    }

    #[tokio::test]
    async fn test_discard_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let clock = ManualClock::new();
        let backend = MemoryBackend::supporting(&["mp4-h264"]);
        let mut graph = open_graph(&clock, 60.0);
        let mut capture = controller(&backend, &clock, dir.path());

        capture.discard().unwrap();
        capture.discard().unwrap();
        assert_eq!(capture.state(), CaptureState::Idle);

        capture.start(&mut graph, trim(0.0), "Song").unwrap();
        assert!(capture.discard().is_err());
        assert_eq!(capture.state(), CaptureState::Recording);

        run_live(&mut capture, &mut graph, &clock, 0.5);
        capture.stop(&mut graph);
        settle(&mut capture, &mut graph).await;
        let path = capture.clip().unwrap().path.clone();

        capture.discard().unwrap();
        capture.discard().unwrap();
        assert_eq!(capture.state(), CaptureState::Idle);
        assert!(capture.clip().is_none());
        assert!(!path.exists());
    }

    #[test]
    fn test_no_supported_format_fails_cleanly_and_retries() {
        let dir = tempfile::tempdir().unwrap();
        let clock = ManualClock::new();
        let backend = MemoryBackend::supporting(&[]);
        let mut graph = open_graph(&clock, 60.0);
        let mut capture = controller(&backend, &clock, dir.path());

        let err = capture.start(&mut graph, trim(0.0), "Song").unwrap_err();
        assert!(matches!(
            err,
            ReelError::EncodingUnsupported(EncodingUnsupportedError { ref tried }) if tried.len() == 4
        ));
        assert_eq!(capture.state(), CaptureState::Failed);
        assert!(capture.last_error().is_some());
        assert!(capture.clip().is_none());
        assert_eq!(capture.elapsed(), 0.0);
        assert_eq!(backend.recorders_created(), 0);
        assert!(!graph.is_playing());
        assert!(files_in(dir.path()).is_empty());

        // The next attempt goes through Idle and can succeed
        backend.allow("mkv-mpeg4");
        capture.start(&mut graph, trim(0.0), "Song").unwrap();
        assert_eq!(capture.state(), CaptureState::Recording);
        assert!(capture.last_error().is_none());
        assert_eq!(capture.format().unwrap().label, "mkv-mpeg4");
    }

    #[test]
    fn test_silent_graph_cannot_record() {
        let dir = tempfile::tempdir().unwrap();
        let clock = ManualClock::new();
        let backend = MemoryBackend::supporting(&["mp4-h264"]);
        let mut graph = AudioGraph::new(
            AudioConfig::default(),
            Box::new(UnavailableBackend),
            Arc::new(clock.clone()),
        );
        graph.load(tone(60.0));
        graph.open(UserGesture::observed()).unwrap();

        let mut capture = controller(&backend, &clock, dir.path());
        let err = capture.start(&mut graph, trim(0.0), "Song").unwrap_err();
        assert!(matches!(err, ReelError::Initialization(InitializationError::SilentMode)));
        assert_eq!(capture.state(), CaptureState::Failed);
        assert_eq!(backend.recorders_created(), 0);
    }

    #[test]
    fn test_encoder_error_releases_partial_buffers() {
        let dir = tempfile::tempdir().unwrap();
        let clock = ManualClock::new();
        let backend = MemoryBackend {
            fail_at_frame: Some(5),
            ..MemoryBackend::supporting(&["mp4-h264"])
        };
        let mut graph = open_graph(&clock, 60.0);
        let mut capture = controller(&backend, &clock, dir.path());

        capture.start(&mut graph, trim(0.0), "Song").unwrap();
        run_live(&mut capture, &mut graph, &clock, 2.0);

        assert_eq!(capture.state(), CaptureState::Failed);
        let failure = capture.last_error().unwrap();
        assert!(failure.message.contains("Recording failed"));
        assert!(failure.recoverable);
        assert!(capture.clip().is_none());
        assert_eq!(capture.elapsed(), 0.0);
        assert!(!graph.is_playing());
        assert!(files_in(dir.path()).is_empty());
    }

    #[tokio::test]
    async fn test_mux_failure_leaves_nothing_behind() {
        let dir = tempfile::tempdir().unwrap();
        let clock = ManualClock::new();
        let backend = MemoryBackend {
            fail_mux: true,
            ..MemoryBackend::supporting(&["mp4-h264"])
        };
        let mut graph = open_graph(&clock, 60.0);
        let mut capture = controller(&backend, &clock, dir.path());

        capture.start(&mut graph, trim(0.0), "Song").unwrap();
        run_live(&mut capture, &mut graph, &clock, 1.0);
        capture.stop(&mut graph);
        settle(&mut capture, &mut graph).await;

        assert_eq!(capture.state(), CaptureState::Failed);
        assert!(capture.clip().is_none());
        assert!(files_in(dir.path()).is_empty());
        capture.discard().unwrap();
        assert_eq!(capture.state(), CaptureState::Idle);
    }

    #[test]
    fn test_abort_mid_recording() {
        let dir = tempfile::tempdir().unwrap();
        let clock = ManualClock::new();
        let backend = MemoryBackend::supporting(&["mp4-h264"]);
        let mut graph = open_graph(&clock, 60.0);
        let mut capture = controller(&backend, &clock, dir.path());

        capture.start(&mut graph, trim(0.0), "Song").unwrap();
        run_live(&mut capture, &mut graph, &clock, 1.0);
        capture.abort();
        capture.abort();

        assert_eq!(capture.state(), CaptureState::Idle);
        assert!(capture.clip().is_none());
        assert!(files_in(dir.path()).is_empty());
    }

    #[test]
    fn test_finalize_without_runtime_runs_inline() {
        let dir = tempfile::tempdir().unwrap();
        let clock = ManualClock::new();
        let backend = MemoryBackend::supporting(&["mp4-h264"]);
        let mut graph = open_graph(&clock, 60.0);
        let mut capture = controller(&backend, &clock, dir.path());

        capture.start(&mut graph, trim(0.0), "Song").unwrap();
        run_live(&mut capture, &mut graph, &clock, 0.5);
        capture.stop(&mut graph);

        assert_eq!(capture.pump(&mut graph), Some(CaptureState::Ready));
        assert!(capture.clip().unwrap().path.exists());
    }
}
