use std::path::PathBuf;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::audio::graph::{AudioGraph, OpenOutcome, UserGesture};
use crate::audio::loader::AudioLoader;
use crate::audio::types::{AudioData, PlaybackEvent};
use crate::capture::clip::ClipHandle;
use crate::capture::controller::{CaptureController, CaptureState};
use crate::config::{ENCODER_FPS, POLL_INTERVAL, REFRESH_INTERVAL};
use crate::error::{InitializationError, ReelError, Result, StateError};
use crate::render::frame::Frame;
use crate::render::renderer::FrameRenderer;
use crate::render::types::{BackgroundAsset, RenderConfig, VisualizerMode};
use crate::scheduler::RenderLoopScheduler;
use crate::trim::TrimSelector;

/// User intents accepted by the editor
#[derive(Debug, Clone, PartialEq)]
pub enum EditorCommand {
    Play,
    Pause,
    /// Requested trim start, in seconds
    SetStart(f64),
    SetMode(VisualizerMode),
    SetTitle(String),
    SetCaption(String),
    /// Replace the background image; `None` returns to the gradient
    SetBackground(Option<PathBuf>),
    LoadTrack(PathBuf),
    Record,
    Stop,
    Discard,
    Shutdown,
}

/// Notifications for whoever drives the session
#[derive(Debug, Clone)]
pub enum SessionEvent {
    CaptureStateChanged(CaptureState),
    ClipReady(ClipHandle),
    TrimChanged { start: f64, end: f64 },
    TrackLoaded { title: String, duration: f64 },
    PlaybackEnded,
    /// User-facing failure message, and whether offering a retry makes sense
    Error { message: String, recoverable: bool },
}

type PendingTrack = oneshot::Receiver<Result<AudioData>>;

/// One live editing session: owns every pipeline component and routes
/// commands and timer ticks to them from a single control flow.
pub struct EditorSession {
    graph: AudioGraph,
    renderer: FrameRenderer,
    render_config: RenderConfig,
    scheduler: RenderLoopScheduler,
    trim: TrimSelector,
    capture: CaptureController,
    surface: Frame,
    pending_track: Option<PendingTrack>,
    observer: Option<mpsc::UnboundedSender<SessionEvent>>,
    torn_down: bool,
}

impl EditorSession {
    pub fn new(
        graph: AudioGraph,
        renderer: FrameRenderer,
        render_config: RenderConfig,
        capture: CaptureController,
    ) -> Self {
        let surface = Frame::new_black(render_config.width, render_config.height);
        let mut trim = TrimSelector::new();
        trim.reset_for(graph.duration().unwrap_or(0.0));

        Self {
            graph,
            renderer,
            render_config,
            scheduler: RenderLoopScheduler::new(),
            trim,
            capture,
            surface,
            pending_track: None,
            observer: None,
            torn_down: false,
        }
    }

    /// Deliver session events to `sender`
    pub fn set_observer(&mut self, sender: mpsc::UnboundedSender<SessionEvent>) {
        self.observer = Some(sender);
    }

    pub fn graph(&self) -> &AudioGraph {
        &self.graph
    }

    pub fn capture(&self) -> &CaptureController {
        &self.capture
    }

    pub fn scheduler(&self) -> &RenderLoopScheduler {
        &self.scheduler
    }

    pub fn trim(&self) -> &TrimSelector {
        &self.trim
    }

    pub fn render_config(&self) -> &RenderConfig {
        &self.render_config
    }

    /// The most recently rendered frame
    pub fn surface(&self) -> &Frame {
        &self.surface
    }

    pub fn is_torn_down(&self) -> bool {
        self.torn_down
    }

    /// Run the live loop until `Shutdown` arrives or the command channel closes.
    ///
    /// Four sources feed the loop: commands, the display refresh, the encoder
    /// sampling clock and the duration poll. All of them run on this task, so
    /// no handler ever overlaps another.
    pub async fn run(&mut self, mut commands: mpsc::UnboundedReceiver<EditorCommand>) -> Result<()> {
        if self.torn_down {
            return Err(StateError::TornDown.into());
        }

        let mut refresh = interval(REFRESH_INTERVAL);
        let mut sample = interval(Duration::from_secs_f64(1.0 / ENCODER_FPS as f64));
        let mut poll = interval(POLL_INTERVAL);
        // Skipped sample ticks are made up by the capture controller's frame slots
        for timer in [&mut refresh, &mut sample, &mut poll] {
            timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
        }

        info!("Editor session running");
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => {
                        if !self.handle(command) {
                            break;
                        }
                    }
                    None => {
                        debug!("Command channel closed");
                        break;
                    }
                },
                _ = refresh.tick(), if self.scheduler.wants_refresh() => self.refresh_tick(),
                _ = sample.tick(), if self.capture.is_recording() => self.sample_tick(),
                _ = poll.tick() => self.poll_tick(),
            }
        }

        // Timers go first, then the rest in teardown order
        drop((refresh, sample, poll));
        self.teardown();
        Ok(())
    }

    /// Apply one command. Returns false when the session should end.
    pub fn handle(&mut self, command: EditorCommand) -> bool {
        if self.torn_down {
            warn!("Ignoring {:?}: session torn down", command);
            return false;
        }
        debug!("Command: {:?}", command);
        let before = self.capture.state();

        match command {
            EditorCommand::Play => {
                self.unlock();
                if let Err(e) = self.graph.play() {
                    self.report(e);
                }
            }
            EditorCommand::Pause => self.graph.pause(),
            EditorCommand::SetStart(offset) => {
                let recording = self.capture.is_active();
                match self.trim.set_start(offset, &mut self.graph, &mut self.scheduler, recording) {
                    Ok(start) => {
                        let end = self.trim.window().end(self.graph.duration().unwrap_or(0.0));
                        self.emit(SessionEvent::TrimChanged { start, end });
                    }
                    Err(e) => self.report(e),
                }
            }
            EditorCommand::SetMode(mode) => {
                self.render_config.mode = mode;
                self.scheduler.on_config_changed();
            }
            EditorCommand::SetTitle(title) => {
                self.render_config.title = title;
                self.scheduler.on_config_changed();
            }
            EditorCommand::SetCaption(caption) => {
                self.render_config.caption = caption;
                self.scheduler.on_config_changed();
            }
            EditorCommand::SetBackground(path) => {
                let (width, height) = (self.render_config.width, self.render_config.height);
                self.render_config.background = match path {
                    Some(path) if tokio::runtime::Handle::try_current().is_ok() => {
                        BackgroundAsset::load_in_background(path, width, height)
                    }
                    Some(path) => BackgroundAsset::load_blocking(&path, width, height),
                    None => BackgroundAsset::None,
                };
                self.scheduler.on_config_changed();
            }
            EditorCommand::LoadTrack(path) => self.begin_load(path),
            EditorCommand::Record => {
                self.unlock();
                let title = self.clip_title();
                if let Err(e) = self.capture.start(&mut self.graph, self.trim.window(), &title) {
                    // Failures inside the attempt are reported by the state change
                    if self.capture.state() != CaptureState::Failed {
                        self.report(e);
                    }
                }
            }
            EditorCommand::Stop => {
                self.capture.stop(&mut self.graph);
            }
            EditorCommand::Discard => {
                if let Err(e) = self.capture.discard() {
                    self.report(e);
                }
            }
            EditorCommand::Shutdown => {
                info!("Shutdown requested");
                return false;
            }
        }

        self.sync(before);
        true
    }

    /// Display refresh: draw a frame if the scheduler wants one
    pub fn refresh_tick(&mut self) {
        if !self.scheduler.on_refresh() {
            return;
        }
        let analysis = self.graph.current_analysis_frame();
        let fraction = self.graph.playback_fraction();
        self.renderer
            .render_into(&mut self.surface, &self.render_config, &analysis, fraction);
    }

    /// Encoder clock: hand the current surface and new audio to the recorder
    pub fn sample_tick(&mut self) {
        let before = self.capture.state();
        self.capture.capture_audio(&self.graph);
        self.capture.capture_video(&self.surface, &mut self.graph);
        self.sync(before);
    }

    /// Duration poll: playback events, the recording cap, encoder output and
    /// pending asset loads
    pub fn poll_tick(&mut self) {
        let before = self.capture.state();

        if let Some(PlaybackEvent::Ended) = self.graph.poll() {
            self.emit(SessionEvent::PlaybackEnded);
            self.capture.on_track_ended(&mut self.graph);
        }
        self.capture.poll_elapsed(&mut self.graph);
        self.capture.pump(&mut self.graph);

        if self.render_config.background.is_pending() {
            self.render_config.background.poll();
            if !self.render_config.background.is_pending() {
                self.scheduler.request_frame();
            }
        }
        self.poll_track();

        self.sync(before);
    }

    /// Release everything: stop scheduler, then encoder, then audio. Safe to repeat.
    pub fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        self.torn_down = true;
        self.pending_track = None;
        self.scheduler.stop();
        self.capture.abort();
        self.graph.close();
        self.observer = None;
        info!("Editor session torn down");
    }

    fn unlock(&mut self) {
        if !self.graph.gate().is_armed() {
            return;
        }
        match self.graph.open(UserGesture::observed()) {
            Ok(OpenOutcome::Silent) => self.report(InitializationError::SilentMode.into()),
            Ok(_) => {}
            Err(e) => self.report(e),
        }
    }

    fn clip_title(&self) -> String {
        if !self.render_config.title.trim().is_empty() {
            return self.render_config.title.clone();
        }
        self.graph.source().map(|s| s.title()).unwrap_or_default()
    }

    fn begin_load(&mut self, path: PathBuf) {
        if self.capture.is_active() {
            self.report(StateError::Capture { operation: "load a track", state: self.capture.state().to_string() }.into());
            return;
        }

        let (sender, receiver) = oneshot::channel();
        let task = move || {
            let _ = sender.send(AudioLoader::load_blocking(&path));
        };
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn_blocking(task);
            }
            Err(_) => task(),
        }
        self.pending_track = Some(receiver);
    }

    fn poll_track(&mut self) {
        let Some(receiver) = self.pending_track.as_mut() else {
            return;
        };
        let result = match receiver.try_recv() {
            Ok(result) => result,
            Err(oneshot::error::TryRecvError::Empty) => return,
            Err(oneshot::error::TryRecvError::Closed) => {
                self.pending_track = None;
                return;
            }
        };
        self.pending_track = None;

        match result {
            Ok(data) if !self.capture.is_active() => {
                let (title, duration) = (data.title(), data.duration);
                self.graph.load(data);
                self.trim.reset_for(duration);
                if let Err(e) = self.graph.seek(self.trim.start_offset()) {
                    self.report(e);
                }
                self.scheduler.request_frame();
                self.emit(SessionEvent::TrackLoaded { title, duration });
            }
            Ok(data) => warn!("Dropping {} loaded during a recording", data.title()),
            Err(e) => {
                // The previous frame stays on screen
                self.graph.pause();
                self.report(e);
            }
        }
    }

    /// Align the scheduler with playback and capture, and announce capture transitions
    fn sync(&mut self, before: CaptureState) {
        self.scheduler.update(self.graph.is_playing(), self.capture.is_recording());

        let after = self.capture.state();
        if after == before {
            return;
        }
        self.emit(SessionEvent::CaptureStateChanged(after));
        match after {
            CaptureState::Ready => {
                if let Some(clip) = self.capture.clip().cloned() {
                    self.emit(SessionEvent::ClipReady(clip));
                }
            }
            CaptureState::Failed => {
                let event = match self.capture.last_error() {
                    Some(failure) => SessionEvent::Error {
                        message: failure.message.clone(),
                        recoverable: failure.recoverable,
                    },
                    None => SessionEvent::Error { message: "Recording failed".to_string(), recoverable: true },
                };
                self.emit(event);
            }
            _ => {}
        }
    }

    fn report(&mut self, e: ReelError) {
        warn!("{}", e);
        self.emit(SessionEvent::Error { message: e.user_message(), recoverable: e.is_recoverable() });
    }

    fn emit(&self, event: SessionEvent) {
        if let Some(observer) = &self.observer {
            // A gone observer just stops listening
            let _ = observer.send(event);
        }
    }
}

impl Drop for EditorSession {
    fn drop(&mut self) {
        self.teardown();
    }
}
