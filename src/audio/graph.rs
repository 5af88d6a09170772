use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::audio::analyzer::SpectrumAnalyser;
use crate::audio::backend::{AudioBackend, AudioContext};
use crate::audio::types::{AnalysisFrame, AudioData, ContextState, PlaybackEvent, PlaybackState};
use crate::clock::Clock;
use crate::config::AudioConfig;
use crate::error::{InitializationError, Result};

/// Proof that a genuine user interaction happened.
///
/// Platforms may refuse to start audio processing before one; the graph only
/// opens when handed a gesture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UserGesture {
    _private: (),
}

impl UserGesture {
    /// Record that the user interacted (key press, click, command invocation)
    pub fn observed() -> Self {
        Self { _private: () }
    }
}

/// One-shot gate: armed on construction, disarmed after the first successful open
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnlockGate {
    armed: bool,
}

impl UnlockGate {
    pub fn new() -> Self {
        Self { armed: true }
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Default for UnlockGate {
    fn default() -> Self {
        Self::new()
    }
}

/// Result of an `open()` call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenOutcome {
    /// The graph was constructed by this call
    Opened,
    /// Already open; nothing happened
    AlreadyOpen,
    /// No audio capability: visuals keep rendering against silent frames
    Silent,
}

/// Capture-only audio output: reads PCM straight from the source.
///
/// Independent of the speaker path, so recording ignores volume and mute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureSink {
    pub sample_rate: u32,
    pub channels: u16,
    position: usize,
}

impl CaptureSink {
    /// Next frame index this sink will deliver
    pub fn position(&self) -> usize {
        self.position
    }
}

/// Owns the decoded source, the analysis tap and the playback cursor
pub struct AudioGraph {
    config: AudioConfig,
    backend: Box<dyn AudioBackend>,
    clock: Arc<dyn Clock>,
    source: Option<AudioData>,
    context: Option<Box<dyn AudioContext>>,
    context_state: ContextState,
    gate: UnlockGate,
    analyser: Option<SpectrumAnalyser>,
    silent: bool,
    playback: PlaybackState,
    cursor: f64,
    /// (clock time, cursor) when playback last (re)started
    anchor: Option<(f64, f64)>,
}

impl AudioGraph {
    pub fn new(config: AudioConfig, backend: Box<dyn AudioBackend>, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            backend,
            clock,
            source: None,
            context: None,
            context_state: ContextState::Uninitialized,
            gate: UnlockGate::new(),
            analyser: None,
            silent: false,
            playback: PlaybackState::Stopped,
            cursor: 0.0,
            anchor: None,
        }
    }

    /// Attach a decoded track, replacing any previous one
    pub fn load(&mut self, data: AudioData) {
        self.halt_output();
        info!("Track loaded: {} ({:.1}s)", data.title(), data.duration);
        self.source = Some(data);
        self.playback = PlaybackState::Stopped;
        self.cursor = 0.0;
        self.anchor = None;
        if let Some(analyser) = self.analyser.as_mut() {
            analyser.reset();
        }
    }

    /// Construct the analysis graph on the first successful call; afterwards a no-op
    pub fn open(&mut self, _gesture: UserGesture) -> Result<OpenOutcome> {
        if !self.gate.is_armed() {
            return Ok(OpenOutcome::AlreadyOpen);
        }

        match self.backend.create_context() {
            Ok(context) => {
                self.analyser = Some(SpectrumAnalyser::new(&self.config)?);
                self.context = Some(context);
                self.context_state = ContextState::Open;
                self.silent = false;
                self.gate.disarm();
                info!("Audio graph opened on {} backend", self.backend.name());
                Ok(OpenOutcome::Opened)
            }
            Err(e) => {
                warn!("Audio unavailable, visuals will not react to sound: {}", e);
                self.silent = true;
                Ok(OpenOutcome::Silent)
            }
        }
    }

    pub fn is_open(&self) -> bool {
        self.context_state == ContextState::Open || self.context_state == ContextState::Suspended
    }

    pub fn is_silent(&self) -> bool {
        self.silent
    }

    pub fn gate(&self) -> UnlockGate {
        self.gate
    }

    pub fn context_state(&self) -> ContextState {
        self.context_state
    }

    pub fn playback_state(&self) -> PlaybackState {
        self.playback
    }

    pub fn is_playing(&self) -> bool {
        self.playback == PlaybackState::Playing
    }

    pub fn source(&self) -> Option<&AudioData> {
        self.source.as_ref()
    }

    /// Track duration, known once a source is loaded
    pub fn duration(&self) -> Option<f64> {
        self.source.as_ref().map(|s| s.duration)
    }

    /// Current playback position in seconds
    pub fn cursor(&self) -> f64 {
        match (self.playback, self.anchor) {
            (PlaybackState::Playing, Some((started, from))) => {
                let position = from + (self.clock.now() - started).max(0.0);
                self.duration().map_or(position, |d| position.min(d))
            }
            _ => self.cursor,
        }
    }

    /// Fraction of the track played so far (0.0 when nothing is loaded)
    pub fn playback_fraction(&self) -> f64 {
        match self.duration() {
            Some(d) if d > 0.0 => (self.cursor() / d).clamp(0.0, 1.0),
            _ => 0.0,
        }
    }

    /// Move the cursor, clamped to [0, duration]
    pub fn seek(&mut self, offset: f64) -> Result<f64> {
        let duration = self.duration().unwrap_or(0.0);
        let target = offset.clamp(0.0, duration);
        self.cursor = target;
        if let Some(analyser) = self.analyser.as_mut() {
            analyser.reset();
        }

        if self.is_playing() {
            self.anchor = Some((self.clock.now(), target));
            self.start_output(target)?;
        }

        debug!("Seeked to {:.2}s", target);
        Ok(target)
    }

    /// Start or resume playback from the cursor
    pub fn play(&mut self) -> Result<()> {
        if self.is_playing() {
            return Ok(());
        }
        if self.source.is_none() {
            return Err(InitializationError::NoTrack.into());
        }
        if self.context_state == ContextState::Closed {
            return Err(InitializationError::AudioContextUnavailable {
                reason: "audio context is closed".to_string(),
            }.into());
        }

        if let Some(context) = self.context.as_mut() {
            if context.is_suspended() || self.context_state == ContextState::Suspended {
                context.resume()?;
                self.context_state = ContextState::Open;
                debug!("Resumed suspended audio context");
            }
        }

        // Restart from the top once a track has played to its end
        if self.duration().map_or(false, |d| self.cursor >= d) {
            self.cursor = 0.0;
        }

        let from = self.cursor;
        self.start_output(from)?;
        self.anchor = Some((self.clock.now(), from));
        self.playback = PlaybackState::Playing;
        debug!("Playback started at {:.2}s", from);
        Ok(())
    }

    pub fn pause(&mut self) {
        if !self.is_playing() {
            return;
        }
        self.cursor = self.cursor();
        self.anchor = None;
        self.halt_output();
        self.playback = PlaybackState::Paused;
        debug!("Playback paused at {:.2}s", self.cursor);
    }

    /// Suspend the context (platform-initiated, e.g. before unlock or on focus loss)
    pub fn suspend(&mut self) {
        self.pause();
        if let Some(context) = self.context.as_mut() {
            context.suspend();
            self.context_state = ContextState::Suspended;
        }
    }

    /// Advance playback; reports a time update, or `Ended` once the track finishes
    pub fn poll(&mut self) -> Option<PlaybackEvent> {
        if !self.is_playing() {
            return None;
        }

        let position = self.cursor();
        match self.duration() {
            Some(d) if position >= d => {
                self.cursor = d;
                self.anchor = None;
                self.halt_output();
                self.playback = PlaybackState::Stopped;
                info!("Track ended at {:.2}s", d);
                Some(PlaybackEvent::Ended)
            }
            _ => Some(PlaybackEvent::TimeUpdate(position)),
        }
    }

    /// Latest spectrum; all zeros when the graph is not open or silent
    pub fn current_analysis_frame(&mut self) -> AnalysisFrame {
        let bucket_count = self.config.fft_size / 2;
        let cursor = self.cursor();

        match (self.analyser.as_mut(), self.source.as_ref()) {
            (Some(analyser), Some(source)) if self.context_state == ContextState::Open => {
                let end = source.frame_at(cursor);
                let window = source.mono_window(end, analyser.fft_size());
                analyser.analyse(&window)
            }
            _ => AnalysisFrame::silent(bucket_count),
        }
    }

    /// Tap the capture-only output, positioned at the cursor
    pub fn capture_sink(&self) -> Result<CaptureSink> {
        if self.silent {
            return Err(InitializationError::SilentMode.into());
        }
        if !self.is_open() {
            return Err(InitializationError::GraphNotOpen.into());
        }
        let source = self.source.as_ref().ok_or(InitializationError::NoTrack)?;

        Ok(CaptureSink {
            sample_rate: source.sample_rate,
            channels: source.channels,
            position: source.frame_at(self.cursor()),
        })
    }

    /// Interleaved samples played since the sink's last pull
    pub fn pull_capture(&self, sink: &mut CaptureSink) -> Vec<f32> {
        let Some(source) = self.source.as_ref() else {
            return Vec::new();
        };

        let end = source.frame_at(self.cursor());
        if end < sink.position {
            // Cursor jumped backwards; resume from the new position
            sink.position = end;
            return Vec::new();
        }

        let samples = source.interleaved_range(sink.position, end).to_vec();
        sink.position = end;
        samples
    }

    /// Release all audio resources; safe to call repeatedly
    pub fn close(&mut self) {
        if self.context_state == ContextState::Closed {
            return;
        }
        self.pause();
        if let Some(mut context) = self.context.take() {
            context.close();
        }
        self.analyser = None;
        self.context_state = ContextState::Closed;
        self.gate.disarm();
        info!("Audio graph closed");
    }

    fn start_output(&mut self, offset: f64) -> Result<()> {
        if let (Some(context), Some(source)) = (self.context.as_mut(), self.source.as_ref()) {
            context.start_output(source, offset)?;
        }
        Ok(())
    }

    fn halt_output(&mut self) {
        if let Some(context) = self.context.as_mut() {
            context.stop_output();
        }
    }
}

impl Drop for AudioGraph {
    fn drop(&mut self) {
        self.close();
    }
}
