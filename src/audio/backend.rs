//! Audio contexts: the speaker-bound side of the graph.
//!
//! The analysis tap and capture sink read decoded PCM directly, so nothing a
//! context does (volume, mute, missing device) changes what gets recorded.

use rodio::buffer::SamplesBuffer;
use rodio::{OutputStream, OutputStreamHandle, Sink};

use crate::audio::types::AudioData;
use crate::error::{InitializationError, PlaybackError, Result};

/// Creates audio contexts for a platform
pub trait AudioBackend {
    /// Short backend name for logs
    fn name(&self) -> &str;

    /// Open a new context; an error means the platform has no audio capability
    fn create_context(&self) -> std::result::Result<Box<dyn AudioContext>, InitializationError>;
}

/// A live audio context owning the speaker output path
pub trait AudioContext {
    /// Begin speaker output of `data` from `offset` seconds
    fn start_output(&mut self, data: &AudioData, offset: f64) -> Result<()>;

    /// Halt speaker output
    fn stop_output(&mut self);

    /// Whether the platform suspended the context (e.g. before an unlock gesture)
    fn is_suspended(&self) -> bool {
        false
    }

    fn resume(&mut self) -> Result<()> {
        Ok(())
    }

    fn suspend(&mut self) {}

    /// Release every handle; must be safe to call more than once
    fn close(&mut self);
}

/// Plays through the default output device with rodio
pub struct RodioBackend {
    volume: f32,
}

impl RodioBackend {
    pub fn new(volume: f32) -> Self {
        Self { volume: volume.clamp(0.0, 1.0) }
    }
}

impl AudioBackend for RodioBackend {
    fn name(&self) -> &str {
        "rodio"
    }

    fn create_context(&self) -> std::result::Result<Box<dyn AudioContext>, InitializationError> {
        let (stream, handle) = OutputStream::try_default().map_err(|e| {
            InitializationError::AudioContextUnavailable { reason: e.to_string() }
        })?;

        tracing::debug!("Opened default audio output device");
        Ok(Box::new(RodioContext {
            stream: Some(stream),
            handle: Some(handle),
            sink: None,
            volume: self.volume,
            suspended: false,
        }))
    }
}

struct RodioContext {
    stream: Option<OutputStream>,
    handle: Option<OutputStreamHandle>,
    sink: Option<Sink>,
    volume: f32,
    suspended: bool,
}

impl AudioContext for RodioContext {
    fn start_output(&mut self, data: &AudioData, offset: f64) -> Result<()> {
        self.stop_output();

        let handle = self.handle.as_ref().ok_or_else(|| PlaybackError::OutputFailed {
            reason: "audio context is closed".to_string(),
        })?;
        let sink = Sink::try_new(handle)
            .map_err(|e| PlaybackError::OutputFailed { reason: e.to_string() })?;

        let from = data.frame_at(offset);
        let remaining = data.interleaved_range(from, data.frame_count()).to_vec();
        sink.set_volume(self.volume);
        sink.append(SamplesBuffer::new(data.channels, data.sample_rate, remaining));
        sink.play();

        self.sink = Some(sink);
        Ok(())
    }

    fn stop_output(&mut self) {
        if let Some(sink) = self.sink.take() {
            sink.stop();
        }
    }

    fn is_suspended(&self) -> bool {
        self.suspended
    }

    fn resume(&mut self) -> Result<()> {
        if let Some(sink) = &self.sink {
            sink.play();
        }
        self.suspended = false;
        Ok(())
    }

    fn suspend(&mut self) {
        if let Some(sink) = &self.sink {
            sink.pause();
        }
        self.suspended = true;
    }

    fn close(&mut self) {
        self.stop_output();
        self.handle = None;
        if self.stream.take().is_some() {
            tracing::debug!("Closed audio output device");
        }
    }
}

/// Context without a speaker, for servers, CI and offline capture
#[derive(Debug, Default)]
pub struct HeadlessBackend;

impl AudioBackend for HeadlessBackend {
    fn name(&self) -> &str {
        "headless"
    }

    fn create_context(&self) -> std::result::Result<Box<dyn AudioContext>, InitializationError> {
        Ok(Box::new(HeadlessContext::default()))
    }
}

#[derive(Debug, Default)]
struct HeadlessContext {
    suspended: bool,
    closed: bool,
}

impl AudioContext for HeadlessContext {
    fn start_output(&mut self, _data: &AudioData, _offset: f64) -> Result<()> {
        if self.closed {
            return Err(PlaybackError::OutputFailed {
                reason: "audio context is closed".to_string(),
            }.into());
        }
        Ok(())
    }

    fn stop_output(&mut self) {}

    fn is_suspended(&self) -> bool {
        self.suspended
    }

    fn resume(&mut self) -> Result<()> {
        self.suspended = false;
        Ok(())
    }

    fn suspend(&mut self) {
        self.suspended = true;
    }

    fn close(&mut self) {
        self.closed = true;
    }
}

/// Backend for platforms with no audio processing at all
#[derive(Debug, Default)]
pub struct UnavailableBackend;

impl AudioBackend for UnavailableBackend {
    fn name(&self) -> &str {
        "unavailable"
    }

    fn create_context(&self) -> std::result::Result<Box<dyn AudioContext>, InitializationError> {
        Err(InitializationError::AudioContextUnavailable {
            reason: "no audio capability on this platform".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_headless_context_lifecycle() {
        let mut context = HeadlessBackend.create_context().unwrap();
        assert!(!context.is_suspended());

        context.suspend();
        assert!(context.is_suspended());
        context.resume().unwrap();
        assert!(!context.is_suspended());

        context.close();
        context.close();
    }

    #[test]
    fn test_unavailable_backend_fails_to_open() {
        assert!(matches!(
            UnavailableBackend.create_context(),
            Err(InitializationError::AudioContextUnavailable { .. })
        ));
    }
}
