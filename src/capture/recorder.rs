//! Encoder seam: a backend negotiates formats, creates live recorders and
//! muxes the finished streams.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use tokio::sync::mpsc;
use tracing::debug;

use crate::capture::format::OutputFormat;
use crate::error::{Result, RuntimeCaptureError};

/// Parameters of the raw video fed into a recorder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecorderSpec {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub crf: u8,
}

impl RecorderSpec {
    /// Bytes in one RGB24 frame
    pub fn frame_len(&self) -> usize {
        self.width as usize * self.height as usize * 3
    }
}

/// Asynchronous completion events from a recorder, delivered in order
#[derive(Debug, Clone, PartialEq)]
pub enum RecorderEvent {
    /// A chunk of encoded output
    DataAvailable(Vec<u8>),
    /// All data has been delivered after a stop request
    Stopped,
    /// The encoder failed; no further events follow
    Error(RuntimeCaptureError),
}

/// A running encoder.
///
/// Frames go in through `push_frame`; encoded data comes back through the
/// event channel handed out alongside the recorder.
pub trait Recorder: Send {
    /// Queue one raw RGB24 frame. Returns `Ok(false)` without queueing
    /// when the encoder is behind; the caller keeps the slot and retries.
    fn push_frame(&mut self, rgb: &[u8]) -> Result<bool>;

    /// Queue one raw RGB24 frame, waiting for room
    fn push_frame_blocking(&mut self, rgb: &[u8]) -> Result<()>;

    /// Finish encoding; `RecorderEvent::Stopped` follows the last chunk
    fn stop(&mut self);

    /// Tear down immediately, discarding anything in flight
    fn abort(&mut self);
}

/// A recorder plus the single-producer channel carrying its events
pub struct RecorderHandle {
    pub recorder: Box<dyn Recorder>,
    pub events: mpsc::UnboundedReceiver<RecorderEvent>,
}

/// Interleaved PCM taken from the capture sink
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CapturedAudio {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: u16,
}

impl CapturedAudio {
    pub fn new(sample_rate: u32, channels: u16) -> Self {
        Self { samples: Vec::new(), sample_rate, channels }
    }

    pub fn duration(&self) -> f64 {
        if self.sample_rate == 0 || self.channels == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / (self.sample_rate as f64 * self.channels as f64)
    }
}

/// Files handed to the muxer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MuxInputs {
    pub video: PathBuf,
    pub audio: PathBuf,
}

impl MuxInputs {
    pub fn remove(&self) {
        for path in [&self.video, &self.audio] {
            if let Err(e) = std::fs::remove_file(path) {
                debug!("Could not remove staging file {:?}: {}", path, e);
            }
        }
    }
}

/// Encoding capability provider
pub trait EncoderBackend: Send + Sync {
    fn name(&self) -> &str;

    /// Whether this backend can produce `format`
    fn is_type_supported(&self, format: &OutputFormat) -> bool;

    /// Start a live video recorder for `format`
    fn create_recorder(&self, format: &'static OutputFormat, spec: &RecorderSpec) -> Result<RecorderHandle>;

    /// Combine the staged video and audio into `output`. Blocking.
    fn mux(&self, format: &OutputFormat, inputs: &MuxInputs, output: &Path) -> Result<()>;
}

/// Write buffered chunks (in arrival order) and the captured PCM next to `stem`
pub fn write_staging(
    chunks: &[Vec<u8>],
    audio: &CapturedAudio,
    dir: &Path,
    stem: &str,
    format: &OutputFormat,
) -> Result<MuxInputs> {
    std::fs::create_dir_all(dir)?;
    let inputs = MuxInputs {
        video: dir.join(format!(".{}.video.{}", stem, format.extension)),
        audio: dir.join(format!(".{}.audio.wav", stem)),
    };

    let mut video = BufWriter::new(File::create(&inputs.video)?);
    for chunk in chunks {
        video.write_all(chunk)?;
    }
    video.flush()?;

    write_wav(audio, &inputs.audio)?;

    debug!(
        "Staged {} video chunks and {:.2}s of audio",
        chunks.len(),
        audio.duration()
    );
    Ok(inputs)
}

fn write_wav(audio: &CapturedAudio, path: &Path) -> Result<()> {
    let spec = hound::WavSpec {
        channels: audio.channels.max(1),
        sample_rate: audio.sample_rate.max(1),
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let finalize_error = |e: hound::Error| RuntimeCaptureError::Finalize {
        reason: format!("writing captured audio: {}", e),
    };

    let mut writer = hound::WavWriter::create(path, spec).map_err(finalize_error)?;
    for &sample in &audio.samples {
        let value = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
        writer.write_sample(value).map_err(finalize_error)?;
    }
    writer.finalize().map_err(finalize_error)?;
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    /// Backend that "encodes" each frame into a 4-byte chunk holding its index
    #[derive(Clone, Default)]
    pub(crate) struct MemoryBackend {
        pub supported: Arc<Mutex<Vec<String>>>,
        pub recorders_created: Arc<AtomicUsize>,
        /// Emit an encoder error instead of the chunk for this frame index
        pub fail_at_frame: Option<u32>,
        pub fail_mux: bool,
        /// Refuse every other non-blocking push, like a saturated queue
        pub refuse_every_other: bool,
    }

    impl MemoryBackend {
        pub(crate) fn supporting(labels: &[&str]) -> Self {
            Self {
                supported: Arc::new(Mutex::new(labels.iter().map(|l| l.to_string()).collect())),
                ..Self::default()
            }
        }

        /// Start supporting `label`; shared with clones handed to a controller
        pub(crate) fn allow(&self, label: &str) {
            self.supported.lock().unwrap().push(label.to_string());
        }

        pub(crate) fn recorders_created(&self) -> usize {
            self.recorders_created.load(Ordering::SeqCst)
        }
    }

    pub(crate) struct MemoryRecorder {
        sender: Option<mpsc::UnboundedSender<RecorderEvent>>,
        frames: u32,
        fail_at_frame: Option<u32>,
        refuse_every_other: bool,
        attempts: u32,
    }

    impl MemoryRecorder {
        fn encode(&mut self) -> Result<()> {
            let Some(sender) = self.sender.as_ref() else {
                return Err(RuntimeCaptureError::ChannelClosed.into());
            };
            let event = if Some(self.frames) == self.fail_at_frame {
                RecorderEvent::Error(RuntimeCaptureError::Encoder { reason: "simulated".to_string() })
            } else {
                RecorderEvent::DataAvailable(self.frames.to_le_bytes().to_vec())
            };
            self.frames += 1;
            let _ = sender.send(event);
            Ok(())
        }
    }

    impl Recorder for MemoryRecorder {
        fn push_frame(&mut self, _rgb: &[u8]) -> Result<bool> {
            self.attempts += 1;
            if self.refuse_every_other && self.attempts % 2 == 0 {
                return Ok(false);
            }
            self.encode()?;
            Ok(true)
        }

        fn push_frame_blocking(&mut self, _rgb: &[u8]) -> Result<()> {
            self.encode()
        }

        fn stop(&mut self) {
            if let Some(sender) = self.sender.take() {
                let _ = sender.send(RecorderEvent::Stopped);
            }
        }

        fn abort(&mut self) {
            self.sender = None;
        }
    }

    impl EncoderBackend for MemoryBackend {
        fn name(&self) -> &str {
            "memory"
        }

        fn is_type_supported(&self, format: &OutputFormat) -> bool {
            self.supported.lock().unwrap().iter().any(|l| l == format.label)
        }

        fn create_recorder(&self, _format: &'static OutputFormat, _spec: &RecorderSpec) -> Result<RecorderHandle> {
            self.recorders_created.fetch_add(1, Ordering::SeqCst);
            let (sender, events) = mpsc::unbounded_channel();
            Ok(RecorderHandle {
                recorder: Box::new(MemoryRecorder {
                    sender: Some(sender),
                    frames: 0,
                    fail_at_frame: self.fail_at_frame,
                    refuse_every_other: self.refuse_every_other,
                    attempts: 0,
                }),
                events,
            })
        }

        fn mux(&self, _format: &OutputFormat, inputs: &MuxInputs, output: &Path) -> Result<()> {
            if self.fail_mux {
                return Err(RuntimeCaptureError::Finalize { reason: "simulated mux failure".to_string() }.into());
            }
            std::fs::copy(&inputs.video, output)?;
            Ok(())
        }
    }

    #[test]
    fn test_staging_preserves_chunk_order() {
        let dir = tempfile::tempdir().unwrap();
        let chunks = vec![b"ab".to_vec(), b"cd".to_vec(), b"e".to_vec()];
        let mut audio = CapturedAudio::new(8000, 2);
        audio.samples = vec![0.25; 8000 * 2];

        let format = &crate::capture::format::FORMAT_PREFERENCES[1];
        let inputs = write_staging(&chunks, &audio, dir.path(), "night_drive", format).unwrap();

        assert_eq!(std::fs::read(&inputs.video).unwrap(), b"abcde");
        assert!(inputs.video.to_string_lossy().ends_with(".webm"));

        let reader = hound::WavReader::open(&inputs.audio).unwrap();
        assert_eq!(reader.spec().channels, 2);
        assert_eq!(reader.spec().sample_rate, 8000);
        assert_eq!(reader.duration(), 8000);

        inputs.remove();
        assert!(!inputs.video.exists());
        assert!(!inputs.audio.exists());
    }

    #[test]
    fn test_captured_audio_duration() {
        let mut audio = CapturedAudio::new(44100, 2);
        audio.samples = vec![0.0; 44100];
        assert!((audio.duration() - 0.5).abs() < 1e-9);
        assert_eq!(CapturedAudio::default().duration(), 0.0);
    }
}
