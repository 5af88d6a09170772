use std::collections::HashSet;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::mpsc::{sync_channel, Receiver, SyncSender, TrySendError};
use std::sync::{Arc, Mutex};
use std::thread;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::capture::format::OutputFormat;
use crate::capture::recorder::{EncoderBackend, MuxInputs, Recorder, RecorderEvent, RecorderHandle, RecorderSpec};
use crate::config::CaptureConfig;
use crate::error::{Result, RuntimeCaptureError};

/// Raw frames queued ahead of the encoder before pushes are deferred
const FRAME_QUEUE_DEPTH: usize = 8;

/// Bytes per encoded-output read
const CHUNK_SIZE: usize = 64 * 1024;

/// Encoder backend driving the `ffmpeg` command line tool
pub struct FfmpegBackend {
    binary: PathBuf,
    encoders: HashSet<String>,
}

impl FfmpegBackend {
    /// Probe the configured binary for its encoder list
    pub async fn detect(config: &CaptureConfig) -> Self {
        let binary = config.ffmpeg_binary.clone();
        let encoders = match Self::probe_encoders(&binary).await {
            Ok(encoders) => {
                info!("FFmpeg found with {} encoders", encoders.len());
                encoders
            }
            Err(e) => {
                warn!("FFmpeg not usable at {:?}: {}", binary, e);
                HashSet::new()
            }
        };
        Self { binary, encoders }
    }

    /// Backend with a known encoder list
    pub fn with_encoders(binary: impl Into<PathBuf>, encoders: impl IntoIterator<Item = String>) -> Self {
        Self { binary: binary.into(), encoders: encoders.into_iter().collect() }
    }

    pub fn check_ffmpeg_available(binary: &Path) -> bool {
        Command::new(binary)
            .arg("-version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|status| status.success())
            .unwrap_or(false)
    }

    async fn probe_encoders(binary: &Path) -> std::io::Result<HashSet<String>> {
        let output = tokio::process::Command::new(binary)
            .args(["-hide_banner", "-encoders"])
            .stdin(Stdio::null())
            .output()
            .await?;

        if !output.status.success() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::Other,
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }
        Ok(parse_encoder_list(&String::from_utf8_lossy(&output.stdout)))
    }

    pub fn encoders(&self) -> &HashSet<String> {
        &self.encoders
    }

    fn encode_args(&self, format: &OutputFormat, spec: &RecorderSpec) -> Vec<String> {
        let size = format!("{}x{}", spec.width, spec.height);
        let fps = spec.fps.to_string();
        let mut args: Vec<String> = [
            "-hide_banner", "-loglevel", "error",
            "-f", "rawvideo",
            "-pix_fmt", "rgb24",
            "-s", size.as_str(),
            "-r", fps.as_str(),
            "-i", "pipe:0",
            "-an",
            "-c:v", format.video_encoder,
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();

        if format.uses_crf {
            args.push("-crf".to_string());
            args.push(spec.crf.to_string());
        }
        args.extend(format.video_args.iter().map(|s| s.to_string()));
        args.extend(format.stream_args.iter().map(|s| s.to_string()));
        args.extend(["-f", format.container, "pipe:1"].iter().map(|s| s.to_string()));
        args
    }
}

/// Encoder names from `ffmpeg -encoders` output.
///
/// Entries look like ` V....D libx264  libx264 H.264 / AVC ...` and follow a
/// ` ------` separator line.
pub fn parse_encoder_list(listing: &str) -> HashSet<String> {
    listing
        .lines()
        .skip_while(|line| !line.trim_start().starts_with("---"))
        .skip(1)
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let flags = fields.next()?;
            if flags.len() != 6 {
                return None;
            }
            fields.next().map(str::to_string)
        })
        .collect()
}

impl EncoderBackend for FfmpegBackend {
    fn name(&self) -> &str {
        "ffmpeg"
    }

    fn is_type_supported(&self, format: &OutputFormat) -> bool {
        self.encoders.contains(format.video_encoder) && self.encoders.contains(format.audio_encoder)
    }

    fn create_recorder(&self, format: &'static OutputFormat, spec: &RecorderSpec) -> Result<RecorderHandle> {
        let args = self.encode_args(format, spec);
        debug!("Spawning encoder: {:?} {}", self.binary, args.join(" "));

        let mut child = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| RuntimeCaptureError::EncoderStart {
                reason: format!("Failed to spawn FFmpeg process: {}", e),
            })?;

        let start_error = || RuntimeCaptureError::EncoderStart { reason: "FFmpeg pipes unavailable".to_string() };
        let stdin = child.stdin.take().ok_or_else(start_error)?;
        let stdout = child.stdout.take().ok_or_else(start_error)?;
        let stderr = child.stderr.take().ok_or_else(start_error)?;

        let (events_tx, events) = mpsc::unbounded_channel();
        let (frames_tx, frames_rx) = sync_channel::<Vec<u8>>(FRAME_QUEUE_DEPTH);
        let child = Arc::new(Mutex::new(child));

        let writer = spawn_writer(stdin, frames_rx, events_tx.clone())?;
        spawn_reader(stdout, stderr, Arc::clone(&child), events_tx)?;

        info!("Recording {}x{}@{} with {}", spec.width, spec.height, spec.fps, format);
        Ok(RecorderHandle {
            recorder: Box::new(FfmpegRecorder {
                frames: Some(frames_tx),
                writer: Some(writer),
                child,
                frame_len: spec.frame_len(),
                deferred: 0,
            }),
            events,
        })
    }

    fn mux(&self, format: &OutputFormat, inputs: &MuxInputs, output: &Path) -> Result<()> {
        let mut cmd = Command::new(&self.binary);
        cmd.args(["-hide_banner", "-loglevel", "error"])
            .arg("-i").arg(&inputs.video)
            .arg("-i").arg(&inputs.audio)
            .args(["-map", "0:v:0", "-map", "1:a:0"])
            .args(["-c:v", "copy", "-c:a", format.audio_encoder])
            .arg("-shortest")
            .args(format.mux_args)
            .args(["-f", format.container, "-y"])
            .arg(output);

        let output_result = cmd.output().map_err(|e| RuntimeCaptureError::Finalize {
            reason: format!("FFmpeg execution failed: {}", e),
        })?;

        if !output_result.status.success() {
            let stderr = String::from_utf8_lossy(&output_result.stderr);
            return Err(RuntimeCaptureError::Finalize {
                reason: format!("FFmpeg failed: {}", stderr.trim()),
            }.into());
        }

        debug!("Muxed clip written to {:?}", output);
        Ok(())
    }
}

fn spawn_writer(
    mut stdin: ChildStdin,
    frames: Receiver<Vec<u8>>,
    events: mpsc::UnboundedSender<RecorderEvent>,
) -> Result<thread::JoinHandle<()>> {
    let handle = thread::Builder::new()
        .name("ffmpeg-frames".to_string())
        .spawn(move || {
            for frame in frames {
                if let Err(e) = stdin.write_all(&frame) {
                    let _ = events.send(RecorderEvent::Error(RuntimeCaptureError::StreamWrite {
                        reason: e.to_string(),
                    }));
                    return;
                }
            }
            // Dropping stdin signals end of input
        })?;
    Ok(handle)
}

fn spawn_reader(
    mut stdout: impl Read + Send + 'static,
    mut stderr: impl Read + Send + 'static,
    child: Arc<Mutex<Child>>,
    events: mpsc::UnboundedSender<RecorderEvent>,
) -> Result<()> {
    let diagnostics = thread::Builder::new()
        .name("ffmpeg-stderr".to_string())
        .spawn(move || {
            let mut text = String::new();
            let _ = stderr.read_to_string(&mut text);
            text
        })?;

    thread::Builder::new()
        .name("ffmpeg-output".to_string())
        .spawn(move || {
            let mut buffer = vec![0u8; CHUNK_SIZE];
            loop {
                match stdout.read(&mut buffer) {
                    Ok(0) => break,
                    Ok(n) => {
                        if events.send(RecorderEvent::DataAvailable(buffer[..n].to_vec())).is_err() {
                            // Nobody is listening any more
                            break;
                        }
                    }
                    Err(e) => {
                        let _ = events.send(RecorderEvent::Error(RuntimeCaptureError::Encoder {
                            reason: e.to_string(),
                        }));
                        return;
                    }
                }
            }

            let stderr_text = diagnostics.join().unwrap_or_default();
            let status = match child.lock() {
                Ok(mut child) => child.wait(),
                Err(poisoned) => poisoned.into_inner().wait(),
            };

            let event = match status {
                Ok(status) if status.success() => RecorderEvent::Stopped,
                Ok(status) => RecorderEvent::Error(RuntimeCaptureError::Encoder {
                    reason: format!("FFmpeg exited with {}: {}", status, stderr_text.trim()),
                }),
                Err(e) => RecorderEvent::Error(RuntimeCaptureError::Encoder { reason: e.to_string() }),
            };
            let _ = events.send(event);
        })?;
    Ok(())
}

/// Live FFmpeg encoder fed over stdin
pub struct FfmpegRecorder {
    frames: Option<SyncSender<Vec<u8>>>,
    writer: Option<thread::JoinHandle<()>>,
    child: Arc<Mutex<Child>>,
    frame_len: usize,
    deferred: u64,
}

impl FfmpegRecorder {
    fn queue(&self, rgb: &[u8]) -> Result<&SyncSender<Vec<u8>>> {
        if rgb.len() != self.frame_len {
            return Err(RuntimeCaptureError::StreamWrite {
                reason: format!("frame is {} bytes, encoder expects {}", rgb.len(), self.frame_len),
            }.into());
        }
        self.frames.as_ref().ok_or_else(|| RuntimeCaptureError::ChannelClosed.into())
    }
}

impl Recorder for FfmpegRecorder {
    fn push_frame(&mut self, rgb: &[u8]) -> Result<bool> {
        match self.queue(rgb)?.try_send(rgb.to_vec()) {
            Ok(()) => Ok(true),
            Err(TrySendError::Full(_)) => {
                self.deferred += 1;
                if self.deferred % 30 == 1 {
                    debug!("Encoder behind; {} frame pushes deferred so far", self.deferred);
                }
                Ok(false)
            }
            Err(TrySendError::Disconnected(_)) => Err(RuntimeCaptureError::ChannelClosed.into()),
        }
    }

    fn push_frame_blocking(&mut self, rgb: &[u8]) -> Result<()> {
        self.queue(rgb)?
            .send(rgb.to_vec())
            .map_err(|_| RuntimeCaptureError::ChannelClosed.into())
    }

    fn stop(&mut self) {
        // Closing the queue lets the writer drain and close stdin
        if self.frames.take().is_some() {
            debug!("Encoder stop requested ({} pushes deferred)", self.deferred);
        }
        // The writer exits on its own once the queue drains; don't wait for it here
        self.writer.take();
    }

    fn abort(&mut self) {
        self.frames = None;
        self.writer = None;
        let result = match self.child.lock() {
            Ok(mut child) => child.kill(),
            Err(poisoned) => poisoned.into_inner().kill(),
        };
        if let Err(e) = result {
            debug!("Encoder already gone: {}", e);
        }
    }
}

impl Drop for FfmpegRecorder {
    fn drop(&mut self) {
        if self.frames.is_some() {
            self.abort();
        }
    }
}
