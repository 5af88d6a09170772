use std::fmt;

use tracing::{debug, info, warn};

use crate::capture::recorder::EncoderBackend;
use crate::error::EncodingUnsupportedError;

/// A container plus video and audio codec the recorder can produce
#[derive(Debug, PartialEq, Eq)]
pub struct OutputFormat {
    /// Stable identifier used in config files and on the command line
    pub label: &'static str,
    pub mime: &'static str,
    /// FFmpeg muxer name of the finished clip
    pub container: &'static str,
    pub extension: &'static str,
    pub video_encoder: &'static str,
    pub audio_encoder: &'static str,
    /// Extra encoder arguments for live encoding
    pub video_args: &'static [&'static str],
    /// Whether the video encoder takes a `-crf` quality value
    pub uses_crf: bool,
    /// Muxer arguments that make the video-only stream writable to a pipe
    pub stream_args: &'static [&'static str],
    /// Muxer arguments for the final clip
    pub mux_args: &'static [&'static str],
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}: {} + {})", self.label, self.container, self.video_encoder, self.audio_encoder)
    }
}

/// Candidate formats, most preferred first
pub static FORMAT_PREFERENCES: [OutputFormat; 4] = [
    OutputFormat {
        label: "mp4-h264",
        mime: "video/mp4;codecs=avc1,mp4a.40.2",
        container: "mp4",
        extension: "mp4",
        video_encoder: "libx264",
        audio_encoder: "aac",
        video_args: &["-preset", "veryfast", "-tune", "zerolatency", "-pix_fmt", "yuv420p"],
        uses_crf: true,
        stream_args: &["-movflags", "frag_keyframe+empty_moov"],
        mux_args: &["-movflags", "+faststart"],
    },
    OutputFormat {
        label: "webm-vp9",
        mime: "video/webm;codecs=vp9,opus",
        container: "webm",
        extension: "webm",
        video_encoder: "libvpx-vp9",
        audio_encoder: "libopus",
        video_args: &["-deadline", "realtime", "-cpu-used", "8", "-row-mt", "1", "-b:v", "0", "-pix_fmt", "yuv420p"],
        uses_crf: true,
        stream_args: &[],
        mux_args: &[],
    },
    OutputFormat {
        label: "webm-vp8",
        mime: "video/webm;codecs=vp8,vorbis",
        container: "webm",
        extension: "webm",
        video_encoder: "libvpx",
        audio_encoder: "libvorbis",
        video_args: &["-deadline", "realtime", "-cpu-used", "8", "-b:v", "2M", "-pix_fmt", "yuv420p"],
        uses_crf: true,
        stream_args: &[],
        mux_args: &[],
    },
    OutputFormat {
        label: "mkv-mpeg4",
        mime: "video/x-matroska;codecs=mp4v,mp4a",
        container: "matroska",
        extension: "mkv",
        video_encoder: "mpeg4",
        audio_encoder: "aac",
        video_args: &["-q:v", "4", "-pix_fmt", "yuv420p"],
        uses_crf: false,
        stream_args: &[],
        mux_args: &[],
    },
];

/// Look up a preference entry by label
pub fn find_format(label: &str) -> Option<&'static OutputFormat> {
    FORMAT_PREFERENCES.iter().find(|f| f.label.eq_ignore_ascii_case(label))
}

/// Candidate list to probe: the configured labels in their order, or the
/// built-in list when none are configured
pub fn preference_order(overrides: &[String]) -> Vec<&'static OutputFormat> {
    if overrides.is_empty() {
        return FORMAT_PREFERENCES.iter().collect();
    }

    let mut order = Vec::new();
    for label in overrides {
        match find_format(label) {
            Some(format) if !order.contains(&format) => order.push(format),
            Some(_) => {}
            None => warn!("Ignoring unknown output format '{}'", label),
        }
    }
    order
}

/// Pick the first candidate the backend supports
pub fn negotiate(
    candidates: &[&'static OutputFormat],
    backend: &dyn EncoderBackend,
) -> Result<&'static OutputFormat, EncodingUnsupportedError> {
    for &format in candidates {
        if backend.is_type_supported(format) {
            info!("Negotiated output format {} on {} backend", format, backend.name());
            return Ok(format);
        }
        debug!("{} backend does not support {}", backend.name(), format.label);
    }

    Err(EncodingUnsupportedError {
        tried: candidates.iter().map(|f| f.label.to_string()).collect(),
    })
}
