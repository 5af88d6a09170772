use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use tracing::{debug, warn};

use crate::capture::format::OutputFormat;

/// A finished recording, ready for download
#[derive(Debug, Clone)]
pub struct ClipHandle {
    pub path: PathBuf,
    /// Name to offer when saving the clip elsewhere
    pub suggested_filename: String,
    pub format: &'static OutputFormat,
    /// Recorded length in seconds
    pub duration: f64,
    pub size_bytes: u64,
    pub created_at: DateTime<Local>,
}

impl ClipHandle {
    pub fn mime(&self) -> &'static str {
        self.format.mime
    }

    /// Delete the clip from disk; a missing file is not an error
    pub fn release(&self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!("Released clip {:?}", self.path),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove clip {:?}: {}", self.path, e),
        }
    }
}

/// Lowercase the title and collapse every run of other characters to `_`
pub fn sanitize_title(title: &str) -> String {
    let mut out = String::with_capacity(title.len());
    let mut pending_separator = false;

    for ch in title.chars().flat_map(char::to_lowercase) {
        if ch.is_ascii_alphanumeric() {
            if pending_separator && !out.is_empty() {
                out.push('_');
            }
            pending_separator = false;
            out.push(ch);
        } else {
            pending_separator = true;
        }
    }

    if out.is_empty() {
        "clip".to_string()
    } else {
        out
    }
}

/// `<sanitized title>_reel.<ext>`
pub fn suggested_filename(title: &str, format: &OutputFormat) -> String {
    format!("{}_reel.{}", sanitize_title(title), format.extension)
}

/// Where a clip recorded at `created_at` is written; distinct per second
pub fn clip_path(output_dir: &Path, title: &str, format: &OutputFormat, created_at: &DateTime<Local>) -> PathBuf {
    output_dir.join(format!(
        "{}_{}_reel.{}",
        sanitize_title(title),
        created_at.format("%Y%m%d_%H%M%S"),
        format.extension
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::format::find_format;

    #[test]
    fn test_sanitize_title() {
        assert_eq!(sanitize_title("Night Drive (Remix)"), "night_drive_remix");
        assert_eq!(sanitize_title("  --Hello, World!--  "), "hello_world");
        assert_eq!(sanitize_title("AC/DC"), "ac_dc");
        assert_eq!(sanitize_title("!!!"), "clip");
        assert_eq!(sanitize_title(""), "clip");
    }

    #[test]
    fn test_suggested_filename_uses_container_extension() {
        let mp4 = find_format("mp4-h264").unwrap();
        let mkv = find_format("mkv-mpeg4").unwrap();
        assert_eq!(suggested_filename("Night Drive", mp4), "night_drive_reel.mp4");
        assert_eq!(suggested_filename("Night Drive", mkv), "night_drive_reel.mkv");
    }

    #[test]
    fn test_release_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let format = find_format("webm-vp9").unwrap();
        let created_at = Local::now();
        let path = clip_path(dir.path(), "Song", format, &created_at);
        std::fs::write(&path, b"data").unwrap();

        let clip = ClipHandle {
            path: path.clone(),
            suggested_filename: suggested_filename("Song", format),
            format,
            duration: 1.0,
            size_bytes: 4,
            created_at,
        };
        assert_eq!(clip.mime(), "video/webm;codecs=vp9,opus");

        clip.release();
        clip.release();
        assert!(!path.exists());
    }
}
