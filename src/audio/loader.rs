use std::fs::File;
use std::path::{Path, PathBuf};

use symphonia::core::audio::{AudioBufferRef, Signal};
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::audio::types::{AudioData, AudioFormat};
use crate::error::{PlaybackError, Result};

/// Decodes a track into PCM so the graph can play, analyse and capture it
pub struct AudioLoader;

impl AudioLoader {
    /// Load an audio file; decoding runs on the blocking pool
    pub async fn load<P: AsRef<Path>>(path: P) -> Result<AudioData> {
        let path = path.as_ref().to_path_buf();
        let display = path.display().to_string();

        tokio::task::spawn_blocking(move || Self::load_blocking(&path))
            .await
            .map_err(|_| PlaybackError::LoadFailed { path: display })?
    }

    /// Load an audio file on the current thread
    pub fn load_blocking<P: AsRef<Path>>(path: P) -> Result<AudioData> {
        let path = path.as_ref();
        let extension = Self::detect_format(path).unwrap_or_default();

        let data = match extension.as_str() {
            "wav" => Self::load_wav(path)?,
            "mp3" | "flac" | "ogg" | "m4a" | "aac" => Self::load_with_symphonia(path)?,
            _ => return Err(PlaybackError::UnsupportedFormat { format: extension }.into()),
        };

        tracing::info!(
            "Loaded {:?}: {:.1}s, {} Hz, {} channels",
            path, data.duration, data.sample_rate, data.channels
        );
        Ok(data)
    }

    /// Load WAV files using the hound crate (most reliable for WAV)
    fn load_wav(path: &Path) -> Result<AudioData> {
        let load_failed = || PlaybackError::LoadFailed { path: path.display().to_string() };

        let reader = hound::WavReader::open(path).map_err(|_| load_failed())?;

        let spec = reader.spec();
        let sample_rate = spec.sample_rate;
        let channels = spec.channels;

        let samples: Vec<f32> = match spec.sample_format {
            hound::SampleFormat::Float => reader
                .into_samples::<f32>()
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|_| load_failed())?,
            hound::SampleFormat::Int => {
                let bit_depth = spec.bits_per_sample;
                reader
                    .into_samples::<i32>()
                    .collect::<std::result::Result<Vec<_>, _>>()
                    .map_err(|_| load_failed())?
                    .into_iter()
                    .map(|sample| Self::int_to_float(sample, bit_depth))
                    .collect()
            }
        };

        Ok(Self::assemble(
            path,
            samples,
            sample_rate,
            channels,
            AudioFormat {
                extension: "wav".to_string(),
                bit_depth: Some(spec.bits_per_sample),
                compression: None,
            },
        ))
    }

    /// Load compressed formats using Symphonia
    fn load_with_symphonia(path: &Path) -> Result<AudioData> {
        let load_failed = || PlaybackError::LoadFailed { path: path.display().to_string() };

        let file = File::open(path).map_err(|_| load_failed())?;
        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        let mut hint = Hint::new();
        if let Some(extension) = path.extension().and_then(|ext| ext.to_str()) {
            hint.with_extension(extension);
        }

        let probed = symphonia::default::get_probe()
            .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
            .map_err(|_| load_failed())?;

        let mut format = probed.format;

        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(load_failed)?;

        let track_id = track.id;
        let codec_params = track.codec_params.clone();

        let sample_rate = codec_params.sample_rate.ok_or_else(|| PlaybackError::DecodeFailed {
            reason: "no sample rate found".to_string(),
        })?;
        let channels = codec_params
            .channels
            .ok_or_else(|| PlaybackError::DecodeFailed {
                reason: "no channel information found".to_string(),
            })?
            .count() as u16;

        let mut decoder = symphonia::default::get_codecs()
            .make(&codec_params, &DecoderOptions::default())
            .map_err(|e| PlaybackError::DecodeFailed { reason: e.to_string() })?;

        let mut samples = Vec::new();

        loop {
            let packet = match format.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::ResetRequired) => {
                    decoder.reset();
                    continue;
                }
                // End of stream
                Err(_) => break,
            };

            while !format.metadata().is_latest() {
                format.metadata().pop();
            }

            if packet.track_id() != track_id {
                continue;
            }

            match decoder.decode(&packet) {
                Ok(decoded) => Self::convert_audio_buffer_to_f32(&decoded, &mut samples),
                Err(SymphoniaError::DecodeError(e)) => {
                    tracing::debug!("Skipping undecodable packet: {}", e);
                    continue;
                }
                Err(_) => break,
            }
        }

        if samples.is_empty() {
            return Err(PlaybackError::DecodeFailed {
                reason: format!("no audio decoded from {}", path.display()),
            }.into());
        }

        Ok(Self::assemble(
            path,
            samples,
            sample_rate,
            channels,
            AudioFormat {
                extension: Self::detect_format(path).unwrap_or_else(|| "unknown".to_string()),
                bit_depth: codec_params.bits_per_sample.map(|b| b as u16),
                compression: Some(format!("{:?}", codec_params.codec)),
            },
        ))
    }

    fn assemble(
        path: &Path,
        samples: Vec<f32>,
        sample_rate: u32,
        channels: u16,
        format: AudioFormat,
    ) -> AudioData {
        let duration = samples.len() as f64 / (sample_rate as f64 * channels.max(1) as f64);
        AudioData {
            samples,
            sample_rate,
            channels,
            duration,
            file_path: PathBuf::from(path),
            format,
        }
    }

    /// Convert integer sample to float (-1.0 to 1.0)
    fn int_to_float(sample: i32, bit_depth: u16) -> f32 {
        match bit_depth {
            8 => (sample as f32 - 128.0) / 128.0,
            16 => sample as f32 / 32768.0,
            24 => sample as f32 / 8388608.0,
            32 => sample as f32 / 2147483648.0,
            _ => sample as f32 / 32768.0,
        }
    }

    /// Interleave a planar Symphonia buffer into f32 samples
    fn convert_audio_buffer_to_f32(buffer: &AudioBufferRef, output: &mut Vec<f32>) {
        fn interleave<S, F>(buf: &symphonia::core::audio::AudioBuffer<S>, output: &mut Vec<f32>, convert: F)
        where
            S: symphonia::core::sample::Sample,
            F: Fn(S) -> f32,
        {
            let channels = buf.spec().channels.count();
            for frame_idx in 0..buf.frames() {
                for ch in 0..channels {
                    output.push(convert(buf.chan(ch)[frame_idx]));
                }
            }
        }

        match buffer {
            AudioBufferRef::F32(buf) => interleave(buf, output, |s| s),
            AudioBufferRef::F64(buf) => interleave(buf, output, |s| s as f32),
            AudioBufferRef::S32(buf) => interleave(buf, output, |s| s as f32 / 2147483648.0),
            AudioBufferRef::S16(buf) => interleave(buf, output, |s| s as f32 / 32768.0),
            AudioBufferRef::U8(buf) => interleave(buf, output, |s| (s as f32 - 128.0) / 128.0),
            _ => {
                tracing::warn!("Unsupported audio buffer format, packet skipped");
            }
        }
    }

    /// Detect audio format from file extension
    pub fn detect_format<P: AsRef<Path>>(path: P) -> Option<String> {
        path.as_ref()
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_lowercase())
    }

    /// Check if a file format is supported
    pub fn is_format_supported(extension: &str) -> bool {
        matches!(
            extension.to_lowercase().as_str(),
            "wav" | "mp3" | "flac" | "ogg" | "m4a" | "aac"
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ReelError;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn test_format_detection() {
        assert_eq!(AudioLoader::detect_format("test.wav"), Some("wav".to_string()));
        assert_eq!(AudioLoader::detect_format("test.MP3"), Some("mp3".to_string()));
        assert_eq!(AudioLoader::detect_format("test"), None);
    }

    #[test]
    fn test_format_support() {
        assert!(AudioLoader::is_format_supported("wav"));
        assert!(AudioLoader::is_format_supported("FLAC"));
        assert!(!AudioLoader::is_format_supported("xyz"));
    }

    #[test]
    fn test_int_to_float_conversion() {
        assert_eq!(AudioLoader::int_to_float(0, 16), 0.0);
        assert_eq!(AudioLoader::int_to_float(-32768, 16), -1.0);
        assert_eq!(AudioLoader::int_to_float(128, 8), 0.0);
        assert_eq!(AudioLoader::int_to_float(0, 8), -1.0);
    }

    #[test]
    fn test_load_wav_reports_duration() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: 8000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        for i in 0..8000 * 2 {
            let s = ((i as f32 * 0.05).sin() * 8000.0) as i16;
            writer.write_sample(s).unwrap();
            writer.write_sample(s).unwrap();
        }
        writer.finalize().unwrap();

        let data = AudioLoader::load_blocking(&path).unwrap();
        assert_eq!(data.channels, 2);
        assert_eq!(data.sample_rate, 8000);
        assert!((data.duration - 2.0).abs() < 1e-9);
        assert_eq!(data.title(), "tone");
    }

    #[tokio::test]
    async fn test_unsupported_format() {
        let temp_dir = tempdir().unwrap();
        let file_path = temp_dir.path().join("test.xyz");

        let mut file = File::create(&file_path).unwrap();
        file.write_all(b"dummy content").unwrap();

        let result = AudioLoader::load(&file_path).await;

        match result {
            Err(ReelError::Playback(PlaybackError::UnsupportedFormat { format })) => {
                assert_eq!(format, "xyz");
            }
            other => panic!("Expected UnsupportedFormat error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_missing_file_is_playback_error() {
        let result = AudioLoader::load("/definitely/not/here.wav").await;
        assert!(matches!(
            result,
            Err(ReelError::Playback(PlaybackError::LoadFailed { .. }))
        ));
    }
}
