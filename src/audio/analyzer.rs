use std::sync::Arc;

use realfft::{RealFftPlanner, RealToComplex};
use rustfft::num_complex::Complex;

use crate::audio::types::AnalysisFrame;
use crate::config::AudioConfig;
use crate::error::{InitializationError, Result};

/// Real-time spectrum analyser producing byte magnitudes per frequency bucket.
///
/// Each call windows the most recent `fft_size` samples with a Blackman window,
/// smooths the normalised magnitudes against the previous call and maps them
/// from decibels onto 0-255.
pub struct SpectrumAnalyser {
    fft: Arc<dyn RealToComplex<f32>>,
    window: Vec<f32>,
    input: Vec<f32>,
    spectrum: Vec<Complex<f32>>,
    smoothed: Vec<f32>,
    smoothing: f32,
    min_decibels: f32,
    max_decibels: f32,
}

impl SpectrumAnalyser {
    /// Create an analyser from the audio configuration
    pub fn new(config: &AudioConfig) -> Result<Self> {
        let fft_size = config.fft_size;
        if fft_size < 2 || !fft_size.is_power_of_two() {
            return Err(InitializationError::AudioContextUnavailable {
                reason: format!("fft size {} is not a power of two", fft_size),
            }.into());
        }

        let mut planner = RealFftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(fft_size);
        let input = fft.make_input_vec();
        let spectrum = fft.make_output_vec();

        Ok(Self {
            fft,
            window: Self::blackman(fft_size),
            input,
            spectrum,
            smoothed: vec![0.0; fft_size / 2],
            smoothing: config.smoothing,
            min_decibels: config.min_decibels,
            max_decibels: config.max_decibels,
        })
    }

    /// Number of buckets in every frame (half the transform size)
    pub fn bucket_count(&self) -> usize {
        self.smoothed.len()
    }

    pub fn fft_size(&self) -> usize {
        self.window.len()
    }

    /// Analyse one window of mono samples.
    ///
    /// Shorter input is zero-padded at the front; longer input uses the tail.
    pub fn analyse(&mut self, samples: &[f32]) -> AnalysisFrame {
        let n = self.fft_size();
        let tail = &samples[samples.len().saturating_sub(n)..];
        let pad = n - tail.len();

        for (i, slot) in self.input.iter_mut().enumerate() {
            let sample = if i < pad { 0.0 } else { tail[i - pad] };
            *slot = sample * self.window[i];
        }

        if self.fft.process(&mut self.input, &mut self.spectrum).is_err() {
            tracing::warn!("FFT processing failed, emitting silent frame");
            return AnalysisFrame::silent(self.bucket_count());
        }

        let scale = 1.0 / n as f32;
        let range = self.max_decibels - self.min_decibels;
        let mut bytes = Vec::with_capacity(self.bucket_count());

        for (smoothed, bin) in self.smoothed.iter_mut().zip(self.spectrum.iter()) {
            let magnitude = bin.norm() * scale;
            *smoothed = self.smoothing * *smoothed + (1.0 - self.smoothing) * magnitude;

            let db = if *smoothed > 0.0 {
                20.0 * smoothed.log10()
            } else {
                f32::NEG_INFINITY
            };
            let scaled = 255.0 * (db - self.min_decibels) / range;
            bytes.push(scaled.clamp(0.0, 255.0) as u8);
        }

        AnalysisFrame::new(bytes)
    }

    /// Forget smoothing history, e.g. after a seek
    pub fn reset(&mut self) {
        self.smoothed.iter_mut().for_each(|v| *v = 0.0);
    }

    fn blackman(n: usize) -> Vec<f32> {
        let (a0, a1, a2) = (0.42f32, 0.5f32, 0.08f32);
        (0..n)
            .map(|i| {
                let x = 2.0 * std::f32::consts::PI * i as f32 / n as f32;
                a0 - a1 * x.cos() + a2 * (2.0 * x).cos()
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(frequency: f32, amplitude: f32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| (2.0 * std::f32::consts::PI * frequency * i as f32 / 44100.0).sin() * amplitude)
            .collect()
    }

    #[test]
    fn test_bucket_count_is_half_fft_size() {
        let analyser = SpectrumAnalyser::new(&AudioConfig::default()).unwrap();
        assert_eq!(analyser.fft_size(), 256);
        assert_eq!(analyser.bucket_count(), 128);
    }

    #[test]
    fn test_silence_maps_to_zero() {
        let mut analyser = SpectrumAnalyser::new(&AudioConfig::default()).unwrap();
        let frame = analyser.analyse(&[0.0; 256]);
        assert_eq!(frame.len(), 128);
        assert!(frame.is_silent());
    }

    #[test]
    fn test_sine_peaks_at_expected_bucket() {
        let config = AudioConfig { smoothing: 0.0, ..AudioConfig::default() };
        let mut analyser = SpectrumAnalyser::new(&config).unwrap();

        // 44100 / 256 ≈ 172 Hz per bucket; bucket 20 is centred on ~3445 Hz.
        // Quiet enough that the main lobe does not saturate at 255.
        let samples = sine(20.0 * 44100.0 / 256.0, 0.01, 256);
        let frame = analyser.analyse(&samples);

        let (peak, _) = frame
            .buckets()
            .iter()
            .enumerate()
            .max_by_key(|(_, &v)| v)
            .unwrap();
        assert_eq!(peak, 20);
        assert!(frame.buckets()[20] > 150);
        assert!(frame.buckets()[100] < frame.buckets()[20]);
    }

    #[test]
    fn test_smoothing_decays_gradually() {
        let mut analyser = SpectrumAnalyser::new(&AudioConfig::default()).unwrap();
        let loud = sine(3000.0, 0.8, 256);

        let first = analyser.analyse(&loud);
        let second = analyser.analyse(&loud);
        let peak_first = *first.buckets().iter().max().unwrap();
        let peak_second = *second.buckets().iter().max().unwrap();
        assert!(peak_second >= peak_first);

        let after_silence = analyser.analyse(&[0.0; 256]);
        assert!(!after_silence.is_silent());

        analyser.reset();
        assert!(analyser.analyse(&[0.0; 256]).is_silent());
    }

    #[test]
    fn test_short_input_is_padded() {
        let mut analyser = SpectrumAnalyser::new(&AudioConfig::default()).unwrap();
        let frame = analyser.analyse(&[0.0; 10]);
        assert_eq!(frame.len(), 128);
    }
}
