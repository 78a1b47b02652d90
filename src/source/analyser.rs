use std::f32::consts::PI;
use std::sync::Arc;

use rustfft::{num_complex::Complex, Fft, FftPlanner};

use crate::config::AnalyserConfig;

const MIN_FFT_SIZE: usize = 32;

/// Turns PCM windows into byte-scaled magnitude spectra.
///
/// Blackman window, forward FFT, magnitude scaled by the FFT size, temporal smoothing
/// against the previous spectrum, then decibels mapped linearly from
/// `[min_db, max_db]` onto `0..=255`.
pub struct Analyser {
    config: AnalyserConfig,
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    smoothed: Vec<f32>,
    raw: Vec<f32>,
}

impl Analyser {
    pub fn new(config: AnalyserConfig) -> Self {
        let fft_size = config.fft_size.max(MIN_FFT_SIZE);
        let mut planner = FftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(fft_size);
        Self {
            config: AnalyserConfig { fft_size, ..config },
            fft,
            window: blackman_window(fft_size),
            smoothed: vec![0.0; fft_size / 2],
            raw: Vec::with_capacity(fft_size / 2),
        }
    }

    pub fn fft_size(&self) -> usize {
        self.config.fft_size
    }

    pub fn bins(&self) -> usize {
        self.config.fft_size / 2
    }

    pub fn reset(&mut self) {
        self.smoothed.iter_mut().for_each(|v| *v = 0.0);
    }

    /// Full pipeline for one window of samples (most recent sample last).
    pub fn process(&mut self, samples: &[f32], out: &mut Vec<u8>) {
        let raw = std::mem::take(&mut self.raw);
        let raw = self.magnitudes_into(samples, raw);
        self.to_bytes(&raw, out);
        self.raw = raw;
    }

    /// Unsmoothed magnitudes; shares no mutable state so it can run on any thread.
    pub fn magnitudes(&self, samples: &[f32]) -> Vec<f32> {
        self.magnitudes_into(samples, Vec::with_capacity(self.bins()))
    }

    fn magnitudes_into(&self, samples: &[f32], mut out: Vec<f32>) -> Vec<f32> {
        let size = self.config.fft_size;
        let mut buffer = vec![Complex::new(0.0f32, 0.0); size];

        // right-align so the newest samples sit at the end of the window
        let take = samples.len().min(size);
        let offset = size - take;
        for (i, &s) in samples[samples.len() - take..].iter().enumerate() {
            let s = if s.is_finite() { s } else { 0.0 };
            buffer[offset + i] = Complex::new(s * self.window[offset + i], 0.0);
        }

        self.fft.process(&mut buffer);

        let scale = 1.0 / size as f32;
        out.clear();
        out.extend(buffer[..size / 2].iter().map(|c| c.norm() * scale));
        out
    }

    /// Apply temporal smoothing and convert to bytes. Must be fed spectra in order.
    pub fn to_bytes(&mut self, raw: &[f32], out: &mut Vec<u8>) {
        let tau = self.config.smoothing.clamp(0.0, 1.0);
        let min_db = self.config.min_db;
        let range = (self.config.max_db - min_db).max(f32::EPSILON);

        out.clear();
        for (prev, &mag) in self.smoothed.iter_mut().zip(raw) {
            let next = tau * *prev + (1.0 - tau) * mag;
            *prev = if next.is_finite() { next } else { 0.0 };

            let byte = if *prev <= 0.0 {
                0.0
            } else {
                let db = 20.0 * prev.log10();
                (255.0 * (db - min_db) / range).clamp(0.0, 255.0)
            };
            out.push(byte as u8);
        }
    }
}

fn blackman_window(size: usize) -> Vec<f32> {
    let n = size as f32;
    (0..size)
        .map(|i| {
            let x = i as f32 / n;
            0.42 - 0.5 * (2.0 * PI * x).cos() + 0.08 * (4.0 * PI * x).cos()
        })
        .collect()
}
