//! Live capture from the default input device.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, Sample, SizedSample};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use super::{Analyser, SourceError, SpectrumSource};
use crate::config::AnalyserConfig;

pub struct MicSource {
    analyser: Analyser,
    buffer: Arc<Mutex<VecDeque<f32>>>,
    stream: Option<cpal::Stream>,
    window: Vec<f32>,
    bytes: Vec<u8>,
}

impl MicSource {
    pub fn new(config: AnalyserConfig) -> Self {
        let analyser = Analyser::new(config);
        let size = analyser.fft_size();
        Self {
            analyser,
            buffer: Arc::new(Mutex::new(VecDeque::with_capacity(size))),
            stream: None,
            window: Vec::with_capacity(size),
            bytes: Vec::with_capacity(size / 2),
        }
    }
}

impl SpectrumSource for MicSource {
    fn open(&mut self) -> Result<(), SourceError> {
        if self.stream.is_some() {
            return Ok(());
        }

        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or_else(|| SourceError::Unavailable("no default input device".into()))?;
        let name = device.name().unwrap_or_else(|_| "unknown".into());
        let supported = device
            .default_input_config()
            .map_err(|e| SourceError::Unavailable(format!("{}: {}", name, e)))?;
        let channels = supported.channels().max(1) as usize;
        let sample_format = supported.sample_format();
        let stream_config: cpal::StreamConfig = supported.into();

        let capacity = self.analyser.fft_size();
        let buffer = Arc::clone(&self.buffer);
        let stream = match sample_format {
            cpal::SampleFormat::F32 => {
                build_stream::<f32>(&device, &stream_config, buffer, channels, capacity)
            }
            cpal::SampleFormat::I16 => {
                build_stream::<i16>(&device, &stream_config, buffer, channels, capacity)
            }
            cpal::SampleFormat::U16 => {
                build_stream::<u16>(&device, &stream_config, buffer, channels, capacity)
            }
            other => {
                return Err(SourceError::Unavailable(format!(
                    "{}: unsupported sample format {:?}",
                    name, other
                )))
            }
        }
        .map_err(|e| SourceError::Unavailable(format!("{}: {}", name, e)))?;
        stream
            .play()
            .map_err(|e| SourceError::Unavailable(format!("{}: {}", name, e)))?;

        self.analyser.reset();
        self.stream = Some(stream);
        log::info!(
            "Capturing from {} ({} ch {:?} @ {}Hz)",
            name,
            channels,
            sample_format,
            stream_config.sample_rate.0
        );
        Ok(())
    }

    fn next_frame(&mut self, frame: &mut Vec<f32>) -> bool {
        if self.stream.is_none() {
            return false;
        }
        {
            let buf = match self.buffer.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            self.window.clear();
            self.window.extend(buf.iter().copied());
        }
        self.analyser.process(&self.window, &mut self.bytes);
        frame.clear();
        frame.extend(self.bytes.iter().map(|&b| b as f32));
        true
    }

    fn close(&mut self) {
        if self.stream.take().is_some() {
            log::info!("Released input device");
        }
        if let Ok(mut buf) = self.buffer.lock() {
            buf.clear();
        }
    }

    fn bins(&self) -> usize {
        self.analyser.bins()
    }
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    buffer: Arc<Mutex<VecDeque<f32>>>,
    channels: usize,
    capacity: usize,
) -> Result<cpal::Stream, cpal::BuildStreamError>
where
    T: SizedSample,
    f32: FromSample<T>,
{
    device.build_input_stream(
        config,
        move |data: &[T], _: &cpal::InputCallbackInfo| {
            let mut buf = match buffer.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            push_downmixed(&mut buf, data, channels, capacity);
        },
        |err| log::error!("Audio stream error: {}", err),
        None,
    )
}

/// Average interleaved frames to mono and append them, keeping the newest `capacity`.
fn push_downmixed<T>(buf: &mut VecDeque<f32>, data: &[T], channels: usize, capacity: usize)
where
    T: Sample,
    f32: FromSample<T>,
{
    for chunk in data.chunks(channels) {
        if buf.len() == capacity {
            buf.pop_front();
        }
        let sum: f32 = chunk.iter().map(|&s| s.to_sample::<f32>()).sum();
        buf.push_back(sum / channels as f32);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_samples_are_scaled_to_unit_range() {
        let mut buf = VecDeque::new();
        push_downmixed(&mut buf, &[i16::MAX, i16::MAX, i16::MIN, i16::MIN], 2, 8);
        assert!((buf[0] - 1.0).abs() < 1e-3);
        assert!((buf[1] + 1.0).abs() < 1e-3);

        buf.clear();
        push_downmixed(&mut buf, &[32768u16, u16::MAX], 1, 8);
        assert!(buf[0].abs() < 1e-3);
        assert!((buf[1] - 1.0).abs() < 1e-3);
    }

    #[test]
    fn window_keeps_newest_samples() {
        let mut buf = VecDeque::new();
        push_downmixed(&mut buf, &[0.1f32, 0.2, 0.3, 0.4], 1, 2);
        assert_eq!(buf.iter().copied().collect::<Vec<_>>(), vec![0.3, 0.4]);
    }

    #[test]
    fn stereo_frames_are_averaged() {
        let mut buf = VecDeque::new();
        push_downmixed(&mut buf, &[0.5f32, -0.5, 1.0, 0.0], 2, 8);
        assert_eq!(buf.iter().copied().collect::<Vec<_>>(), vec![0.0, 0.5]);
    }
}
