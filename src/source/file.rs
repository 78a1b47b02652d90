use rayon::prelude::*;
use std::path::{Path, PathBuf};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use super::{Analyser, SourceError, SpectrumSource};
use crate::config::AnalyserConfig;

pub struct DecodedAudio {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

/// Decode any format symphonia can probe into mono `f32` samples.
pub fn decode_audio(path: &Path) -> Result<DecodedAudio, SourceError> {
    let file = std::fs::File::open(path).map_err(|source| SourceError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe().format(
        &hint,
        mss,
        &FormatOptions::default(),
        &MetadataOptions::default(),
    )?;

    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != symphonia::core::codecs::CODEC_TYPE_NULL)
        .ok_or_else(|| SourceError::Empty(path.to_path_buf()))?;

    let track_id = track.id;
    let channels = track.codec_params.channels.map_or(1, |c| c.count()).max(1);
    let sample_rate = track
        .codec_params
        .sample_rate
        .ok_or_else(|| SourceError::Unavailable(format!("unknown sample rate in {}", path.display())))?;

    let mut decoder = symphonia::default::get_codecs().make(&track.codec_params, &DecoderOptions::default())?;

    let mut all_samples: Vec<f32> = Vec::new();

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(symphonia::core::errors::Error::IoError(ref e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(e) => return Err(e.into()),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(d) => d,
            Err(symphonia::core::errors::Error::DecodeError(msg)) => {
                log::warn!("Skipping undecodable packet: {}", msg);
                continue;
            }
            Err(e) => return Err(e.into()),
        };

        let spec = *decoded.spec();
        let mut sample_buf = SampleBuffer::<f32>::new(decoded.frames() as u64, spec);
        sample_buf.copy_interleaved_ref(decoded);

        let samples = sample_buf.samples();
        if channels == 1 {
            all_samples.extend_from_slice(samples);
        } else {
            all_samples.extend(
                samples
                    .chunks(channels)
                    .map(|frame| frame.iter().sum::<f32>() / channels as f32),
            );
        }
    }

    if all_samples.is_empty() {
        return Err(SourceError::Empty(path.to_path_buf()));
    }

    log::info!(
        "Decoded audio: {} samples, {}Hz, {:.1}s",
        all_samples.len(),
        sample_rate,
        all_samples.len() as f32 / sample_rate as f32
    );

    Ok(DecodedAudio {
        samples: all_samples,
        sample_rate,
    })
}

/// Replays an audio file as a sequence of spectra, one per output frame.
///
/// The whole file is analysed on `open`: raw spectra in parallel, then the order-dependent
/// smoothing pass sequentially.
pub struct FileSource {
    path: PathBuf,
    analyser: Analyser,
    fps: u32,
    frames: Vec<Vec<u8>>,
    cursor: usize,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>, config: AnalyserConfig, fps: u32) -> Self {
        Self {
            path: path.into(),
            analyser: Analyser::new(config),
            fps: fps.max(1),
            frames: Vec::new(),
            cursor: 0,
        }
    }

    /// Frames available after `open`.
    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    pub fn fps(&self) -> u32 {
        self.fps
    }

    /// Analyse already-decoded samples; `open` calls this after decoding.
    pub fn load_samples(&mut self, samples: &[f32], sample_rate: u32) {
        let samples_per_frame = sample_rate as f64 / self.fps as f64;
        let total_frames = (samples.len() as f64 / samples_per_frame).ceil() as usize;
        let fft_size = self.analyser.fft_size();

        let analyser = &self.analyser;
        let raw: Vec<Vec<f32>> = (0..total_frames)
            .into_par_iter()
            .map(|frame_idx| {
                let end = (((frame_idx + 1) as f64 * samples_per_frame) as usize).min(samples.len());
                let start = end.saturating_sub(fft_size);
                analyser.magnitudes(&samples[start..end])
            })
            .collect();

        self.analyser.reset();
        let mut frames = Vec::with_capacity(raw.len());
        for spectrum in &raw {
            let mut bytes = Vec::with_capacity(spectrum.len());
            self.analyser.to_bytes(spectrum, &mut bytes);
            frames.push(bytes);
        }

        self.frames = frames;
        self.cursor = 0;
    }
}

impl SpectrumSource for FileSource {
    fn open(&mut self) -> Result<(), SourceError> {
        let audio = decode_audio(&self.path)?;
        self.load_samples(&audio.samples, audio.sample_rate);
        log::info!(
            "Prepared {} spectra ({} bins @ {}fps) from {}",
            self.frames.len(),
            self.analyser.bins(),
            self.fps,
            self.path.display()
        );
        Ok(())
    }

    fn next_frame(&mut self, frame: &mut Vec<f32>) -> bool {
        let Some(bytes) = self.frames.get(self.cursor) else {
            return false;
        };
        frame.clear();
        frame.extend(bytes.iter().map(|&b| b as f32));
        self.cursor += 1;
        true
    }

    fn close(&mut self) {
        self.frames = Vec::new();
        self.cursor = 0;
    }

    fn bins(&self) -> usize {
        self.analyser.bins()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    #[test]
    fn missing_file_is_an_io_error() {
        let mut source = FileSource::new("/definitely/not/here.wav", AnalyserConfig::default(), 60);
        assert!(matches!(source.open(), Err(SourceError::Io { .. })));
        let mut frame = Vec::new();
        assert!(!source.next_frame(&mut frame));
    }

    #[test]
    fn one_spectrum_per_output_frame() {
        let sample_rate = 48_000;
        let samples: Vec<f32> = (0..sample_rate)
            .map(|i| 0.5 * (2.0 * PI * 110.0 * i as f32 / sample_rate as f32).sin())
            .collect();

        let mut source = FileSource::new("unused.wav", AnalyserConfig::default(), 60);
        source.load_samples(&samples, sample_rate as u32);
        assert_eq!(source.frame_count(), 60);

        let mut frame = Vec::new();
        let mut count = 0;
        while source.next_frame(&mut frame) {
            assert_eq!(frame.len(), 1024);
            assert!(frame.iter().all(|&b| (0.0..=255.0).contains(&b)));
            count += 1;
        }
        assert_eq!(count, 60);

        source.close();
        assert_eq!(source.frame_count(), 0);
    }
}
