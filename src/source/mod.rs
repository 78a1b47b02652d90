//! Upstream spectrum producers.
//!
//! A [`SpectrumSource`] yields one byte-scaled magnitude frame (0-255 per bin) per
//! cadence tick. The engine never sees where frames come from.

pub mod analyser;
pub mod file;
#[cfg(feature = "mic")]
pub mod mic;

use std::path::PathBuf;
use thiserror::Error;

pub use analyser::Analyser;
pub use file::FileSource;
#[cfg(feature = "mic")]
pub use mic::MicSource;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("audio input unavailable: {0}")]
    Unavailable(String),
    #[error("failed to open {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to decode audio: {0}")]
    Decode(#[from] symphonia::core::errors::Error),
    #[error("no audio samples in {0}")]
    Empty(PathBuf),
}

pub trait SpectrumSource {
    /// Acquire the underlying stream. Called once per session start.
    fn open(&mut self) -> Result<(), SourceError>;

    /// Write the next frame into `frame`. Returns `false` once the source is exhausted
    /// or not open.
    fn next_frame(&mut self, frame: &mut Vec<f32>) -> bool;

    /// Release the stream. Must be safe to call when not open.
    fn close(&mut self);

    /// Number of bins per frame.
    fn bins(&self) -> usize;
}
