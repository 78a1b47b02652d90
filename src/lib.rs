//! Audio feature extraction and beat tracking for audio-reactive visuals.

pub mod config;
pub mod engine;
pub mod session;
pub mod source;

pub use config::{ConfigHandle, EngineConfig};
pub use engine::{Engine, FeatureReader, FeatureVector};
pub use session::Session;
pub use source::{SourceError, SpectrumSource};
