//! Real-time audio feature engine.
//!
//! One [`Engine`] turns a stream of magnitude frames into a [`FeatureVector`]. It has no
//! scheduling of its own: the caller drives it with one [`Engine::on_tick`] (or
//! [`Engine::tick_at`]) per cadence period and reads the result through
//! [`Engine::features`] or a [`FeatureReader`] handed to another thread.

pub mod bands;
pub mod detector;
pub mod envelope;
pub mod features;
pub mod history;
pub mod shaper;
pub mod tempo;

use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use crate::config::{ConfigHandle, EngineConfig};

use detector::Detector;
pub use features::FeatureVector;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StreamState {
    Idle,
    Streaming { epoch: Instant },
    Stopped,
}

/// Read-only view of the last committed feature vector.
#[derive(Debug, Clone, Default)]
pub struct FeatureReader {
    shared: Arc<RwLock<FeatureVector>>,
}

impl FeatureReader {
    pub fn get(&self) -> FeatureVector {
        match self.shared.read() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    fn publish(&self, features: FeatureVector) {
        match self.shared.write() {
            Ok(mut guard) => *guard = features,
            Err(poisoned) => *poisoned.into_inner() = features,
        }
    }
}

pub struct Engine {
    config: ConfigHandle,
    state: StreamState,
    features: FeatureVector,
    detector: Detector,
    reader: FeatureReader,
    frame: Vec<f32>,
    warned_malformed: bool,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        Self::with_handle(ConfigHandle::new(config))
    }

    pub fn with_handle(config: ConfigHandle) -> Self {
        Self {
            config,
            state: StreamState::Idle,
            features: FeatureVector::default(),
            detector: Detector::new(),
            reader: FeatureReader::default(),
            frame: Vec::new(),
            warned_malformed: false,
        }
    }

    /// Handle for adjusting the config between ticks.
    pub fn config_handle(&self) -> ConfigHandle {
        self.config.clone()
    }

    pub fn reader(&self) -> FeatureReader {
        self.reader.clone()
    }

    /// Last committed feature vector.
    pub fn features(&self) -> FeatureVector {
        self.features
    }

    pub fn is_streaming(&self) -> bool {
        matches!(self.state, StreamState::Streaming { .. })
    }

    /// Begin a stream. Rolling histories start empty; the feature vector carries over so
    /// the visuals resume from where they stopped. No-op while already streaming.
    pub fn start(&mut self) {
        if self.is_streaming() {
            return;
        }
        self.detector.reset(self.features.low);
        self.features.beat = false;
        self.features.transient_active = false;
        self.reader.publish(self.features);
        self.warned_malformed = false;
        self.state = StreamState::Streaming {
            epoch: Instant::now(),
        };
        log::info!("Feature engine streaming");
    }

    /// End the stream, keeping the last feature vector. Safe to call repeatedly or
    /// before any `start`.
    pub fn stop(&mut self) {
        if !self.is_streaming() {
            return;
        }
        self.state = StreamState::Stopped;
        log::info!(
            "Feature engine stopped (bpm={}, pattern={:.2})",
            self.features.bpm,
            self.features.pattern_strength
        );
    }

    /// Process one frame stamped with the wall-clock time since `start`.
    pub fn on_tick(&mut self, frame: &[f32]) -> bool {
        match self.state {
            StreamState::Streaming { epoch } => self.tick_at(frame, epoch.elapsed()),
            _ => self.tick_at(frame, Duration::ZERO),
        }
    }

    /// Process one frame at stream time `at`. Returns `false` (and changes nothing)
    /// unless the engine is streaming.
    pub fn tick_at(&mut self, frame: &[f32], at: Duration) -> bool {
        if !self.is_streaming() {
            log::trace!("Tick ignored: engine not streaming");
            return false;
        }

        let cfg = self.config.snapshot().sanitized();

        let replaced = features::sanitize_frame(frame, cfg.max_magnitude, &mut self.frame);
        if replaced > 0 && !self.warned_malformed {
            log::warn!("Replaced {} malformed samples with silence", replaced);
            self.warned_malformed = true;
        }

        let mut next = self.features;
        next.beat_impact = envelope::decay(next.beat_impact, &cfg.pulse);

        let raw = bands::split(&self.frame, &cfg);
        next.level = shaper::smooth(next.level, shaper::shape(raw.broadband, &cfg.level), &cfg.level);
        next.low = shaper::smooth(next.low, shaper::shape(raw.low, &cfg.low), &cfg.low);
        next.mid = shaper::smooth(next.mid, shaper::shape(raw.mid, &cfg.mid), &cfg.mid);
        let shaped_high = shaper::shape(raw.high, &cfg.high);
        next.high = shaper::smooth(next.high, shaped_high, &cfg.high);

        let detection = self.detector.process(next.low, shaped_high, at, &cfg);

        next.beat = detection.beat.is_some();
        if let Some(beat) = detection.beat {
            next.beat_impact = cfg.beat.impact_base + cfg.beat.impact_gain * beat.strength;
            if let Some(tempo) = tempo::estimate(&self.detector.history().beat_times, &cfg.tempo) {
                next.bpm = tempo.bpm;
                next.pattern_strength = tempo.pattern_strength;
            }
            if self.detector.history().beat_times.len() > 4 {
                log::debug!(
                    "Beat detected! BPM: {}, Pattern: {:.2}",
                    next.bpm,
                    next.pattern_strength
                );
            }
        }

        next.transient_active = detection.transient.is_some();
        if let Some(rise) = detection.transient {
            next.high = features::finite_unit(next.high + rise * cfg.transient.boost);
        }

        self.features = next;
        self.reader.publish(next);
        true
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}
