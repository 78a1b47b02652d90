use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

/// Top-level `beatglass.toml` layout.
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub analyser: AnalyserConfig,
    #[serde(default)]
    pub engine: EngineConfig,
}

#[derive(Debug, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_fps")]
    pub fps: u32,
}

/// Settings for the spectrum producer that feeds the engine.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct AnalyserConfig {
    #[serde(default = "default_fft_size")]
    pub fft_size: usize,
    /// Temporal smoothing between consecutive spectra (0 = none, 1 = frozen).
    #[serde(default = "default_smoothing")]
    pub smoothing: f32,
    #[serde(default = "default_min_db")]
    pub min_db: f32,
    #[serde(default = "default_max_db")]
    pub max_db: f32,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self { fps: default_fps() }
    }
}

impl Default for AnalyserConfig {
    fn default() -> Self {
        Self {
            fft_size: default_fft_size(),
            smoothing: default_smoothing(),
            min_db: default_min_db(),
            max_db: default_max_db(),
        }
    }
}

fn default_fps() -> u32 { 60 }
fn default_fft_size() -> usize { 2048 }
fn default_smoothing() -> f32 { 0.85 }
fn default_min_db() -> f32 { -100.0 }
fn default_max_db() -> f32 { -30.0 }

/// Per-band response shaping and smoothing.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct BandShape {
    /// Raw band average that maps to full scale. Values above it clamp to 1.
    pub ceiling: f32,
    /// Power-law exponent; below 1 lifts quiet signals.
    pub exponent: f32,
    pub amplification: f32,
    /// Smoothing coefficient used while the level rises.
    pub attack: f32,
    /// Smoothing coefficient used while the level falls.
    pub decay: f32,
}

impl BandShape {
    const fn new(ceiling: f32, exponent: f32, amplification: f32, attack: f32, decay: f32) -> Self {
        Self { ceiling, exponent, amplification, attack, decay }
    }

    fn sanitized(self, fallback: BandShape) -> Self {
        Self {
            ceiling: positive_or(self.ceiling, fallback.ceiling),
            exponent: positive_or(self.exponent, fallback.exponent).max(MIN_EXPONENT),
            amplification: finite_or(self.amplification, fallback.amplification).max(0.0),
            attack: unit_or(self.attack, fallback.attack),
            decay: unit_or(self.decay, fallback.decay),
        }
    }
}

/// Where the bass/mid/high bands sit inside a frame, and how bins are weighted.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct BandLayout {
    /// Bass covers bins `1..floor(n * bass_end)`.
    pub bass_end: f32,
    /// Mid covers bins up to `floor(n * mid_end)`; high takes the rest.
    pub mid_end: f32,
    /// Bass bins below this index get `sub_bass_weight`.
    pub sub_bass_bins: usize,
    pub sub_bass_weight: f32,
    /// Height of the sine bump added on top of `mid_base_weight`.
    pub mid_peak_weight: f32,
    pub mid_base_weight: f32,
    /// Weight at the bottom of the high band, falling by one per band width.
    pub high_peak_weight: f32,
    /// Relative position inside the high band where the roll-off starts.
    pub high_rolloff_start: f32,
    /// Weight intercept and slope past the roll-off.
    pub high_tail_weight: f32,
    pub high_tail_slope: f32,
    pub high_weight_floor: f32,
}

impl Default for BandLayout {
    fn default() -> Self {
        Self {
            bass_end: 0.05,
            mid_end: 0.6,
            sub_bass_bins: 3,
            sub_bass_weight: 0.5,
            mid_peak_weight: 0.8,
            mid_base_weight: 0.5,
            high_peak_weight: 1.2,
            high_rolloff_start: 0.4,
            high_tail_weight: 0.8,
            high_tail_slope: 0.5,
            high_weight_floor: 0.2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct BeatConfig {
    pub baseline_threshold: f32,
    pub min_threshold: f32,
    pub max_threshold: f32,
    /// Weight of the adaptive delta against the baseline.
    pub adaptive_blend: f32,
    /// Index into the descending positive deltas, as a fraction of their count.
    pub adaptive_percentile: f32,
    pub adaptive_scale: f32,
    /// Positive deltas required before the threshold adapts at all.
    pub min_adaptive_samples: usize,
    pub energy_floor: f32,
    pub energy_floor_ratio: f32,
    pub min_energy_samples: usize,
    pub refractory_ms: f64,
    pub impact_base: f32,
    pub impact_gain: f32,
}

impl Default for BeatConfig {
    fn default() -> Self {
        Self {
            baseline_threshold: 0.18,
            min_threshold: 0.12,
            max_threshold: 0.30,
            adaptive_blend: 0.7,
            adaptive_percentile: 0.4,
            adaptive_scale: 0.8,
            min_adaptive_samples: 10,
            energy_floor: 0.08,
            energy_floor_ratio: 0.5,
            min_energy_samples: 4,
            refractory_ms: 180.0,
            impact_base: 1.0,
            impact_gain: 0.5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct TransientConfig {
    pub threshold: f32,
    pub refractory_ms: f64,
    /// Fraction of the high-band rise added back onto the smoothed high level.
    pub boost: f32,
}

impl Default for TransientConfig {
    fn default() -> Self {
        Self {
            threshold: 0.15,
            refractory_ms: 80.0,
            boost: 0.5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct TempoConfig {
    pub min_bpm: u32,
    pub max_bpm: u32,
    /// Fraction of intervals dropped from each end before averaging.
    pub outlier_trim: f32,
    pub min_beats: usize,
}

impl Default for TempoConfig {
    fn default() -> Self {
        Self {
            min_bpm: 60,
            max_bpm: 200,
            outlier_trim: 0.2,
            min_beats: 4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct PulseConfig {
    /// Higher values make the beat impact fade faster (0 holds it).
    pub decay_speed: f32,
    pub snap_floor: f32,
}

impl Default for PulseConfig {
    fn default() -> Self {
        Self {
            decay_speed: 0.9,
            snap_floor: 0.01,
        }
    }
}

/// Tunable coefficients of the feature engine.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct EngineConfig {
    pub level: BandShape,
    pub low: BandShape,
    pub mid: BandShape,
    pub high: BandShape,
    pub bands: BandLayout,
    pub beat: BeatConfig,
    pub transient: TransientConfig,
    pub tempo: TempoConfig,
    pub pulse: PulseConfig,
    /// Largest legal sample value; anything above is treated as silence.
    pub max_magnitude: f32,
}

const MIN_EXPONENT: f32 = 0.05;

const DEFAULT_LEVEL: BandShape = BandShape::new(120.0, 0.8, 1.0, 0.4, 0.2);
const DEFAULT_LOW: BandShape = BandShape::new(145.0, 0.9, 1.0, 0.5, 0.25);
const DEFAULT_MID: BandShape = BandShape::new(110.0, 0.96, 1.8, 0.45, 0.225);
const DEFAULT_HIGH: BandShape = BandShape::new(95.0, 0.7, 1.0, 0.55, 0.3);

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            level: DEFAULT_LEVEL,
            low: DEFAULT_LOW,
            mid: DEFAULT_MID,
            high: DEFAULT_HIGH,
            bands: BandLayout::default(),
            beat: BeatConfig::default(),
            transient: TransientConfig::default(),
            tempo: TempoConfig::default(),
            pulse: PulseConfig::default(),
            max_magnitude: 255.0,
        }
    }
}

impl EngineConfig {
    /// Copy of this config with every coefficient forced into its legal domain.
    pub fn sanitized(&self) -> Self {
        let layout = BandLayout::default();
        let beat = BeatConfig::default();
        let transient = TransientConfig::default();
        let tempo = TempoConfig::default();
        let pulse = PulseConfig::default();

        let bass_end = unit_or(self.bands.bass_end, layout.bass_end);
        let mid_end = unit_or(self.bands.mid_end, layout.mid_end).max(bass_end);
        let min_threshold = positive_or(self.beat.min_threshold, beat.min_threshold);
        let max_threshold = finite_or(self.beat.max_threshold, beat.max_threshold).max(min_threshold);
        let min_bpm = self.tempo.min_bpm.max(1);

        Self {
            level: self.level.sanitized(DEFAULT_LEVEL),
            low: self.low.sanitized(DEFAULT_LOW),
            mid: self.mid.sanitized(DEFAULT_MID),
            high: self.high.sanitized(DEFAULT_HIGH),
            bands: BandLayout {
                bass_end,
                mid_end,
                sub_bass_bins: self.bands.sub_bass_bins,
                sub_bass_weight: finite_or(self.bands.sub_bass_weight, layout.sub_bass_weight).max(0.0),
                mid_peak_weight: finite_or(self.bands.mid_peak_weight, layout.mid_peak_weight).max(0.0),
                mid_base_weight: finite_or(self.bands.mid_base_weight, layout.mid_base_weight).max(0.0),
                high_peak_weight: finite_or(self.bands.high_peak_weight, layout.high_peak_weight).max(0.0),
                high_rolloff_start: unit_or(self.bands.high_rolloff_start, layout.high_rolloff_start),
                high_tail_weight: finite_or(self.bands.high_tail_weight, layout.high_tail_weight).max(0.0),
                high_tail_slope: finite_or(self.bands.high_tail_slope, layout.high_tail_slope).max(0.0),
                high_weight_floor: finite_or(self.bands.high_weight_floor, layout.high_weight_floor).max(0.0),
            },
            beat: BeatConfig {
                baseline_threshold: finite_or(self.beat.baseline_threshold, beat.baseline_threshold)
                    .clamp(min_threshold, max_threshold),
                min_threshold,
                max_threshold,
                adaptive_blend: unit_or(self.beat.adaptive_blend, beat.adaptive_blend),
                adaptive_percentile: unit_or(self.beat.adaptive_percentile, beat.adaptive_percentile),
                adaptive_scale: finite_or(self.beat.adaptive_scale, beat.adaptive_scale).max(0.0),
                min_adaptive_samples: self.beat.min_adaptive_samples,
                energy_floor: finite_or(self.beat.energy_floor, beat.energy_floor).max(0.0),
                energy_floor_ratio: finite_or(self.beat.energy_floor_ratio, beat.energy_floor_ratio).max(0.0),
                min_energy_samples: self.beat.min_energy_samples.max(1),
                refractory_ms: non_negative_ms(self.beat.refractory_ms, beat.refractory_ms),
                impact_base: finite_or(self.beat.impact_base, beat.impact_base).max(0.0),
                impact_gain: finite_or(self.beat.impact_gain, beat.impact_gain).max(0.0),
            },
            transient: TransientConfig {
                threshold: finite_or(self.transient.threshold, transient.threshold).max(0.0),
                refractory_ms: non_negative_ms(self.transient.refractory_ms, transient.refractory_ms),
                boost: finite_or(self.transient.boost, transient.boost).max(0.0),
            },
            tempo: TempoConfig {
                min_bpm,
                max_bpm: self.tempo.max_bpm.max(min_bpm),
                outlier_trim: finite_or(self.tempo.outlier_trim, tempo.outlier_trim).clamp(0.0, 0.5),
                min_beats: self.tempo.min_beats.max(2),
            },
            pulse: PulseConfig {
                decay_speed: unit_or(self.pulse.decay_speed, pulse.decay_speed),
                snap_floor: finite_or(self.pulse.snap_floor, pulse.snap_floor).max(0.0),
            },
            max_magnitude: positive_or(self.max_magnitude, 255.0),
        }
    }
}

fn finite_or(value: f32, fallback: f32) -> f32 {
    if value.is_finite() { value } else { fallback }
}

fn positive_or(value: f32, fallback: f32) -> f32 {
    if value.is_finite() && value > 0.0 { value } else { fallback }
}

fn unit_or(value: f32, fallback: f32) -> f32 {
    finite_or(value, fallback).clamp(0.0, 1.0)
}

fn non_negative_ms(value: f64, fallback: f64) -> f64 {
    if value.is_finite() { value.max(0.0) } else { fallback }
}

/// Shared, mutable engine configuration.
///
/// The control layer edits it between ticks; the engine takes one snapshot per tick so a
/// change never applies halfway through a frame.
#[derive(Debug, Clone, Default)]
pub struct ConfigHandle {
    inner: Arc<RwLock<EngineConfig>>,
}

impl ConfigHandle {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            inner: Arc::new(RwLock::new(config)),
        }
    }

    pub fn snapshot(&self) -> EngineConfig {
        match self.inner.read() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    pub fn set(&self, config: EngineConfig) {
        self.update(|current| *current = config);
    }

    pub fn update(&self, edit: impl FnOnce(&mut EngineConfig)) {
        match self.inner.write() {
            Ok(mut guard) => edit(&mut guard),
            Err(poisoned) => edit(&mut poisoned.into_inner()),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config: {}", path.display()))?;
    toml::from_str(&content).with_context(|| format!("Failed to parse config: {}", path.display()))
}

/// `beatglass.toml` in the working directory, then the per-user config locations.
pub fn find_config_path() -> Option<PathBuf> {
    let local = PathBuf::from("beatglass.toml");
    if local.exists() {
        return Some(local);
    }
    if let Some(home) = dirs::home_dir() {
        let xdg = home.join(".config").join("beatglass").join("config.toml");
        if xdg.exists() {
            return Some(xdg);
        }
    }
    if let Some(config_dir) = dirs::config_dir() {
        let platform = config_dir.join("beatglass").join("config.toml");
        if platform.exists() {
            return Some(platform);
        }
    }
    None
}
