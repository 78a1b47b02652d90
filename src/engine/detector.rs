//! Beat and transient detection over the shaped band levels.
//!
//! Beats come from the rate of rise of the smoothed bass level, compared against a
//! threshold that adapts to the recent distribution of positive bass deltas. Transients
//! come from a fast rise of the shaped high band. Both paths have their own refractory
//! window and may fire on the same tick.

use std::time::Duration;

use crate::config::{BeatConfig, EngineConfig, TransientConfig};

use super::history::{BeatHistory, RingBuffer};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BeatEvent {
    /// How far the bass rise exceeded the threshold, capped at 1.
    pub strength: f32,
    pub delta: f32,
    pub threshold: f32,
    /// Smoothed bass level at the beat.
    pub energy: f32,
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Detection {
    pub beat: Option<BeatEvent>,
    /// Rise of the high band when a transient fired.
    pub transient: Option<f32>,
}

#[derive(Debug, Clone, Default)]
pub struct Detector {
    history: BeatHistory,
    previous_bass: f32,
    last_beat: Option<Duration>,
    last_transient: Option<Duration>,
}

impl Detector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget everything from the previous stream. `bass` seeds the delta baseline so a
    /// restart does not register the retained level as a rise.
    pub fn reset(&mut self, bass: f32) {
        self.history.clear();
        self.previous_bass = bass;
        self.last_beat = None;
        self.last_transient = None;
    }

    pub fn history(&self) -> &BeatHistory {
        &self.history
    }

    pub fn last_beat(&self) -> Option<Duration> {
        self.last_beat
    }

    pub fn process(
        &mut self,
        smoothed_bass: f32,
        shaped_high: f32,
        at: Duration,
        config: &EngineConfig,
    ) -> Detection {
        let beat = self.detect_beat(smoothed_bass, at, &config.beat);
        let transient = self.detect_transient(shaped_high, at, &config.transient);
        Detection { beat, transient }
    }

    fn detect_beat(&mut self, bass: f32, at: Duration, config: &BeatConfig) -> Option<BeatEvent> {
        let delta = bass - self.previous_bass;
        self.previous_bass = bass;
        self.history.bass_deltas.push(delta);

        let threshold = dynamic_threshold(&self.history.bass_deltas, config);
        let min_energy = dynamic_min_energy(&self.history.beat_energies, config);

        let fired = delta > threshold
            && bass > min_energy
            && elapsed_beyond(self.last_beat, at, config.refractory_ms);
        if !fired {
            return None;
        }

        self.history.beat_energies.push(bass);
        self.history.beat_times.push(at);
        self.last_beat = Some(at);

        Some(BeatEvent {
            strength: (delta / threshold).clamp(0.0, 1.0),
            delta,
            threshold,
            energy: bass,
        })
    }

    fn detect_transient(&mut self, high: f32, at: Duration, config: &TransientConfig) -> Option<f32> {
        let delta = self.history.high_levels.last().map_or(0.0, |prev| high - prev);
        self.history.high_levels.push(high);

        if delta > config.threshold && elapsed_beyond(self.last_transient, at, config.refractory_ms) {
            self.last_transient = Some(at);
            Some(delta)
        } else {
            None
        }
    }
}

/// Rise threshold adapted to the recent positive bass deltas.
pub fn dynamic_threshold(deltas: &RingBuffer<f32>, config: &BeatConfig) -> f32 {
    let mut rising: Vec<f32> = deltas.iter().copied().filter(|d| *d > 0.0).collect();
    if rising.len() <= config.min_adaptive_samples {
        return config.baseline_threshold.clamp(config.min_threshold, config.max_threshold);
    }

    rising.sort_by(|a, b| b.total_cmp(a));
    let index = ((rising.len() as f32 * config.adaptive_percentile).floor() as usize).min(rising.len() - 1);
    let significant = rising[index] * config.adaptive_scale;

    let blended = config.baseline_threshold + (significant - config.baseline_threshold) * config.adaptive_blend;
    blended.clamp(config.min_threshold, config.max_threshold)
}

/// Energy the bass must exceed to count as a beat, derived from recent beat energies.
pub fn dynamic_min_energy(energies: &RingBuffer<f32>, config: &BeatConfig) -> f32 {
    if energies.len() < config.min_energy_samples {
        return config.energy_floor;
    }
    let quietest = energies.iter().copied().fold(f32::INFINITY, f32::min);
    (quietest * config.energy_floor_ratio).max(config.energy_floor)
}

fn elapsed_beyond(last: Option<Duration>, now: Duration, window_ms: f64) -> bool {
    match last {
        None => true,
        Some(last) => now.saturating_sub(last).as_secs_f64() * 1000.0 > window_ms,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    #[test]
    fn baseline_until_enough_rises() {
        let cfg = BeatConfig::default();
        let mut deltas = RingBuffer::new(40);
        for _ in 0..10 {
            deltas.push(0.5);
        }
        deltas.push(-0.3);
        assert_eq!(dynamic_threshold(&deltas, &cfg), 0.18);
    }

    #[test]
    fn baseline_is_held_within_bounds() {
        let cfg = BeatConfig {
            baseline_threshold: -0.01,
            ..BeatConfig::default()
        };
        let deltas = RingBuffer::new(40);
        assert_eq!(dynamic_threshold(&deltas, &cfg), 0.12);

        let cfg = BeatConfig {
            baseline_threshold: 2.0,
            ..BeatConfig::default()
        };
        assert_eq!(dynamic_threshold(&deltas, &cfg), 0.30);
    }

    #[test]
    fn threshold_adapts_within_bounds() {
        let cfg = BeatConfig::default();
        let mut loud = RingBuffer::new(40);
        for _ in 0..20 {
            loud.push(0.9);
        }
        assert_eq!(dynamic_threshold(&loud, &cfg), 0.30);

        let mut quiet = RingBuffer::new(40);
        for _ in 0..20 {
            quiet.push(0.01);
        }
        assert_eq!(dynamic_threshold(&quiet, &cfg), 0.12);

        let mut mixed = RingBuffer::new(40);
        for _ in 0..20 {
            mixed.push(0.25);
        }
        // lerp(0.18, 0.25 * 0.8, 0.7)
        assert!((dynamic_threshold(&mixed, &cfg) - 0.194).abs() < 1e-5);
    }

    #[test]
    fn energy_floor_follows_quietest_beat() {
        let cfg = BeatConfig::default();
        let mut energies = RingBuffer::new(8);
        for e in [0.6, 0.5, 0.7] {
            energies.push(e);
        }
        assert_eq!(dynamic_min_energy(&energies, &cfg), 0.08);
        energies.push(0.4);
        assert!((dynamic_min_energy(&energies, &cfg) - 0.2).abs() < 1e-6);

        let mut faint = RingBuffer::new(8);
        for _ in 0..4 {
            faint.push(0.1);
        }
        assert_eq!(dynamic_min_energy(&faint, &cfg), 0.08);
    }

    #[test]
    fn beat_fires_on_sharp_bass_rise() {
        let cfg = EngineConfig::default();
        let mut detector = Detector::new();
        assert_eq!(detector.process(0.0, 0.0, ms(0), &cfg).beat, None);

        let beat = detector.process(0.5, 0.0, ms(16), &cfg).beat.unwrap();
        assert_eq!(beat.strength, 1.0);
        assert_eq!(detector.last_beat(), Some(ms(16)));
        assert_eq!(detector.history().beat_times.len(), 1);
    }

    #[test]
    fn quiet_rise_is_not_a_beat() {
        let cfg = EngineConfig::default();
        let mut detector = Detector::new();
        detector.process(0.0, 0.0, ms(0), &cfg);
        assert_eq!(detector.process(0.05, 0.0, ms(16), &cfg).beat, None);
    }

    #[test]
    fn beat_refractory_window() {
        let cfg = EngineConfig::default();
        let mut detector = Detector::new();
        assert!(detector.process(0.4, 0.0, ms(0), &cfg).beat.is_some());
        detector.process(0.0, 0.0, ms(50), &cfg);
        assert!(detector.process(0.4, 0.0, ms(150), &cfg).beat.is_none());
        detector.process(0.0, 0.0, ms(170), &cfg);
        assert!(detector.process(0.4, 0.0, ms(181), &cfg).beat.is_some());
    }

    #[test]
    fn transient_refractory_window() {
        let cfg = EngineConfig::default();
        let mut detector = Detector::new();
        detector.process(0.0, 0.0, ms(0), &cfg);
        assert_eq!(detector.process(0.0, 0.5, ms(10), &cfg).transient, Some(0.5));
        detector.process(0.0, 0.0, ms(20), &cfg);
        assert_eq!(detector.process(0.0, 0.5, ms(60), &cfg).transient, None);
        detector.process(0.0, 0.0, ms(70), &cfg);
        assert!(detector.process(0.0, 0.5, ms(91), &cfg).transient.is_some());
    }

    #[test]
    fn first_high_sample_has_no_delta() {
        let cfg = EngineConfig::default();
        let mut detector = Detector::new();
        assert_eq!(detector.process(0.0, 1.0, ms(0), &cfg).transient, None);
    }

    #[test]
    fn reset_clears_history_and_seeds_baseline() {
        let cfg = EngineConfig::default();
        let mut detector = Detector::new();
        detector.process(0.6, 0.0, ms(0), &cfg);
        detector.reset(0.6);
        assert!(detector.history().beat_times.is_empty());
        assert_eq!(detector.last_beat(), None);
        assert!(detector.process(0.6, 0.0, ms(10), &cfg).beat.is_none());
    }
}
