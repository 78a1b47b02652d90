//! The feature vector the engine publishes and input frame sanitising.

use serde::Serialize;

/// Engine output, overwritten once per tick.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct FeatureVector {
    /// Broadband loudness (0.0-1.0)
    pub level: f32,
    /// Per-band levels (0.0-1.0)
    pub low: f32,
    pub mid: f32,
    pub high: f32,
    /// Beat envelope: jumps above 1.0 on a beat, decays toward 0 every tick
    pub beat_impact: f32,
    /// Tempo estimate; 0 until enough beats have been seen
    pub bpm: u32,
    /// Regularity of recent beat spacing (1.0 = perfectly periodic)
    pub pattern_strength: f32,
    /// High-frequency transient fired on this tick
    pub transient_active: bool,
    /// Beat fired on this tick
    pub beat: bool,
}

/// Copy `frame` into `out`, replacing non-finite, negative and over-range samples with 0.
///
/// Returns how many samples were replaced.
pub fn sanitize_frame(frame: &[f32], max_magnitude: f32, out: &mut Vec<f32>) -> usize {
    out.clear();
    let mut replaced = 0;
    out.extend(frame.iter().map(|&s| {
        if s.is_finite() && (0.0..=max_magnitude).contains(&s) {
            s
        } else {
            replaced += 1;
            0.0
        }
    }));
    replaced
}

pub(crate) fn finite_unit(value: f32) -> f32 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        0.0
    }
}
