//! Decay of the beat pulse between beats.

use crate::config::PulseConfig;

/// Per-tick multiplier for the beat impact. A higher decay speed shortens the pulse.
pub fn decay_rate(decay_speed: f32) -> f32 {
    0.7 + (1.0 - decay_speed.clamp(0.0, 1.0)) * 0.3
}

/// Decay `impact` by one tick, snapping residue below the floor to zero.
pub fn decay(impact: f32, pulse: &PulseConfig) -> f32 {
    if !impact.is_finite() {
        return 0.0;
    }
    let next = (impact * decay_rate(pulse.decay_speed)).max(0.0);
    if next < pulse.snap_floor {
        0.0
    } else {
        next
    }
}
