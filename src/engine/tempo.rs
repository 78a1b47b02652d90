//! Tempo and pulse regularity from recent beat timestamps.

use std::time::Duration;

use crate::config::TempoConfig;

use super::history::RingBuffer;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TempoEstimate {
    pub bpm: u32,
    pub pattern_strength: f32,
}

/// Estimate tempo from beat timestamps, oldest first.
///
/// Returns `None` when there are fewer than `min_beats` timestamps or nothing survives
/// the outlier trim; the caller keeps its previous estimate in that case.
pub fn estimate(beat_times: &RingBuffer<Duration>, config: &TempoConfig) -> Option<TempoEstimate> {
    if beat_times.len() < config.min_beats.max(2) {
        return None;
    }

    let stamps: Vec<f64> = beat_times.iter().map(|t| t.as_secs_f64() * 1000.0).collect();
    let mut intervals: Vec<f64> = stamps.windows(2).map(|w| w[1] - w[0]).collect();
    intervals.sort_by(|a, b| a.total_cmp(b));

    let n = intervals.len() as f64;
    let trim = config.outlier_trim as f64;
    let start = (n * trim).floor() as usize;
    let end = ((n * (1.0 - trim)).ceil() as usize).min(intervals.len());
    if start >= end {
        return None;
    }
    let valid = &intervals[start..end];

    let avg = valid.iter().sum::<f64>() / valid.len() as f64;
    if !avg.is_finite() || avg <= 0.0 {
        return None;
    }

    let bpm = (60_000.0 / avg).round().clamp(config.min_bpm as f64, config.max_bpm as f64) as u32;

    let deviation = valid.iter().map(|v| (v - avg).abs()).sum::<f64>() / valid.len() as f64;
    let pattern_strength = (1.0 - (deviation / avg).min(1.0)) as f32;

    Some(TempoEstimate {
        bpm,
        pattern_strength,
    })
}
