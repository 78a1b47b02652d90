//! Splits one magnitude frame into broadband, bass, mid and high averages.
//!
//! Band edges are fractions of the frame length, so the split follows whatever FFT size
//! the producer uses. Each average is divided by its band's ceiling and clamped to 0-1.

use std::f32::consts::PI;

use crate::config::{BandLayout, EngineConfig};

use super::features::finite_unit;

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct BandAverages {
    pub broadband: f32,
    pub low: f32,
    pub mid: f32,
    pub high: f32,
}

/// Bin index ranges `[start, end)` of each band for a frame of `len` bins.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BandEdges {
    pub bass_end: usize,
    pub mid_end: usize,
    pub len: usize,
}

impl BandEdges {
    pub fn new(len: usize, layout: &BandLayout) -> Self {
        let bass_end = ((len as f32 * layout.bass_end).floor() as usize).min(len);
        let mid_end = ((len as f32 * layout.mid_end).floor() as usize).clamp(bass_end, len);
        Self { bass_end, mid_end, len }
    }
}

pub fn split(frame: &[f32], config: &EngineConfig) -> BandAverages {
    let layout = &config.bands;
    let edges = BandEdges::new(frame.len(), layout);

    let broadband = if frame.is_empty() {
        0.0
    } else {
        frame.iter().sum::<f32>() / frame.len() as f32
    };

    BandAverages {
        broadband: normalize(broadband, config.level.ceiling),
        low: normalize(bass_average(frame, &edges, layout), config.low.ceiling),
        mid: normalize(mid_average(frame, &edges, layout), config.mid.ceiling),
        high: normalize(high_average(frame, &edges, layout), config.high.ceiling),
    }
}

fn normalize(average: f32, ceiling: f32) -> f32 {
    finite_unit(average / ceiling)
}

// Bin 0 is DC and never counts toward the bass.
fn bass_average(frame: &[f32], edges: &BandEdges, layout: &BandLayout) -> f32 {
    if edges.bass_end <= 1 {
        return 0.0;
    }
    let sum: f32 = frame[1..edges.bass_end]
        .iter()
        .enumerate()
        .map(|(offset, &mag)| {
            let bin = offset + 1;
            let weight = if bin < layout.sub_bass_bins {
                layout.sub_bass_weight
            } else {
                1.0
            };
            mag * weight
        })
        .sum();
    sum / (edges.bass_end - 1) as f32
}

fn mid_average(frame: &[f32], edges: &BandEdges, layout: &BandLayout) -> f32 {
    let count = edges.mid_end - edges.bass_end;
    if count == 0 {
        return 0.0;
    }
    let sum: f32 = frame[edges.bass_end..edges.mid_end]
        .iter()
        .enumerate()
        .map(|(offset, &mag)| {
            let position = offset as f32 / count as f32;
            let weight = layout.mid_base_weight + (position * PI).sin() * layout.mid_peak_weight;
            mag * weight
        })
        .sum();
    sum / count as f32
}

fn high_average(frame: &[f32], edges: &BandEdges, layout: &BandLayout) -> f32 {
    let count = edges.len - edges.mid_end;
    if count == 0 {
        return 0.0;
    }
    let sum: f32 = frame[edges.mid_end..]
        .iter()
        .enumerate()
        .map(|(offset, &mag)| {
            let position = offset as f32 / count as f32;
            let weight = if position < layout.high_rolloff_start {
                layout.high_peak_weight - position
            } else {
                layout.high_tail_weight - position * layout.high_tail_slope
            };
            mag * weight.max(layout.high_weight_floor)
        })
        .sum();
    sum / count as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    const BINS: usize = 1024;

    #[test]
    fn edges_follow_fractions() {
        let edges = BandEdges::new(BINS, &BandLayout::default());
        assert_eq!(edges.bass_end, 51);
        assert_eq!(edges.mid_end, 614);
    }

    #[test]
    fn empty_frame_is_silent() {
        assert_eq!(split(&[], &EngineConfig::default()), BandAverages::default());
    }

    #[test]
    fn tiny_frame_does_not_divide_by_zero() {
        let avgs = split(&[200.0, 200.0], &EngineConfig::default());
        assert_eq!(avgs.low, 0.0);
        assert!(avgs.high.is_finite() && avgs.mid.is_finite());
        assert!(avgs.broadband > 0.0);
    }

    #[test]
    fn dc_bin_is_ignored() {
        let mut frame = vec![0.0; BINS];
        frame[0] = 255.0;
        let avgs = split(&frame, &EngineConfig::default());
        assert_eq!(avgs.low, 0.0);
        assert!(avgs.broadband > 0.0);
    }

    #[test]
    fn sub_bass_bins_are_down_weighted() {
        let cfg = EngineConfig::default();
        let mut rumble = vec![0.0; BINS];
        rumble[1] = 100.0;
        let mut punch = vec![0.0; BINS];
        punch[10] = 100.0;
        let rumble = split(&rumble, &cfg).low;
        let punch = split(&punch, &cfg).low;
        assert!((rumble * 2.0 - punch).abs() < 1e-6);
    }

    #[test]
    fn full_scale_clamps_to_one() {
        let avgs = split(&vec![255.0; BINS], &EngineConfig::default());
        assert_eq!(avgs.broadband, 1.0);
        assert_eq!(avgs.low, 1.0);
        assert_eq!(avgs.mid, 1.0);
        assert_eq!(avgs.high, 1.0);
    }

    #[test]
    fn bass_only_frame_leaves_other_bands_silent() {
        let mut frame = vec![0.0; BINS];
        frame[1..51].iter_mut().for_each(|b| *b = 255.0);
        let avgs = split(&frame, &EngineConfig::default());
        assert_eq!(avgs.low, 1.0);
        assert_eq!(avgs.mid, 0.0);
        assert_eq!(avgs.high, 0.0);
    }

    #[test]
    fn mid_weighting_peaks_in_the_middle() {
        let cfg = EngineConfig::default();
        let edges = BandEdges::new(BINS, &cfg.bands);
        let mut edge = vec![0.0; BINS];
        edge[edges.bass_end] = 100.0;
        let mut centre = vec![0.0; BINS];
        centre[(edges.bass_end + edges.mid_end) / 2] = 100.0;
        assert!(split(&centre, &cfg).mid > split(&edge, &cfg).mid);
    }

    #[test]
    fn extreme_highs_are_de_emphasised() {
        let cfg = EngineConfig::default();
        let mut low_high = vec![0.0; BINS];
        low_high[620] = 90.0;
        let mut top = vec![0.0; BINS];
        top[BINS - 1] = 90.0;
        assert!(split(&low_high, &cfg).high > split(&top, &cfg).high);
    }

    #[test]
    fn high_slope_follows_layout() {
        let mut cfg = EngineConfig::default();
        cfg.bands.high_peak_weight = 1.0;
        cfg.bands.high_rolloff_start = 0.0;
        cfg.bands.high_tail_weight = 1.0;
        cfg.bands.high_tail_slope = 0.0;
        cfg.bands.high_weight_floor = 0.0;

        let mut first = vec![0.0; BINS];
        first[614] = 90.0;
        let mut top = vec![0.0; BINS];
        top[BINS - 1] = 90.0;
        assert!((split(&first, &cfg).high - split(&top, &cfg).high).abs() < 1e-6);
    }
}
