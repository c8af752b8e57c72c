use serde::Serialize;

use crate::audio::level::LevelTrack;

/// Keeps the threshold positive on a silent track.
const MIN_PEAK: f32 = f32::EPSILON;

/// A run of frames loud enough to count as one onset. `start <= end`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct Spurt {
    pub start: u32,
    pub end: u32,
}

impl Spurt {
    pub fn new(start: u32, end: u32) -> Self {
        debug_assert!(start <= end);
        Self { start, end }
    }
}

/// Segment the left channel of `track` into spurts.
pub fn find_spurts(track: &LevelTrack, threshold_ratio: f32) -> Vec<Spurt> {
    segment_levels(track.left(), track.peak_value(), threshold_ratio)
}

/// Segment solution and sample at once; the tracks are independent.
pub fn find_spurts_pair(solution: &LevelTrack, sample: &LevelTrack, threshold_ratio: f32) -> (Vec<Spurt>, Vec<Spurt>) {
    rayon::join(
        || find_spurts(solution, threshold_ratio),
        || find_spurts(sample, threshold_ratio),
    )
}

/// Single forward scan. A spurt opens one frame before the first loud frame
/// (to catch the attack) and closes on the first quiet frame after it.
pub fn segment_levels(levels: &[f32], peak_value: f32, threshold_ratio: f32) -> Vec<Spurt> {
    let reference = if peak_value > 0.0 { peak_value } else { MIN_PEAK };
    let threshold = threshold_ratio * reference;
    let mut spurts = Vec::new();
    let mut open: Option<u32> = None;

    for (i, &level) in levels.iter().enumerate() {
        let i = i as u32;
        match open {
            None if level > threshold => open = Some(i.saturating_sub(1)),
            Some(start) if level <= threshold => {
                spurts.push(Spurt::new(start, i));
                open = None;
            }
            _ => {}
        }
    }

    if let Some(start) = open {
        let last = levels.len().saturating_sub(1) as u32;
        spurts.push(Spurt::new(start, last));
    }

    spurts
}

/// Loudest left-channel level inside the spurt.
pub fn peak_of(track: &LevelTrack, spurt: &Spurt) -> f32 {
    let left = track.left();
    let end = (spurt.end as usize + 1).min(left.len());
    let start = (spurt.start as usize).min(end);
    left[start..end].iter().copied().fold(0.0f32, f32::max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::level::{extracted_track, TrackRole};

    #[test]
    fn backs_up_one_frame_for_the_attack() {
        let levels = [0.0, 0.0, 1.0, 0.9, 0.0, 0.0, 0.8, 0.0];
        let spurts = segment_levels(&levels, 1.0, 0.3);
        assert_eq!(spurts, vec![Spurt::new(1, 4), Spurt::new(5, 7)]);
    }

    #[test]
    fn first_frame_onset_starts_at_zero() {
        let spurts = segment_levels(&[0.9, 0.9, 0.1], 0.9, 0.3);
        assert_eq!(spurts, vec![Spurt::new(0, 2)]);
    }

    #[test]
    fn open_spurt_is_closed_at_last_index() {
        let spurts = segment_levels(&[0.0, 0.0, 0.5, 0.6], 0.6, 0.3);
        assert_eq!(spurts, vec![Spurt::new(1, 3)]);
    }

    #[test]
    fn threshold_is_strictly_exceeded() {
        // 0.3 of peak 1.0 does not count as loud
        let spurts = segment_levels(&[0.3, 1.0, 0.3], 1.0, 0.3);
        assert_eq!(spurts, vec![Spurt::new(0, 2)]);
    }

    #[test]
    fn silent_track_yields_nothing() {
        let track = extracted_track(TrackRole::Sample, &[0.0; 20]);
        assert_eq!(track.peak_value(), 0.0);
        assert!(find_spurts(&track, 0.3).is_empty());
        assert!(segment_levels(&[], 0.0, 0.3).is_empty());
    }

    #[test]
    fn very_quiet_track_keeps_its_onsets() {
        let levels = [0.0, 1e-9, 4e-8, 0.0, 0.0, 3e-8, 0.0];
        let spurts = segment_levels(&levels, 4e-8, 0.3);
        assert_eq!(spurts, vec![Spurt::new(1, 3), Spurt::new(4, 6)]);
    }

    #[test]
    fn segmentation_is_idempotent_and_ordered() {
        let levels: Vec<f32> = (0..200)
            .map(|i| if (i / 7) % 3 == 0 { 0.8 } else { 0.05 * (i % 4) as f32 })
            .collect();
        let track = extracted_track(TrackRole::Solution, &levels);

        let first = find_spurts(&track, 0.3);
        let second = find_spurts(&track, 0.3);
        assert_eq!(first, second);
        assert!(!first.is_empty());

        for s in &first {
            assert!(s.start <= s.end);
        }
        for pair in first.windows(2) {
            assert!(pair[0].start < pair[1].start);
            assert!(pair[0].end <= pair[1].start);
        }
    }

    #[test]
    fn pair_matches_single_track_segmentation() {
        let solution = extracted_track(TrackRole::Solution, &[0.0, 1.0, 0.0, 0.0, 0.7, 0.0]);
        let sample = extracted_track(TrackRole::Sample, &[0.5, 0.0, 0.0, 0.9, 0.9]);
        let (sol, smp) = find_spurts_pair(&solution, &sample, 0.3);
        assert_eq!(sol, find_spurts(&solution, 0.3));
        assert_eq!(smp, vec![Spurt::new(0, 1), Spurt::new(2, 4)]);
    }

    #[test]
    fn peak_of_spans_the_whole_spurt() {
        let track = extracted_track(TrackRole::Sample, &[0.0, 0.2, 0.9, 0.4, 0.0]);
        assert_eq!(peak_of(&track, &Spurt::new(1, 4)), 0.9);
        assert_eq!(peak_of(&track, &Spurt::new(3, 4)), 0.4);
    }
}
