use serde::Serialize;

use super::spurts::Spurt;
use crate::audio::level::LevelTrack;
use crate::error::{AnalysisError, AnalysisResult};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct AlignmentSummary {
    pub useful_solution_frames: u32,
    pub useful_sample_frames: u32,
    /// Common length of both tracks after truncation and padding.
    pub aligned_frames: u32,
}

/// Performance window `[first.start, last.end]` of a spurt list.
fn window(role: &str, spurts: &[Spurt]) -> AnalysisResult<(u32, u32)> {
    match (spurts.first(), spurts.last()) {
        (Some(first), Some(last)) => Ok((first.start, last.end)),
        _ => Err(AnalysisError::StructuralMismatch(format!(
            "no onsets detected in the {} recording",
            role
        ))),
    }
}

/// Cut both tracks down to their performance windows, then pad the shorter
/// one with silent frames so frame indices line up.
///
/// This is the only place where extracted levels are rewritten.
pub fn align(
    solution: &mut LevelTrack,
    sample: &mut LevelTrack,
    solution_spurts: &[Spurt],
    sample_spurts: &[Spurt],
) -> AnalysisResult<AlignmentSummary> {
    let (sol_front, sol_back) = window("solution", solution_spurts)?;
    let (smp_front, smp_back) = window("sample", sample_spurts)?;

    let useful_solution_frames = sol_back - sol_front + 1;
    let useful_sample_frames = smp_back - smp_front + 1;

    solution.truncate(sol_front, sol_back);
    sample.truncate(smp_front, smp_back);

    let diff = useful_solution_frames as i64 - useful_sample_frames as i64;
    if diff > 0 {
        sample.pad(diff as u32);
    } else if diff < 0 {
        solution.pad(diff.unsigned_abs() as u32);
    }

    solution.adjust_num_frames();
    sample.adjust_num_frames();

    let summary = AlignmentSummary {
        useful_solution_frames,
        useful_sample_frames,
        aligned_frames: solution.num_frames(),
    };
    log::info!(
        "Aligned: solution {} useful frames, sample {} useful frames, {} frames each",
        summary.useful_solution_frames,
        summary.useful_sample_frames,
        summary.aligned_frames
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::spurts::find_spurts;
    use crate::audio::level::{extracted_track, TrackRole};

    fn burst_track(role: TrackRole, lead: usize, bursts: &[usize], tail: usize) -> LevelTrack {
        let mut levels = vec![0.0; lead];
        for &len in bursts {
            levels.extend(std::iter::repeat(1.0).take(len));
            levels.extend(std::iter::repeat(0.0).take(10));
        }
        levels.extend(std::iter::repeat(0.0).take(tail));
        extracted_track(role, &levels)
    }

    #[test]
    fn equalises_lengths_to_the_longer_window() {
        let mut solution = burst_track(TrackRole::Solution, 30, &[5, 5, 5], 40);
        let mut sample = burst_track(TrackRole::Sample, 5, &[5, 5], 3);
        let sol_spurts = find_spurts(&solution, 0.3);
        let smp_spurts = find_spurts(&sample, 0.3);

        let summary = align(&mut solution, &mut sample, &sol_spurts, &smp_spurts).unwrap();

        assert_eq!(solution.len(), sample.len());
        let expected = summary.useful_solution_frames.max(summary.useful_sample_frames);
        assert_eq!(summary.aligned_frames, expected);
        assert_eq!(solution.len() as u32, expected);
        assert_eq!(solution.num_frames(), expected);
        assert_eq!(sample.frame_done_count(), expected);
        assert_eq!(sample.levels().right().len(), sample.len());
    }

    #[test]
    fn pads_the_solution_when_the_sample_is_longer() {
        let mut solution = burst_track(TrackRole::Solution, 2, &[4], 2);
        let mut sample = burst_track(TrackRole::Sample, 7, &[4, 4, 4], 0);
        let sol_spurts = find_spurts(&solution, 0.3);
        let smp_spurts = find_spurts(&sample, 0.3);

        let summary = align(&mut solution, &mut sample, &sol_spurts, &smp_spurts).unwrap();
        assert!(summary.useful_sample_frames > summary.useful_solution_frames);
        assert_eq!(solution.len(), sample.len());
        assert_eq!(*solution.left().last().unwrap(), 0.0);
    }

    #[test]
    fn realigned_tracks_start_with_the_attack_frame() {
        let mut solution = burst_track(TrackRole::Solution, 50, &[5], 0);
        let mut sample = burst_track(TrackRole::Sample, 20, &[5], 0);
        let sol_spurts = find_spurts(&solution, 0.3);
        let smp_spurts = find_spurts(&sample, 0.3);
        align(&mut solution, &mut sample, &sol_spurts, &smp_spurts).unwrap();

        assert_eq!(find_spurts(&solution, 0.3)[0].start, 0);
        assert_eq!(find_spurts(&sample, 0.3)[0].start, 0);
    }

    #[test]
    fn silent_track_cannot_be_aligned() {
        let mut solution = burst_track(TrackRole::Solution, 5, &[5], 5);
        let mut sample = extracted_track(TrackRole::Sample, &[0.0; 30]);
        let sol_spurts = find_spurts(&solution, 0.3);
        let err = align(&mut solution, &mut sample, &sol_spurts, &[]).unwrap_err();
        assert!(matches!(err, AnalysisError::StructuralMismatch(_)));
        assert_eq!(sample.len(), 30);
    }
}
