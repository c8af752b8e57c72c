use serde::Serialize;
use std::fmt;

use super::align::{align, AlignmentSummary};
use super::bars::split_into_bars;
use super::spurts::{find_spurts_pair, peak_of, Spurt};
use crate::audio::level::LevelTrack;
use crate::error::{AnalysisError, AnalysisResult};
use crate::pattern::rhythm::RhythmPattern;

/// Ratios steering segmentation and matching.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MatchSettings {
    /// Spurt threshold as a fraction of the track peak.
    pub threshold_ratio: f32,
    /// Accepted onset error as a fraction of the gap to the next expected onset.
    pub tolerance_ratio: f64,
    /// First lead-in click louder than this many times the second counts as accented.
    pub accent_ratio: f32,
}

impl Default for MatchSettings {
    fn default() -> Self {
        Self {
            threshold_ratio: 0.3,
            tolerance_ratio: 0.1,
            accent_ratio: 1.3,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LeadInAccent {
    /// The downbeat click stands out from the rest.
    Accented { level: f32 },
    Uniform { level: f32 },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct NoteResult {
    /// 1-based pattern bar.
    pub bar: u32,
    /// 0-based checkpoint within the bar.
    pub note_index: u32,
    pub matched: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ComparisonReport {
    pub notes: Vec<NoteResult>,
    pub alignment: AlignmentSummary,
    pub lead_in_accent: Option<LeadInAccent>,
    pub summary: String,
}

impl ComparisonReport {
    pub fn unmatched(&self) -> impl Iterator<Item = &NoteResult> {
        self.notes.iter().filter(|n| !n.matched)
    }

    pub fn is_correct(&self) -> bool {
        self.notes.iter().all(|n| n.matched)
    }

    /// One line per unmatched note; empty when everything was played correctly.
    pub fn diagnostics(&self) -> Vec<String> {
        self.unmatched()
            .map(|n| format!("bar {}: note {} was not played correctly", n.bar, n.note_index + 1))
            .collect()
    }
}

impl fmt::Display for ComparisonReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.summary)?;
        for line in self.diagnostics() {
            writeln!(f, "  {}", line)?;
        }
        Ok(())
    }
}

/// Holds the inputs of a comparison. Tracks and pattern can be replaced at any
/// time; `run` aligns the tracks in place.
#[derive(Debug, Default)]
pub struct Comparator {
    solution: Option<LevelTrack>,
    sample: Option<LevelTrack>,
    pattern: Option<RhythmPattern>,
    settings: MatchSettings,
}

impl Comparator {
    pub fn new(settings: MatchSettings) -> Self {
        Self {
            settings,
            ..Self::default()
        }
    }

    pub fn set_solution(&mut self, track: LevelTrack) {
        self.solution = Some(track);
    }

    pub fn set_sample(&mut self, track: LevelTrack) {
        self.sample = Some(track);
    }

    /// Swap in a new pattern wholesale.
    pub fn load_pattern(&mut self, pattern: RhythmPattern) {
        self.pattern = Some(pattern);
    }

    pub fn run(&mut self) -> AnalysisResult<ComparisonReport> {
        let (Some(solution), Some(sample), Some(pattern)) =
            (self.solution.as_mut(), self.sample.as_mut(), self.pattern.as_ref())
        else {
            return Err(AnalysisError::StructuralMismatch(
                "please provide a pattern, a solution and a sample first".into(),
            ));
        };
        compare(solution, sample, pattern, &self.settings)
    }
}

/// Compare a performer's sample against the solution recording and pattern.
///
/// Both tracks must have finished extraction. They are aligned in place, so a
/// second run works on already aligned data.
pub fn compare(
    solution: &mut LevelTrack,
    sample: &mut LevelTrack,
    pattern: &RhythmPattern,
    settings: &MatchSettings,
) -> AnalysisResult<ComparisonReport> {
    for track in [&*solution, &*sample] {
        if !track.has_levels() {
            return Err(AnalysisError::InvalidState {
                operation: "compare",
                state: "extraction has not finished",
            });
        }
    }
    if solution.frame_duration_ms() != sample.frame_duration_ms() {
        return Err(AnalysisError::StructuralMismatch(format!(
            "frame durations differ: solution {}ms, sample {}ms",
            solution.frame_duration_ms(),
            sample.frame_duration_ms()
        )));
    }
    let frame_ms = sample.frame_duration_ms();

    let (solution_spurts, sample_spurts) = find_spurts_pair(solution, sample, settings.threshold_ratio);
    let alignment = align(solution, sample, &solution_spurts, &sample_spurts)?;

    // Indices moved, segment again
    let (solution_spurts, sample_spurts) = find_spurts_pair(solution, sample, settings.threshold_ratio);
    log::debug!("Solution spurts: {:?}", solution_spurts);
    log::debug!("Sample spurts: {:?}", sample_spurts);

    let bars = split_into_bars(&sample_spurts, pattern.bar_frames(frame_ms));
    log::debug!("Sample split into {} bar(s)", bars.len());

    let lead_in = &bars[0];
    let expected_clicks = pattern.beats_per_bar() as usize;
    if lead_in.len() != expected_clicks {
        return Err(AnalysisError::StructuralMismatch(format!(
            "expected {} click(s) in lead-in bar, found {}",
            expected_clicks,
            lead_in.len()
        )));
    }
    let lead_in_accent = classify_lead_in(sample, lead_in, settings.accent_ratio);
    log::debug!("Lead-in accent: {:?}", lead_in_accent);

    let num_bars = pattern.num_bars() as usize;
    if bars.len() > num_bars + 1 {
        log::warn!(
            "Sample has {} bar(s) after the lead-in, pattern has {}; extra bars ignored",
            bars.len() - 1,
            num_bars
        );
    }

    let mut notes = Vec::new();
    for bar_index in 0..num_bars {
        let mut expected = pattern.expected_onset_offsets(bar_index, frame_ms)?;
        let bar_number = bar_index as u32 + 1;

        match bars.get(bar_index + 1).and_then(|b| b.first().map(|first| (b, first.start))) {
            Some((sample_bar, bar_start)) => {
                for offset in expected.iter_mut() {
                    *offset += bar_start;
                }
                log::debug!("Bar {} expected onsets: {:?}", bar_number, expected);
                let matched = match_bar(&expected, sample_bar, settings.tolerance_ratio);
                notes.extend(matched.into_iter().enumerate().map(|(j, matched)| NoteResult {
                    bar: bar_number,
                    note_index: j as u32,
                    matched,
                }));
            }
            None => {
                log::warn!("Bar {} is missing from the sample", bar_number);
                notes.extend((0..expected.len().saturating_sub(1)).map(|j| NoteResult {
                    bar: bar_number,
                    note_index: j as u32,
                    matched: false,
                }));
            }
        }
    }

    let missed = notes.iter().filter(|n| !n.matched).count();
    let summary = if missed == 0 {
        format!("All {} note(s) played correctly", notes.len())
    } else {
        format!("{} of {} note(s) not played correctly", missed, notes.len())
    };
    log::info!("{}", summary);

    Ok(ComparisonReport {
        notes,
        alignment,
        lead_in_accent,
        summary,
    })
}

/// For each expected onset except the closing bar line, whether some spurt
/// starts within `tolerance_ratio` of the gap to the next expected onset.
/// The first spurt in order that fits wins.
///
/// The error is compared as a ratio of the gap so that an onset exactly
/// `tolerance_ratio` away is rejected.
pub fn match_bar(expected: &[u32], sample_bar: &[Spurt], tolerance_ratio: f64) -> Vec<bool> {
    expected
        .windows(2)
        .map(|pair| {
            let (target, next) = (pair[0] as i64, pair[1] as i64);
            let gap = (next - target) as f64;
            sample_bar
                .iter()
                .any(|s| ((s.start as i64 - target).abs() as f64 / gap) < tolerance_ratio)
        })
        .collect()
}

/// Diagnostic only: whether the first lead-in click is markedly louder.
fn classify_lead_in(track: &LevelTrack, lead_in: &[Spurt], accent_ratio: f32) -> Option<LeadInAccent> {
    let [first, second, ..] = lead_in else {
        return None;
    };
    let first_peak = peak_of(track, first);
    let second_peak = peak_of(track, second);
    if first_peak > second_peak * accent_ratio {
        Some(LeadInAccent::Accented { level: first_peak })
    } else {
        Some(LeadInAccent::Uniform { level: second_peak })
    }
}
