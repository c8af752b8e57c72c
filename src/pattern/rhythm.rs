use std::fmt;

use super::token::NoteToken;
use crate::error::{AnalysisError, AnalysisResult};

/// Expected rhythm: time signature, tempo and the notes of every bar.
///
/// Bar and beat durations are derived from `bpm` and `beats_per_bar` and are
/// recomputed by the setters; they cannot be set directly.
#[derive(Clone, Debug, PartialEq)]
pub struct RhythmPattern {
    beats_per_bar: u32,
    beat_unit: u32,
    bpm: f32,
    bars: Vec<Vec<NoteToken>>,
    bar_duration_seconds: f32,
    beat_duration_seconds: f32,
}

impl RhythmPattern {
    pub fn new(
        beats_per_bar: u32,
        beat_unit: u32,
        bpm: f32,
        bars: Vec<Vec<NoteToken>>,
    ) -> AnalysisResult<Self> {
        if beats_per_bar == 0 || beat_unit == 0 {
            return Err(AnalysisError::Parse(format!(
                "invalid time signature {}/{}",
                beats_per_bar, beat_unit
            )));
        }
        validate_bpm(bpm)?;

        let mut pattern = Self {
            beats_per_bar,
            beat_unit,
            bpm,
            bars,
            bar_duration_seconds: 0.0,
            beat_duration_seconds: 0.0,
        };
        pattern.recompute_timing();
        Ok(pattern)
    }

    fn recompute_timing(&mut self) {
        self.beat_duration_seconds = 60.0 / self.bpm;
        self.bar_duration_seconds = self.beat_duration_seconds * self.beats_per_bar as f32;
    }

    #[allow(dead_code)]
    pub fn set_bpm(&mut self, bpm: f32) -> AnalysisResult<()> {
        validate_bpm(bpm)?;
        self.bpm = bpm;
        self.recompute_timing();
        Ok(())
    }

    #[allow(dead_code)]
    pub fn set_beats_per_bar(&mut self, beats_per_bar: u32) -> AnalysisResult<()> {
        if beats_per_bar == 0 {
            return Err(AnalysisError::Parse("beats per bar must be positive".into()));
        }
        self.beats_per_bar = beats_per_bar;
        self.recompute_timing();
        Ok(())
    }

    pub fn beats_per_bar(&self) -> u32 {
        self.beats_per_bar
    }

    #[allow(dead_code)]
    pub fn beat_unit(&self) -> u32 {
        self.beat_unit
    }

    #[allow(dead_code)]
    pub fn bpm(&self) -> f32 {
        self.bpm
    }

    pub fn num_bars(&self) -> u32 {
        self.bars.len() as u32
    }

    #[allow(dead_code)]
    pub fn bars(&self) -> &[Vec<NoteToken>] {
        &self.bars
    }

    pub fn bar_duration_seconds(&self) -> f32 {
        self.bar_duration_seconds
    }

    #[allow(dead_code)]
    pub fn beat_duration_seconds(&self) -> f32 {
        self.beat_duration_seconds
    }

    /// Bar length in frames of `frame_duration_ms`.
    pub fn bar_frames(&self, frame_duration_ms: u32) -> f64 {
        self.bar_duration_seconds as f64 * (1000.0 / frame_duration_ms as f64)
    }

    /// Seconds taken by a note: one beat scaled by `beat_unit / denominator`.
    pub fn physical_duration(&self, token: &NoteToken) -> f64 {
        self.beat_duration_seconds as f64 * token.beats(self.beat_unit)
    }

    /// Frame offsets (from bar start) where the bar expects a sound.
    ///
    /// Every note is a checkpoint; a rest is one only when it starts exactly on
    /// a beat. The last entry is the end of the bar and is not an onset.
    pub fn expected_onset_offsets(
        &self,
        bar_index: usize,
        frame_duration_ms: u32,
    ) -> AnalysisResult<Vec<u32>> {
        let bar = self.bars.get(bar_index).ok_or_else(|| {
            AnalysisError::StructuralMismatch(format!(
                "pattern has {} bar(s), bar {} requested",
                self.bars.len(),
                bar_index + 1
            ))
        })?;

        let frame_ms = frame_duration_ms.max(1) as f64;
        let mut offsets = Vec::with_capacity(bar.len() + 1);
        let mut offset_frames: u32 = 0;
        let mut beat_position: f64 = 0.0;

        for token in bar {
            if !token.is_rest || beat_position.fract() == 0.0 {
                offsets.push(offset_frames);
            }
            beat_position += token.beats(self.beat_unit);
            let frames = (self.physical_duration(token) * 1000.0 / frame_ms).floor();
            log::trace!("{} (1/{:.3}) -> {} frames", token, token.denominator(), frames);
            offset_frames += frames as u32;
        }
        offsets.push(offset_frames);

        Ok(offsets)
    }
}

fn validate_bpm(bpm: f32) -> AnalysisResult<()> {
    if bpm.is_finite() && bpm > 0.0 {
        Ok(())
    } else {
        Err(AnalysisError::Parse(format!("invalid tempo {} bpm", bpm)))
    }
}

impl fmt::Display for RhythmPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{} at {} bpm, {} bar(s) of {:.2}s",
            self.beats_per_bar,
            self.beat_unit,
            self.bpm,
            self.bars.len(),
            self.bar_duration_seconds
        )
    }
}

#[cfg(test)]
pub(crate) fn pattern_from(beats_per_bar: u32, beat_unit: u32, bpm: f32, bars: &[&[&str]]) -> RhythmPattern {
    let bars = bars
        .iter()
        .map(|bar| bar.iter().map(|n| NoteToken::parse(n).unwrap()).collect())
        .collect();
    RhythmPattern::new(beats_per_bar, beat_unit, bpm, bars).unwrap()
}
