use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

use super::rhythm::RhythmPattern;
use super::token::NoteToken;
use crate::error::{AnalysisError, AnalysisResult};

/// Pattern file as stored on disk.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatternRecord {
    pub time_signature_top: u32,
    pub time_signature_bottom: u32,
    pub bpm: f32,
    pub number_of_bars: u32,
    pub pattern: Vec<Vec<String>>,
}

impl PatternRecord {
    /// Parse every note and build the pattern with its derived timing.
    pub fn into_pattern(self) -> AnalysisResult<RhythmPattern> {
        let declared = self.number_of_bars as usize;
        if declared > self.pattern.len() {
            return Err(AnalysisError::Parse(format!(
                "numberOfBars is {} but only {} bar(s) are written out",
                declared,
                self.pattern.len()
            )));
        }
        if declared < self.pattern.len() {
            log::warn!(
                "Pattern lists {} bars but numberOfBars is {}; ignoring the rest",
                self.pattern.len(),
                declared
            );
        }

        let bars = self
            .pattern
            .iter()
            .take(declared)
            .enumerate()
            .map(|(i, bar)| {
                bar.iter()
                    .map(|note| NoteToken::parse(note))
                    .collect::<AnalysisResult<Vec<_>>>()
                    .map_err(|e| AnalysisError::Parse(format!("bar {}: {}", i + 1, e)))
            })
            .collect::<AnalysisResult<Vec<_>>>()?;

        RhythmPattern::new(self.time_signature_top, self.time_signature_bottom, self.bpm, bars)
    }
}

pub fn parse_pattern(json: &str) -> Result<RhythmPattern> {
    let record: PatternRecord =
        serde_json::from_str(json).context("Failed to parse rhythm pattern JSON")?;
    Ok(record.into_pattern()?)
}

pub fn load_pattern(path: &Path) -> Result<RhythmPattern> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read pattern: {}", path.display()))?;
    let pattern = parse_pattern(&json)
        .with_context(|| format!("Invalid pattern: {}", path.display()))?;
    log::info!("Loaded pattern: {}", pattern);
    Ok(pattern)
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASIC: &str = r#"{
        "timeSignatureTop": 4,
        "timeSignatureBottom": 4,
        "bpm": 60,
        "numberOfBars": 2,
        "pattern": [
            ["a/4/q", "a/4/q", "a/4/q", "a/4/q"],
            ["a/4/h", "a/4/qr", "a/4/8", "a/4/8"]
        ]
    }"#;

    #[test]
    fn loads_a_pattern_record() {
        let p = parse_pattern(BASIC).unwrap();
        assert_eq!(p.beats_per_bar(), 4);
        assert_eq!(p.beat_unit(), 4);
        assert_eq!(p.num_bars(), 2);
        assert_eq!(p.bar_duration_seconds(), 4.0);
        assert!(p.bars()[1][1].is_rest);
        assert_eq!(p.expected_onset_offsets(1, 10).unwrap(), vec![0, 200, 300, 350, 400]);
    }

    #[test]
    fn bad_note_is_a_parse_error() {
        let json = BASIC.replace("a/4/8\"", "a/4/z\"");
        let err = parse_pattern(&json).unwrap_err();
        let analysis = err.downcast_ref::<AnalysisError>().unwrap();
        assert!(matches!(analysis, AnalysisError::Parse(msg) if msg.contains("bar 2")));
    }

    #[test]
    fn declared_bar_count_must_be_written_out() {
        let json = BASIC.replace("\"numberOfBars\": 2", "\"numberOfBars\": 3");
        assert!(parse_pattern(&json).is_err());

        let json = BASIC.replace("\"numberOfBars\": 2", "\"numberOfBars\": 1");
        assert_eq!(parse_pattern(&json).unwrap().num_bars(), 1);
    }

    #[test]
    fn missing_fields_are_rejected() {
        assert!(parse_pattern(r#"{"bpm": 60}"#).is_err());
    }
}
