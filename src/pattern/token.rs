use std::fmt;
use std::str::FromStr;

use crate::error::AnalysisError;

/// One note or rest of a bar, written `pitch/octave/duration`, e.g. `a/4/q`,
/// `c/5/8d`, `b/4/hr`.
///
/// The duration is a denominator (`1, 2, 4, 8, 16, ...`) or one of `f`, `h`,
/// `q` for whole, half and quarter. A trailing `r` marks a rest and `d` a
/// dotted value; both may be present.
#[derive(Clone, Debug, PartialEq)]
pub struct NoteToken {
    pub pitch: String,
    pub octave: String,
    pub duration_code: String,
    pub is_rest: bool,
    pub is_dotted: bool,
    base_denominator: u32,
}

impl NoteToken {
    pub fn parse(text: &str) -> Result<Self, AnalysisError> {
        let parts: Vec<&str> = text.trim().split('/').collect();
        let [pitch, octave, code] = parts.as_slice() else {
            return Err(AnalysisError::Parse(format!(
                "note '{}' is not of the form pitch/octave/duration",
                text
            )));
        };

        let is_rest = code.contains('r');
        let is_dotted = code.contains('d');
        let suffix_len = usize::from(is_rest) + usize::from(is_dotted);
        let body = code
            .len()
            .checked_sub(suffix_len)
            .and_then(|n| code.get(..n))
            .unwrap_or("");

        let base_denominator = parse_denominator(body).ok_or_else(|| {
            AnalysisError::Parse(format!("unknown duration '{}' in note '{}'", code, text))
        })?;

        Ok(Self {
            pitch: pitch.to_string(),
            octave: octave.to_string(),
            duration_code: code.to_string(),
            is_rest,
            is_dotted,
            base_denominator,
        })
    }

    /// Effective denominator: a dotted value lasts 1.5x as long, so its
    /// denominator shrinks by the same factor.
    pub fn denominator(&self) -> f64 {
        let base = self.base_denominator as f64;
        if self.is_dotted {
            base / 1.5
        } else {
            base
        }
    }

    /// Length in beats when a beat is a `beat_unit` note.
    pub fn beats(&self, beat_unit: u32) -> f64 {
        let beats = beat_unit as f64 / self.base_denominator as f64;
        if self.is_dotted {
            beats * 1.5
        } else {
            beats
        }
    }
}

/// Integer denominator first, then the symbolic table. Zero is rejected.
fn parse_denominator(body: &str) -> Option<u32> {
    match body.parse::<u32>() {
        Ok(0) => None,
        Ok(n) => Some(n),
        Err(_) => match body {
            "f" => Some(1),
            "h" => Some(2),
            "q" => Some(4),
            _ => None,
        },
    }
}

impl FromStr for NoteToken {
    type Err = AnalysisError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for NoteToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.pitch, self.octave, self.duration_code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_symbolic_and_numeric_codes() {
        let q = NoteToken::parse("a/4/q").unwrap();
        assert_eq!(q.pitch, "a");
        assert_eq!(q.octave, "4");
        assert_eq!(q.denominator(), 4.0);
        assert!(!q.is_rest && !q.is_dotted);

        assert_eq!(NoteToken::parse("c/5/f").unwrap().denominator(), 1.0);
        assert_eq!(NoteToken::parse("c/5/h").unwrap().denominator(), 2.0);
        assert_eq!(NoteToken::parse("c/5/16").unwrap().denominator(), 16.0);
    }

    #[test]
    fn rest_and_dot_suffixes() {
        let rest = NoteToken::parse("b/4/8r").unwrap();
        assert!(rest.is_rest);
        assert_eq!(rest.denominator(), 8.0);

        let dotted = NoteToken::parse("b/4/qd").unwrap();
        assert!(dotted.is_dotted);
        assert!((dotted.denominator() - 4.0 / 1.5).abs() < 1e-9);
        assert_eq!(dotted.beats(4), 1.5);

        let both = NoteToken::parse("b/4/hrd").unwrap();
        assert!(both.is_rest && both.is_dotted);
        assert_eq!(both.beats(4), 3.0);
        assert_eq!(both.to_string(), "b/4/hrd");
    }

    #[test]
    fn unknown_codes_are_parse_errors() {
        for bad in ["a/4/x", "a/4/", "a/4/0", "a/4/qq", "a/4/r", "a/q", "a/4/q/1"] {
            let err = NoteToken::parse(bad).unwrap_err();
            assert!(matches!(err, AnalysisError::Parse(_)), "{bad}");
        }
    }

    #[test]
    fn beats_follow_the_beat_unit() {
        let eighth = NoteToken::parse("e/4/8").unwrap();
        assert_eq!(eighth.beats(4), 0.5);
        assert_eq!(eighth.beats(8), 1.0);
    }
}
