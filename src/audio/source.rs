use anyhow::Result;

/// Stereo peak pair for one frame.
pub type PeakPair = (f32, f32);

/// Backend that yields per-frame stereo peak levels for an opened recording.
///
/// Frames have a fixed duration chosen when the source is opened. `next_levels`
/// advances an internal cursor and returns `None` once the stream is exhausted.
pub trait LevelSource: Send + Sync {
    fn frame_count(&self) -> u32;
    fn next_levels(&mut self) -> Option<PeakPair>;
    fn seek_start(&mut self) -> Result<()>;
    fn close(&mut self);
}

/// In-memory source used to drive the pipeline with synthetic envelopes.
#[cfg(test)]
pub struct MemorySource {
    frames: Vec<PeakPair>,
    cursor: usize,
    closed: bool,
}

#[cfg(test)]
impl MemorySource {
    pub fn new(frames: Vec<PeakPair>) -> Self {
        Self {
            frames,
            cursor: 0,
            closed: false,
        }
    }

    /// Same level on both channels.
    pub fn mono(levels: &[f32]) -> Self {
        Self::new(levels.iter().map(|&l| (l, l)).collect())
    }
}

#[cfg(test)]
impl LevelSource for MemorySource {
    fn frame_count(&self) -> u32 {
        self.frames.len() as u32
    }

    fn next_levels(&mut self) -> Option<PeakPair> {
        if self.closed {
            return None;
        }
        let pair = self.frames.get(self.cursor).copied()?;
        self.cursor += 1;
        Some(pair)
    }

    fn seek_start(&mut self) -> Result<()> {
        self.cursor = 0;
        Ok(())
    }

    fn close(&mut self) {
        self.closed = true;
    }
}
