use anyhow::Result;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{SyncSender, TrySendError};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::source::LevelSource;
use crate::error::{AnalysisError, AnalysisResult};

/// Which side of a comparison a recording plays.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TrackRole {
    Solution,
    Sample,
}

impl fmt::Display for TrackRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackRole::Solution => write!(f, "solution"),
            TrackRole::Sample => write!(f, "sample"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExtractorState {
    Idle,
    StreamOpen,
    Running,
    Completed,
    Closed,
}

impl ExtractorState {
    fn name(self) -> &'static str {
        match self {
            ExtractorState::Idle => "idle",
            ExtractorState::StreamOpen => "stream open",
            ExtractorState::Running => "running",
            ExtractorState::Completed => "completed",
            ExtractorState::Closed => "closed",
        }
    }
}

/// Shared cancellation flag, checked once per frame by the extraction loop.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ExtractionProgress {
    pub role: TrackRole,
    pub frame_done_count: u32,
    pub percent_completed: f32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExtractionOutcome {
    Completed,
    /// Stopped early on request; the track holds the frames produced so far.
    Cancelled,
}

const MIN_PROGRESS_GAP: Duration = Duration::from_millis(1);

/// Gate for progress notifications: at least 1ms since the last one and the
/// percentage must have crossed into a new `interval_percent` bucket.
/// An interval of 0 lets every frame through the bucket check.
#[derive(Debug)]
pub struct ProgressThrottle {
    interval_percent: f32,
    last_percent: f32,
    last_emit: Instant,
}

impl ProgressThrottle {
    pub fn new(interval_percent: f32, now: Instant) -> Self {
        Self {
            interval_percent: interval_percent.clamp(0.0, 100.0),
            last_percent: 0.0,
            last_emit: now,
        }
    }

    #[allow(dead_code)]
    pub fn interval_percent(&self) -> f32 {
        self.interval_percent
    }

    pub fn should_emit(&mut self, now: Instant, percent: f32) -> bool {
        if now.saturating_duration_since(self.last_emit) < MIN_PROGRESS_GAP {
            return false;
        }
        let advanced = self.interval_percent == 0.0
            || (percent / self.interval_percent).floor()
                > (self.last_percent / self.interval_percent).floor();
        if advanced {
            self.last_percent = percent;
            self.last_emit = now;
        }
        advanced
    }
}

/// Owned per-channel level storage. Both channels always have equal length.
/// `revision` counts the explicit rewrites (truncate/pad) applied after extraction.
#[derive(Clone, Debug, Default)]
pub struct LevelBuffer {
    left: Vec<f32>,
    right: Vec<f32>,
    revision: u32,
}

impl LevelBuffer {
    fn push(&mut self, left: f32, right: f32) {
        self.left.push(left);
        self.right.push(right);
    }

    fn clear(&mut self) {
        self.left.clear();
        self.right.clear();
    }

    pub fn len(&self) -> usize {
        self.left.len()
    }

    pub fn is_empty(&self) -> bool {
        self.left.is_empty()
    }

    pub fn left(&self) -> &[f32] {
        &self.left
    }

    #[allow(dead_code)]
    pub fn right(&self) -> &[f32] {
        &self.right
    }

    #[allow(dead_code)]
    pub fn revision(&self) -> u32 {
        self.revision
    }

    /// Keep only frames `front..=back`. Returns the new length.
    fn truncate_to(&mut self, front: usize, back: usize) -> usize {
        let end = (back + 1).min(self.left.len());
        let start = front.min(end);
        self.left.truncate(end);
        self.right.truncate(end);
        self.left.drain(..start);
        self.right.drain(..start);
        self.revision += 1;
        self.left.len()
    }

    /// Append `count` silent frames. Returns the new length.
    fn pad(&mut self, count: usize) -> usize {
        self.left.resize(self.left.len() + count, 0.0);
        self.right.resize(self.right.len() + count, 0.0);
        self.revision += 1;
        self.left.len()
    }
}

/// Envelope of one recording, filled frame by frame from a [`LevelSource`].
pub struct LevelTrack {
    role: TrackRole,
    frame_duration_ms: u32,
    num_frames: u32,
    frame_done_count: u32,
    peak_value: f32,
    levels: LevelBuffer,
    state: ExtractorState,
    extracted: bool,
    progress_interval_percent: f32,
    source: Option<Box<dyn LevelSource>>,
}

impl LevelTrack {
    pub fn new(role: TrackRole, frame_duration_ms: u32) -> Self {
        Self {
            role,
            frame_duration_ms: frame_duration_ms.max(1),
            num_frames: 0,
            frame_done_count: 0,
            peak_value: 0.0,
            levels: LevelBuffer::default(),
            state: ExtractorState::Idle,
            extracted: false,
            progress_interval_percent: 1.0,
            source: None,
        }
    }

    pub fn with_progress_interval(mut self, interval_percent: f32) -> Self {
        self.progress_interval_percent = interval_percent.clamp(0.0, 100.0);
        self
    }

    fn require(&self, operation: &'static str, legal: &[ExtractorState]) -> AnalysisResult<()> {
        if legal.contains(&self.state) {
            Ok(())
        } else {
            Err(AnalysisError::InvalidState {
                operation,
                state: self.state.name(),
            })
        }
    }

    /// Attach a backend and read its frame count.
    pub fn open_stream(&mut self, source: Box<dyn LevelSource>) -> AnalysisResult<()> {
        self.require("open a stream", &[ExtractorState::Idle, ExtractorState::Closed])?;
        self.num_frames = source.frame_count();
        self.source = Some(source);
        self.state = ExtractorState::StreamOpen;
        log::debug!("{}: stream open, {} frames", self.role, self.num_frames);
        Ok(())
    }

    /// Pull every frame from the backend, checking `cancel` before each pull.
    ///
    /// Can be re-run after completion; previous levels are discarded and the
    /// source is rewound.
    pub fn detect_levels(
        &mut self,
        cancel: &CancelToken,
        progress: Option<&SyncSender<ExtractionProgress>>,
    ) -> Result<ExtractionOutcome> {
        self.require("detect levels", &[ExtractorState::StreamOpen, ExtractorState::Completed])?;

        self.frame_done_count = 0;
        self.peak_value = 0.0;
        self.levels.clear();
        self.extracted = false;

        let Some(source) = self.source.as_mut() else {
            return Err(AnalysisError::InvalidState {
                operation: "detect levels",
                state: "without a source",
            }
            .into());
        };
        source.seek_start()?;

        self.state = ExtractorState::Running;
        let mut throttle = ProgressThrottle::new(self.progress_interval_percent, Instant::now());
        let mut outcome = ExtractionOutcome::Completed;

        for _ in 0..self.num_frames {
            if cancel.is_cancelled() {
                outcome = ExtractionOutcome::Cancelled;
                break;
            }
            let Some((left, right)) = source.next_levels() else {
                log::warn!(
                    "{}: source ended after {} of {} frames",
                    self.role,
                    self.frame_done_count,
                    self.num_frames
                );
                break;
            };

            self.levels.push(left, right);
            self.peak_value = self.peak_value.max(left).max(right);
            self.frame_done_count += 1;

            let percent = 100.0 * self.frame_done_count as f32 / self.num_frames as f32;
            if throttle.should_emit(Instant::now(), percent) {
                if let Some(tx) = progress {
                    let event = ExtractionProgress {
                        role: self.role,
                        frame_done_count: self.frame_done_count,
                        percent_completed: percent,
                    };
                    // Skip the update if the consumer has not taken the previous one
                    if let Err(TrySendError::Disconnected(_)) = tx.try_send(event) {
                        log::debug!("{}: progress receiver dropped", self.role);
                    }
                }
            }
        }

        self.state = ExtractorState::Completed;
        self.extracted = true;

        match outcome {
            ExtractionOutcome::Completed => log::info!(
                "{}: extracted {} frames, peak {:.4}",
                self.role,
                self.frame_done_count,
                self.peak_value
            ),
            ExtractionOutcome::Cancelled => log::warn!(
                "{}: extraction cancelled at {}/{} frames",
                self.role,
                self.frame_done_count,
                self.num_frames
            ),
        }
        Ok(outcome)
    }

    /// Release the backend. Extracted levels stay available.
    pub fn close(&mut self) -> AnalysisResult<()> {
        self.require(
            "close the stream",
            &[ExtractorState::StreamOpen, ExtractorState::Running, ExtractorState::Completed],
        )?;
        if let Some(mut source) = self.source.take() {
            source.close();
        }
        self.state = ExtractorState::Closed;
        Ok(())
    }

    /// True once an extraction has finished, even if cancelled or since closed.
    pub fn has_levels(&self) -> bool {
        self.extracted
            && matches!(self.state, ExtractorState::Completed | ExtractorState::Closed)
    }

    pub fn role(&self) -> TrackRole {
        self.role
    }

    pub fn state(&self) -> ExtractorState {
        self.state
    }

    pub fn frame_duration_ms(&self) -> u32 {
        self.frame_duration_ms
    }

    pub fn num_frames(&self) -> u32 {
        self.num_frames
    }

    pub fn frame_done_count(&self) -> u32 {
        self.frame_done_count
    }

    pub fn peak_value(&self) -> f32 {
        self.peak_value
    }

    pub fn levels(&self) -> &LevelBuffer {
        &self.levels
    }

    /// Left channel, the reference channel for segmentation.
    pub fn left(&self) -> &[f32] {
        self.levels.left()
    }

    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub(crate) fn truncate(&mut self, front: u32, back: u32) -> usize {
        self.levels.truncate_to(front as usize, back as usize)
    }

    pub(crate) fn pad(&mut self, count: u32) -> usize {
        self.levels.pad(count as usize)
    }

    /// Declared and produced counts follow the buffer after a rewrite.
    pub(crate) fn adjust_num_frames(&mut self) {
        self.num_frames = self.levels.len() as u32;
        self.frame_done_count = self.num_frames;
    }
}

impl fmt::Debug for LevelTrack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LevelTrack")
            .field("role", &self.role)
            .field("state", &self.state)
            .field("num_frames", &self.num_frames)
            .field("frame_done_count", &self.frame_done_count)
            .field("peak_value", &self.peak_value)
            .finish()
    }
}

/// Fully extracted track with the same level on both channels.
#[cfg(test)]
pub(crate) fn extracted_track(role: TrackRole, levels: &[f32]) -> LevelTrack {
    use super::source::MemorySource;

    let mut track = LevelTrack::new(role, 10);
    track
        .open_stream(Box::new(MemorySource::mono(levels)))
        .unwrap();
    track.detect_levels(&CancelToken::new(), None).unwrap();
    track
}
