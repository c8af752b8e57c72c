use anyhow::{anyhow, Context, Result};
use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::path::Path;
use std::sync::mpsc::{sync_channel, Receiver, SyncSender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::audio::decode::SymphoniaSource;
use crate::audio::level::{CancelToken, ExtractionOutcome, ExtractionProgress, LevelTrack, TrackRole};
use crate::audio::source::LevelSource;

const POLL_INTERVAL: Duration = Duration::from_millis(20);

#[derive(Clone, Debug)]
pub struct ExtractOptions {
    pub frame_duration_ms: u32,
    pub progress_interval_percent: f32,
    pub show_progress: bool,
    pub timeout: Option<Duration>,
}

/// Opens the backend for one side of the comparison. Called on the worker thread.
type SourceFactory = dyn Fn(TrackRole) -> Result<Box<dyn LevelSource>> + Send + Sync;

type Extracted = (LevelTrack, ExtractionOutcome);

struct Worker {
    role: TrackRole,
    handle: JoinHandle<Result<Extracted>>,
    progress: Receiver<ExtractionProgress>,
    bar: ProgressBar,
}

/// Open and extract one recording on its own thread.
fn spawn_extraction(
    role: TrackRole,
    open: Arc<SourceFactory>,
    options: &ExtractOptions,
    cancel: CancelToken,
    progress: SyncSender<ExtractionProgress>,
) -> Result<JoinHandle<Result<Extracted>>> {
    let frame_ms = options.frame_duration_ms;
    let interval = options.progress_interval_percent;

    thread::Builder::new()
        .name(format!("extract-{}", role))
        .spawn(move || -> Result<Extracted> {
            let source = open(role)?;
            let mut track = LevelTrack::new(role, frame_ms).with_progress_interval(interval);
            track.open_stream(source)?;
            let outcome = track.detect_levels(&cancel, Some(&progress))?;
            track.close()?;
            Ok((track, outcome))
        })
        .context("Failed to spawn extraction thread")
}

/// Decode solution and sample concurrently, showing one progress bar per
/// recording. Returns once both workers have finished.
pub fn extract_pair(solution: &Path, sample: &Path, options: &ExtractOptions) -> Result<(LevelTrack, LevelTrack)> {
    let frame_ms = options.frame_duration_ms;
    let solution = solution.to_path_buf();
    let sample = sample.to_path_buf();

    let open = move |role: TrackRole| -> Result<Box<dyn LevelSource>> {
        let path = match role {
            TrackRole::Solution => &solution,
            TrackRole::Sample => &sample,
        };
        log::info!("Decoding {}: {}", role, path.display());
        let source = SymphoniaSource::open(path, frame_ms)
            .with_context(|| format!("Failed to open {} recording", role))?;
        Ok(Box::new(source))
    };

    let ((solution, _), (sample, _)) = extract_with(Arc::new(open), options)?;
    Ok((solution, sample))
}

/// Run both extractions against sources from `open`. The timeout, when set,
/// trips the shared cancel token; both tracks then hold what they read so far.
fn extract_with(open: Arc<SourceFactory>, options: &ExtractOptions) -> Result<(Extracted, Extracted)> {
    let cancel = CancelToken::new();
    let multi = MultiProgress::new();
    if !options.show_progress {
        multi.set_draw_target(ProgressDrawTarget::hidden());
    }
    let style = ProgressStyle::default_bar()
        .template("{prefix:>8} [{elapsed_precise}] {bar:40.cyan/blue} {pos:>3}% {msg}")
        .context("Invalid progress template")?
        .progress_chars("=>-");

    let mut workers = Vec::with_capacity(2);
    for role in [TrackRole::Solution, TrackRole::Sample] {
        let (tx, rx) = sync_channel(1);
        let bar = multi.add(ProgressBar::new(100));
        bar.set_style(style.clone());
        bar.set_prefix(role.to_string());

        let handle = spawn_extraction(role, Arc::clone(&open), options, cancel.clone(), tx)?;
        workers.push(Worker {
            role,
            handle,
            progress: rx,
            bar,
        });
    }

    let started = Instant::now();
    loop {
        for worker in &workers {
            for event in worker.progress.try_iter() {
                worker.bar.set_position(event.percent_completed.floor() as u64);
            }
        }
        if workers.iter().all(|w| w.handle.is_finished()) {
            break;
        }
        if let Some(timeout) = options.timeout {
            if started.elapsed() >= timeout && !cancel.is_cancelled() {
                log::warn!("Extraction timed out after {:.1}s, cancelling", timeout.as_secs_f32());
                cancel.cancel();
            }
        }
        thread::sleep(POLL_INTERVAL);
    }

    let mut results = Vec::with_capacity(2);
    for worker in workers {
        let (track, outcome) = worker
            .handle
            .join()
            .map_err(|_| anyhow!("{} extraction thread panicked", worker.role))??;
        match outcome {
            ExtractionOutcome::Completed => {
                worker.bar.set_position(100);
                worker.bar.finish_with_message("done");
            }
            ExtractionOutcome::Cancelled => worker.bar.abandon_with_message("cancelled"),
        }
        results.push((track, outcome));
    }

    let sample = results.pop().context("sample track missing")?;
    let solution = results.pop().context("solution track missing")?;
    Ok((solution, sample))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::source::{MemorySource, PeakPair};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    /// Emits a constant level with a delay per frame. On its first pull it
    /// waits (bounded) for the other source to start too and records whether
    /// both were running at once.
    struct PacedSource {
        frames: u32,
        cursor: u32,
        delay: Duration,
        started: Arc<AtomicUsize>,
        overlapped: Arc<AtomicBool>,
    }

    impl LevelSource for PacedSource {
        fn frame_count(&self) -> u32 {
            self.frames
        }

        fn next_levels(&mut self) -> Option<PeakPair> {
            if self.cursor == 0 {
                self.started.fetch_add(1, Ordering::SeqCst);
                let deadline = Instant::now() + Duration::from_secs(2);
                while self.started.load(Ordering::SeqCst) < 2 && Instant::now() < deadline {
                    thread::sleep(Duration::from_millis(1));
                }
                if self.started.load(Ordering::SeqCst) >= 2 {
                    self.overlapped.store(true, Ordering::SeqCst);
                }
            }
            if self.cursor >= self.frames {
                return None;
            }
            thread::sleep(self.delay);
            self.cursor += 1;
            Some((0.5, 0.5))
        }

        fn seek_start(&mut self) -> Result<()> {
            self.cursor = 0;
            Ok(())
        }

        fn close(&mut self) {}
    }

    fn options(timeout: Option<Duration>) -> ExtractOptions {
        ExtractOptions {
            frame_duration_ms: 10,
            progress_interval_percent: 1.0,
            show_progress: false,
            timeout,
        }
    }

    fn paced(frames: u32, delay: Duration, overlapped: Arc<AtomicBool>) -> Arc<SourceFactory> {
        let started = Arc::new(AtomicUsize::new(0));
        Arc::new(move |_role: TrackRole| -> Result<Box<dyn LevelSource>> {
            Ok(Box::new(PacedSource {
                frames,
                cursor: 0,
                delay,
                started: Arc::clone(&started),
                overlapped: Arc::clone(&overlapped),
            }))
        })
    }

    #[test]
    fn both_recordings_extract_concurrently() {
        let overlapped = Arc::new(AtomicBool::new(false));
        let open = paced(40, Duration::ZERO, Arc::clone(&overlapped));

        let ((solution, sol_outcome), (sample, smp_outcome)) = extract_with(open, &options(None)).unwrap();

        assert!(overlapped.load(Ordering::SeqCst));
        assert_eq!(solution.role(), TrackRole::Solution);
        assert_eq!(sample.role(), TrackRole::Sample);
        for (track, outcome) in [(&solution, sol_outcome), (&sample, smp_outcome)] {
            assert_eq!(outcome, ExtractionOutcome::Completed);
            assert_eq!(track.frame_done_count(), 40);
            assert!(track.has_levels());
        }
    }

    #[test]
    fn timeout_cancels_both_workers() {
        let overlapped = Arc::new(AtomicBool::new(false));
        let open = paced(100_000, Duration::from_millis(1), overlapped);

        let started = Instant::now();
        let ((solution, sol_outcome), (sample, smp_outcome)) =
            extract_with(open, &options(Some(Duration::from_millis(50)))).unwrap();

        assert!(started.elapsed() < Duration::from_secs(10));
        for (track, outcome) in [(&solution, sol_outcome), (&sample, smp_outcome)] {
            assert_eq!(outcome, ExtractionOutcome::Cancelled);
            assert!(track.frame_done_count() < track.num_frames());
            assert_eq!(track.left().len(), track.frame_done_count() as usize);
            assert!(track.has_levels());
        }
    }

    #[test]
    fn failing_source_is_reported() {
        let open: Arc<SourceFactory> = Arc::new(|role: TrackRole| -> Result<Box<dyn LevelSource>> {
            match role {
                TrackRole::Solution => Ok(Box::new(MemorySource::mono(&[0.5; 4]))),
                TrackRole::Sample => Err(anyhow!("unreadable")),
            }
        });
        let err = extract_with(open, &options(None)).unwrap_err();
        assert!(err.to_string().contains("unreadable"));
    }
}
