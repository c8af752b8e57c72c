use anyhow::{Context, Result};
use std::collections::VecDeque;
use std::path::Path;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{Decoder, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader, SeekMode, SeekTo};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use super::source::{LevelSource, PeakPair};

fn is_end_of_stream(err: &SymphoniaError) -> bool {
    matches!(err, SymphoniaError::IoError(e) if e.kind() == std::io::ErrorKind::UnexpectedEof)
}

/// Streams per-frame peak levels out of an audio file, decoding packets only
/// as frames are requested. Mono input is duplicated onto both channels and
/// anything beyond stereo is ignored.
pub struct SymphoniaSource {
    format: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    frame_len: usize,
    frame_count: u32,
    /// Decoded stereo samples not yet folded into a frame.
    pending: VecDeque<PeakPair>,
    exhausted: bool,
    /// Packets have been read since the last rewind.
    dirty: bool,
}

impl SymphoniaSource {
    pub fn open(path: &Path, frame_duration_ms: u32) -> Result<Self> {
        let file = std::fs::File::open(path)
            .with_context(|| format!("Failed to open audio file: {}", path.display()))?;

        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        let mut hint = Hint::new();
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            hint.with_extension(ext);
        }

        let probed = symphonia::default::get_probe()
            .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
            .context("Failed to probe audio format")?;

        let mut format = probed.format;

        let (track_id, codec_params) = {
            let track = format
                .tracks()
                .iter()
                .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
                .context("No audio tracks found")?;
            (track.id, track.codec_params.clone())
        };
        let sample_rate = codec_params.sample_rate.context("Unknown sample rate")?;

        let decoder = symphonia::default::get_codecs()
            .make(&codec_params, &DecoderOptions::default())
            .context("Failed to create audio decoder")?;

        // Containers without a length header need one demux pass to count samples
        let (total_samples, dirty) = match codec_params.n_frames {
            Some(n) => (n, false),
            None => (count_samples(format.as_mut(), track_id)?, true),
        };

        let frame_len = ((sample_rate as u64 * frame_duration_ms as u64) / 1000).max(1) as usize;
        let frame_count = (total_samples as f64 / frame_len as f64).round() as u32;

        log::info!(
            "Opened {}: {} samples/channel, {}Hz, {:.1}s, {} frames of {}ms",
            path.display(),
            total_samples,
            sample_rate,
            total_samples as f32 / sample_rate as f32,
            frame_count,
            frame_duration_ms
        );

        Ok(Self {
            format,
            decoder,
            track_id,
            frame_len,
            frame_count,
            pending: VecDeque::with_capacity(frame_len * 2),
            exhausted: false,
            dirty,
        })
    }

    /// Decode the next packet of our track into `pending`.
    fn decode_next_packet(&mut self) {
        self.dirty = true;
        let packet = match self.format.next_packet() {
            Ok(packet) => packet,
            Err(e) if is_end_of_stream(&e) => {
                self.exhausted = true;
                return;
            }
            Err(e) => {
                log::warn!("Stopping decode early: {}", e);
                self.exhausted = true;
                return;
            }
        };

        if packet.track_id() != self.track_id {
            return;
        }

        let decoded = match self.decoder.decode(&packet) {
            Ok(d) => d,
            Err(SymphoniaError::DecodeError(e)) => {
                log::debug!("Skipping undecodable packet: {}", e);
                return;
            }
            Err(e) => {
                log::warn!("Stopping decode early: {}", e);
                self.exhausted = true;
                return;
            }
        };

        let spec = *decoded.spec();
        let channels = spec.channels.count().max(1);
        let num_frames = decoded.frames();

        let mut sample_buf = SampleBuffer::<f32>::new(num_frames as u64, spec);
        sample_buf.copy_interleaved_ref(decoded);

        for frame_samples in sample_buf.samples().chunks(channels) {
            let l = frame_samples[0];
            let r = if channels > 1 { frame_samples[1] } else { l };
            self.pending.push_back((l, r));
        }
    }
}

/// Sum packet durations of one track without decoding them.
fn count_samples(format: &mut dyn FormatReader, track_id: u32) -> Result<u64> {
    let mut total = 0u64;
    loop {
        match format.next_packet() {
            Ok(packet) if packet.track_id() == track_id => total += packet.dur,
            Ok(_) => {}
            Err(e) if is_end_of_stream(&e) => break,
            Err(e) => return Err(e).context("Failed to scan audio packets"),
        }
    }
    Ok(total)
}

/// Max absolute sample per channel. A final partial window is peaked over
/// what exists.
fn window_peak(samples: impl Iterator<Item = PeakPair>) -> PeakPair {
    samples.fold((0.0f32, 0.0f32), |(pl, pr), (l, r)| (pl.max(l.abs()), pr.max(r.abs())))
}

impl LevelSource for SymphoniaSource {
    fn frame_count(&self) -> u32 {
        self.frame_count
    }

    fn next_levels(&mut self) -> Option<PeakPair> {
        while self.pending.len() < self.frame_len && !self.exhausted {
            self.decode_next_packet();
        }
        if self.pending.is_empty() {
            return None;
        }
        let take = self.frame_len.min(self.pending.len());
        Some(window_peak(self.pending.drain(..take)))
    }

    fn seek_start(&mut self) -> Result<()> {
        self.pending.clear();
        self.exhausted = false;
        if !self.dirty {
            return Ok(());
        }
        self.format
            .seek(
                SeekMode::Accurate,
                SeekTo::TimeStamp {
                    ts: 0,
                    track_id: self.track_id,
                },
            )
            .context("Failed to rewind audio stream")?;
        self.decoder.reset();
        self.dirty = false;
        Ok(())
    }

    fn close(&mut self) {
        self.pending = VecDeque::new();
        self.exhausted = true;
    }
}
