use anyhow::{Context, Result};
use std::io::{BufWriter, Write};
use std::path::Path;

use super::level::LevelTrack;

/// Write one level per line to any writer.
pub fn write_levels<W: Write>(mut out: W, levels: &[f32]) -> std::io::Result<()> {
    for level in levels {
        writeln!(out, "{}", level)?;
    }
    out.flush()
}

/// Dump the reference (left) channel of a track, replacing any existing file.
pub fn export_levels(track: &LevelTrack, path: &Path) -> Result<()> {
    if track.levels().is_empty() {
        log::warn!("{} has no levels to export", track.role());
    }
    let file = std::fs::File::create(path)
        .with_context(|| format!("Failed to create level dump: {}", path.display()))?;
    write_levels(BufWriter::new(file), track.left())
        .with_context(|| format!("Failed to write level dump: {}", path.display()))?;
    log::info!("Wrote {} {} levels to {}", track.len(), track.role(), path.display());
    Ok(())
}
