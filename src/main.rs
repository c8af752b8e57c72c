mod analysis;
mod audio;
mod cli;
mod config;
mod error;
mod pattern;
mod worker;

use anyhow::{Context, Result};
use clap::Parser;
use std::process::ExitCode;
use std::time::Duration;

use analysis::compare::{Comparator, MatchSettings};
use audio::export::export_levels;
use cli::Cli;
use error::AnalysisError;
use pattern::loader::load_pattern;
use worker::{extract_pair, ExtractOptions};

fn main() -> Result<ExitCode> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let mut cli = Cli::parse();
    let mut accent_ratio = MatchSettings::default().accent_ratio;
    let mut show_progress = !cli.no_progress;

    if let Some(ref path) = config::find_config(cli.config.clone()) {
        if let Some(cfg) = config::load_config(path) {
            log::info!("Loaded config from {}", path.display());
            // Merge: config values apply only when CLI is at its default
            if cli.frame_ms == 10 { cli.frame_ms = cfg.analysis.frame_duration_ms; }
            if cli.threshold == 0.3 { cli.threshold = cfg.analysis.threshold_ratio; }
            if cli.tolerance == 0.1 { cli.tolerance = cfg.analysis.tolerance_ratio; }
            if cli.progress_interval == 1.0 { cli.progress_interval = cfg.progress.interval_percent; }
            if !cli.no_progress { show_progress = cfg.progress.enabled; }
            accent_ratio = cfg.analysis.accent_ratio;
        } else {
            log::warn!("Failed to load config from {}", path.display());
        }
    }

    for input in [&cli.pattern, &cli.solution, &cli.sample] {
        if !input.exists() {
            anyhow::bail!("Input file not found: {}", input.display());
        }
    }
    if cli.frame_ms == 0 {
        anyhow::bail!("Frame length must be at least 1ms");
    }

    log::info!("cadence - rhythm performance checker");
    log::info!("Pattern: {}", cli.pattern.display());
    log::info!("Solution: {}", cli.solution.display());
    log::info!("Sample: {}", cli.sample.display());
    log::info!("Frame length: {}ms", cli.frame_ms);

    // 1. Pattern
    let pattern = load_pattern(&cli.pattern)?;

    // 2. Levels of both recordings, extracted concurrently
    let options = ExtractOptions {
        frame_duration_ms: cli.frame_ms,
        progress_interval_percent: cli.progress_interval,
        show_progress,
        timeout: cli.timeout_secs.map(Duration::from_secs),
    };
    let (solution, sample) = extract_pair(&cli.solution, &cli.sample, &options)?;
    for track in [&solution, &sample] {
        log::info!(
            "{}: {}/{} frames ({:?}), peak {:.4}",
            track.role(),
            track.frame_done_count(),
            track.num_frames(),
            track.state(),
            track.peak_value()
        );
    }

    // 3. Optional level dumps, before alignment rewrites the tracks
    if let Some(ref path) = cli.export_solution {
        export_levels(&solution, path)?;
    }
    if let Some(ref path) = cli.export_sample {
        export_levels(&sample, path)?;
    }

    // 4. Compare
    let mut comparator = Comparator::new(MatchSettings {
        threshold_ratio: cli.threshold,
        tolerance_ratio: cli.tolerance,
        accent_ratio,
    });
    comparator.set_solution(solution);
    comparator.set_sample(sample);
    comparator.load_pattern(pattern);

    let report = match comparator.run() {
        Ok(report) => report,
        Err(AnalysisError::StructuralMismatch(msg)) => {
            println!("{}", msg);
            return Ok(ExitCode::from(2));
        }
        Err(e) => return Err(e).context("Comparison failed"),
    };

    if cli.json {
        let json = serde_json::to_string_pretty(&report).context("Failed to serialize report")?;
        println!("{}", json);
    } else {
        print!("{}", report);
    }

    Ok(if report.is_correct() {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    })
}
