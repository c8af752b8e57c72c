use serde::Deserialize;
use std::path::PathBuf;

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub progress: ProgressConfig,
}

#[derive(Debug, Deserialize)]
pub struct AnalysisConfig {
    #[serde(default = "default_frame_duration_ms")]
    pub frame_duration_ms: u32,
    #[serde(default = "default_threshold_ratio")]
    pub threshold_ratio: f32,
    #[serde(default = "default_tolerance_ratio")]
    pub tolerance_ratio: f64,
    #[serde(default = "default_accent_ratio")]
    pub accent_ratio: f32,
}

#[derive(Debug, Deserialize)]
pub struct ProgressConfig {
    #[serde(default = "default_interval_percent")]
    pub interval_percent: f32,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            frame_duration_ms: default_frame_duration_ms(),
            threshold_ratio: default_threshold_ratio(),
            tolerance_ratio: default_tolerance_ratio(),
            accent_ratio: default_accent_ratio(),
        }
    }
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            interval_percent: default_interval_percent(),
            enabled: default_enabled(),
        }
    }
}

fn default_frame_duration_ms() -> u32 { 10 }
fn default_threshold_ratio() -> f32 { 0.3 }
fn default_tolerance_ratio() -> f64 { 0.1 }
fn default_accent_ratio() -> f32 { 1.3 }
fn default_interval_percent() -> f32 { 1.0 }
fn default_enabled() -> bool { true }

pub fn load_config(path: &PathBuf) -> Option<Config> {
    let content = std::fs::read_to_string(path).ok()?;
    toml::from_str(&content).ok()
}

/// Explicit path first, then `./cadence.toml`, then the user config dirs.
pub fn find_config(explicit: Option<PathBuf>) -> Option<PathBuf> {
    explicit.or_else(|| {
        let local = PathBuf::from("cadence.toml");
        if local.exists() {
            return Some(local);
        }
        if let Some(home) = dirs::home_dir() {
            let xdg = home.join(".config").join("cadence").join("config.toml");
            if xdg.exists() {
                return Some(xdg);
            }
        }
        if let Some(config_dir) = dirs::config_dir() {
            let platform = config_dir.join("cadence").join("config.toml");
            if platform.exists() {
                return Some(platform);
            }
        }
        None
    })
}
