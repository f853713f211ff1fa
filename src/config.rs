// Startup settings. Read from an optional JSON file (first CLI argument);
// anything missing falls back to the defaults below.

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Deserialize;

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub bpm: f32,
    pub master_volume_db: f32,
    pub lookahead_ms: u64, // how far ahead of the audio clock ticks get scheduled
    pub frame_ms: u64,     // ui redraw / input poll interval
    pub log_path: PathBuf,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bpm: 120.0,
            master_volume_db: -12.0,
            lookahead_ms: 100,
            frame_ms: 16, // ~60fps
            log_path: PathBuf::from("aetherseq.log"),
            log_level: String::from("info"),
        }
    }
}

impl Config {
    pub fn lookahead_secs(&self) -> f64 {
        self.lookahead_ms as f64 / 1000.0
    }

    pub fn log_level(&self) -> tracing::Level {
        self.log_level.parse().unwrap_or(tracing::Level::INFO)
    }
}

pub fn load(path: Option<&Path>) -> anyhow::Result<Config> {
    let Some(path) = path else {
        return Ok(Config::default());
    };
    let data = std::fs::read_to_string(path).with_context(|| format!("reading config {}", path.display()))?;
    parse(&data).with_context(|| format!("parsing config {}", path.display()))
}

pub fn parse(data: &str) -> anyhow::Result<Config> {
    Ok(serde_json::from_str(data)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_path_means_defaults() {
        let config = load(None).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.lookahead_secs(), 0.1);
    }

    #[test]
    fn partial_json_keeps_other_defaults() {
        let config = parse(r#"{ "bpm": 90, "log_level": "debug" }"#).unwrap();
        assert_eq!(config.bpm, 90.0);
        assert_eq!(config.log_level(), tracing::Level::DEBUG);
        assert_eq!(config.master_volume_db, -12.0);
        assert_eq!(config.frame_ms, 16);
    }

    #[test]
    fn bad_level_falls_back_to_info() {
        let config = parse(r#"{ "log_level": "loud" }"#).unwrap();
        assert_eq!(config.log_level(), tracing::Level::INFO);
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(load(Some(Path::new("/definitely/not/here.json"))).is_err());
        assert!(parse("{ not json").is_err());
    }
}
