use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use serde::Deserialize;

use crate::capture::Quality;

fn default_frame_rate() -> f64 {
    24.0
}

fn default_sample_rate() -> u32 {
    44_100
}

fn default_analyze_duration() -> f64 {
    10.0
}

fn default_stop_timeout_secs() -> u64 {
    5
}

fn default_true() -> bool {
    true
}

/// Pipeline configuration, loadable from a layered config file with every
/// field defaulted except the output path.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Final output file; every intermediate artifact is a sibling named
    /// after its stem.
    pub output: PathBuf,

    #[serde(default)]
    pub quality: Quality,

    /// Measure the playback frame rate before recording instead of trusting
    /// `record_frame_rate`.
    #[serde(default = "default_true")]
    pub detect_frame_rate: bool,

    /// How many seconds of playback the Analyze phase measures.
    #[serde(default = "default_analyze_duration")]
    pub analyze_duration: f64,

    /// Frame rate the capture process records at.
    #[serde(default = "default_frame_rate")]
    pub record_frame_rate: f64,

    /// Frame rate of the final output; replaced by the measured playback
    /// rate when detection is enabled, and the fallback when the
    /// measurement is inconclusive.
    #[serde(default = "default_frame_rate")]
    pub output_frame_rate: f64,

    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,

    /// Constant audio offset in seconds, applied once at the final merge.
    #[serde(default)]
    pub audio_offset: f64,

    /// Title of the browser window the capture process grabs.
    #[serde(default)]
    pub window_title: String,

    /// Explicit capture device name; when unset the device is resolved
    /// (virtual loopback preferred, stereo mix fallback).
    #[serde(default)]
    pub audio_device: Option<String>,

    /// Grace period for the capture process to exit after the quit command.
    #[serde(default = "default_stop_timeout_secs")]
    pub stop_timeout_secs: u64,

    /// Keep demuxed/trimmed intermediates instead of deleting them after a
    /// successful merge.
    #[serde(default)]
    pub keep_temporary_files: bool,
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_secs(self.stop_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config: Config = serde_json::from_str(r#"{"output": "movie.mkv"}"#).unwrap();
        assert_eq!(config.record_frame_rate, 24.0);
        assert_eq!(config.output_frame_rate, 24.0);
        assert_eq!(config.sample_rate, 44_100);
        assert_eq!(config.analyze_duration, 10.0);
        assert_eq!(config.stop_timeout_secs, 5);
        assert_eq!(config.quality, Quality::Lossless);
        assert!(config.detect_frame_rate);
        assert!(!config.keep_temporary_files);
        assert!(config.audio_device.is_none());
    }
}
