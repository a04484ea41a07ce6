use std::path::Path;

use serde::{Deserialize, Serialize};

/// Output quality preset, which drives the encoder arguments used for the
/// raw recording and both post-process trim passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Quality {
    Lossless,
    High,
    Medium,
    Low,
}

impl Default for Quality {
    fn default() -> Self {
        Quality::Lossless
    }
}

/// Builds transcoder argument vectors for every pipeline invocation.
///
/// Arguments are always vectors handed straight to the process spawn, never
/// shell strings.
#[derive(Debug, Clone)]
pub struct CommandFactory {
    quality: Quality,
}

fn fmt_f64(value: f64) -> String {
    format!("{value:.6}")
}

fn push_args(args: &mut Vec<String>, items: &[&str]) {
    args.extend(items.iter().map(|s| s.to_string()));
}

impl CommandFactory {
    pub fn new(quality: Quality) -> Self {
        Self { quality }
    }

    pub fn quality(&self) -> Quality {
        self.quality
    }

    /// Arguments for the combined screen+audio capture invocation.
    ///
    /// The audio device is captured as one input, the browser window as the
    /// other; both carry `-copyts -start_at_zero` so their timestamps stay
    /// comparable, and the progress interval is set to one output frame so
    /// record-time reports are as fine-grained as the format allows.
    pub fn record_args(
        &self,
        audio_device: &str,
        frame_rate: f64,
        sample_rate: u32,
        window_title: &str,
        output: &Path,
    ) -> Vec<String> {
        let mut args = Vec::new();
        push_args(&mut args, &["-y", "-hide_banner", "-loglevel", "warning"]);

        // Audio input.
        push_args(&mut args, &["-f", audio_input_format()]);
        push_args(&mut args, &["-thread_queue_size", "1024", "-probesize", "8M"]);
        args.push("-sample_rate".into());
        args.push(sample_rate.to_string());
        push_args(&mut args, &["-channel_layout", "stereo"]);
        push_args(&mut args, &["-copyts", "-start_at_zero"]);
        args.push("-i".into());
        args.push(audio_input_target(audio_device));

        // Video input.
        push_args(&mut args, &["-f", video_input_format()]);
        push_args(&mut args, &["-thread_queue_size", "1024", "-probesize", "64M"]);
        push_args(&mut args, &["-fflags", "+igndts"]);
        args.push("-framerate".into());
        args.push(fmt_f64(frame_rate));
        push_args(&mut args, &["-draw_mouse", "0"]);
        push_args(&mut args, &["-copyts", "-start_at_zero"]);
        args.push("-i".into());
        args.push(video_input_target(window_title));

        // Output encoding.
        match self.quality {
            Quality::Lossless => {
                push_args(&mut args, &["-c:v", "libx264rgb"]);
                args.push("-r".into());
                args.push(fmt_f64(frame_rate));
                push_args(&mut args, &["-c:a", "pcm_s16le", "-ac", "2"]);
                args.push("-ar".into());
                args.push(sample_rate.to_string());
                push_args(&mut args, &["-channel_layout", "stereo"]);
                push_args(
                    &mut args,
                    &["-preset", "ultrafast", "-tune", "zerolatency", "-qp", "0"],
                );
                push_args(&mut args, &["-pix_fmt", "rgb24", "-g", "1"]);
            }
            Quality::High => {
                push_args(&mut args, &["-c:v", "libx264rgb"]);
                args.push("-r".into());
                args.push(fmt_f64(frame_rate));
                push_args(&mut args, &["-c:a", "pcm_s16le", "-ac", "2"]);
                args.push("-ar".into());
                args.push(sample_rate.to_string());
                push_args(&mut args, &["-channel_layout", "stereo"]);
                push_args(
                    &mut args,
                    &["-preset", "ultrafast", "-tune", "zerolatency", "-crf", "0"],
                );
                push_args(&mut args, &["-pix_fmt", "rgb24"]);
            }
            Quality::Medium | Quality::Low => {
                let crf = if self.quality == Quality::Medium { "17" } else { "23" };
                push_args(&mut args, &["-c:v", "libx264"]);
                args.push("-r".into());
                args.push(fmt_f64(frame_rate));
                push_args(&mut args, &["-c:a", "aac", "-ac", "2"]);
                args.push("-ar".into());
                args.push(sample_rate.to_string());
                push_args(&mut args, &["-channel_layout", "stereo"]);
                push_args(
                    &mut args,
                    &["-preset", "ultrafast", "-tune", "zerolatency", "-crf", crf],
                );
                push_args(&mut args, &["-pix_fmt", "yuv420p"]);
            }
        }

        // Timestamp resets keep pause/resume from producing gaps.
        push_args(&mut args, &["-vf", "setpts=N/FR/TB"]);
        push_args(&mut args, &["-af", "asetpts=N/SR/TB"]);

        // Progress reports, one per output frame interval.
        push_args(&mut args, &["-stats", "-stats_period"]);
        args.push(fmt_f64(1.0 / frame_rate));

        args.push(output.display().to_string());
        args
    }

    /// Lossless video demux: stream-copies the video track only.
    pub fn demux_video_args(&self, input: &Path, output: &Path) -> Vec<String> {
        let mut args = Vec::new();
        push_args(&mut args, &["-y", "-hide_banner", "-v", "info", "-i"]);
        args.push(input.display().to_string());
        push_args(&mut args, &["-c:v", "copy", "-an"]);
        args.push(output.display().to_string());
        args
    }

    /// Lossless audio demux: stream-copies the audio track only.
    pub fn demux_audio_args(&self, input: &Path, output: &Path) -> Vec<String> {
        let mut args = Vec::new();
        push_args(&mut args, &["-y", "-hide_banner", "-v", "info", "-i"]);
        args.push(input.display().to_string());
        push_args(&mut args, &["-c:a", "copy", "-vn"]);
        args.push(output.display().to_string());
        args
    }

    /// Encoder arguments appended to each video trim invocation.
    pub fn video_trim_args(&self) -> Vec<String> {
        let mut args = vec!["-an".to_string()];
        match self.quality {
            Quality::Lossless => push_args(
                &mut args,
                &[
                    "-c:v", "libx264rgb", "-preset", "ultrafast", "-tune", "film", "-qp", "0",
                    "-pix_fmt", "rgb24", "-g", "1",
                ],
            ),
            Quality::High => push_args(
                &mut args,
                &[
                    "-c:v", "libx264rgb", "-preset", "ultrafast", "-tune", "film", "-crf", "0",
                    "-pix_fmt", "rgb24",
                ],
            ),
            Quality::Medium => push_args(
                &mut args,
                &[
                    "-c:v", "libx264", "-preset", "ultrafast", "-tune", "film", "-crf", "17",
                    "-pix_fmt", "yuv420p",
                ],
            ),
            Quality::Low => push_args(
                &mut args,
                &[
                    "-c:v", "libx264", "-preset", "ultrafast", "-tune", "film", "-crf", "23",
                    "-pix_fmt", "yuv420p",
                ],
            ),
        }
        args
    }

    /// Encoder arguments appended to each audio trim invocation.
    pub fn audio_trim_args(&self) -> Vec<String> {
        let codec = match self.quality {
            Quality::Lossless | Quality::High => "pcm_s16le",
            Quality::Medium | Quality::Low => "aac",
        };
        vec!["-vn".to_string(), "-c:a".to_string(), codec.to_string()]
    }

    pub fn audio_file_extension(&self) -> &'static str {
        match self.quality {
            Quality::Lossless | Quality::High => "wav",
            Quality::Medium | Quality::Low => "aac",
        }
    }

    pub fn video_file_extension(&self) -> &'static str {
        "mkv"
    }

    /// Final remerge: the constant audio offset is applied as an
    /// input-level timestamp shift and the result is clipped to the shorter
    /// stream.
    pub fn merge_args(
        &self,
        video: &Path,
        audio: &Path,
        audio_offset: f64,
        output: &Path,
    ) -> Vec<String> {
        let mut args = Vec::new();
        push_args(&mut args, &["-y", "-hide_banner", "-v", "info", "-i"]);
        args.push(video.display().to_string());
        args.push("-itsoffset".into());
        args.push(fmt_f64(audio_offset));
        args.push("-i".into());
        args.push(audio.display().to_string());
        push_args(&mut args, &["-map", "0:v:0", "-map", "1:a:0"]);
        push_args(&mut args, &["-c:v", "copy", "-c:a", "copy"]);
        args.push("-shortest".into());
        args.push(output.display().to_string());
        args
    }
}

#[cfg(windows)]
fn audio_input_format() -> &'static str {
    "dshow"
}

#[cfg(not(windows))]
fn audio_input_format() -> &'static str {
    "pulse"
}

#[cfg(windows)]
fn audio_input_target(device: &str) -> String {
    format!("audio={device}")
}

#[cfg(not(windows))]
fn audio_input_target(device: &str) -> String {
    device.to_string()
}

#[cfg(windows)]
fn video_input_format() -> &'static str {
    "gdigrab"
}

#[cfg(not(windows))]
fn video_input_format() -> &'static str {
    "x11grab"
}

#[cfg(windows)]
fn video_input_target(window_title: &str) -> String {
    format!("title={window_title}")
}

#[cfg(not(windows))]
fn video_input_target(_window_title: &str) -> String {
    std::env::var("DISPLAY").unwrap_or_else(|_| ":0.0".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_record_args_contain_both_inputs() {
        let factory = CommandFactory::new(Quality::Lossless);
        let args = factory.record_args(
            "loopback",
            24.0,
            44_100,
            "player window",
            &PathBuf::from("/tmp/out.mkv"),
        );
        let count = args.iter().filter(|a| a.as_str() == "-i").count();
        assert_eq!(count, 2);
        assert!(!args.contains(&"-shortest".to_string()));
        assert_eq!(args.last().unwrap(), "/tmp/out.mkv");
    }

    #[test]
    fn test_lossless_uses_rgb_intra_only() {
        let factory = CommandFactory::new(Quality::Lossless);
        let args = factory.video_trim_args();
        assert!(args.contains(&"libx264rgb".to_string()));
        assert!(args.contains(&"-g".to_string()));
    }

    #[test]
    fn test_lossy_audio_extension() {
        assert_eq!(CommandFactory::new(Quality::Low).audio_file_extension(), "aac");
        assert_eq!(
            CommandFactory::new(Quality::Lossless).audio_file_extension(),
            "wav"
        );
    }

    #[test]
    fn test_merge_args_offset_precedes_audio_input() {
        let factory = CommandFactory::new(Quality::Lossless);
        let args = factory.merge_args(
            &PathBuf::from("v.mkv"),
            &PathBuf::from("a.wav"),
            0.25,
            &PathBuf::from("out.mkv"),
        );
        let offset_pos = args.iter().position(|a| a == "-itsoffset").unwrap();
        let audio_pos = args.iter().position(|a| a == "a.wav").unwrap();
        assert!(offset_pos < audio_pos);
        assert!(args.contains(&"-shortest".to_string()));
    }
}
