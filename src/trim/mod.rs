use std::path::{Path, PathBuf};

use crate::error::CaptureError;
use crate::timing::cut::Cut;

/// Safe lower bound across the command-length limits of the supported
/// operating systems (the tightest is the Windows process creation limit of
/// 32767 characters).
const MAX_COMMAND_LENGTH: usize = 30_000;

/// A generated filter graph and the stream label its output is mapped from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrimScript {
    pub filtergraph: String,
    pub output_label: String,
}

/// Generates transcoder invocations that keep only the included segments of
/// a single stream.
///
/// Segment boundaries are converted from seconds to discrete units (frames
/// for video, samples for audio) so the filter graph operates on exact
/// stream positions. When the graph for one invocation would exceed the
/// portable command-length limit, the work is split across several
/// invocations plus a final concat join.
#[derive(Debug)]
pub struct TrimCommandGenerator {
    input: PathBuf,
    output: PathBuf,
    rate: f64,
    stream_descriptor: &'static str,
    trim_filter: &'static str,
    start_arg: &'static str,
    end_arg: &'static str,
    setpts: &'static str,
    concat_args: &'static str,
    stream_type: &'static str,
    extra_args: Vec<String>,
}

impl TrimCommandGenerator {
    /// Video trims operate on frame indices and reset presentation
    /// timestamps to the output frame grid.
    pub fn for_video(input: &Path, output: &Path, frame_rate: f64, extra_args: Vec<String>) -> Self {
        Self {
            input: input.to_path_buf(),
            output: output.to_path_buf(),
            rate: frame_rate,
            stream_descriptor: "0:v",
            trim_filter: "trim",
            start_arg: "start_frame",
            end_arg: "end_frame",
            setpts: "setpts=N/FR/TB",
            concat_args: "v=1:a=0",
            stream_type: "v",
            extra_args,
        }
    }

    /// Audio trims operate on sample indices and reset timestamps to the
    /// sample grid.
    pub fn for_audio(input: &Path, output: &Path, sample_rate: u32, extra_args: Vec<String>) -> Self {
        Self {
            input: input.to_path_buf(),
            output: output.to_path_buf(),
            rate: sample_rate as f64,
            stream_descriptor: "0:a",
            trim_filter: "atrim",
            start_arg: "start_sample",
            end_arg: "end_sample",
            setpts: "asetpts=N/SR/TB",
            concat_args: "v=0:a=1",
            stream_type: "a",
            extra_args,
        }
    }

    /// Builds the filter graph for one invocation over `include`.
    ///
    /// One trim filter per segment; a concat stage is added only when there
    /// are at least two segments, so a single segment maps straight from its
    /// own label.
    pub fn filter_script(&self, include: &[Cut]) -> Result<TrimScript, CaptureError> {
        if include.is_empty() {
            return Err(CaptureError::EmptyIncludeList);
        }

        let mut filtergraph = String::new();
        for (i, cut) in include.iter().enumerate() {
            let indexed = cut.to_index(self.rate);
            if i > 0 {
                filtergraph.push(';');
            }
            filtergraph.push_str(&format!(
                "[{}]{}={}={}:{}={},{}[t{}]",
                self.stream_descriptor,
                self.trim_filter,
                self.start_arg,
                indexed.start,
                self.end_arg,
                indexed.end,
                self.setpts,
                i,
            ));
        }

        let output_label = if include.len() >= 2 {
            filtergraph.push(';');
            for i in 0..include.len() {
                filtergraph.push_str(&format!("[t{i}]"));
            }
            filtergraph.push_str(&format!("concat=n={}:{}[c]", include.len(), self.concat_args));
            "c".to_string()
        } else {
            "t0".to_string()
        };

        Ok(TrimScript {
            filtergraph,
            output_label,
        })
    }

    // Estimated command length per included segment, using average digit
    // counts for the boundary values and the segment counter.
    fn max_cuts_per_command(&self) -> usize {
        let len_counter = 2.890;
        let len_value = 10.8889;
        let template_len = (self.stream_descriptor.len()
            + self.trim_filter.len()
            + self.start_arg.len()
            + self.end_arg.len()
            + self.setpts.len()
            + "[]==:,[t];".len()) as f64;
        let per_trim = template_len + 2.0 * len_value + len_counter;
        let per_concat = 3.0 + len_counter;
        ((MAX_COMMAND_LENGTH as f64) / (per_trim + per_concat)) as usize
    }

    fn partial_output_path(&self, index: usize) -> PathBuf {
        let stem = self
            .output
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let extension = self
            .output
            .extension()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.output
            .with_file_name(format!("{stem}.trim{index}.{extension}"))
    }

    fn trim_command(&self, include: &[Cut], output: &Path) -> Result<Vec<String>, CaptureError> {
        let script = self.filter_script(include)?;
        let mut args: Vec<String> = ["-y", "-hide_banner", "-v", "info", "-i"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        args.push(self.input.display().to_string());
        args.push("-filter_complex".into());
        args.push(script.filtergraph);
        args.push("-map".into());
        args.push(format!("[{}]", script.output_label));
        args.extend(self.extra_args.iter().cloned());
        args.push(output.display().to_string());
        Ok(args)
    }

    fn join_command(&self, parts: usize) -> Vec<String> {
        let mut args: Vec<String> = ["-y", "-hide_banner", "-v", "info"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        for i in 0..parts {
            args.push("-i".into());
            args.push(self.partial_output_path(i).display().to_string());
        }
        let mut filtergraph = String::new();
        for i in 0..parts {
            filtergraph.push_str(&format!("[{}:{}]", i, self.stream_type));
        }
        filtergraph.push_str(&format!("concat=n={}:{}[c]", parts, self.concat_args));
        args.push("-filter_complex".into());
        args.push(filtergraph);
        args.push("-map".into());
        args.push("[c]".into());
        args.extend(self.extra_args.iter().cloned());
        args.push(self.output.display().to_string());
        args
    }

    /// Intermediate part files produced when the work had to be split.
    /// Empty for a single-invocation trim.
    pub fn partial_outputs(&self, include: &[Cut]) -> Vec<PathBuf> {
        let max_per_command = self.max_cuts_per_command().max(1);
        if include.len() <= max_per_command {
            return Vec::new();
        }
        let parts = include.len().div_ceil(max_per_command);
        (0..parts).map(|i| self.partial_output_path(i)).collect()
    }

    /// All invocations needed to produce the trimmed output, in run order.
    pub fn commands(&self, include: &[Cut]) -> Result<Vec<Vec<String>>, CaptureError> {
        if include.is_empty() {
            return Err(CaptureError::EmptyIncludeList);
        }

        let max_per_command = self.max_cuts_per_command().max(1);
        if include.len() <= max_per_command {
            return Ok(vec![self.trim_command(include, &self.output)?]);
        }

        let mut commands = Vec::new();
        for (i, chunk) in include.chunks(max_per_command).enumerate() {
            commands.push(self.trim_command(chunk, &self.partial_output_path(i))?);
        }
        let parts = commands.len();
        commands.push(self.join_command(parts));
        Ok(commands)
    }
}
