use regex::Regex;

/// One parsed progress report from the transcoder's log stream.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Progress {
    pub frame: i64,
    pub fps: f64,
    pub time: f64,
}

/// Parser for the fixed transcoder progress grammar:
/// `frame=<n> fps=<x> ... time=<HH:MM:SS.cc> ...`.
///
/// Any line that does not match is informational only.
#[derive(Debug)]
pub struct ProgressParser {
    pattern: Regex,
}

impl Default for ProgressParser {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressParser {
    pub fn new() -> Self {
        Self {
            pattern: Regex::new(r"^frame=\s*(\d+)\s+fps=\s*(\S+)\s+.*?time=(\S+)\s.*$")
                .expect("progress pattern is valid"),
        }
    }

    pub fn parse(&self, line: &str) -> Option<Progress> {
        let caps = self.pattern.captures(line)?;
        let frame: i64 = caps[1].parse().ok()?;
        let fps: f64 = caps[2].parse().ok()?;
        let time = parse_timestamp(&caps[3])?;
        Some(Progress { frame, fps, time })
    }
}

/// Time-only progress extraction, used by post-process invocations where the
/// line may start with either `frame=` (video) or `size=` (audio).
#[derive(Debug)]
pub struct TimeProgressParser {
    pattern: Regex,
}

impl Default for TimeProgressParser {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeProgressParser {
    pub fn new() -> Self {
        Self {
            pattern: Regex::new(r"^(?:frame|size)=.*?time=(\S+)\s.*$")
                .expect("time progress pattern is valid"),
        }
    }

    pub fn parse(&self, line: &str) -> Option<f64> {
        let caps = self.pattern.captures(line)?;
        parse_timestamp(&caps[1])
    }
}

/// Converts `HH:MM:SS.cc` (or plain seconds) into seconds.
pub fn parse_timestamp(value: &str) -> Option<f64> {
    if let Ok(seconds) = value.parse::<f64>() {
        return Some(seconds);
    }
    let mut parts = value.split(':');
    let hours: f64 = parts.next()?.parse().ok()?;
    let minutes: f64 = parts.next()?.parse().ok()?;
    let seconds: f64 = parts.next()?.parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    Some(hours * 3600.0 + minutes * 60.0 + seconds)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_progress_line() {
        let parser = ProgressParser::new();
        let line = "frame=  240 fps= 24 q=0.0 size=    5120kB time=00:00:10.00 bitrate=4194.3kbits/s speed=1.0x";
        let progress = parser.parse(line).unwrap();
        assert_eq!(progress.frame, 240);
        assert_eq!(progress.fps, 24.0);
        assert!((progress.time - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_non_progress_line_is_ignored() {
        let parser = ProgressParser::new();
        assert!(parser.parse("Input #0, matroska,webm, from 'x.mkv':").is_none());
        assert!(parser.parse("").is_none());
    }

    #[test]
    fn test_time_progress_audio_line() {
        let parser = TimeProgressParser::new();
        let line = "size=    1024kB time=00:01:30.50 bitrate= 92.6kbits/s speed=30x";
        let time = parser.parse(line).unwrap();
        assert!((time - 90.5).abs() < 1e-9);
    }

    #[test]
    fn test_parse_timestamp_forms() {
        assert_eq!(parse_timestamp("12.5"), Some(12.5));
        assert_eq!(parse_timestamp("00:00:02.50"), Some(2.5));
        assert_eq!(parse_timestamp("01:02:03.00"), Some(3723.0));
        assert_eq!(parse_timestamp("bogus"), None);
    }
}
