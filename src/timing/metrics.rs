use std::time::Instant;

use super::cut::EPSILON;

const MEMORY_CAPACITY: usize = 128;
const FPS_MIN: u32 = 10;
const FPS_MAX: u32 = 90;

/// Running average of instantaneous frame rates over a fixed window.
///
/// Keeps a circular buffer of the last `capacity` per-update rates and a
/// running sum, so the average is O(1) per update.
#[derive(Debug)]
struct FrameRateCalculator {
    memory: Vec<f64>,
    read: usize,
    write: usize,
    len: usize,
    sum: f64,
    rate: f64,
}

impl FrameRateCalculator {
    fn new(capacity: usize) -> Self {
        Self {
            memory: vec![0.0; capacity],
            read: 0,
            write: 0,
            len: 0,
            sum: 0.0,
            rate: 0.0,
        }
    }

    fn add(&mut self, delta: f64) {
        let mut evicted = 0.0;
        if self.len == self.memory.len() {
            evicted = self.memory[self.read];
            self.read = (self.read + 1) % self.memory.len();
        } else {
            self.len += 1;
        }
        self.memory[self.write] = delta;
        self.write = (self.write + 1) % self.memory.len();
        self.sum += delta - evicted;
        self.rate = self.sum / self.len as f64;
    }

    fn get(&self) -> f64 {
        self.rate
    }

    fn reset(&mut self) {
        self.memory.fill(0.0);
        self.read = 0;
        self.write = 0;
        self.len = 0;
        self.sum = 0.0;
        self.rate = 0.0;
    }
}

/// Windowed histogram of frame rates in the `[FPS_MIN, FPS_MAX]` bucket
/// range.
///
/// The reported rate is the weighted mean across buckets rather than the
/// argmax bucket; this rejects codec/driver jitter and single outlier
/// spikes better than the mode would.
#[derive(Debug)]
struct FrameRateHistogram {
    min: u32,
    counts: Vec<u64>,
    memory: Vec<usize>,
    read: usize,
    write: usize,
    len: usize,
}

impl FrameRateHistogram {
    fn new(min: u32, max: u32, capacity: usize) -> Self {
        Self {
            min,
            counts: vec![0; (max - min + 1) as usize],
            memory: vec![0; capacity],
            read: 0,
            write: 0,
            len: 0,
        }
    }

    fn add(&mut self, value: u32) {
        let bucket = (value - self.min) as usize;
        if self.len == self.memory.len() {
            self.counts[self.memory[self.read]] -= 1;
            self.read = (self.read + 1) % self.memory.len();
        } else {
            self.len += 1;
        }
        self.memory[self.write] = bucket;
        self.write = (self.write + 1) % self.memory.len();
        self.counts[bucket] += 1;
    }

    fn average(&self) -> f64 {
        let mut value_sum = 0u64;
        let mut weight_sum = 0u64;
        for (i, &count) in self.counts.iter().enumerate() {
            value_sum += (i as u64 + self.min as u64) * count;
            weight_sum += count;
        }
        if weight_sum == 0 {
            return 0.0;
        }
        value_sum as f64 / weight_sum as f64
    }

    fn reset(&mut self) {
        self.counts.fill(0);
        self.memory.fill(0);
        self.read = 0;
        self.write = 0;
        self.len = 0;
    }
}

/// Stateful estimator for a single Analyze or Record pass.
///
/// Smooths the noisy per-update playback frame rate and keeps a
/// self-synchronizing estimate of the capture process's record time between
/// its periodic progress reports.
#[derive(Debug)]
pub struct RecordMetrics {
    fps_calc: FrameRateCalculator,
    histogram: FrameRateHistogram,

    record_time: f64,
    last_record_time: f64,
    /// Wall-clock anchor of the last distinct progress report. `None` until
    /// the first report arrives.
    last_record_update: Option<Instant>,

    last_playback_time: f64,
    last_playback_frames: i64,
}

impl Default for RecordMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordMetrics {
    pub fn new() -> Self {
        Self {
            fps_calc: FrameRateCalculator::new(MEMORY_CAPACITY),
            histogram: FrameRateHistogram::new(FPS_MIN, FPS_MAX, MEMORY_CAPACITY),
            record_time: 0.0,
            last_record_time: 0.0,
            last_record_update: None,
            last_playback_time: 0.0,
            last_playback_frames: 0,
        }
    }

    fn clamp_fps(rate: f64) -> u32 {
        (rate as u32).clamp(FPS_MIN, FPS_MAX)
    }

    /// Feeds one playback tick into the frame-rate estimators.
    ///
    /// Zero time deltas are rejected entirely (no update, not a zero rate).
    pub fn update_playback(&mut self, time: f64, frames: i64) {
        let dt = time - self.last_playback_time;
        let df = frames - self.last_playback_frames;
        if dt == 0.0 {
            return;
        }
        self.fps_calc.add(df as f64 / dt);
        self.histogram.add(Self::clamp_fps(self.fps_calc.get()));
        self.last_playback_time = time;
        self.last_playback_frames = frames;
    }

    /// Records a progress report from the capture process.
    ///
    /// The very first report anchors the wall clock unconditionally, even
    /// at time zero. After that the anchor only moves when the reported
    /// time actually changed; an unchanged report means the process is
    /// stalled and the interpolation keeps accumulating, which timestamps
    /// stalls that the reporting granularity alone would hide.
    pub fn update_record_at(&mut self, time: f64, now: Instant) {
        self.record_time = time;
        if self.last_record_update.is_none()
            || (time - self.last_record_time).abs() > EPSILON
        {
            self.last_record_update = Some(now);
        }
        self.last_record_time = time;
    }

    pub fn update_record(&mut self, time: f64) {
        self.update_record_at(time, Instant::now());
    }

    /// Wall-clock-interpolated record time at `now`. Before the first
    /// progress report this is simply the last known record time.
    pub fn record_time_at(&self, now: Instant) -> f64 {
        match self.last_record_update {
            Some(anchor) => self.record_time + now.duration_since(anchor).as_secs_f64(),
            None => self.record_time,
        }
    }

    pub fn record_time(&self) -> f64 {
        self.record_time_at(Instant::now())
    }

    /// Smoothed playback frame rate: weighted histogram mean.
    pub fn playback_frame_rate(&self) -> f64 {
        self.histogram.average()
    }

    /// Clears the estimators between measurement sub-passes. The next
    /// progress report re-anchors the wall clock.
    pub fn reset(&mut self) {
        self.fps_calc.reset();
        self.histogram.reset();
        self.last_playback_time = 0.0;
        self.last_playback_frames = 0;
        self.last_record_update = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_constant_input_converges() {
        let mut metrics = RecordMetrics::new();
        let fps = 25.0;
        // Fill well past the window so the oldest samples cycle out.
        for i in 1..=300i64 {
            metrics.update_playback(i as f64 / fps, i);
        }
        assert!((metrics.playback_frame_rate() - fps).abs() <= 1.0);
    }

    #[test]
    fn test_zero_delta_updates_are_rejected() {
        let mut metrics = RecordMetrics::new();
        metrics.update_playback(1.0, 24);
        let before = metrics.playback_frame_rate();
        // Same timestamp again must be a no-op, not a zero-rate sample.
        metrics.update_playback(1.0, 30);
        assert_eq!(metrics.playback_frame_rate(), before);
    }

    #[test]
    fn test_histogram_clamps_outliers() {
        let mut metrics = RecordMetrics::new();
        // Absurd instantaneous rate, clamped into [10, 90].
        metrics.update_playback(0.001, 500);
        let rate = metrics.playback_frame_rate();
        assert!((10.0..=90.0).contains(&rate));
    }

    #[test]
    fn test_record_time_interpolates_wall_clock() {
        let mut metrics = RecordMetrics::new();
        let t0 = Instant::now();
        metrics.update_record_at(3.0, t0);
        let later = t0 + Duration::from_millis(250);
        let estimated = metrics.record_time_at(later);
        assert!((estimated - 3.25).abs() < 1e-9);
    }

    #[test]
    fn test_first_report_anchors_at_caller_clock() {
        let mut metrics = RecordMetrics::new();
        // A zero-time report must anchor at the caller's clock, not at
        // construction time.
        let t0 = Instant::now() + Duration::from_secs(5);
        metrics.update_record_at(0.0, t0);
        let estimated = metrics.record_time_at(t0 + Duration::from_millis(500));
        assert!((estimated - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_record_time_before_first_report_does_not_drift() {
        let metrics = RecordMetrics::new();
        let later = Instant::now() + Duration::from_secs(10);
        assert_eq!(metrics.record_time_at(later), 0.0);
    }

    #[test]
    fn test_reset_rearms_the_anchor() {
        let mut metrics = RecordMetrics::new();
        let t0 = Instant::now();
        metrics.update_record_at(0.0, t0);
        metrics.reset();

        // The first report after a reset re-anchors even at the same time.
        let t1 = t0 + Duration::from_secs(3);
        metrics.update_record_at(0.0, t1);
        let estimated = metrics.record_time_at(t1 + Duration::from_secs(1));
        assert!((estimated - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_record_time_resets_on_new_report() {
        let mut metrics = RecordMetrics::new();
        let t0 = Instant::now();
        metrics.update_record_at(3.0, t0);

        let t1 = t0 + Duration::from_secs(1);
        metrics.update_record_at(4.0, t1);
        assert!((metrics.record_time_at(t1) - 4.0).abs() < 1e-9);
    }

    #[test]
    fn test_record_time_keeps_growing_on_stalled_report() {
        let mut metrics = RecordMetrics::new();
        let t0 = Instant::now();
        metrics.update_record_at(3.0, t0);

        // Process reports the same time again: the anchor must not move.
        let t1 = t0 + Duration::from_secs(2);
        metrics.update_record_at(3.0, t1);
        let estimated = metrics.record_time_at(t1 + Duration::from_secs(1));
        assert!((estimated - 6.0).abs() < 1e-9);
    }

    #[test]
    fn test_reset_clears_estimators() {
        let mut metrics = RecordMetrics::new();
        for i in 1..=50i64 {
            metrics.update_playback(i as f64 / 24.0, i);
        }
        metrics.reset();
        assert_eq!(metrics.playback_frame_rate(), 0.0);
    }
}
