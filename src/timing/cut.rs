use serde::{Deserialize, Serialize};

/// Tolerance for cut-boundary deduplication and float comparisons.
///
/// Carried over from the original tuning; treat as a tunable constant.
pub const EPSILON: f64 = 1e-6;

/// Half-open interval of time to exclude from the output, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Cut {
    pub start: f64,
    pub end: f64,
}

impl Cut {
    pub fn new(start: f64, end: f64) -> Self {
        debug_assert!(end >= start, "cut end must not precede start");
        Self { start, end }
    }

    pub fn length(&self) -> f64 {
        self.end - self.start
    }

    /// True when the interval is shorter than the dedup tolerance.
    pub fn is_empty(&self) -> bool {
        self.length() <= EPSILON
    }

    /// Converts the interval from seconds into integer frame or sample
    /// indices, using round-half-up (`round(seconds * rate)`).
    pub fn to_index(&self, rate: f64) -> IndexCut {
        IndexCut {
            start: (self.start * rate).round() as i64,
            end: (self.end * rate).round() as i64,
        }
    }
}

/// A cut after conversion into the frame or sample domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexCut {
    pub start: i64,
    pub end: i64,
}

impl IndexCut {
    pub fn length(&self) -> i64 {
        self.end - self.start
    }
}

/// Computes the list of segments to keep: the complement of `cuts` over
/// `[0, duration]`.
///
/// Cuts are sorted by start time first; the input list is order-independent
/// but must be non-overlapping. Segments shorter than [`EPSILON`] are
/// dropped so no degenerate trim filter is ever emitted. An empty cut list
/// yields exactly one segment `[0, duration]`.
pub fn include_list(cuts: &[Cut], duration: f64) -> Vec<Cut> {
    let mut sorted: Vec<Cut> = cuts.to_vec();
    sorted.sort_by(|a, b| a.start.total_cmp(&b.start));

    let mut include = Vec::with_capacity(sorted.len() + 1);
    let mut start = 0.0;

    for cut in &sorted {
        let segment = Cut::new(start, cut.start.max(start));
        if !segment.is_empty() {
            include.push(segment);
        }
        start = cut.end;
    }

    if start < duration {
        let tail = Cut::new(start, duration);
        if !tail.is_empty() {
            include.push(tail);
        }
    }

    include
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cut_length() {
        let cut = Cut::new(2.0, 2.5);
        assert!((cut.length() - 0.5).abs() < EPSILON);
    }

    #[test]
    fn test_empty_cut_detection() {
        assert!(Cut::new(1.0, 1.0).is_empty());
        assert!(Cut::new(1.0, 1.0 + EPSILON / 2.0).is_empty());
        assert!(!Cut::new(1.0, 1.1).is_empty());
    }

    #[test]
    fn test_to_index_rounds_half_up() {
        let cut = Cut::new(6.4, 9.4);
        let idx = cut.to_index(24.0);
        // 153.6 and 225.6 round up
        assert_eq!(idx, IndexCut { start: 154, end: 226 });

        let cut = Cut::new(0.0, 2.0);
        assert_eq!(cut.to_index(24.0), IndexCut { start: 0, end: 48 });
    }

    #[test]
    fn test_include_list_empty_cuts() {
        let include = include_list(&[], 10.0);
        assert_eq!(include.len(), 1);
        assert_eq!(include[0], Cut::new(0.0, 10.0));
    }

    #[test]
    fn test_include_list_is_complement() {
        let cuts = vec![Cut::new(2.0, 2.5), Cut::new(6.0, 6.4)];
        let duration = 10.0;
        let include = include_list(&cuts, duration);

        assert_eq!(include.len(), 3);
        assert_eq!(include[0], Cut::new(0.0, 2.0));
        assert_eq!(include[1], Cut::new(2.5, 6.0));
        assert_eq!(include[2], Cut::new(6.4, 10.0));

        // Kept length plus cut length covers the whole duration.
        let cut_total: f64 = cuts.iter().map(Cut::length).sum();
        let include_total: f64 = include.iter().map(Cut::length).sum();
        assert!((cut_total + include_total - duration).abs() < EPSILON);
    }

    #[test]
    fn test_include_list_unsorted_input() {
        let cuts = vec![Cut::new(6.0, 6.4), Cut::new(2.0, 2.5)];
        let include = include_list(&cuts, 10.0);
        assert_eq!(include.len(), 3);
        assert_eq!(include[0], Cut::new(0.0, 2.0));
    }

    #[test]
    fn test_include_list_drops_near_zero_segments() {
        // Cut reaching the very start and the very end leaves no head/tail.
        let cuts = vec![Cut::new(0.0, 1.0), Cut::new(9.0, 10.0)];
        let include = include_list(&cuts, 10.0);
        assert_eq!(include.len(), 1);
        assert_eq!(include[0], Cut::new(1.0, 9.0));
    }

    #[test]
    fn test_include_list_entire_stream_cut() {
        let cuts = vec![Cut::new(0.0, 10.0)];
        let include = include_list(&cuts, 10.0);
        assert!(include.is_empty());
    }

    #[test]
    fn test_index_round_trip_exact_multiples() {
        let rate = 24.0;
        for n in [0i64, 48, 60, 144, 226] {
            let seconds = n as f64 / rate;
            let idx = Cut::new(0.0, seconds).to_index(rate);
            assert!((idx.end as f64 / rate - seconds).abs() < 1.0 / rate);
        }
    }
}
