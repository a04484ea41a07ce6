pub mod cut;
pub mod metrics;

pub use cut::{include_list, Cut, IndexCut, EPSILON};
pub use metrics::RecordMetrics;

/// Epsilon comparison used for all cut-boundary and clock arithmetic.
pub fn approx_eq(a: f64, b: f64) -> bool {
    (a - b).abs() <= EPSILON
}
