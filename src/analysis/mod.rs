//! Analysis Layer
//!
//! Scores stored detection results against ground truth and aggregates
//! per-engine accuracy and latency metrics.

pub mod scoring;
pub mod statistics;

pub use scoring::{join_results, similarity, LINE_SEPARATOR};
pub use statistics::{
    compute_engine_statistics, evaluate_image, EngineDataTableRow, EngineStatistics,
    ImageEvaluation, Metric, PerformanceMetrics,
};
