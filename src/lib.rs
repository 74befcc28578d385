//! MRZ Benchmark - accuracy and latency benchmarking for MRZ recognition engines
//!
//! Runs pluggable recognition engines over a project's labeled images, stores
//! every detection result, and scores the results against ground truth with a
//! normalized edit-distance similarity.

pub mod analysis;
pub mod app;
pub mod config;
pub mod error;
pub mod report;
pub mod storage;
pub mod util;
pub mod vision;

pub use analysis::{compute_engine_statistics, EngineStatistics, Metric, PerformanceMetrics};
pub use app::BenchmarkApp;
pub use error::{BenchError, Result};
