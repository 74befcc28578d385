//! Per-engine accuracy statistics
//!
//! Walks a project's images in order, scores every image that has both a
//! ground truth and a stored detection result for the engine, and folds the
//! scores into summary metrics.

use serde::{Serialize, Serializer};
use std::fmt;
use tracing::{debug, warn};

use super::scoring::{join_results, similarity};
use crate::error::{BenchError, Result};
use crate::storage::projects::ProjectInfo;
use crate::storage::{keys, KeyValueStore};
use crate::util::category_of;
use crate::vision::DetectionResult;

/// An averaged metric that may have no samples
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Metric {
    Value(f64),
    /// No image contributed to the average
    NoData,
}

impl Metric {
    /// `sum / count`, or [`Metric::NoData`] when `count == 0`
    pub fn mean(sum: f64, count: usize) -> Self {
        if count == 0 {
            Metric::NoData
        } else {
            Metric::Value(sum / count as f64)
        }
    }

    pub fn value(self) -> Option<f64> {
        match self {
            Metric::Value(v) => Some(v),
            Metric::NoData => None,
        }
    }

    /// Numeric view, `NaN` for [`Metric::NoData`]
    pub fn as_f64(self) -> f64 {
        self.value().unwrap_or(f64::NAN)
    }

    fn rounded(self, decimals: i32) -> Self {
        let factor = 10f64.powi(decimals);
        match self {
            Metric::Value(v) => Metric::Value((v * factor).round() / factor),
            Metric::NoData => Metric::NoData,
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match (self, f.precision()) {
            (Metric::Value(v), Some(p)) => format!("{:.*}", p, v),
            (Metric::Value(v), None) => v.to_string(),
            (Metric::NoData, _) => "-".to_string(),
        };
        let width = f.width().unwrap_or(0);
        match f.align() {
            Some(fmt::Alignment::Left) => write!(f, "{:<width$}", text),
            Some(fmt::Alignment::Center) => write!(f, "{:^width$}", text),
            _ => write!(f, "{:>width$}", text),
        }
    }
}

impl Serialize for Metric {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.value().serialize(serializer)
    }
}

/// Summary metrics of one engine over one project
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceMetrics {
    /// Every image in the project, regardless of the category filter
    pub file_number: usize,
    /// Images that scored exactly 1.0
    pub correct_files_number: usize,
    /// Images that had both ground truth and a detection result
    pub detected_files_number: usize,
    /// Mean elapsed time in milliseconds, two decimals
    pub average_time: Metric,
    /// Mean similarity score
    pub score: Metric,
}

/// Detail row for one scored image
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineDataTableRow {
    /// 1-based position of the image in the project list
    pub number: usize,
    pub filename: String,
    pub ground_truth: String,
    pub detected_text: String,
    /// Elapsed time as displayed
    pub time: String,
    pub score: f64,
}

/// Report of one engine over one project
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngineStatistics {
    /// Engine name
    pub name: String,
    pub metrics: PerformanceMetrics,
    pub rows: Vec<EngineDataTableRow>,
}

/// Outcome of scoring a single image
#[derive(Debug, Clone, PartialEq)]
pub struct ImageEvaluation {
    pub row: EngineDataTableRow,
    /// Numeric elapsed time behind `row.time`
    pub elapsed_time: f64,
}

/// Score one image of a project against one engine's stored result.
///
/// Returns `Ok(None)` when the image is filtered out by `category` or lacks
/// ground truth or a detection result. A stored detection result that is not
/// valid JSON is an error.
pub fn evaluate_image(
    store: &dyn KeyValueStore,
    project: &str,
    image: &str,
    engine: &str,
    category: Option<&str>,
    number: usize,
) -> Result<Option<ImageEvaluation>> {
    if let Some(category) = category {
        if category_of(image) != Some(category) {
            return Ok(None);
        }
    }

    let Some(ground_truth) = fetch(store, &keys::ground_truth(project, image)) else {
        debug!("No ground truth for {}, skipping", image);
        return Ok(None);
    };

    let result_key = keys::detection_result(project, &keys::detection_result_filename(image, engine));
    let Some(raw) = fetch(store, &result_key) else {
        debug!("No {} detection result for {}, skipping", engine, image);
        return Ok(None);
    };

    let detection: DetectionResult =
        serde_json::from_str(&raw).map_err(|source| BenchError::MalformedRecord {
            key: result_key.clone(),
            source,
        })?;

    let detected_text = join_results(&detection.results);
    let score = similarity(&ground_truth, &detected_text);

    Ok(Some(ImageEvaluation {
        row: EngineDataTableRow {
            number,
            filename: image.to_string(),
            ground_truth,
            detected_text,
            time: detection.elapsed_time.to_string(),
            score,
        },
        elapsed_time: detection.elapsed_time,
    }))
}

/// Read a key, treating store failures like a missing entry
fn fetch(store: &dyn KeyValueStore, key: &str) -> Option<String> {
    match store.get(key) {
        Ok(value) => value,
        Err(e) => {
            warn!("Failed to read {}: {}", key, e);
            None
        }
    }
}

/// Aggregate an engine's accuracy over a project.
///
/// Images are evaluated strictly in project order. `file_number` counts every
/// project image even when `category` filters some of them out.
pub fn compute_engine_statistics(
    store: &dyn KeyValueStore,
    project: &ProjectInfo,
    engine: &str,
    category: Option<&str>,
) -> Result<EngineStatistics> {
    let mut elapsed_sum = 0.0;
    let mut score_sum = 0.0;
    let mut correct = 0;
    let mut rows = Vec::new();

    for (index, image) in project.images.iter().enumerate() {
        let Some(evaluation) = evaluate_image(store, &project.name, image, engine, category, index + 1)? else {
            continue;
        };

        elapsed_sum += evaluation.elapsed_time;
        score_sum += evaluation.row.score;
        if evaluation.row.score == 1.0 {
            correct += 1;
        }
        rows.push(evaluation.row);
    }

    let detected = rows.len();
    let metrics = PerformanceMetrics {
        file_number: project.images.len(),
        correct_files_number: correct,
        detected_files_number: detected,
        average_time: Metric::mean(elapsed_sum, detected).rounded(2),
        score: Metric::mean(score_sum, detected),
    };

    debug!(
        "{} on {}: {}/{} detected, {} correct",
        engine, project.name, detected, metrics.file_number, correct
    );

    Ok(EngineStatistics {
        name: engine.to_string(),
        metrics,
        rows,
    })
}
