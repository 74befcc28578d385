//! Recognition result types
//!
//! These mirror the JSON documents persisted per image and engine:
//! `{ "elapsedTime": 120, "results": [{ "text": "...", "x1": 0, ... }] }`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A point in image pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

/// Single detected text region
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OcrResult {
    /// Recognized text
    pub text: String,
    /// Recognition confidence, when the engine reports one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    pub x1: f64,
    pub x2: f64,
    pub x3: f64,
    pub x4: f64,
    pub y1: f64,
    pub y2: f64,
    pub y3: f64,
    pub y4: f64,
}

impl OcrResult {
    /// Build a region from its four corners (clockwise from top-left)
    pub fn from_corners(text: impl Into<String>, confidence: Option<f64>, corners: [Point; 4]) -> Self {
        Self {
            text: text.into(),
            confidence,
            x1: corners[0].x,
            x2: corners[1].x,
            x3: corners[2].x,
            x4: corners[3].x,
            y1: corners[0].y,
            y2: corners[1].y,
            y3: corners[2].y,
            y4: corners[3].y,
        }
    }

    /// The four corners in storage order
    pub fn corners(&self) -> [Point; 4] {
        [
            Point { x: self.x1, y: self.y1 },
            Point { x: self.x2, y: self.y2 },
            Point { x: self.x3, y: self.y3 },
            Point { x: self.x4, y: self.y4 },
        ]
    }
}

/// Output of running one engine over one image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectionResult {
    /// Recognition latency in milliseconds
    pub elapsed_time: f64,
    /// Detected regions in engine order
    pub results: Vec<OcrResult>,
}

/// Manually verified label for an image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroundTruth {
    pub text: String,
    pub attrib: BTreeMap<String, String>,
    pub value_attrib: BTreeMap<String, String>,
    pub x1: f64,
    pub x2: f64,
    pub x3: f64,
    pub x4: f64,
    pub y1: f64,
    pub y2: f64,
    pub y3: f64,
    pub y4: f64,
}

/// Turn one detected region into a ground-truth label
pub fn convert_ocr_result_to_ground_truth(result: &OcrResult) -> GroundTruth {
    let mut attrib = BTreeMap::new();
    attrib.insert("Type".to_string(), "text".to_string());
    let [p1, p2, p3, p4] = result.corners();

    GroundTruth {
        text: result.text.clone(),
        attrib,
        value_attrib: BTreeMap::new(),
        x1: p1.x,
        x2: p2.x,
        x3: p3.x,
        x4: p4.x,
        y1: p1.y,
        y2: p2.y,
        y3: p3.y,
        y4: p4.y,
    }
}

/// Turn every detected region into a ground-truth label, preserving order
pub fn convert_ocr_results_to_ground_truth(results: &[OcrResult]) -> Vec<GroundTruth> {
    results.iter().map(convert_ocr_result_to_ground_truth).collect()
}
