//! Report rendering for engine statistics

use std::fmt::Write;

use crate::analysis::EngineStatistics;
use crate::config::ReportFormat;

/// Render statistics in the requested format
pub fn render(stats: &[EngineStatistics], format: ReportFormat, show_rows: bool) -> serde_json::Result<String> {
    match format {
        ReportFormat::Table => Ok(render_table(stats, show_rows)),
        ReportFormat::Json => render_json(stats, show_rows),
    }
}

/// JSON array of engine statistics
pub fn render_json(stats: &[EngineStatistics], show_rows: bool) -> serde_json::Result<String> {
    if show_rows {
        return serde_json::to_string_pretty(stats);
    }
    let trimmed: Vec<EngineStatistics> = stats
        .iter()
        .map(|s| EngineStatistics {
            rows: Vec::new(),
            ..s.clone()
        })
        .collect();
    serde_json::to_string_pretty(&trimmed)
}

/// Plain-text summary table, followed by one detail table per engine
pub fn render_table(stats: &[EngineStatistics], show_rows: bool) -> String {
    let mut out = String::new();
    let name_width = stats
        .iter()
        .map(|s| s.name.chars().count())
        .max()
        .unwrap_or(0)
        .max("Engine".len());

    let _ = writeln!(
        out,
        "{:<name_width$}  {:>6}  {:>8}  {:>7}  {:>14}  {:>6}",
        "Engine", "Files", "Detected", "Correct", "Avg time (ms)", "Score"
    );
    for s in stats {
        let m = &s.metrics;
        let _ = writeln!(
            out,
            "{:<name_width$}  {:>6}  {:>8}  {:>7}  {:>14.2}  {:>6.4}",
            s.name, m.file_number, m.detected_files_number, m.correct_files_number, m.average_time, m.score
        );
    }

    if !show_rows {
        return out;
    }

    for s in stats {
        let _ = writeln!(out, "\n{}", s.name);
        if s.rows.is_empty() {
            let _ = writeln!(out, "  (no scored images)");
            continue;
        }
        for row in &s.rows {
            let _ = writeln!(
                out,
                "  {:>4}  {}  time={} ms  score={:.4}",
                row.number, row.filename, row.time, row.score
            );
            let _ = writeln!(out, "        expected: {}", single_line(&row.ground_truth));
            let _ = writeln!(out, "        detected: {}", single_line(&row.detected_text));
        }
    }

    out
}

/// Show line breaks inside MRZ text as a visible marker
fn single_line(text: &str) -> String {
    text.replace("\r\n", " | ").replace('\n', " | ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{EngineDataTableRow, Metric, PerformanceMetrics};

    fn stats(rows: bool) -> Vec<EngineStatistics> {
        let row = EngineDataTableRow {
            number: 2,
            filename: "td3/a.jpg".to_string(),
            ground_truth: "AAA\r\nBBB".to_string(),
            detected_text: "AAA\r\nBBX".to_string(),
            time: "120".to_string(),
            score: 0.875,
        };
        vec![
            EngineStatistics {
                name: "tesseract".to_string(),
                metrics: PerformanceMetrics {
                    file_number: 3,
                    correct_files_number: 0,
                    detected_files_number: 1,
                    average_time: Metric::Value(120.0),
                    score: Metric::Value(0.875),
                },
                rows: if rows { vec![row] } else { Vec::new() },
            },
            EngineStatistics {
                name: "empty".to_string(),
                metrics: PerformanceMetrics {
                    file_number: 3,
                    correct_files_number: 0,
                    detected_files_number: 0,
                    average_time: Metric::NoData,
                    score: Metric::NoData,
                },
                rows: Vec::new(),
            },
        ]
    }

    #[test]
    fn test_table_summary_and_rows() {
        let table = render_table(&stats(true), true);

        assert!(table.starts_with("Engine"));
        assert!(table.contains("120.00"));
        assert!(table.contains("0.8750"));
        assert!(table.contains("td3/a.jpg"));
        assert!(table.contains("expected: AAA | BBB"));
        assert!(table.contains("(no scored images)"));

        let empty_line = table.lines().find(|l| l.starts_with("empty")).unwrap();
        assert!(empty_line.trim_end().ends_with('-'));
    }

    #[test]
    fn test_table_without_rows() {
        let table = render_table(&stats(true), false);
        assert_eq!(table.lines().count(), 3);
        assert!(!table.contains("td3/a.jpg"));
    }

    #[test]
    fn test_json_output() {
        let json = render(&stats(true), ReportFormat::Json, true).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value[0]["metrics"]["averageTime"], 120.0);
        assert_eq!(value[0]["rows"][0]["number"], 2);
        assert!(value[1]["metrics"]["score"].is_null());

        let json = render_json(&stats(true), false).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value[0]["rows"].as_array().unwrap().len(), 0);
    }
}
