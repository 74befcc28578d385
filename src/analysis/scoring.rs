//! Text normalization and similarity scoring

use strsim::normalized_levenshtein;

use crate::vision::OcrResult;

/// Separator placed between recognized lines
pub const LINE_SEPARATOR: &str = "\r\n";

/// Join the text of every detected region into one comparable string.
///
/// MRZ output is two or three fixed-width lines; ground truth stores them as
/// a single CRLF-separated string, so the lines are joined the same way.
pub fn join_results(results: &[OcrResult]) -> String {
    results
        .iter()
        .map(|r| r.text.as_str())
        .collect::<Vec<_>>()
        .join(LINE_SEPARATOR)
}

/// Normalized edit-distance similarity in `[0, 1]`.
///
/// `1 - levenshtein(a, b) / max(len(a), len(b))` over characters. Two empty
/// strings are a perfect match.
pub fn similarity(a: &str, b: &str) -> f64 {
    normalized_levenshtein(a, b)
}
