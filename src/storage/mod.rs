//! Storage Layer
//!
//! Key-value persistence for projects, images, ground truth and detection
//! results. Every entry of a project lives under the `"<project>:"` namespace.

pub mod database;
pub mod memory;
pub mod projects;

pub use database::SqliteStore;
pub use memory::MemoryStore;

use anyhow::Result as AnyResult;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::PathBuf;

use crate::error::{BenchError, Result};
use crate::util::filename_without_extension;

/// Minimal key-value interface the benchmark is written against
pub trait KeyValueStore {
    /// Read a value, `None` when the key is absent
    fn get(&self, key: &str) -> Result<Option<String>>;
    /// Insert or overwrite a value
    fn set(&self, key: &str, value: &str) -> Result<()>;
    /// Remove a key (absent keys are not an error)
    fn remove(&self, key: &str) -> Result<()>;
    /// All keys starting with `prefix`, in lexical order
    fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>>;
}

/// Read and decode a JSON value
pub fn get_json<T: DeserializeOwned>(store: &dyn KeyValueStore, key: &str) -> Result<Option<T>> {
    match store.get(key)? {
        Some(raw) => serde_json::from_str(&raw)
            .map(Some)
            .map_err(|source| BenchError::MalformedRecord {
                key: key.to_string(),
                source,
            }),
        None => Ok(None),
    }
}

/// Encode and write a JSON value
pub fn set_json<T: Serialize>(store: &dyn KeyValueStore, key: &str, value: &T) -> Result<()> {
    let raw = serde_json::to_string(value).map_err(|source| BenchError::MalformedRecord {
        key: key.to_string(),
        source,
    })?;
    store.set(key, &raw)
}

/// Key layout of the store
pub mod keys {
    use super::filename_without_extension;

    /// JSON array of every project name
    pub const PROJECTS: &str = "projects";

    /// Prefix shared by every key of a project
    pub fn namespace(project: &str) -> String {
        format!("{project}:")
    }

    pub fn project_info(project: &str) -> String {
        format!("{project}:info")
    }

    pub fn settings(project: &str) -> String {
        format!("{project}:settings")
    }

    pub fn image(project: &str, image: &str) -> String {
        format!("{project}:image:{image}")
    }

    pub fn ground_truth(project: &str, image: &str) -> String {
        format!(
            "{project}:groundTruth:{}.txt",
            filename_without_extension(image)
        )
    }

    /// Region-level labels behind the ground-truth text
    pub fn ground_truth_regions(project: &str, image: &str) -> String {
        format!(
            "{project}:groundTruth:{}.json",
            filename_without_extension(image)
        )
    }

    /// File name a detection result is stored under (`<basename>-<engine>.json`)
    pub fn detection_result_filename(image: &str, engine: &str) -> String {
        format!("{}-{engine}.json", filename_without_extension(image))
    }

    pub fn detection_result(project: &str, filename: &str) -> String {
        format!("{project}:detectionResult:{filename}")
    }

    pub fn detection_result_list(project: &str) -> String {
        format!("{project}:detectionResultFileNamesList")
    }

    pub fn results_archive(project: &str) -> String {
        format!("{project}:results.zip")
    }
}

/// Get the application data directory
pub fn get_data_dir() -> AnyResult<PathBuf> {
    let proj_dirs = directories::ProjectDirs::from("com", "mrzbenchmark", "MrzBenchmark")
        .ok_or_else(|| anyhow::anyhow!("Could not determine data directory"))?;

    let data_dir = proj_dirs.data_dir().to_path_buf();
    std::fs::create_dir_all(&data_dir)?;

    Ok(data_dir)
}

/// Get the configuration directory
pub fn get_config_dir() -> AnyResult<PathBuf> {
    let proj_dirs = directories::ProjectDirs::from("com", "mrzbenchmark", "MrzBenchmark")
        .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;

    let config_dir = proj_dirs.config_dir().to_path_buf();
    std::fs::create_dir_all(&config_dir)?;

    Ok(config_dir)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_layout() {
        assert_eq!(keys::image("p", "A/1.jpg"), "p:image:A/1.jpg");
        assert_eq!(keys::ground_truth("p", "A/1.jpg"), "p:groundTruth:A/1.txt");
        assert_eq!(
            keys::detection_result_filename("A/1.jpg", "tesseract"),
            "A/1-tesseract.json"
        );
        assert_eq!(
            keys::detection_result("p", "A/1-tesseract.json"),
            "p:detectionResult:A/1-tesseract.json"
        );
        assert_eq!(keys::detection_result_list("p"), "p:detectionResultFileNamesList");
    }

    #[test]
    fn test_json_helpers() {
        let store = MemoryStore::new();
        set_json(&store, "k", &vec!["a".to_string(), "b".to_string()]).unwrap();

        let value: Option<Vec<String>> = get_json(&store, "k").unwrap();
        assert_eq!(value, Some(vec!["a".to_string(), "b".to_string()]));

        let missing: Option<Vec<String>> = get_json(&store, "nope").unwrap();
        assert!(missing.is_none());
    }

    #[test]
    fn test_get_json_malformed() {
        let store = MemoryStore::new();
        store.set("k", "{not json").unwrap();

        let result: Result<Option<Vec<String>>> = get_json(&store, "k");
        assert!(matches!(result, Err(BenchError::MalformedRecord { .. })));
    }
}
