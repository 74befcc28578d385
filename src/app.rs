//! Application Coordinator
//!
//! Ties the store, the engine registry and the configuration together:
//! runs engines over a project's images, derives ground truth from engine
//! output, and produces per-engine statistics.

use tracing::{info, warn};

use crate::analysis::{compute_engine_statistics, join_results, EngineStatistics};
use crate::config::AppConfig;
use crate::error::Result;
use crate::storage::projects::{
    ground_truth, load_image, load_project_reader_configs, record_detection_result,
    set_ground_truth, ProjectInfo,
};
use crate::storage::{get_json, keys, set_json, KeyValueStore};
use crate::vision::{convert_ocr_results_to_ground_truth, DetectionResult, EngineRegistry};

/// Outcome of one detection run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DetectionRunSummary {
    /// Images recognized and stored
    pub processed: usize,
    /// Images the engine failed on
    pub failed: usize,
    /// Images without a stored payload
    pub skipped: usize,
}

/// Main application coordinator
pub struct BenchmarkApp {
    /// Backing key-value store
    store: Box<dyn KeyValueStore>,
    /// Registered recognition engines
    registry: EngineRegistry,
    /// Loaded configuration
    config: AppConfig,
}

impl BenchmarkApp {
    /// Create a coordinator with the built-in engines
    pub fn new(store: Box<dyn KeyValueStore>, config: AppConfig) -> Self {
        let registry = EngineRegistry::with_builtin(&config.engines);
        Self::with_registry(store, registry, config)
    }

    /// Create a coordinator with a custom registry
    pub fn with_registry(store: Box<dyn KeyValueStore>, registry: EngineRegistry, config: AppConfig) -> Self {
        Self {
            store,
            registry,
            config,
        }
    }

    pub fn store(&self) -> &dyn KeyValueStore {
        self.store.as_ref()
    }

    pub fn registry(&self) -> &EngineRegistry {
        &self.registry
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Engines to use for a project: the requested ones, or the project's
    /// configured engines in their configured order.
    ///
    /// Unregistered names are kept so their stored results stay reportable.
    pub fn resolve_engines(&self, project: &str, requested: &[String]) -> Result<Vec<String>> {
        if !requested.is_empty() {
            for engine in requested.iter().filter(|e| !self.registry.contains(e)) {
                warn!("{} is not a registered engine; only stored results can be used", engine);
            }
            return Ok(requested.to_vec());
        }
        Ok(load_project_reader_configs(self.store(), project, &self.registry)?
            .into_iter()
            .map(|c| c.engine)
            .collect())
    }

    /// Run one engine over every image of a project and store the results.
    ///
    /// The project's settings for the engine are applied first. Failures on a
    /// single image are logged and counted; the run continues.
    pub async fn run_detection(&self, project: &ProjectInfo, engine: &str) -> Result<DetectionRunSummary> {
        let settings = load_project_reader_configs(self.store(), &project.name, &self.registry)?
            .into_iter()
            .find(|c| c.engine == engine)
            .map(|c| c.settings)
            .unwrap_or_default();

        let handle = self.registry.ensure_initialized(engine).await?;
        let mut instance = handle.lock().await;
        instance.apply_settings(&settings).await?;

        info!(
            "Running {} over {} images of {}",
            instance.name(),
            project.images.len(),
            project.name
        );

        let total = project.images.len();
        let mut summary = DetectionRunSummary::default();

        for (index, image) in project.images.iter().enumerate() {
            let data = match load_image(self.store(), &project.name, image) {
                Ok(Some(data)) => data,
                Ok(None) => {
                    warn!("No stored image data for {}, skipping", image);
                    summary.skipped += 1;
                    continue;
                }
                Err(e) => {
                    warn!("Could not load {}: {}", image, e);
                    summary.failed += 1;
                    continue;
                }
            };

            match instance.detect(&data).await {
                Ok(result) => {
                    let filename = keys::detection_result_filename(image, engine);
                    set_json(
                        self.store(),
                        &keys::detection_result(&project.name, &filename),
                        &result,
                    )?;
                    record_detection_result(self.store(), &project.name, &filename)?;
                    summary.processed += 1;
                    info!(
                        "[{}/{}] {}: {} lines in {} ms",
                        index + 1,
                        total,
                        image,
                        result.results.len(),
                        result.elapsed_time
                    );
                }
                Err(e) => {
                    warn!("[{}/{}] {} failed on {}: {}", index + 1, total, engine, image, e);
                    summary.failed += 1;
                }
            }
        }

        info!(
            "{} finished: {} processed, {} failed, {} skipped",
            engine, summary.processed, summary.failed, summary.skipped
        );
        Ok(summary)
    }

    /// Derive ground truth from an engine's stored results.
    ///
    /// Only images without ground truth are labeled unless `overwrite` is set.
    /// Returns the number of labeled images.
    pub fn label_from_engine(&self, project: &ProjectInfo, engine: &str, overwrite: bool) -> Result<usize> {
        let mut labeled = 0;

        for image in &project.images {
            if !overwrite && ground_truth(self.store(), &project.name, image)?.is_some() {
                continue;
            }

            let key = keys::detection_result(
                &project.name,
                &keys::detection_result_filename(image, engine),
            );
            let Some(result) = get_json::<DetectionResult>(self.store(), &key)? else {
                continue;
            };

            let truths = convert_ocr_results_to_ground_truth(&result.results);
            let text = join_results(&result.results);

            set_ground_truth(self.store(), &project.name, image, &text)?;
            set_json(
                self.store(),
                &keys::ground_truth_regions(&project.name, image),
                &truths,
            )?;
            labeled += 1;
        }

        info!("Labeled {} images of {} from {}", labeled, project.name, engine);
        Ok(labeled)
    }

    /// Statistics for each engine, in the given order
    pub fn statistics(
        &self,
        project: &ProjectInfo,
        engines: &[String],
        category: Option<&str>,
    ) -> Result<Vec<EngineStatistics>> {
        engines
            .iter()
            .map(|engine| compute_engine_statistics(self.store(), project, engine, category))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::Metric;
    use crate::storage::projects::{add_image, create_project, save_project_reader_configs, ReaderConfig};
    use crate::storage::MemoryStore;
    use crate::vision::testing::ScriptedFactory;
    use crate::vision::{GroundTruth, OcrResult, Point, Setting, SettingKind};

    const TD3_LINE1: &str = "P<UTOERIKSSON<<ANNA<MARIA<<<<<<<<<<<<<<<<<<<";
    const TD3_LINE2: &str = "L898902C36UTO7408122F1204159ZE184226B<<<<<10";

    fn region(text: &str) -> OcrResult {
        OcrResult::from_corners(text, Some(0.95), [Point { x: 1.0, y: 2.0 }; 4])
    }

    fn detection(elapsed: f64, lines: &[&str]) -> DetectionResult {
        DetectionResult {
            elapsed_time: elapsed,
            results: lines.iter().map(|l| region(l)).collect(),
        }
    }

    /// App with one scripted engine answering for images "good" and "typo"
    fn app() -> (BenchmarkApp, std::sync::Arc<parking_lot::Mutex<Vec<Setting>>>) {
        let factory = ScriptedFactory::new("scripted")
            .answer(b"good", detection(100.0, &[TD3_LINE1, TD3_LINE2]))
            .answer(b"typo", detection(50.0, &[TD3_LINE1, "L898902C36UTO7408122F1204159ZE184226B<<<<<1O"]));
        let settings = factory.settings.clone();

        let mut registry = EngineRegistry::new();
        registry.register(Box::new(factory));

        let app = BenchmarkApp::with_registry(Box::new(MemoryStore::new()), registry, AppConfig::default());
        (app, settings)
    }

    fn project(app: &BenchmarkApp, images: &[(&str, &str)]) -> ProjectInfo {
        let mut project = create_project(app.store(), "p").unwrap();
        for (name, data) in images {
            add_image(app.store(), &mut project, name, data.as_bytes()).unwrap();
        }
        project
    }

    #[tokio::test]
    async fn test_run_detection_then_statistics() {
        let (app, _) = app();
        let mut project = project(&app, &[("1.jpg", "good"), ("2.jpg", "typo"), ("3.jpg", "unknown")]);
        project.images.push("4.jpg".to_string());
        let truth = format!("{TD3_LINE1}\r\n{TD3_LINE2}");
        for image in ["1.jpg", "2.jpg", "3.jpg"] {
            set_ground_truth(app.store(), "p", image, &truth).unwrap();
        }

        let summary = app.run_detection(&project, "scripted").await.unwrap();
        assert_eq!(
            summary,
            DetectionRunSummary {
                processed: 2,
                failed: 1,
                skipped: 1
            }
        );

        let listed: Vec<String> = get_json(app.store(), &keys::detection_result_list("p"))
            .unwrap()
            .unwrap();
        assert_eq!(listed, vec!["1-scripted.json", "2-scripted.json"]);

        let stats = app
            .statistics(&project, &["scripted".to_string()], None)
            .unwrap();
        assert_eq!(stats.len(), 1);
        let metrics = &stats[0].metrics;
        assert_eq!(metrics.file_number, 4);
        assert_eq!(metrics.detected_files_number, 2);
        assert_eq!(metrics.correct_files_number, 1);
        assert_eq!(metrics.average_time, Metric::Value(75.0));
        // One substitution over 90 characters on the second image
        let expected = (1.0 + (1.0 - 1.0 / 90.0)) / 2.0;
        assert!((metrics.score.as_f64() - expected).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_rerun_overwrites_without_duplicating_list() {
        let (app, _) = app();
        let project = project(&app, &[("1.jpg", "good")]);

        app.run_detection(&project, "scripted").await.unwrap();
        app.run_detection(&project, "scripted").await.unwrap();

        let listed: Vec<String> = get_json(app.store(), &keys::detection_result_list("p"))
            .unwrap()
            .unwrap();
        assert_eq!(listed.len(), 1);
    }

    #[tokio::test]
    async fn test_run_detection_applies_project_settings() {
        let (app, applied) = app();
        let project = project(&app, &[("1.jpg", "good")]);
        let configs = vec![ReaderConfig {
            engine: "scripted".to_string(),
            display_name: "Scripted".to_string(),
            color: None,
            settings: vec![Setting::new("template", "MRZ", SettingKind::String)],
        }];
        save_project_reader_configs(app.store(), "p", &configs).unwrap();

        app.run_detection(&project, "scripted").await.unwrap();

        assert_eq!(applied.lock().clone(), configs[0].settings);
    }

    #[tokio::test]
    async fn test_run_detection_unknown_engine() {
        let (app, _) = app();
        let project = project(&app, &[("1.jpg", "good")]);
        assert!(app.run_detection(&project, "missing").await.is_err());
    }

    #[tokio::test]
    async fn test_label_from_engine() {
        let (app, _) = app();
        let project = project(&app, &[("1.jpg", "good"), ("2.jpg", "typo")]);
        set_ground_truth(app.store(), "p", "2.jpg", "MANUAL").unwrap();
        app.run_detection(&project, "scripted").await.unwrap();

        assert_eq!(app.label_from_engine(&project, "scripted", false).unwrap(), 1);
        assert_eq!(
            ground_truth(app.store(), "p", "1.jpg").unwrap(),
            Some(format!("{TD3_LINE1}\r\n{TD3_LINE2}"))
        );
        assert_eq!(ground_truth(app.store(), "p", "2.jpg").unwrap().as_deref(), Some("MANUAL"));

        let regions: Vec<GroundTruth> = get_json(app.store(), &keys::ground_truth_regions("p", "1.jpg"))
            .unwrap()
            .unwrap();
        assert_eq!(regions.len(), 2);
        assert_eq!(regions[1].text, TD3_LINE2);

        assert_eq!(app.label_from_engine(&project, "scripted", true).unwrap(), 2);
        assert_ne!(ground_truth(app.store(), "p", "2.jpg").unwrap().as_deref(), Some("MANUAL"));
    }

    /// Store that refuses to write the detection-result list
    struct ListWriteFails(MemoryStore);

    impl KeyValueStore for ListWriteFails {
        fn get(&self, key: &str) -> Result<Option<String>> {
            self.0.get(key)
        }
        fn set(&self, key: &str, value: &str) -> Result<()> {
            if key.ends_with(":detectionResultFileNamesList") {
                return Err(crate::error::BenchError::Io(std::io::Error::other("read-only")));
            }
            self.0.set(key, value)
        }
        fn remove(&self, key: &str) -> Result<()> {
            self.0.remove(key)
        }
        fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>> {
            self.0.keys_with_prefix(prefix)
        }
    }

    #[tokio::test]
    async fn test_delete_project_removes_unlisted_detection_results() {
        let factory = ScriptedFactory::new("scripted").answer(b"good", detection(10.0, &[TD3_LINE1]));
        let mut registry = EngineRegistry::new();
        registry.register(Box::new(factory));
        let app = BenchmarkApp::with_registry(
            Box::new(ListWriteFails(MemoryStore::new())),
            registry,
            AppConfig::default(),
        );
        let project = project(&app, &[("1.jpg", "good")]);

        // The result is written, then recording it in the list fails
        assert!(app.run_detection(&project, "scripted").await.is_err());
        let orphan = keys::detection_result("p", "1-scripted.json");
        assert!(app.store().get(&orphan).unwrap().is_some());

        crate::storage::projects::delete_project(app.store(), "p").unwrap();

        assert!(app.store().keys_with_prefix("p:").unwrap().is_empty());
    }

    #[test]
    fn test_resolve_engines() {
        let (app, _) = app();
        assert_eq!(app.resolve_engines("p", &[]).unwrap(), vec!["scripted"]);
        assert_eq!(
            app.resolve_engines("p", &["other".to_string()]).unwrap(),
            vec!["other"]
        );
    }
}
